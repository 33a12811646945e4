//! Chart helpers: axis formatters, operating-hours overlays and series
//!
//! Formatters are plain functions over an `AxisSnapshot` taken when the chart
//! options are built, so they never reach back into view state.

use crate::filter_set::FilterSet;
use crate::range::{Frequency, FrequencyUnit, RangeSelection};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use indexmap::{IndexMap, IndexSet};
use shared::{Reading, ScheduleEvent};

const MISSING_VALUE: &str = "n/a";

/// What an axis formatter needs to know about the chart it labels.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSnapshot {
    pub unit: String,
    pub precision: usize,
    pub utc_offset_minutes: i32,
    pub frequency: Option<Frequency>,
}

impl AxisSnapshot {
    pub fn format_value(&self, value: f64) -> String {
        if !value.is_finite() {
            return MISSING_VALUE.to_string();
        }
        if self.unit.is_empty() {
            format!("{value:.prec$}", prec = self.precision)
        } else {
            format!("{value:.prec$} {}", self.unit, prec = self.precision)
        }
    }

    /// Labels `at` in the site's local time, coarser for coarser buckets.
    pub fn format_timestamp(&self, at: DateTime<Utc>) -> String {
        let pattern = match self.frequency.map(|frequency| frequency.unit()) {
            Some(FrequencyUnit::Minute | FrequencyUnit::Hour) => "%H:%M",
            Some(FrequencyUnit::Day | FrequencyUnit::Week) => "%b %d",
            Some(FrequencyUnit::Month) => "%b %Y",
            None => "%b %d %H:%M",
        };
        at.with_timezone(&site_offset(self.utc_offset_minutes))
            .format(pattern)
            .to_string()
    }
}

fn site_offset(utc_offset_minutes: i32) -> FixedOffset {
    utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| {
            log::warn!("UTC offset of {utc_offset_minutes} minutes is out of range, using UTC");
            Utc.fix()
        })
}

// ===== PLOT LINES =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotLineKind {
    Open,
    Close,
}

/// A vertical marker on a trend chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotLine {
    pub at: DateTime<Utc>,
    pub kind: PlotLineKind,
}

/// Opening and closing markers for every fixed-hours schedule day inside
/// `range`, in chronological order.
///
/// Schedule times are local to the site. `auto` events have no fixed hours
/// and produce no markers.
pub fn operating_hours_plot_lines(
    range: &RangeSelection,
    events: &[ScheduleEvent],
    utc_offset_minutes: i32,
) -> Vec<PlotLine> {
    let offset = site_offset(utc_offset_minutes);
    let first_day = range.start().with_timezone(&offset).date_naive();
    let last_day = range.end().with_timezone(&offset).date_naive();

    let mut lines = Vec::new();
    for day in first_day.iter_days().take_while(|day| *day <= last_day) {
        let weekday = day.weekday();
        for event in events.iter().filter(|event| event.applies_on(weekday)) {
            match event {
                ScheduleEvent::Simple { start, end, .. } => {
                    for (time, kind) in [(*start, PlotLineKind::Open), (*end, PlotLineKind::Close)] {
                        let at = local_to_utc(day, time, offset);
                        if range.contains(at) {
                            lines.push(PlotLine { at, kind });
                        }
                    }
                }
                ScheduleEvent::Auto { .. } => {}
            }
        }
    }
    lines.sort_by_key(|line| line.at);
    lines.dedup();
    lines
}

fn local_to_utc(day: NaiveDate, time: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    (day.and_time(time) - offset).and_utc()
}

// ===== SERIES =====

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub sensor_id: String,
    pub points: Vec<(DateTime<Utc>, f64)>,
}

/// Distinct sensor ids in first-seen order.
pub fn sensor_ids(readings: &[Reading]) -> Vec<String> {
    readings
        .iter()
        .map(|reading| reading.sensor_id.as_str())
        .collect::<IndexSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// One time-ordered series per sensor that passes `filter`.
pub fn group_series(readings: &[Reading], filter: &FilterSet<String>) -> Vec<Series> {
    let mut grouped: IndexMap<&str, Vec<(DateTime<Utc>, f64)>> = IndexMap::new();
    for reading in readings.iter().filter(|reading| filter.matches(&reading.sensor_id)) {
        grouped
            .entry(reading.sensor_id.as_str())
            .or_default()
            .push((reading.recorded_at, reading.value));
    }
    grouped
        .into_iter()
        .map(|(sensor_id, mut points)| {
            points.sort_by_key(|(at, _)| *at);
            Series {
                sensor_id: sensor_id.to_string(),
                points,
            }
        })
        .collect()
}
