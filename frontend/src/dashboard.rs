//! Trend card view model
//!
//! Wires the pieces together the way every dashboard card does: context and
//! range inputs feed a watch effect, the effect drives a reconciler over the
//! API client, and the loaded readings feed a sensor filter and the derived
//! chart series. Losing the location context (another organization, a
//! sign-out) clears the readings and drops whatever is still in flight.
//!
//! Loads are spawned with `Task::start`, so a card must live inside a
//! `tokio::task::LocalSet`.

use crate::app_context::AppContext;
use crate::config::RefreshSection;
use crate::dataflow::{Atom, AutoRefresh, Derived, Effect, ReadOnly, Runtime, Task};
use crate::errors::ErrorSink;
use crate::filter_set::FilterController;
use crate::format::{AxisSnapshot, PlotLine, Series, group_series, operating_hours_plot_lines, sensor_ids};
use crate::loading::{LoadState, Reconciler};
use crate::range::RangeSelection;
use crate::transport::ApiClient;
use shared::{Reading, ScheduleEvent};
use std::cell::RefCell;
use std::rc::Rc;

/// Everything a readings request depends on. A change in any part reloads.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendKey {
    pub location_id: String,
    pub range: RangeSelection,
    pub utc_offset_minutes: i32,
}

impl TrendKey {
    fn path(&self) -> String {
        format!("/locations/{}/readings", self.location_id)
    }

    fn params(&self) -> Vec<(String, String)> {
        let mut params = self.range.to_params();
        params.push((
            "utc_offset_minutes".to_string(),
            self.utc_offset_minutes.to_string(),
        ));
        params
    }
}

fn load(readings: &Reconciler<TrendKey, Vec<Reading>>, client: &ApiClient, key: TrendKey) {
    let client = client.clone();
    let settled = readings.run(key, move |key| client.get(&key.path(), key.params()));
    Task::start(async move {
        let outcome = settled.await;
        log::debug!("Trend readings settled: {outcome:?}");
    });
}

pub struct TrendCard {
    range: Atom<Option<RangeSelection>>,
    timezone: Atom<Option<i32>>,
    readings: Reconciler<TrendKey, Vec<Reading>>,
    sensors: FilterController<String>,
    series: Derived<Vec<Series>>,
    client: ApiClient,
    auto_refresh: RefCell<Option<AutoRefresh>>,
    _load_effect: Effect,
    _scope_reset: Effect,
    _sensor_universe: Effect,
}

impl TrendCard {
    pub fn new(
        runtime: &Runtime,
        context: &AppContext,
        client: ApiClient,
        errors: Rc<dyn ErrorSink>,
    ) -> Self {
        let range = runtime.atom(None::<RangeSelection>);
        let timezone = runtime.atom(None::<i32>);
        let readings = Reconciler::with_error_sink(runtime, errors);

        let location = context.location_in_scope();
        let load_effect = runtime.watch(
            {
                let (range, timezone) = (range.clone(), timezone.clone());
                move || {
                    Some(TrendKey {
                        location_id: location.with(|location| location.as_ref().map(|l| l.id.clone()))?,
                        range: range.get()?,
                        utc_offset_minutes: timezone.get()?,
                    })
                }
            },
            {
                let (readings, client) = (readings.clone(), client.clone());
                move |key| load(&readings, &client, key)
            },
        );

        let scope_reset = runtime.effect({
            let (location, readings) = (context.location_in_scope(), readings.clone());
            move || {
                if location.with(Option::is_none) && readings.current_key().is_some() {
                    log::debug!("Location left the current context, clearing readings");
                    readings.reset();
                }
            }
        });

        let state = readings.state();
        let sensors = FilterController::new(runtime);
        let sensor_universe = sensors.bind_universe(
            runtime,
            runtime.derive({
                let state = state.clone();
                move || state.with(|state| state.value.as_deref().map(sensor_ids).unwrap_or_default())
            }),
        );

        let series = runtime.derive({
            let filter = sensors.state();
            move || {
                filter.with(|filter| {
                    state.with(|state| {
                        state
                            .value
                            .as_deref()
                            .map(|readings| group_series(readings, filter))
                            .unwrap_or_default()
                    })
                })
            }
        });

        Self {
            range,
            timezone,
            readings,
            sensors,
            series,
            client,
            auto_refresh: RefCell::new(None),
            _load_effect: load_effect,
            _scope_reset: scope_reset,
            _sensor_universe: sensor_universe,
        }
    }

    /// No-op when `range` equals the current one.
    pub fn set_range(&self, range: RangeSelection) {
        self.range.set_neq(Some(range));
    }

    pub fn set_timezone(&self, utc_offset_minutes: i32) {
        self.timezone.set_neq(Some(utc_offset_minutes));
    }

    pub fn readings(&self) -> ReadOnly<LoadState<Vec<Reading>>> {
        self.readings.state()
    }

    pub fn sensors(&self) -> &FilterController<String> {
        &self.sensors
    }

    pub fn series(&self) -> Derived<Vec<Series>> {
        self.series.clone()
    }

    /// Reloads the current request, keeping the shown data while loading.
    pub fn refresh(&self) {
        match self.readings.current_key() {
            Some(key) => load(&self.readings, &self.client, key),
            None => log::debug!("Nothing to refresh yet"),
        }
    }

    /// Starts periodic refresh if `config` enables it. Replaces any earlier
    /// schedule.
    pub fn start_auto_refresh(&self, config: &RefreshSection) {
        let refresh = config.period().map(|period| {
            let (readings, client) = (self.readings.clone(), self.client.clone());
            AutoRefresh::start(period, move || {
                if let Some(key) = readings.current_key() {
                    load(&readings, &client, key);
                }
            })
        });
        *self.auto_refresh.borrow_mut() = refresh;
    }

    pub fn stop_auto_refresh(&self) {
        self.auto_refresh.borrow_mut().take();
    }

    pub fn axis(&self, unit: &str, precision: usize) -> AxisSnapshot {
        AxisSnapshot {
            unit: unit.to_string(),
            precision,
            utc_offset_minutes: self.timezone.get_untracked().unwrap_or_default(),
            frequency: self
                .range
                .with_untracked(|range| range.as_ref().and_then(RangeSelection::frequency)),
        }
    }

    pub fn plot_lines(&self, schedule: &[ScheduleEvent]) -> Vec<PlotLine> {
        let offset = self.timezone.get_untracked().unwrap_or_default();
        self.range
            .with_untracked(|range| {
                range
                    .as_ref()
                    .map(|range| operating_hours_plot_lines(range, schedule, offset))
            })
            .unwrap_or_default()
    }
}

impl Drop for TrendCard {
    fn drop(&mut self) {
        self.auto_refresh.get_mut().take();
        self.readings.abandon();
    }
}
