use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

// ===== RESPONSE ENVELOPE =====

/// Every REST payload arrives wrapped as `{ "data": ... }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope { data: f(self.data) }
    }
}

// ===== CONTEXT TYPES =====

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    /// Offset of the site's local time from UTC, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub organization_ids: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl UserSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn can_access(&self, organization_id: &str) -> bool {
        self.organization_ids.iter().any(|id| id == organization_id)
    }
}

// ===== TIME SERIES =====

/// A single sensor sample as returned by the trend endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor_id: String,
    #[serde(default)]
    pub zone: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub value: f64,
}

// ===== SCHEDULES =====

/// Schedule events come in two shapes distinguished by the `mode` field.
///
/// `simple` events carry fixed operating hours; `auto` events let the
/// controller decide occupancy and only carry setpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScheduleEvent {
    Simple {
        days: Vec<Weekday>,
        start: NaiveTime,
        end: NaiveTime,
        #[serde(default)]
        setpoint_celsius: Option<f64>,
    },
    Auto {
        days: Vec<Weekday>,
        occupied_setpoint_celsius: f64,
        unoccupied_setpoint_celsius: f64,
    },
}

impl ScheduleEvent {
    pub fn days(&self) -> &[Weekday] {
        match self {
            ScheduleEvent::Simple { days, .. } => days,
            ScheduleEvent::Auto { days, .. } => days,
        }
    }

    pub fn applies_on(&self, weekday: Weekday) -> bool {
        self.days().contains(&weekday)
    }

    /// Opening and closing time, for events that have fixed hours.
    pub fn fixed_hours(&self) -> Option<(NaiveTime, NaiveTime)> {
        match self {
            ScheduleEvent::Simple { start, end, .. } => Some((*start, *end)),
            ScheduleEvent::Auto { .. } => None,
        }
    }
}
