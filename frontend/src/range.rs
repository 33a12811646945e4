use crate::errors::ValidationError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl FrequencyUnit {
    fn suffix(self) -> &'static str {
        match self {
            FrequencyUnit::Minute => "m",
            FrequencyUnit::Hour => "h",
            FrequencyUnit::Day => "d",
            FrequencyUnit::Week => "w",
            FrequencyUnit::Month => "M",
        }
    }

    /// Nominal length; months count as 30 days.
    fn nominal(self) -> Duration {
        match self {
            FrequencyUnit::Minute => Duration::minutes(1),
            FrequencyUnit::Hour => Duration::hours(1),
            FrequencyUnit::Day => Duration::days(1),
            FrequencyUnit::Week => Duration::weeks(1),
            FrequencyUnit::Month => Duration::days(30),
        }
    }
}

/// Bucket size of a time series, e.g. 15 minutes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frequency {
    size: u32,
    unit: FrequencyUnit,
}

impl Frequency {
    pub fn new(size: u32, unit: FrequencyUnit) -> Result<Self, ValidationError> {
        if size == 0 {
            return Err(ValidationError::ZeroFrequency);
        }
        Ok(Self { size, unit })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn unit(&self) -> FrequencyUnit {
        self.unit
    }

    /// Nominal bucket length, or `None` if it does not fit in a `Duration`.
    pub fn bucket(&self) -> Option<Duration> {
        i32::try_from(self.size)
            .ok()
            .and_then(|size| self.unit.nominal().checked_mul(size))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.size, self.unit.suffix())
    }
}

/// Time window a dashboard card fetches for.
///
/// Two selections compare equal only when start, end and frequency all
/// match, which is what callers check before reloading.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeSelection {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    frequency: Option<Frequency>,
}

impl RangeSelection {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::EmptyRange { start, end });
        }
        Ok(Self {
            start,
            end,
            frequency: None,
        })
    }

    /// The `span` leading up to `now`.
    pub fn trailing(span: Duration, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        Self::new(now - span, now)
    }

    pub fn with_frequency(self, frequency: Frequency) -> Result<Self, ValidationError> {
        if frequency.bucket().is_none_or(|bucket| bucket > self.duration()) {
            return Err(ValidationError::FrequencyExceedsRange {
                frequency: frequency.to_string(),
            });
        }
        Ok(Self {
            frequency: Some(frequency),
            ..self
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn frequency(&self) -> Option<Frequency> {
        self.frequency
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// Query parameters understood by the trend endpoints.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("start".to_string(), self.start.to_rfc3339()),
            ("end".to_string(), self.end.to_rfc3339()),
        ];
        if let Some(frequency) = self.frequency {
            params.push(("frequency_size".to_string(), frequency.size.to_string()));
            params.push((
                "frequency_unit".to_string(),
                serde_json::to_value(frequency.unit)
                    .ok()
                    .and_then(|value| value.as_str().map(str::to_string))
                    .unwrap_or_default(),
            ));
        }
        params
    }
}
