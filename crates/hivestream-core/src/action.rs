//! Time-based actions: recurring contract invocations measured in
//! blockchain time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::StreamerError;

/// Longest accepted action id.
pub const MAX_ACTION_ID_LEN: usize = 255;

// ─── Frequency ───────────────────────────────────────────────────────────────

/// Unit in which elapsed time is measured for a [`Frequency`] bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

/// How often a [`ScheduledAction`] fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Frequency {
    /// Every processed block.
    EveryBlock,
    Seconds3,
    Seconds10,
    Seconds30,
    Minute1,
    Minutes5,
    Minutes15,
    Minutes30,
    Hour1,
    Hours12,
    Hours24,
    Week1,
}

impl Frequency {
    /// All buckets, shortest first.
    pub const ALL: [Frequency; 12] = [
        Self::EveryBlock,
        Self::Seconds3,
        Self::Seconds10,
        Self::Seconds30,
        Self::Minute1,
        Self::Minutes5,
        Self::Minutes15,
        Self::Minutes30,
        Self::Hour1,
        Self::Hours12,
        Self::Hours24,
        Self::Week1,
    ];

    /// Canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EveryBlock => "block",
            Self::Seconds3 => "3s",
            Self::Seconds10 => "10s",
            Self::Seconds30 => "30s",
            Self::Minute1 => "1m",
            Self::Minutes5 => "5m",
            Self::Minutes15 => "15m",
            Self::Minutes30 => "30m",
            Self::Hour1 => "1h",
            Self::Hours12 => "12h",
            Self::Hours24 => "24h",
            Self::Week1 => "1w",
        }
    }

    /// The measuring unit and the threshold in that unit.
    ///
    /// `EveryBlock` has a zero threshold, so it is due on every block.
    pub fn threshold(&self) -> (TimeUnit, i64) {
        match self {
            Self::EveryBlock => (TimeUnit::Seconds, 0),
            Self::Seconds3 => (TimeUnit::Seconds, 3),
            Self::Seconds10 => (TimeUnit::Seconds, 10),
            Self::Seconds30 => (TimeUnit::Seconds, 30),
            Self::Minute1 => (TimeUnit::Minutes, 1),
            Self::Minutes5 => (TimeUnit::Minutes, 5),
            Self::Minutes15 => (TimeUnit::Minutes, 15),
            Self::Minutes30 => (TimeUnit::Minutes, 30),
            Self::Hour1 => (TimeUnit::Hours, 1),
            Self::Hours12 => (TimeUnit::Hours, 12),
            Self::Hours24 => (TimeUnit::Hours, 24),
            Self::Week1 => (TimeUnit::Days, 7),
        }
    }

    /// Whole units elapsed between `since` and `now`, truncated.
    pub fn elapsed(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        let delta = now - since;
        match self.threshold().0 {
            TimeUnit::Seconds => delta.num_seconds(),
            TimeUnit::Minutes => delta.num_minutes(),
            TimeUnit::Hours => delta.num_hours(),
            TimeUnit::Days => delta.num_days(),
        }
    }

    /// Returns `true` if enough blockchain time has passed since `since`.
    pub fn is_due(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if *self == Self::EveryBlock {
            return true;
        }
        self.elapsed(since, now) >= self.threshold().1
    }
}

impl FromStr for Frequency {
    type Err = StreamerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let freq = match s {
            "block" | "every-block" => Self::EveryBlock,
            "3s" => Self::Seconds3,
            "10s" => Self::Seconds10,
            "30s" => Self::Seconds30,
            "1m" => Self::Minute1,
            "5m" => Self::Minutes5,
            "15m" => Self::Minutes15,
            "30m" => Self::Minutes30,
            "1h" => Self::Hour1,
            "12h" => Self::Hours12,
            "24h" | "1d" | "day" => Self::Hours24,
            "1w" | "week" => Self::Week1,
            other => return Err(StreamerError::InvalidFrequency(other.to_string())),
        };
        Ok(freq)
    }
}

impl TryFrom<String> for Frequency {
    type Error = StreamerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Frequency> for String {
    fn from(f: Frequency) -> Self {
        f.as_str().to_string()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── ScheduledAction ─────────────────────────────────────────────────────────

/// A persisted, recurring invocation of a contract action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub id: String,
    pub frequency: Frequency,
    pub contract_name: String,
    pub contract_method: String,
    #[serde(default)]
    pub payload: Value,
    /// Last reset point; elapsed time is measured from here.
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub last_execution_at: Option<DateTime<Utc>>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default)]
    pub max_executions: Option<u64>,
    /// Informational only; comparisons always use UTC blockchain time.
    #[serde(default)]
    pub timezone: Option<String>,
}

fn enabled_default() -> bool {
    true
}

impl ScheduledAction {
    /// Create an enabled action scheduled from `scheduled_at`.
    pub fn new(
        id: impl Into<String>,
        frequency: Frequency,
        contract_name: impl Into<String>,
        contract_method: impl Into<String>,
        payload: Value,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Self, StreamerError> {
        let action = Self {
            id: id.into(),
            frequency,
            contract_name: contract_name.into(),
            contract_method: contract_method.into(),
            payload,
            scheduled_at,
            last_execution_at: None,
            enabled: true,
            execution_count: 0,
            max_executions: None,
            timezone: None,
        };
        action.validate()?;
        Ok(action)
    }

    /// Limit the number of firings; the action is removed after the last one.
    pub fn with_max_executions(mut self, max: u64) -> Self {
        self.max_executions = Some(max);
        self
    }

    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = Some(tz.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check id shape and that the target names are present.
    pub fn validate(&self) -> Result<(), StreamerError> {
        if !is_valid_action_id(&self.id) {
            return Err(StreamerError::InvalidAction(format!(
                "id '{}' must be 1-{MAX_ACTION_ID_LEN} characters of [A-Za-z0-9_-]",
                self.id
            )));
        }
        if self.contract_name.is_empty() || self.contract_method.is_empty() {
            return Err(StreamerError::InvalidAction(format!(
                "action '{}' needs a contract name and method",
                self.id
            )));
        }
        Ok(())
    }

    /// Returns `true` if the action should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.frequency.is_due(self.scheduled_at, now)
    }

    /// Record a successful firing at `now`.
    pub fn record_execution(&mut self, now: DateTime<Utc>) {
        self.execution_count += 1;
        self.last_execution_at = Some(now);
        self.scheduled_at = now;
    }

    /// Restart the interval from `now` without counting a firing.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.scheduled_at = now;
    }

    /// Returns `true` once `max_executions` has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.max_executions
            .map(|max| self.execution_count >= max)
            .unwrap_or(false)
    }
}

/// Ids are 1..=255 characters of ASCII alphanumerics, `_` and `-`.
pub fn is_valid_action_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ACTION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn parse_known_and_alias_buckets() {
        assert_eq!("1m".parse::<Frequency>().unwrap(), Frequency::Minute1);
        assert_eq!("week".parse::<Frequency>().unwrap(), Frequency::Week1);
        assert_eq!("1d".parse::<Frequency>().unwrap(), Frequency::Hours24);
        for f in Frequency::ALL {
            assert_eq!(f.as_str().parse::<Frequency>().unwrap(), f);
        }
    }

    #[test]
    fn unknown_bucket_is_rejected() {
        let err = "2m".parse::<Frequency>().unwrap_err();
        assert!(matches!(err, StreamerError::InvalidFrequency(ref s) if s == "2m"));
        assert!(serde_json::from_value::<Frequency>(json!("90s")).is_err());
    }

    #[test]
    fn due_below_and_at_threshold() {
        let f = Frequency::Seconds30;
        assert!(!f.is_due(t0(), t0() + Duration::seconds(29)));
        assert!(f.is_due(t0(), t0() + Duration::seconds(30)));

        let f = Frequency::Hour1;
        assert!(!f.is_due(t0(), t0() + Duration::minutes(59)));
        assert!(f.is_due(t0(), t0() + Duration::minutes(60)));

        let f = Frequency::Week1;
        assert!(!f.is_due(t0(), t0() + Duration::days(6) + Duration::hours(23)));
        assert!(f.is_due(t0(), t0() + Duration::days(7)));
    }

    #[test]
    fn elapsed_truncates_to_unit() {
        let f = Frequency::Minutes5;
        assert_eq!(f.elapsed(t0(), t0() + Duration::seconds(299)), 4);
        assert!(!f.is_due(t0(), t0() + Duration::seconds(299)));
    }

    #[test]
    fn every_block_is_always_due() {
        assert!(Frequency::EveryBlock.is_due(t0(), t0()));
    }

    #[test]
    fn time_going_backwards_is_not_due() {
        assert!(!Frequency::Seconds3.is_due(t0(), t0() - Duration::seconds(10)));
    }

    #[test]
    fn id_validation() {
        assert!(is_valid_action_id("daily_payout-1"));
        assert!(!is_valid_action_id(""));
        assert!(!is_valid_action_id("has space"));
        assert!(!is_valid_action_id(&"a".repeat(256)));
        assert!(is_valid_action_id(&"a".repeat(255)));

        let err = ScheduledAction::new("bad id", Frequency::Minute1, "c", "m", json!({}), t0());
        assert!(matches!(err, Err(StreamerError::InvalidAction(_))));
    }

    #[test]
    fn record_execution_resets_reference_time() {
        let mut a = ScheduledAction::new("a1", Frequency::Minute1, "c", "m", json!({}), t0())
            .unwrap()
            .with_max_executions(2);
        let now = t0() + Duration::minutes(1);
        a.record_execution(now);
        assert_eq!(a.execution_count, 1);
        assert_eq!(a.scheduled_at, now);
        assert_eq!(a.last_execution_at, Some(now));
        assert!(!a.is_exhausted());
        a.record_execution(now + Duration::minutes(1));
        assert!(a.is_exhausted());
    }

    #[test]
    fn persisted_form_roundtrip() {
        let action = ScheduledAction::new(
            "weekly-draw",
            Frequency::Week1,
            "lotto",
            "draw",
            json!({"pot": "100.000 HIVE"}),
            t0(),
        )
        .unwrap()
        .with_max_executions(4)
        .with_timezone("Europe/Berlin")
        .disabled();

        let stored = serde_json::to_string(&action).unwrap();
        assert!(stored.contains("\"frequency\":\"1w\""));
        let restored: ScheduledAction = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, action);
    }
}
