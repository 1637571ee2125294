use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::ScanConfigId;
use crate::error::{OrchestratorError, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSchedule {
    /// Next time a scan should be started for this config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_time: Option<DateTime<Utc>>,
    /// Repeat cadence; one-shot schedules leave this unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval_secs: Option<u64>,
}

impl RuntimeSchedule {
    /// First occurrence strictly after `now`, or `None` for one-shot schedules.
    ///
    /// Fails when the next occurrence falls outside the representable range.
    pub fn next_after(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let (Some(operation_time), Some(interval)) = (
            self.operation_time,
            self.repeat_interval_secs.filter(|secs| *secs > 0),
        ) else {
            return Ok(None);
        };
        if operation_time > now {
            return Ok(Some(operation_time));
        }

        let out_of_range = || {
            OrchestratorError::InvalidSchedule(format!(
                "repeat interval of {interval}s from {operation_time} is out of range"
            ))
        };
        let interval = i64::try_from(interval).map_err(|_| out_of_range())?;
        let steps = (now - operation_time).num_seconds() / interval + 1;
        steps
            .checked_mul(interval)
            .and_then(TimeDelta::try_seconds)
            .and_then(|offset| operation_time.checked_add_signed(offset))
            .map(Some)
            .ok_or_else(out_of_range)
    }
}

/// Fields copied onto every scan created from a config.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ScanConfigId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<RuntimeSchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_template: Option<ScanTemplate>,
}

impl ScanConfig {
    pub fn is_disabled(&self) -> bool {
        self.disabled == Some(true)
    }

    pub fn operation_time(&self) -> Option<DateTime<Utc>> {
        self.scheduled.as_ref().and_then(|s| s.operation_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn one_shot_schedule_has_no_next_occurrence() {
        let schedule = RuntimeSchedule {
            operation_time: Some(at(1_000)),
            repeat_interval_secs: None,
        };
        assert_eq!(schedule.next_after(at(2_000)).unwrap(), None);
    }

    #[test]
    fn repeating_schedule_skips_missed_occurrences() {
        let schedule = RuntimeSchedule {
            operation_time: Some(at(1_000)),
            repeat_interval_secs: Some(100),
        };
        assert_eq!(schedule.next_after(at(1_000)).unwrap(), Some(at(1_100)));
        assert_eq!(schedule.next_after(at(1_050)).unwrap(), Some(at(1_100)));
        assert_eq!(schedule.next_after(at(1_350)).unwrap(), Some(at(1_400)));
        assert_eq!(schedule.next_after(at(500)).unwrap(), Some(at(1_000)));
    }

    #[test]
    fn oversized_interval_is_an_error() {
        let now = Utc::now();
        for secs in [9_000_000_000_000, 10_000_000_000_000_000, u64::MAX] {
            let schedule = RuntimeSchedule {
                operation_time: Some(now - TimeDelta::seconds(10)),
                repeat_interval_secs: Some(secs),
            };
            let err = schedule.next_after(now).unwrap_err();
            assert!(
                matches!(err, OrchestratorError::InvalidSchedule(_)),
                "{secs}: {err}"
            );
        }
    }
}
