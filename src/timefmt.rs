use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Placeholder replaced by the counted amount in minute/hour/day templates.
pub const COUNT_PLACEHOLDER: &str = "{n}";

/// Coarse age of an instant relative to a reference "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBucket {
    Now,
    Minutes(i64),
    Hours(i64),
    Days(i64),
}

impl AgeBucket {
    /// Both arguments are epoch milliseconds. Future instants count as "now".
    pub fn classify(timestamp: i64, now: i64) -> Self {
        let seconds = now.saturating_sub(timestamp).max(0) / 1_000;
        if seconds < MINUTE {
            AgeBucket::Now
        } else if seconds < HOUR {
            AgeBucket::Minutes(seconds / MINUTE)
        } else if seconds < DAY {
            AgeBucket::Hours(seconds / HOUR)
        } else {
            AgeBucket::Days(seconds / DAY)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("{tier} template {template:?} has no {{n}} placeholder")]
    MissingCount { tier: &'static str, template: String },
}

/// One label template per age tier. `{n}` in the counted tiers is replaced
/// with the whole number of minutes, hours or days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeAgoTemplates {
    pub now: String,
    pub minutes: String,
    pub hours: String,
    pub days: String,
}

impl Default for TimeAgoTemplates {
    fn default() -> Self {
        Self::english()
    }
}

impl TimeAgoTemplates {
    pub fn english() -> Self {
        Self {
            now: "now".into(),
            minutes: "{n}m ago".into(),
            hours: "{n}h ago".into(),
            days: "{n}d ago".into(),
        }
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        for (tier, template) in [
            ("minutes", &self.minutes),
            ("hours", &self.hours),
            ("days", &self.days),
        ] {
            if !template.contains(COUNT_PLACEHOLDER) {
                return Err(TemplateError::MissingCount {
                    tier,
                    template: template.clone(),
                });
            }
        }
        Ok(())
    }

    /// Replaces every counted template lacking `{n}` with its English
    /// counterpart. Returns the errors that triggered a replacement.
    pub fn repair(&mut self) -> Vec<TemplateError> {
        let english = Self::english();
        let mut errors = Vec::new();
        for (tier, template, fallback) in [
            ("minutes", &mut self.minutes, english.minutes),
            ("hours", &mut self.hours, english.hours),
            ("days", &mut self.days, english.days),
        ] {
            if !template.contains(COUNT_PLACEHOLDER) {
                errors.push(TemplateError::MissingCount {
                    tier,
                    template: std::mem::replace(template, fallback),
                });
            }
        }
        errors
    }

    pub fn render(&self, bucket: AgeBucket) -> String {
        match bucket {
            AgeBucket::Now => self.now.clone(),
            AgeBucket::Minutes(n) => self.minutes.replace(COUNT_PLACEHOLDER, &n.to_string()),
            AgeBucket::Hours(n) => self.hours.replace(COUNT_PLACEHOLDER, &n.to_string()),
            AgeBucket::Days(n) => self.days.replace(COUNT_PLACEHOLDER, &n.to_string()),
        }
    }

    pub fn format(&self, timestamp: i64, now: i64) -> String {
        self.render(AgeBucket::classify(timestamp, now))
    }
}

/// English "time ago" label for `timestamp`, both in epoch milliseconds.
pub fn time_ago(timestamp: i64, now: i64) -> String {
    TimeAgoTemplates::english().format(timestamp, now)
}

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn millis_to_datetime(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

pub fn datetime_to_millis(dt: OffsetDateTime) -> i64 {
    (dt.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn format_absolute(millis: i64) -> String {
    millis_to_datetime(millis)
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn ago(seconds: i64) -> String {
        time_ago(NOW - seconds * 1_000, NOW)
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(ago(0), "now");
        assert_eq!(ago(59), "now");
        assert_eq!(ago(60), "1m ago");
        assert_eq!(ago(3_599), "59m ago");
        assert_eq!(ago(3_600), "1h ago");
        assert_eq!(ago(86_399), "23h ago");
        assert_eq!(ago(86_400), "1d ago");
        assert_eq!(ago(172_800), "2d ago");
    }

    #[test]
    fn days_grow_without_bound() {
        assert_eq!(ago(400 * 86_400), "400d ago");
    }

    #[test]
    fn sub_second_remainders_are_floored() {
        assert_eq!(time_ago(NOW - 59_999, NOW), "now");
        assert_eq!(time_ago(NOW - 60_999, NOW), "1m ago");
    }

    #[test]
    fn future_timestamps_clamp_to_now() {
        assert_eq!(time_ago(NOW + 5_000, NOW), "now");
        assert_eq!(time_ago(NOW + 90 * 86_400_000, NOW), "now");
        assert_eq!(AgeBucket::classify(i64::MAX, i64::MIN), AgeBucket::Now);
    }

    #[test]
    fn custom_templates_substitute_counts() {
        let templates = TimeAgoTemplates {
            now: "à l'instant".into(),
            minutes: "il y a {n} min".into(),
            hours: "il y a {n} h".into(),
            days: "il y a {n} j".into(),
        };
        assert_eq!(templates.format(NOW, NOW), "à l'instant");
        assert_eq!(templates.format(NOW - 125_000, NOW), "il y a 2 min");
        assert_eq!(templates.format(NOW - 7_200_000, NOW), "il y a 2 h");
        assert_eq!(templates.format(NOW - 3 * 86_400_000, NOW), "il y a 3 j");
    }

    #[test]
    fn repair_restores_templates_without_placeholder() {
        let mut templates = TimeAgoTemplates {
            hours: "hours ago".into(),
            ..TimeAgoTemplates::english()
        };
        assert!(templates.validate().is_err());
        let errors = templates.repair();
        assert_eq!(
            errors,
            vec![TemplateError::MissingCount {
                tier: "hours",
                template: "hours ago".into(),
            }]
        );
        assert_eq!(templates, TimeAgoTemplates::english());
        assert!(templates.validate().is_ok());
    }

    #[test]
    fn millis_round_trip_through_datetime() {
        let dt = millis_to_datetime(NOW).expect("valid instant");
        assert_eq!(datetime_to_millis(dt), NOW);
        assert_eq!(format_absolute(0), "1970-01-01T00:00:00Z");
    }
}
