//! Chain schedule expressions.
//!
//! `run_at` accepts:
//!
//! | Form                  | Meaning                                         |
//! |-----------------------|-------------------------------------------------|
//! | `*/5 * * * *`         | standard 5-field cron (runs at second 0)        |
//! | `30 */5 * * * *`      | 6-field cron with seconds                       |
//! | `@hourly`, `@daily`…  | cron shorthands                                 |
//! | `@every 10 minutes`   | fixed interval measured from the previous fire  |
//! | `@reboot`             | once, when the tick loop starts                 |

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, SchedulerError};

#[derive(Debug, Clone)]
pub enum Schedule {
    Cron(Box<cron::Schedule>),
    Every(Duration),
    Reboot,
}

impl Schedule {
    /// Next fire strictly after `after`. `@reboot` never fires again.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Cron(schedule) => schedule.after(&after).next(),
            Schedule::Every(every) => Some(after + *every),
            Schedule::Reboot => None,
        }
    }

    pub fn is_reboot(&self) -> bool {
        matches!(self, Schedule::Reboot)
    }
}

impl FromStr for Schedule {
    type Err = SchedulerError;

    fn from_str(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        let invalid = |reason: String| SchedulerError::InvalidSchedule {
            expr: expr.to_string(),
            reason,
        };

        if trimmed.eq_ignore_ascii_case("@reboot") {
            return Ok(Schedule::Reboot);
        }
        if let Some(rest) = strip_prefix_ignore_case(trimmed, "@every") {
            return parse_interval(rest).map(Schedule::Every).map_err(invalid);
        }

        let normalized = normalize_cron_expr(trimmed);
        cron::Schedule::from_str(&normalized)
            .map(|s| Schedule::Cron(Box::new(s)))
            .map_err(|e| invalid(e.to_string()))
    }
}

/// The `cron` crate wants a seconds field; 5-field expressions fire at second 0.
fn normalize_cron_expr(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// Parse `10 minutes`, `1 hour`, `90s`, `2h` and similar.
fn parse_interval(text: &str) -> std::result::Result<Duration, String> {
    let text = text.trim();
    let (amount, unit) = match text.split_once(char::is_whitespace) {
        Some((amount, unit)) => (amount.trim(), unit.trim()),
        None => {
            let split = text
                .find(|c: char| !c.is_ascii_digit())
                .ok_or_else(|| format!("missing unit in '{text}'"))?;
            text.split_at(split)
        }
    };

    let amount: i64 = amount
        .parse()
        .map_err(|_| format!("'{amount}' is not a whole number"))?;
    if amount <= 0 {
        return Err("interval must be positive".to_string());
    }

    let unit_secs = match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        other => return Err(format!("unknown interval unit '{other}'")),
    };
    amount
        .checked_mul(unit_secs)
        .and_then(Duration::try_seconds)
        .ok_or_else(|| "interval is too large".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn five_field_cron_fires_at_second_zero() {
        let schedule: Schedule = "*/15 * * * *".parse().unwrap();
        let next = schedule.next_after(at(10, 7, 30)).unwrap();
        assert_eq!(next, at(10, 15, 0));
    }

    #[test]
    fn six_field_cron_keeps_seconds() {
        let schedule: Schedule = "30 * * * * *".parse().unwrap();
        let next = schedule.next_after(at(10, 7, 30)).unwrap();
        assert_eq!((next.minute(), next.second()), (8, 30));
    }

    #[test]
    fn cron_shorthand_is_accepted() {
        let schedule: Schedule = "@hourly".parse().unwrap();
        assert_eq!(schedule.next_after(at(10, 7, 30)), Some(at(11, 0, 0)));
    }

    #[test]
    fn every_adds_the_interval() {
        for (expr, secs) in [
            ("@every 10 minutes", 600),
            ("@every 1 hour", 3_600),
            ("@EVERY 90s", 90),
            ("@every 2 d", 172_800),
        ] {
            let schedule: Schedule = expr.parse().unwrap();
            assert_eq!(
                schedule.next_after(at(0, 0, 0)),
                Some(at(0, 0, 0) + Duration::seconds(secs)),
                "{expr}"
            );
        }
    }

    #[test]
    fn reboot_fires_only_at_startup() {
        let schedule: Schedule = "@reboot".parse().unwrap();
        assert!(schedule.is_reboot());
        assert_eq!(schedule.next_after(at(0, 0, 0)), None);
    }

    #[test]
    fn invalid_expressions_are_rejected() {
        for expr in [
            "",
            "not a schedule",
            "61 * * * *",
            "@every",
            "@every 0 minutes",
            "@every -3 hours",
            "@every 5 fortnights",
            "@every ten minutes",
        ] {
            let err = expr.parse::<Schedule>().unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidSchedule { .. }), "{expr}");
        }
    }
}
