//! Cron schedule validation.
//!
//! Accepts the five-field syntax understood by the CronJob controller, plus
//! its predefined macros, and IANA time zone names. Evaluating a schedule is
//! the orchestrator's job; this only rejects input that it would refuse.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{Error, Result};

const MACROS: &[&str] = &[
    "@yearly",
    "@annually",
    "@monthly",
    "@weekly",
    "@daily",
    "@midnight",
    "@hourly",
];

const MONTHS: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const WEEKDAYS: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Top-level areas of the tz database, including its backward-compatible links
const TZ_AREAS: &[&str] = &[
    "Africa", "America", "Antarctica", "Arctic", "Asia", "Atlantic", "Australia", "Europe",
    "Indian", "Pacific", "Etc", "Brazil", "Canada", "Chile", "Mexico", "US",
];

lazy_static! {
    static ref ITEM: Regex =
        Regex::new(r"^(\*|\?|[0-9A-Za-z]+(?:-[0-9A-Za-z]+)?)(?:/([0-9]+))?$").expect("valid item regex");
    static ref TZ_SEGMENT: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_+\-]*$").expect("valid zone regex");
    static ref TZ_LINK: Regex = Regex::new(r"^[A-Z][A-Za-z0-9+\-]*$").expect("valid zone regex");
}

struct Field {
    name: &'static str,
    min: u32,
    max: u32,
    /// Symbolic names, where `names[i]` stands for `first_name_value + i`
    names: &'static [&'static str],
    first_name_value: u32,
    allow_question: bool,
}

const FIELDS: [Field; 5] = [
    Field { name: "minute", min: 0, max: 59, names: &[], first_name_value: 0, allow_question: false },
    Field { name: "hour", min: 0, max: 23, names: &[], first_name_value: 0, allow_question: false },
    Field { name: "day-of-month", min: 1, max: 31, names: &[], first_name_value: 0, allow_question: true },
    Field { name: "month", min: 1, max: 12, names: MONTHS, first_name_value: 1, allow_question: false },
    Field { name: "day-of-week", min: 0, max: 6, names: WEEKDAYS, first_name_value: 0, allow_question: true },
];

pub fn validate_schedule(schedule: &str) -> Result<()> {
    let schedule = schedule.trim();
    if schedule.is_empty() {
        return Err(Error::Validation("schedule must not be empty".into()));
    }

    if schedule.starts_with('@') {
        if MACROS.contains(&schedule.to_ascii_lowercase().as_str()) {
            return Ok(());
        }
        return Err(invalid(schedule, "unknown schedule macro"));
    }

    let parts: Vec<&str> = schedule.split_whitespace().collect();
    if parts.len() != FIELDS.len() {
        return Err(invalid(
            schedule,
            &format!("expected {} fields, found {}", FIELDS.len(), parts.len()),
        ));
    }

    for (part, field) in parts.iter().zip(FIELDS.iter()) {
        for item in part.split(',') {
            validate_item(item, field).map_err(|reason| invalid(schedule, &reason))?;
        }
    }

    Ok(())
}

/// Checks `zone` has the shape of a tz database name: `Area/Location[/Sub]`
/// under a known area, or a single-word link such as `UTC` or `Japan`.
pub fn validate_time_zone(zone: &str) -> Result<()> {
    let invalid = |reason: &str| Error::Validation(format!("invalid timeZone '{}': {}", zone, reason));

    let segments: Vec<&str> = zone.split('/').collect();
    match segments.as_slice() {
        [single] if TZ_LINK.is_match(single) => Ok(()),
        [_] => Err(invalid("not a tz database name")),
        [area, rest @ ..] => {
            if !TZ_AREAS.contains(area) {
                return Err(invalid(&format!("unknown area '{}'", area)));
            }
            if rest.iter().all(|s| TZ_SEGMENT.is_match(s)) {
                Ok(())
            } else {
                Err(invalid("malformed location"))
            }
        }
        [] => Err(invalid("empty")),
    }
}

fn validate_item(item: &str, field: &Field) -> std::result::Result<(), String> {
    let captures = ITEM
        .captures(item)
        .ok_or_else(|| format!("{} field has malformed item '{}'", field.name, item))?;

    if let Some(step) = captures.get(2) {
        let step: u32 = step
            .as_str()
            .parse()
            .map_err(|_| format!("{} step '{}' is out of range", field.name, step.as_str()))?;
        if step == 0 {
            return Err(format!("{} step must be at least 1", field.name));
        }
    }

    let base = &captures[1];
    match base {
        "*" => Ok(()),
        "?" if field.allow_question => Ok(()),
        "?" => Err(format!("'?' is not allowed in the {} field", field.name)),
        _ => {
            let (low, high) = match base.split_once('-') {
                Some((low, high)) => (value(low, field)?, value(high, field)?),
                None => {
                    let v = value(base, field)?;
                    (v, v)
                }
            };
            if low > high {
                return Err(format!("{} range {} is reversed", field.name, base));
            }
            Ok(())
        }
    }
}

fn value(token: &str, field: &Field) -> std::result::Result<u32, String> {
    let parsed = match token.parse::<u32>() {
        Ok(n) => n,
        Err(_) => field
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(token))
            .map(|i| i as u32 + field.first_name_value)
            .ok_or_else(|| format!("{} value '{}' is not recognised", field.name, token))?,
    };

    if parsed < field.min || parsed > field.max {
        return Err(format!(
            "{} value {} is outside {}-{}",
            field.name, parsed, field.min, field.max
        ));
    }
    Ok(parsed)
}

fn invalid(schedule: &str, reason: &str) -> Error {
    Error::Validation(format!("invalid schedule '{}': {}", schedule, reason))
}
