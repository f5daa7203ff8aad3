// ABOUTME: Bounded parsing of numeric configuration values
// ABOUTME: Invalid or out-of-range values are logged and replaced by the default

use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use tracing::warn;

/// Parse `raw` as a value inside `range`, falling back to `default`
///
/// A missing value is silent; a present but unusable value logs a warning.
pub fn parse_bounded<T>(key: &str, raw: Option<String>, range: RangeInclusive<T>, default: T) -> T
where
    T: FromStr + PartialOrd + Display + Copy,
{
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse::<T>() {
        Ok(value) if range.contains(&value) => value,
        Ok(value) => {
            warn!(
                "{}={} is outside {}..={}, using {}",
                key,
                value,
                range.start(),
                range.end(),
                default
            );
            default
        }
        Err(_) => {
            warn!("{}='{}' is not a valid number, using {}", key, raw, default);
            default
        }
    }
}
