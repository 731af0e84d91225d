//! Timezone conversion for owner-local schedule times
//!
//! Owners enter patch times as wall-clock values in their own IANA zone;
//! triggers fire in UTC. Conversions must apply the zone rules in effect
//! at the converted instant, so the same wall-clock time maps to
//! different UTC offsets across a DST boundary.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::errors::ConfigError;

/// Parse an IANA zone name, failing with a configuration error so
/// callers never fall back to a silent default.
pub fn resolve_zone(zone_name: &str) -> Result<Tz, ConfigError> {
    zone_name.parse::<Tz>().map_err(|_| ConfigError::UnknownTimezone {
        zone: zone_name.to_string(),
    })
}

/// Convert a naive local date/time in the named zone to a UTC instant.
///
/// Ambiguous local times (the repeated hour at the DST fall-back) resolve
/// to the earlier mapping; nonexistent local times (the skipped hour at
/// spring-forward) roll forward in 30-minute steps until a valid local
/// time is found.
pub fn to_utc(local: NaiveDateTime, zone_name: &str) -> Result<DateTime<Utc>, ConfigError> {
    let tz = resolve_zone(zone_name)?;

    let mut candidate = local;
    for _ in 0..6 {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => {
                warn!(
                    "Ambiguous local time {} in {}; using earlier offset",
                    candidate, zone_name
                );
                return Ok(earliest.with_timezone(&Utc));
            }
            LocalResult::None => {
                candidate += chrono::Duration::minutes(30);
            }
        }
    }

    // Six 30-minute steps cover every real-world DST gap; a zone that
    // still yields nothing is effectively misconfigured.
    Err(ConfigError::InvalidValue {
        field: "patch_time".to_string(),
        reason: format!("local time {} does not exist in {}", local, zone_name),
    })
}

/// Convert a UTC instant back to naive wall-clock time in the named zone.
pub fn to_local(instant: DateTime<Utc>, zone_name: &str) -> Result<NaiveDateTime, ConfigError> {
    let tz = resolve_zone(zone_name)?;
    Ok(instant.with_timezone(&tz).naive_local())
}

/// The zone's display abbreviation at the given instant (EST vs EDT and
/// so on), chosen by whether daylight saving is active then.
pub fn abbreviation(zone_name: &str, instant: DateTime<Utc>) -> Result<String, ConfigError> {
    let tz = resolve_zone(zone_name)?;
    Ok(instant.with_timezone(&tz).format("%Z").to_string())
}
