/// Cron next-fire-time computation
///
/// Thin wrapper over the `cron` crate. Schedules use standard 5-field
/// cron expressions interpreted in an IANA timezone; an unparseable
/// expression yields `None`, which pauses the owning schedule.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

/// Compute the next fire time strictly after `after`
///
/// An invalid timezone string falls back to UTC; an invalid cron
/// expression returns `None`.
pub fn next_fire_time(expr: &str, timezone: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tz: Tz = timezone.parse().unwrap_or(chrono_tz::UTC);

    // the cron crate wants a seconds field; prepend one for 5-field input
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };

    let schedule = Schedule::from_str(&normalized).ok()?;
    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|next| next.with_timezone(&Utc))
}
