use chrono::{DateTime, Duration, Utc};

/// An entitlement is active strictly until its expiry instant.
pub fn is_active(premium_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(premium_until, Some(expiry) if now < expiry)
}

/// Expiry after granting one more period. A still-active entitlement stacks
/// on top of its current expiry; a missing or lapsed one restarts from `now`.
pub fn extended_expiry(
    premium_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    period_days: u32,
) -> DateTime<Utc> {
    let base = match premium_until {
        Some(expiry) if expiry > now => expiry,
        _ => now,
    };
    base + Duration::days(i64::from(period_days))
}
