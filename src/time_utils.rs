// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and metering windows.

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};

/// Subscriptions are displayed as renewing this many days after they start.
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The UTC calendar day containing `now`, as `[start, end)`.
pub fn utc_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&now.date_naive().and_time(chrono::NaiveTime::MIN));
    (start, start + Duration::days(1))
}

/// Approximate end of a billing period. Display only, never enforced.
pub fn subscription_period_end(start: DateTime<Utc>) -> DateTime<Utc> {
    start + Duration::days(SUBSCRIPTION_PERIOD_DAYS)
}

/// Convert a unix timestamp (seconds) from the billing provider.
pub fn from_unix_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}
