//! Market-local time utilities.
//!
//! The broker reports order-book timestamps and the daily cutoff in the
//! exchange's local time (IST by default). Used for:
//! - Resolving the daily cutoff (`HH:MM`) to a UTC instant
//! - Filtering the order book to today's entries
//! - Keying crash-recovery snapshots by trading day

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::{CoreError, Result};

/// Date prefix of the broker's `updatetime` field, e.g. `16-Oct-2026`.
pub const ORDER_BOOK_DATE_FORMAT: &str = "%d-%b-%Y";

/// Indian Standard Time, UTC+05:30.
pub const IST_OFFSET_MINUTES: i32 = 330;

/// Fixed-offset view of the exchange's wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketTime {
    offset: FixedOffset,
}

impl Default for MarketTime {
    fn default() -> Self {
        // 19_800 s is within FixedOffset's +/-24h range.
        Self {
            offset: FixedOffset::east_opt(IST_OFFSET_MINUTES * 60).expect("IST offset is valid"),
        }
    }
}

impl MarketTime {
    pub fn new(utc_offset_minutes: i32) -> Result<Self> {
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| CoreError::InvalidTime(format!("bad UTC offset {utc_offset_minutes}m")))?;
        Ok(Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Local calendar day of `now`.
    #[must_use]
    pub fn trading_day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset()).date_naive()
    }

    /// `updatetime` prefix for the local day of `now`.
    #[must_use]
    pub fn order_book_day(&self, now: DateTime<Utc>) -> String {
        self.trading_day(now).format(ORDER_BOOK_DATE_FORMAT).to_string()
    }

    /// UTC instant of local `cutoff` on the local day of `now`.
    ///
    /// A cutoff already in the past yields a past instant; it is not rolled
    /// forward to the next day.
    pub fn cutoff_on_day_of(&self, now: DateTime<Utc>, cutoff: NaiveTime) -> Result<DateTime<Utc>> {
        let local = self.trading_day(now).and_time(cutoff);
        self.offset()
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| CoreError::InvalidTime(format!("ambiguous local time {local}")))
    }
}

/// Parse `HH:MM` (24h).
pub fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| CoreError::InvalidTime(format!("{s:?}: {e}")))
}
