//! Daily / monthly request quota for the pricing provider
//!
//! Periods are calendar days and months in a configured timezone. Counters
//! only grow inside a period and drop to zero exactly when [`QuotaState::roll`]
//! observes a new period.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

pub const DEFAULT_DAILY_LIMIT: u32 = 100;
pub const DEFAULT_MONTHLY_LIMIT: u32 = 1000;

/// Snapshot exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaStatus {
    /// Requests still allowed right now (daily and monthly combined)
    pub remaining: u32,
    pub limit: u32,
    /// When `remaining` next grows
    pub reset_at: DateTime<Utc>,
    pub monthly_remaining: u32,
    pub monthly_limit: u32,
}

#[derive(Debug, Clone)]
pub struct QuotaState {
    daily_limit: u32,
    monthly_limit: u32,
    daily_used: u32,
    monthly_used: u32,
    timezone: Tz,
    day: NaiveDate,
}

impl QuotaState {
    pub fn new(daily_limit: u32, monthly_limit: u32, timezone: Tz, now: DateTime<Utc>) -> Self {
        Self {
            daily_limit,
            monthly_limit,
            daily_used: 0,
            monthly_used: 0,
            timezone,
            day: now.with_timezone(&timezone).date_naive(),
        }
    }

    /// Reset counters whose period ended before `now`
    pub fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.with_timezone(&self.timezone).date_naive();
        if today <= self.day {
            return;
        }
        if (today.year(), today.month()) != (self.day.year(), self.day.month()) {
            log::info!("Monthly pricing quota reset ({} used)", self.monthly_used);
            self.monthly_used = 0;
        }
        log::debug!("Daily pricing quota reset ({} used)", self.daily_used);
        self.daily_used = 0;
        self.day = today;
    }

    pub fn daily_remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.daily_used)
    }

    pub fn monthly_remaining(&self) -> u32 {
        self.monthly_limit.saturating_sub(self.monthly_used)
    }

    /// Requests allowed in the current period
    pub fn remaining(&self) -> u32 {
        self.daily_remaining().min(self.monthly_remaining())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Take one request unit; false when none is left
    pub fn try_consume(&mut self, now: DateTime<Utc>) -> bool {
        self.roll(now);
        if self.is_exhausted() {
            return false;
        }
        self.daily_used += 1;
        self.monthly_used += 1;
        true
    }

    /// Mark today's quota as spent, e.g. after the provider rejected a call
    pub fn exhaust(&mut self, now: DateTime<Utc>) {
        self.roll(now);
        self.daily_used = self.daily_used.max(self.daily_limit);
    }

    /// Tighten local counters to the provider's reported daily remaining.
    ///
    /// Never loosens: a report higher than the local view is ignored.
    pub fn observe_remaining(&mut self, daily_remaining: u32) {
        let used = self.daily_limit.saturating_sub(daily_remaining);
        if used > self.daily_used {
            let delta = used - self.daily_used;
            self.daily_used = used;
            self.monthly_used = self.monthly_used.saturating_add(delta);
        }
    }

    /// Start of the period after which `remaining` grows again
    pub fn reset_at(&self) -> DateTime<Utc> {
        let next = if self.monthly_remaining() == 0 {
            first_of_next_month(self.day)
        } else {
            self.day.succ_opt()
        };
        let next = next.unwrap_or(self.day);
        self.local_midnight(next)
    }

    pub fn status(&self) -> QuotaStatus {
        QuotaStatus {
            remaining: self.remaining(),
            limit: self.daily_limit,
            reset_at: self.reset_at(),
            monthly_remaining: self.monthly_remaining(),
            monthly_limit: self.monthly_limit,
        }
    }

    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        match self.timezone.from_local_datetime(&midnight).earliest() {
            Some(local) => local.with_timezone(&Utc),
            // Midnight skipped by a DST jump; the first valid instant is an hour later
            None => Utc.from_utc_datetime(&midnight) + Duration::hours(1),
        }
    }
}

fn first_of_next_month(day: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if day.month() == 12 {
        (day.year() + 1, 1)
    } else {
        (day.year(), day.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}
