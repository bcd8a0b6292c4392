//! Daily visit capacity over the booking horizon.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::Serialize;

/// Load band shown to visitors choosing a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityLevel {
    Available,
    Moderate,
    Limited,
    Full,
}

impl AvailabilityLevel {
    /// Bands: under 50% available, from 50% moderate, from 80% limited, from 100% full.
    pub fn for_load(count: u32, max_capacity: u32) -> Self {
        let percent = percent_full(count, max_capacity);
        if percent >= 100 {
            AvailabilityLevel::Full
        } else if percent >= 80 {
            AvailabilityLevel::Limited
        } else if percent >= 50 {
            AvailabilityLevel::Moderate
        } else {
            AvailabilityLevel::Available
        }
    }
}

fn percent_full(count: u32, max_capacity: u32) -> u32 {
    if max_capacity == 0 {
        return 100;
    }
    let percent = u64::from(count) * 100 / u64::from(max_capacity);
    u32::try_from(percent).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub weekday: String,
    pub visitor_count: u32,
    pub percent_full: u32,
    pub level: AvailabilityLevel,
}

/// Snapshot handed to booking forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityInfo {
    pub max_capacity: u32,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    /// ISO day to number of slot-holding schedules. Days with no bookings are omitted.
    pub current_daily_visits: BTreeMap<String, u32>,
    pub next_available_date: Option<NaiveDate>,
}

/// Slot-holding counts for `horizon_days` days starting at `today`.
#[derive(Debug, Clone)]
pub struct CapacityCalendar {
    max_capacity: u32,
    today: NaiveDate,
    horizon_days: u32,
    counts: BTreeMap<NaiveDate, u32>,
}

impl CapacityCalendar {
    pub fn new(
        max_capacity: u32,
        today: NaiveDate,
        horizon_days: u32,
        counts: BTreeMap<NaiveDate, u32>,
    ) -> Self {
        Self {
            max_capacity,
            today,
            horizon_days,
            counts,
        }
    }

    /// First day after the window.
    pub fn window_end(&self) -> NaiveDate {
        self.today
            .checked_add_days(Days::new(u64::from(self.horizon_days)))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn count(&self, date: NaiveDate) -> u32 {
        self.counts.get(&date).copied().unwrap_or(0)
    }

    pub fn is_full(&self, date: NaiveDate) -> bool {
        self.count(date) >= self.max_capacity
    }

    fn window(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.today
            .iter_days()
            .take(usize::try_from(self.horizon_days).unwrap_or(usize::MAX))
    }

    /// Nearest day from today, inclusive, that still has a free slot.
    pub fn next_available(&self) -> Option<NaiveDate> {
        self.window().find(|date| !self.is_full(*date))
    }

    pub fn heat_map(&self, days: u32) -> Vec<DayAvailability> {
        self.window()
            .take(usize::try_from(days).unwrap_or(usize::MAX))
            .map(|date| {
                let count = self.count(date);
                DayAvailability {
                    date,
                    weekday: date.format("%a").to_string(),
                    visitor_count: count,
                    percent_full: percent_full(count, self.max_capacity),
                    level: AvailabilityLevel::for_load(count, self.max_capacity),
                }
            })
            .collect()
    }

    pub fn info(&self) -> CapacityInfo {
        CapacityInfo {
            max_capacity: self.max_capacity,
            window_start: self.today,
            window_end: self.window_end(),
            current_daily_visits: self
                .counts
                .iter()
                .filter(|(date, _)| **date >= self.today && **date < self.window_end())
                .map(|(date, count)| (date.format("%Y-%m-%d").to_string(), *count))
                .collect(),
            next_available_date: self.next_available(),
        }
    }
}
