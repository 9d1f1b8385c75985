//! Time source and Arabic calendar names.
//!
//! Everything that depends on "now" (cache ages, today's weekday, the date
//! line in the prompt) reads it through [`Clock`], so tests can pin or
//! advance time.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime, Utc};
use std::sync::RwLock;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

/// Reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Pin the clock to local noon on the given date.
    ///
    /// Noon avoids the DST gaps that make midnight ambiguous in some zones.
    pub fn at_date(date: NaiveDate) -> Self {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
        let now = date
            .and_time(noon)
            .and_local_timezone(Local)
            .earliest()
            .unwrap_or_else(Local::now);
        Self::new(now)
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Weekday names, Sunday first.
pub const ARABIC_WEEKDAYS: [&str; 7] = [
    "الأحد",
    "الاثنين",
    "الثلاثاء",
    "الأربعاء",
    "الخميس",
    "الجمعة",
    "السبت",
];

const ARABIC_MONTHS: [&str; 12] = [
    "يناير",
    "فبراير",
    "مارس",
    "أبريل",
    "مايو",
    "يونيو",
    "يوليو",
    "أغسطس",
    "سبتمبر",
    "أكتوبر",
    "نوفمبر",
    "ديسمبر",
];

pub fn arabic_weekday<D: Datelike>(date: &D) -> &'static str {
    ARABIC_WEEKDAYS[date.weekday().num_days_from_sunday() as usize]
}

/// Long date, e.g. `الأحد، 18 أكتوبر 2026`.
pub fn arabic_long_date<D: Datelike>(date: &D) -> String {
    format!(
        "{}، {} {} {}",
        arabic_weekday(date),
        date.day(),
        ARABIC_MONTHS[date.month0() as usize],
        date.year()
    )
}
