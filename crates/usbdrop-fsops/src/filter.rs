//! Calendar filters over inventory listings.
//!
//! A date embedded in the file name wins over filesystem timestamps, since
//! copies onto the volume often rewrite those. Timestamps are judged in local
//! time because that is the calendar the operator sees.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;

use crate::inventory::FileRecord;

static FILENAME_STAMP: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:^|\D)(?P<y>(?:19|20)\d{2})[-_.]?(?P<m>0[1-9]|1[0-2])[-_.]?",
        r"(?P<d>0[1-9]|[12]\d|3[01])",
        r"(?:[T_ -]?(?P<hh>[01]\d|2[0-3])[-_:.]?(?P<mm>[0-5]\d)[-_:.]?(?P<ss>[0-5]\d))?",
        r"(?:\D|$)",
    ))
});

/// Predicate applied to a listing before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryFilter {
    /// Keep every record.
    All,
    /// Keep records dated on the given calendar day.
    Day(NaiveDate),
    /// Keep records dated on the most recent Sunday on or before `today`.
    LastSunday {
        /// Reference day the Sunday is computed from.
        today: NaiveDate,
    },
}

impl InventoryFilter {
    /// Filter for records dated today in local time.
    #[must_use]
    pub fn today() -> Self {
        Self::Day(Local::now().date_naive())
    }

    /// Filter for records dated on the most recent Sunday in local time.
    #[must_use]
    pub fn last_sunday() -> Self {
        Self::LastSunday {
            today: Local::now().date_naive(),
        }
    }

    /// Whether `record` satisfies the filter.
    #[must_use]
    pub fn matches(&self, record: &FileRecord) -> bool {
        match self {
            Self::All => true,
            Self::Day(day) => effective_date(record) == *day,
            Self::LastSunday { today } => effective_date(record) == most_recent_sunday(*today),
        }
    }

    /// Keep the records matching the filter, preserving their order.
    #[must_use]
    pub fn apply(&self, records: Vec<FileRecord>) -> Vec<FileRecord> {
        records
            .into_iter()
            .filter(|record| self.matches(record))
            .collect()
    }
}

/// The Sunday on or before `today`; `today` itself when it is a Sunday.
#[must_use]
pub fn most_recent_sunday(today: NaiveDate) -> NaiveDate {
    let offset = u64::from(today.weekday().num_days_from_sunday());
    today.checked_sub_days(Days::new(offset)).unwrap_or(today)
}

/// Date and optional time embedded in a file name such as `REC_20240512_143000.wav`.
///
/// Returns `None` when no stamp is present or the stamp is not a real date.
#[must_use]
pub fn filename_timestamp(name: &str) -> Option<NaiveDateTime> {
    let pattern = FILENAME_STAMP.as_ref().ok()?;
    let captures = pattern.captures(name)?;
    let field = |key: &str| captures.name(key).and_then(|m| m.as_str().parse::<u32>().ok());

    let year = captures.name("y")?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, field("m")?, field("d")?)?;
    let time = match (field("hh"), field("mm"), field("ss")) {
        (Some(hour), Some(minute), Some(second)) => {
            NaiveTime::from_hms_opt(hour, minute, second)?
        }
        _ => NaiveTime::MIN,
    };
    Some(date.and_time(time))
}

/// Calendar day a record is filed under.
#[must_use]
pub fn effective_date(record: &FileRecord) -> NaiveDate {
    filename_timestamp(&record.name)
        .map_or_else(|| local_date(record.created_at), |stamp| stamp.date())
}

fn local_date(timestamp: DateTime<Utc>) -> NaiveDate {
    timestamp.with_timezone(&Local).date_naive()
}
