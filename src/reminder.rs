use crate::config::{DUE_SOON_MINUTES, GRACE_WINDOW_MINUTES};
use crate::error::AppError;
use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Daily time-of-day in 24-hour `HH:MM` form.
///
/// Stored as text so the slot stays readable by anything else writing
/// reminders; a slot containing an invalid time fails to decode as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReminderTime(NaiveTime);

impl ReminderTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    /// Accepts `HH:MM` (a single-digit hour is tolerated), hours 0-23 and
    /// minutes 0-59
    pub fn parse(input: &str) -> Result<Self, AppError> {
        let invalid = || AppError::validation(format!("invalid time '{}', expected HH:MM", input));

        let (hh, mm) = input.trim().split_once(':').ok_or_else(invalid)?;
        let digits = |s: &str, max_len: usize| {
            !s.is_empty() && s.len() <= max_len && s.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(hh, 2) || !digits(mm, 2) || mm.len() != 2 {
            return Err(invalid());
        }

        let hour: u32 = hh.parse().map_err(|_| invalid())?;
        let minute: u32 = mm.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ReminderTime {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ReminderTime {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReminderTime> for String {
    fn from(time: ReminderTime) -> Self {
        time.to_string()
    }
}

/// One daily medicine reminder, in the exact shape kept in the reminders slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub dose: String,
    pub time: ReminderTime,
    /// Epoch milliseconds of the last "taken" mark
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_taken: Option<i64>,
}

impl ReminderEntry {
    pub fn new(id: String, name: String, dose: String, time: ReminderTime) -> Self {
        Self {
            id,
            name,
            dose,
            time,
            last_taken: None,
        }
    }

    pub fn next_due_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        next_due(self.time, self.last_taken, now)
    }
}

/// Display bucket, in increasing priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Urgency {
    Normal,
    DueSoon,
    PastDue,
}

impl Urgency {
    pub fn from_flags(due_soon: bool, past_due: bool) -> Self {
        if past_due {
            Urgency::PastDue
        } else if due_soon {
            Urgency::DueSoon
        } else {
            Urgency::Normal
        }
    }
}

/// An entry with its derived scheduling fields, recomputed on every read
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedEntry {
    #[serde(flatten)]
    pub entry: ReminderEntry,
    /// Epoch milliseconds of the next occurrence
    pub due_at: i64,
    pub due_soon: bool,
    pub past_due: bool,
}

impl EnrichedEntry {
    pub fn from_entry<Tz: TimeZone>(entry: &ReminderEntry, now: &DateTime<Tz>) -> Self {
        let due_at = entry.next_due_at(now).timestamp_millis();
        let diff = due_at - now.timestamp_millis();
        Self {
            entry: entry.clone(),
            due_at,
            due_soon: diff <= Duration::minutes(DUE_SOON_MINUTES).num_milliseconds(),
            past_due: diff < 0,
        }
    }

    pub fn urgency(&self) -> Urgency {
        Urgency::from_flags(self.due_soon, self.past_due)
    }
}

/// Next occurrence of a daily `time`, evaluated in `now`'s time zone.
///
/// Starts from today's slot. Moves to tomorrow when the dose was already
/// taken after today's slot, and independently when the slot is more than
/// the grace window in the past.
pub fn next_due<Tz: TimeZone>(
    time: ReminderTime,
    last_taken: Option<i64>,
    now: &DateTime<Tz>,
) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    let mut due = local_instant(&tz, day, time.as_naive());

    if last_taken.map_or(false, |taken| taken > due.timestamp_millis()) {
        day = following_day(day);
        due = local_instant(&tz, day, time.as_naive());
    }

    if due < now.clone() - Duration::minutes(GRACE_WINDOW_MINUTES) {
        day = following_day(day);
        due = local_instant(&tz, day, time.as_naive());
    }

    due
}

/// Enrich every entry against `now` and order by next due instant. The
/// sort is stable, so entries due at the same instant keep storage order.
pub fn enrich_and_sort<Tz: TimeZone>(entries: &[ReminderEntry], now: &DateTime<Tz>) -> Vec<EnrichedEntry> {
    let mut enriched: Vec<EnrichedEntry> = entries
        .iter()
        .map(|entry| EnrichedEntry::from_entry(entry, now))
        .collect();
    enriched.sort_by_key(|e| e.due_at);
    enriched
}

fn following_day(day: NaiveDate) -> NaiveDate {
    day.checked_add_days(Days::new(1)).unwrap_or(day)
}

// Wall-clock times skipped by a DST jump resolve an hour later; repeated
// ones resolve to the earlier instant.
fn local_instant<Tz: TimeZone>(tz: &Tz, day: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = day.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}
