use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// Composite identity of one daily record: (user, calendar date).
/// `Display` renders the document id used by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub user_id: String,
    pub date: NaiveDate,
}

impl RecordKey {
    pub fn new(user_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            date,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.user_id, self.date.format("%Y-%m-%d"))
    }
}

/// One time-of-day slot on a daily record.
///
/// A slot is either untouched or carries the absolute instant it was
/// recorded at. Once recorded it never changes for the rest of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<NaiveDateTime>", into = "Option<NaiveDateTime>")]
pub enum TimeSlot {
    #[default]
    Unset,
    RecordedAt(NaiveDateTime),
}

impl TimeSlot {
    pub fn is_set(&self) -> bool {
        matches!(self, TimeSlot::RecordedAt(_))
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            TimeSlot::Unset => None,
            TimeSlot::RecordedAt(dt) => Some(*dt),
        }
    }

    /// 12-hour wall-clock rendering, e.g. "08:15 AM".
    pub fn formatted(&self) -> Option<String> {
        self.as_datetime().map(format_clock)
    }
}

impl From<Option<NaiveDateTime>> for TimeSlot {
    fn from(value: Option<NaiveDateTime>) -> Self {
        match value {
            Some(dt) => TimeSlot::RecordedAt(dt),
            None => TimeSlot::Unset,
        }
    }
}

impl From<TimeSlot> for Option<NaiveDateTime> {
    fn from(value: TimeSlot) -> Self {
        value.as_datetime()
    }
}

/// Fixed display format for all recorded times.
pub fn format_clock(dt: NaiveDateTime) -> String {
    dt.format("%I:%M %p").to_string()
}

/// The four explicit kiosk actions. Wire strings match the labels shown
/// on the scanner page.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
pub enum AttendanceAction {
    #[serde(rename = "Time In AM")]
    #[strum(serialize = "Time In AM")]
    TimeInAm,
    #[serde(rename = "Time Out AM")]
    #[strum(serialize = "Time Out AM")]
    TimeOutAm,
    #[serde(rename = "Time In PM")]
    #[strum(serialize = "Time In PM")]
    TimeInPm,
    #[serde(rename = "Time Out PM")]
    #[strum(serialize = "Time Out PM")]
    TimeOutPm,
}

/// Hour-of-day window in which an action is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockWindow {
    MorningOnly,
    AfternoonOnly,
    AnyHour,
}

impl ClockWindow {
    pub fn admits(&self, hour: u32) -> bool {
        match self {
            ClockWindow::MorningOnly => hour < 12,
            ClockWindow::AfternoonOnly => hour >= 12,
            ClockWindow::AnyHour => true,
        }
    }
}

impl AttendanceAction {
    /// Time-window guard for this action. Outs are deliberately
    /// unrestricted so a forgotten time-in can still be closed out.
    pub fn window(&self) -> ClockWindow {
        match self {
            AttendanceAction::TimeInAm => ClockWindow::MorningOnly,
            AttendanceAction::TimeInPm => ClockWindow::AfternoonOnly,
            AttendanceAction::TimeOutAm | AttendanceAction::TimeOutPm => ClockWindow::AnyHour,
        }
    }

    pub fn window_rejection(&self, user_name: &str) -> String {
        match self {
            AttendanceAction::TimeInAm => format!(
                "Good afternoon {}! Time In AM is closed. Please use Time In PM instead.",
                user_name
            ),
            AttendanceAction::TimeInPm => format!(
                "Good morning {}! Time In PM opens at noon. Please use Time In AM instead.",
                user_name
            ),
            // Outs have no window; callers must not ask.
            AttendanceAction::TimeOutAm | AttendanceAction::TimeOutPm => {
                format!("{}, this action is not available right now.", user_name)
            }
        }
    }

    pub fn duplicate_rejection(&self, user_name: &str) -> String {
        match self {
            AttendanceAction::TimeInAm => {
                format!("{}, you have already timed in this morning.", user_name)
            }
            AttendanceAction::TimeOutAm => {
                format!("{}, you have already timed out this morning.", user_name)
            }
            AttendanceAction::TimeInPm => {
                format!("{}, you have already timed in this afternoon.", user_name)
            }
            AttendanceAction::TimeOutPm => {
                format!("{}, you have already timed out this afternoon.", user_name)
            }
        }
    }

    pub fn success_message(&self, user_name: &str, time: &str) -> String {
        match self {
            AttendanceAction::TimeInAm => {
                format!("Welcome {}! Time In AM recorded at {}", user_name, time)
            }
            AttendanceAction::TimeOutAm => {
                format!("{}, Time Out AM recorded at {}", user_name, time)
            }
            AttendanceAction::TimeInPm => {
                format!("Welcome back {}! Time In PM recorded at {}", user_name, time)
            }
            AttendanceAction::TimeOutPm => format!(
                "Goodbye {}! Time Out PM recorded at {}. See you tomorrow!",
                user_name, time
            ),
        }
    }
}

/// One user's daily time record. Exactly zero or one exists per
/// (user_id, date); the whole struct is the unit of persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRecord {
    pub user_id: String,
    pub user_name: String,
    pub date: NaiveDate,
    pub time_in_am: TimeSlot,
    pub time_out_am: TimeSlot,
    pub time_in_pm: TimeSlot,
    pub time_out_pm: TimeSlot,
    pub missed_am: Option<bool>,
    pub missed_pm: Option<bool>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TimeRecord {
    /// Fresh record with no slots set. Not persisted until a slot is.
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            date,
            time_in_am: TimeSlot::Unset,
            time_out_am: TimeSlot::Unset,
            time_in_pm: TimeSlot::Unset,
            time_out_pm: TimeSlot::Unset,
            missed_am: None,
            missed_pm: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.user_id.clone(), self.date)
    }

    pub fn slot(&self, action: AttendanceAction) -> &TimeSlot {
        match action {
            AttendanceAction::TimeInAm => &self.time_in_am,
            AttendanceAction::TimeOutAm => &self.time_out_am,
            AttendanceAction::TimeInPm => &self.time_in_pm,
            AttendanceAction::TimeOutPm => &self.time_out_pm,
        }
    }

    pub fn slot_mut(&mut self, action: AttendanceAction) -> &mut TimeSlot {
        match action {
            AttendanceAction::TimeInAm => &mut self.time_in_am,
            AttendanceAction::TimeOutAm => &mut self.time_out_am,
            AttendanceAction::TimeInPm => &mut self.time_in_pm,
            AttendanceAction::TimeOutPm => &mut self.time_out_pm,
        }
    }

    pub fn am_complete(&self) -> bool {
        self.time_in_am.is_set() && self.time_out_am.is_set()
    }

    pub fn pm_complete(&self) -> bool {
        self.time_in_pm.is_set() && self.time_out_pm.is_set()
    }
}

/// What the scanner page shows after a scan. Guard rejections travel
/// through here as ordinary values, never as errors.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScanResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl ScanResult {
    pub fn accepted(action: AttendanceAction, time: String, message: String, user_name: &str) -> Self {
        Self {
            success: true,
            action: Some(action.to_string()),
            time: Some(time),
            message,
            user_name: Some(user_name.to_string()),
        }
    }

    pub fn rejected(message: String, user_name: &str) -> Self {
        Self {
            success: false,
            action: None,
            time: None,
            message,
            user_name: Some(user_name.to_string()),
        }
    }

    /// Fixed rejection for cards the directory does not know.
    pub fn unregistered_card() -> Self {
        Self {
            success: false,
            action: None,
            time: None,
            message: "Unregistered RFID card. Please contact administrator.".to_string(),
            user_name: None,
        }
    }

    /// Generic failure for faults the kiosk cannot act on.
    pub fn system_error() -> Self {
        Self {
            success: false,
            action: None,
            time: None,
            message: "Failed to process scan. Please try again or contact support.".to_string(),
            user_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn clock_format_is_12_hour_padded() {
        assert_eq!(format_clock(dt(8, 15)), "08:15 AM");
        assert_eq!(format_clock(dt(13, 5)), "01:05 PM");
        assert_eq!(format_clock(dt(0, 0)), "12:00 AM");
        assert_eq!(format_clock(dt(12, 0)), "12:00 PM");
    }

    #[test]
    fn action_strings_round_trip() {
        for (s, a) in [
            ("Time In AM", AttendanceAction::TimeInAm),
            ("Time Out AM", AttendanceAction::TimeOutAm),
            ("Time In PM", AttendanceAction::TimeInPm),
            ("Time Out PM", AttendanceAction::TimeOutPm),
        ] {
            assert_eq!(AttendanceAction::from_str(s).unwrap(), a);
            assert_eq!(a.to_string(), s);
        }
    }

    #[test]
    fn windows_follow_the_noon_boundary() {
        assert!(AttendanceAction::TimeInAm.window().admits(11));
        assert!(!AttendanceAction::TimeInAm.window().admits(12));
        assert!(!AttendanceAction::TimeInPm.window().admits(11));
        assert!(AttendanceAction::TimeInPm.window().admits(12));
        assert!(AttendanceAction::TimeOutAm.window().admits(23));
        assert!(AttendanceAction::TimeOutPm.window().admits(0));
    }

    #[test]
    fn record_key_display_matches_legacy_document_id() {
        let key = RecordKey::new("u42", NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(key.to_string(), "u42_2025-03-10");
    }

    #[test]
    fn unregistered_card_message_is_fixed() {
        let res = ScanResult::unregistered_card();
        assert!(!res.success);
        assert!(res.message.starts_with("Unregistered RFID card"));
        assert!(res.user_name.is_none());
    }

    #[test]
    fn time_slot_serializes_as_nullable_datetime() {
        let set = TimeSlot::RecordedAt(dt(8, 15));
        assert_eq!(
            serde_json::to_string(&set).unwrap(),
            "\"2025-03-10T08:15:00\""
        );
        assert_eq!(serde_json::to_string(&TimeSlot::Unset).unwrap(), "null");

        let back: TimeSlot = serde_json::from_str("null").unwrap();
        assert_eq!(back, TimeSlot::Unset);
    }
}
