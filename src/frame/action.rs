//! Semantic commands carried by a streetlight frame
//!
//! Every inbound request is turned into an [`Action`] before any platform
//! call is made, so malformed parameters are rejected up front instead of
//! once per device.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Weekday order used on the wire: index 0 is Sunday
const WEEKDAYS_FROM_SUNDAY: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// Which command class a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    TurnLight,
    TimeSync,
    Schedule,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [
        ActionKind::TurnLight,
        ActionKind::TimeSync,
        ActionKind::Schedule,
    ];

    /// Fixed bytes following the UID field.
    ///
    /// The third byte is the length of everything after it up to (not
    /// including) the checksum.
    pub fn header(self) -> &'static [u8] {
        match self {
            ActionKind::TurnLight => &[0x68, 0x01, 0x06, 0xF0, 0x00, 0x20, 0x01],
            ActionKind::TimeSync => &[0x68, 0x01, 0x0B, 0xF0, 0x00, 0x2D],
            ActionKind::Schedule => &[
                0x68, 0x01, 0x11, 0xF0, 0x00, 0x2C, 0x01, 0x01, 0x00, 0x00, 0x00, 0x02,
            ],
        }
    }

    /// Number of action-specific bytes after the header
    pub fn payload_len(self) -> usize {
        match self {
            ActionKind::TurnLight => 2,
            ActionKind::TimeSync => 8,
            ActionKind::Schedule => 8,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::TurnLight => write!(f, "TurnLight"),
            ActionKind::TimeSync => write!(f, "TimeSync"),
            ActionKind::Schedule => write!(f, "Schedule"),
        }
    }
}

/// Requested lamp state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightState {
    On,
    Off,
}

impl LightState {
    pub fn action_code(self) -> u8 {
        match self {
            LightState::On => 0x21,
            LightState::Off => 0x22,
        }
    }

    pub fn dim_level(self) -> u8 {
        match self {
            LightState::On => 0x64,
            LightState::Off => 0x00,
        }
    }

    pub fn from_action_code(code: u8) -> Option<Self> {
        match code {
            0x21 => Some(LightState::On),
            0x22 => Some(LightState::Off),
            _ => None,
        }
    }
}

impl FromStr for LightState {
    type Err = BridgeError;

    /// Accepts the operator dashboard strings ("Light On" / "Light Off") as
    /// well as bare "on" / "off", case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_lowercase().as_str() {
            "light on" | "on" => Ok(LightState::On),
            "light off" | "off" => Ok(LightState::Off),
            _ => Err(BridgeError::invalid(format!("invalid light action '{}'", s))),
        }
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LightState::On => write!(f, "Light On"),
            LightState::Off => write!(f, "Light Off"),
        }
    }
}

/// Wall-clock time pushed to a controller's RTC
///
/// The weekday is carried separately from the date because the operator
/// supplies it explicitly; it is not cross-checked against the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTimestamp {
    pub weekday: Weekday,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl ClockTimestamp {
    /// Parse `"<Weekday> <YYYY-MM-DD> <HH:MM:SS>"`
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.len() < 3 {
            return Err(BridgeError::invalid(format!(
                "invalid timestamp '{}': expected '<Weekday> <YYYY-MM-DD> <HH:MM:SS>'",
                text
            )));
        }

        let weekday = parts[0]
            .parse::<Weekday>()
            .map_err(|_| BridgeError::invalid(format!("unknown weekday '{}'", parts[0])))?;
        let date = NaiveDate::parse_from_str(parts[1], "%Y-%m-%d")
            .map_err(|e| BridgeError::invalid(format!("invalid date '{}': {}", parts[1], e)))?;
        let time = NaiveTime::parse_from_str(parts[2], "%H:%M:%S")
            .map_err(|e| BridgeError::invalid(format!("invalid time '{}': {}", parts[2], e)))?;

        if !(0..=9999).contains(&date.year()) {
            return Err(BridgeError::invalid(format!(
                "year {} does not fit the frame",
                date.year()
            )));
        }

        Ok(Self {
            weekday,
            date,
            time,
        })
    }

    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        let naive = dt.naive_local();
        Self {
            weekday: naive.weekday(),
            date: naive.date(),
            // sub-second precision is not representable on the wire
            time: naive.time().with_nanosecond(0).unwrap_or_else(|| naive.time()),
        }
    }

    pub fn weekday_index(&self) -> u8 {
        self.weekday.num_days_from_sunday() as u8
    }

    pub fn weekday_from_index(index: u8) -> Option<Weekday> {
        WEEKDAYS_FROM_SUNDAY.get(index as usize).copied()
    }

    /// hour, minute, second, century, year-in-century, month, day, weekday
    pub fn to_bytes(&self) -> [u8; 8] {
        let year = self.date.year() as u32;
        [
            self.time.hour() as u8,
            self.time.minute() as u8,
            self.time.second() as u8,
            (year / 100) as u8,
            (year % 100) as u8,
            self.date.month() as u8,
            self.date.day() as u8,
            self.weekday_index(),
        ]
    }
}

impl fmt::Display for ClockTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.weekday,
            self.date.format("%Y-%m-%d"),
            self.time.format("%H:%M:%S")
        )
    }
}

/// One entry of the two-slot daily dimming program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSlot {
    pub hour: u8,
    pub minute: u8,
    pub dim_level: u8,
}

impl ScheduleSlot {
    pub fn new(time: &str, dim_level: u8) -> Result<Self> {
        let (hour, minute) = parse_hh_mm(time)?;
        Ok(Self {
            hour,
            minute,
            dim_level,
        })
    }
}

impl fmt::Display for ScheduleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}@{}", self.hour, self.minute, self.dim_level)
    }
}

/// Loosely-typed schedule slot as it arrives from a caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSpec {
    pub time: Option<String>,
    pub dim_level: Option<i64>,
}

impl SlotSpec {
    fn into_slot(spec: Option<&SlotSpec>, name: &str) -> Result<ScheduleSlot> {
        let spec = spec.ok_or_else(|| BridgeError::invalid(format!("missing {}", name)))?;
        let time = spec
            .time
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| BridgeError::invalid(format!("missing {} time", name)))?;
        let level = spec
            .dim_level
            .ok_or_else(|| BridgeError::invalid(format!("missing {} dim level", name)))?;
        let level = u8::try_from(level).map_err(|_| {
            BridgeError::invalid(format!("{} dim level {} is outside 0-255", name, level))
        })?;
        ScheduleSlot::new(time, level)
    }
}

/// A command to be encoded once per device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    TurnLight(LightState),
    TimeSync(ClockTimestamp),
    Schedule {
        slot1: ScheduleSlot,
        slot2: ScheduleSlot,
    },
}

impl Action {
    pub fn turn_light(state: &str) -> Result<Self> {
        Ok(Action::TurnLight(state.parse()?))
    }

    pub fn time_sync(timestamp: &str) -> Result<Self> {
        Ok(Action::TimeSync(ClockTimestamp::parse(timestamp)?))
    }

    /// Build a schedule, failing when either slot, time or dim level is absent
    pub fn schedule(slot1: Option<&SlotSpec>, slot2: Option<&SlotSpec>) -> Result<Self> {
        Ok(Action::Schedule {
            slot1: SlotSpec::into_slot(slot1, "slot1")?,
            slot2: SlotSpec::into_slot(slot2, "slot2")?,
        })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::TurnLight(_) => ActionKind::TurnLight,
            Action::TimeSync(_) => ActionKind::TimeSync,
            Action::Schedule { .. } => ActionKind::Schedule,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::TurnLight(state) => write!(f, "TurnLight({})", state),
            Action::TimeSync(ts) => write!(f, "TimeSync({})", ts),
            Action::Schedule { slot1, slot2 } => write!(f, "Schedule({}, {})", slot1, slot2),
        }
    }
}

fn parse_hh_mm(text: &str) -> Result<(u8, u8)> {
    let bad = || BridgeError::invalid(format!("invalid slot time '{}': expected HH:MM", text));

    let two_digits = |part: &str| -> Option<u8> {
        match part.as_bytes() {
            [tens @ b'0'..=b'9', ones @ b'0'..=b'9'] => Some((tens - b'0') * 10 + (ones - b'0')),
            _ => None,
        }
    };

    let (h, m) = text.split_once(':').ok_or_else(bad)?;
    let hour = two_digits(h).ok_or_else(bad)?;
    let minute = two_digits(m).ok_or_else(bad)?;
    if hour > 23 || minute > 59 {
        return Err(bad());
    }
    Ok((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_state_parsing() {
        assert_eq!("Light On".parse::<LightState>().unwrap(), LightState::On);
        assert_eq!("Light Off".parse::<LightState>().unwrap(), LightState::Off);
        assert_eq!("ON".parse::<LightState>().unwrap(), LightState::On);
        assert_eq!(" off ".parse::<LightState>().unwrap(), LightState::Off);
        assert!(matches!(
            "Light Dim".parse::<LightState>(),
            Err(BridgeError::InvalidInput(_))
        ));
        assert!("".parse::<LightState>().is_err());
    }

    #[test]
    fn test_light_codes() {
        assert_eq!(LightState::On.action_code(), 0x21);
        assert_eq!(LightState::On.dim_level(), 0x64);
        assert_eq!(LightState::Off.action_code(), 0x22);
        assert_eq!(LightState::Off.dim_level(), 0x00);
        assert_eq!(LightState::from_action_code(0x22), Some(LightState::Off));
        assert_eq!(LightState::from_action_code(0x23), None);
    }

    #[test]
    fn test_timestamp_parse() {
        let ts = ClockTimestamp::parse("Tuesday 2024-03-05 09:07:30").unwrap();
        assert_eq!(ts.weekday, Weekday::Tue);
        assert_eq!(ts.weekday_index(), 2);
        // plain binary, not BCD
        assert_eq!(ts.to_bytes(), [9, 7, 30, 20, 24, 3, 5, 2]);
    }

    #[test]
    fn test_timestamp_sunday_is_zero() {
        let ts = ClockTimestamp::parse("sun 2023-12-31 23:59:59").unwrap();
        assert_eq!(ts.to_bytes(), [23, 59, 59, 20, 23, 12, 31, 0]);
        let ts = ClockTimestamp::parse("Saturday 1999-01-02 00:00:00").unwrap();
        assert_eq!(ts.to_bytes(), [0, 0, 0, 19, 99, 1, 2, 6]);
    }

    #[test]
    fn test_timestamp_rejects_short_input() {
        assert!(matches!(
            ClockTimestamp::parse("Monday 2024-01-01"),
            Err(BridgeError::InvalidInput(_))
        ));
        assert!(ClockTimestamp::parse("").is_err());
    }

    #[test]
    fn test_timestamp_rejects_bad_components() {
        assert!(ClockTimestamp::parse("Funday 2024-01-01 10:00:00").is_err());
        assert!(ClockTimestamp::parse("Monday 2024-13-01 10:00:00").is_err());
        assert!(ClockTimestamp::parse("Monday 2024-01-01 25:00:00").is_err());
    }

    #[test]
    fn test_timestamp_from_datetime() {
        let dt = chrono::Utc.with_ymd_and_hms(2025, 6, 15, 18, 30, 5).unwrap();
        let ts = ClockTimestamp::from_datetime(&dt);
        assert_eq!(ts.weekday, Weekday::Sun);
        assert_eq!(ts.to_string(), "Sun 2025-06-15 18:30:05");
    }

    #[test]
    fn test_weekday_from_index() {
        assert_eq!(ClockTimestamp::weekday_from_index(0), Some(Weekday::Sun));
        assert_eq!(ClockTimestamp::weekday_from_index(6), Some(Weekday::Sat));
        assert_eq!(ClockTimestamp::weekday_from_index(7), None);
    }

    #[test]
    fn test_schedule_requires_both_slots() {
        let slot = SlotSpec {
            time: Some("18:00".into()),
            dim_level: Some(80),
        };
        assert!(matches!(
            Action::schedule(Some(&slot), None),
            Err(BridgeError::InvalidInput(_))
        ));
        assert!(Action::schedule(None, Some(&slot)).is_err());
    }

    #[test]
    fn test_schedule_requires_time_and_level() {
        let good = SlotSpec {
            time: Some("05:30".into()),
            dim_level: Some(0),
        };
        let no_level = SlotSpec {
            time: Some("18:00".into()),
            dim_level: None,
        };
        let no_time = SlotSpec {
            time: None,
            dim_level: Some(50),
        };
        assert!(Action::schedule(Some(&good), Some(&no_level)).is_err());
        assert!(Action::schedule(Some(&no_time), Some(&good)).is_err());
    }

    #[test]
    fn test_schedule_validates_ranges() {
        let good = SlotSpec {
            time: Some("05:30".into()),
            dim_level: Some(0),
        };
        let too_bright = SlotSpec {
            time: Some("18:00".into()),
            dim_level: Some(256),
        };
        let bad_time = SlotSpec {
            time: Some("24:00".into()),
            dim_level: Some(10),
        };
        assert!(Action::schedule(Some(&good), Some(&too_bright)).is_err());
        assert!(Action::schedule(Some(&good), Some(&bad_time)).is_err());
    }

    #[test]
    fn test_slot_time_is_two_digit_hh_mm() {
        assert_eq!(parse_hh_mm("07:05").unwrap(), (7, 5));
        assert_eq!(parse_hh_mm("00:00").unwrap(), (0, 0));
        assert_eq!(parse_hh_mm("23:59").unwrap(), (23, 59));

        for text in ["7:5", "07:5", "7:05", "+7:+5", " 07:05", "07:05 ", "007:05", "07-05", "0a:05", ""] {
            assert!(
                matches!(parse_hh_mm(text), Err(BridgeError::InvalidInput(_))),
                "accepted {:?}",
                text
            );
        }
    }

    #[test]
    fn test_schedule_ok() {
        let evening = SlotSpec {
            time: Some("18:15".into()),
            dim_level: Some(100),
        };
        let night = SlotSpec {
            time: Some("23:00".into()),
            dim_level: Some(40),
        };
        let action = Action::schedule(Some(&evening), Some(&night)).unwrap();
        assert_eq!(
            action,
            Action::Schedule {
                slot1: ScheduleSlot {
                    hour: 18,
                    minute: 15,
                    dim_level: 100
                },
                slot2: ScheduleSlot {
                    hour: 23,
                    minute: 0,
                    dim_level: 40
                },
            }
        );
        assert_eq!(action.kind(), ActionKind::Schedule);
    }

    #[test]
    fn test_header_length_byte_matches_layout() {
        for kind in ActionKind::ALL {
            let header = kind.header();
            // bytes after the length byte + payload
            assert_eq!(header[2] as usize, header.len() - 3 + kind.payload_len());
        }
    }
}
