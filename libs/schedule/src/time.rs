use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{NaiveTime, Timelike};
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Accepted format for a slot start time, 24h `HH:MM`
pub static SLOT_TIME_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").unwrap());

const MINUTES_PER_DAY: u32 = 24 * 60;

/// A time of day with minute precision, written as `HH:MM`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotTime(u16);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidSlotTime(pub String);

impl fmt::Display for InvalidSlotTime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "'{}' is not a valid HH:MM time", self.0)
	}
}

impl std::error::Error for InvalidSlotTime {}

impl SlotTime {
	/// Build a time from constants known to be in range
	pub(crate) const fn at(hour: u16, minute: u16) -> Self {
		Self(hour * 60 + minute)
	}

	#[must_use]
	pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
		if hour > 23 || minute > 59 {
			return None;
		}

		#[allow(clippy::cast_possible_truncation)]
		Some(Self((hour * 60 + minute) as u16))
	}

	/// Minutes since midnight
	#[must_use]
	pub fn minutes(self) -> u32 { u32::from(self.0) }

	/// Add a number of minutes, `None` if the result would leave the day
	#[must_use]
	pub fn add_minutes(self, minutes: u32) -> Option<Self> {
		let total = self.minutes().checked_add(minutes)?;

		if total >= MINUTES_PER_DAY {
			return None;
		}

		Self::from_hm(total / 60, total % 60)
	}

	/// Truncate a [`NaiveTime`] to minute precision
	#[must_use]
	pub fn from_naive(time: NaiveTime) -> Self {
		#[allow(clippy::cast_possible_truncation)]
		Self((time.hour() * 60 + time.minute()) as u16)
	}

	#[must_use]
	pub fn to_naive(self) -> NaiveTime {
		NaiveTime::from_hms_opt(self.minutes() / 60, self.minutes() % 60, 0)
			.unwrap_or(NaiveTime::MIN)
	}
}

impl FromStr for SlotTime {
	type Err = InvalidSlotTime;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if !SLOT_TIME_REGEX.is_match(s) {
			return Err(InvalidSlotTime(s.to_string()));
		}

		let (hour, minute) =
			s.split_once(':').ok_or_else(|| InvalidSlotTime(s.to_string()))?;

		let hour = hour.parse().map_err(|_| InvalidSlotTime(s.to_string()))?;
		let minute =
			minute.parse().map_err(|_| InvalidSlotTime(s.to_string()))?;

		Self::from_hm(hour, minute).ok_or_else(|| InvalidSlotTime(s.to_string()))
	}
}

impl fmt::Display for SlotTime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
	}
}

impl Serialize for SlotTime {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for SlotTime {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;

		raw.parse().map_err(D::Error::custom)
	}
}
