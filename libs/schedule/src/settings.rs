use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::SlotTime;

pub const DEFAULT_SLOT_DURATION_MINUTES: u32 = 120;
pub const DEFAULT_MAX_CAPACITY_PER_SLOT: u32 = 1;
pub const DEFAULT_MAX_CAPACITY_PER_DAY: u32 = 1;
pub const DEFAULT_CANCELLATION_DEADLINE_HOURS: u32 = 24;

/// Weekday names indexed from sunday, used for keyed business hours and
/// messages
pub const WEEKDAY_NAMES: [&str; 7] = [
	"sunday",
	"monday",
	"tuesday",
	"wednesday",
	"thursday",
	"friday",
	"saturday",
];

/// The salon's schedule configuration
///
/// Only [`normalize`](crate::normalize) produces this from stored data, its
/// [`Serialize`] output is the persisted document shape
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationSettings {
	pub slot_duration:               u32,
	pub max_capacity_per_slot:       u32,
	/// Indexed by weekday, 0 is sunday
	pub business_hours:              [DayHours; 7],
	pub blocked_dates:               BTreeSet<NaiveDate>,
	pub date_overrides:              BTreeMap<NaiveDate, DateOverride>,
	pub cancellation_deadline_hours: u32,
	pub cancellation_policy:         String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayHours {
	pub is_open:              bool,
	pub open:                 SlotTime,
	pub close:                SlotTime,
	pub max_capacity_per_day: u32,
	#[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
	pub allowed_slots:        BTreeSet<SlotTime>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub alternate_slot_sets:  Vec<BTreeSet<SlotTime>>,
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub allow_multiple_slots: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub slot_interval:        Option<u32>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateOverride {
	pub allowed_slots: BTreeSet<SlotTime>,
}

impl DayHours {
	fn template(is_open: bool) -> Self {
		Self {
			is_open,
			open: SlotTime::at(10, 0),
			close: SlotTime::at(20, 0),
			max_capacity_per_day: DEFAULT_MAX_CAPACITY_PER_DAY,
			allowed_slots: BTreeSet::new(),
			alternate_slot_sets: vec![],
			allow_multiple_slots: false,
			slot_interval: None,
		}
	}

	/// Length of the opening hours in minutes, zero if they are inverted
	#[must_use]
	pub fn span_minutes(&self) -> u32 {
		self.close.minutes().saturating_sub(self.open.minutes())
	}
}

impl Default for ReservationSettings {
	fn default() -> Self {
		Self {
			slot_duration:               DEFAULT_SLOT_DURATION_MINUTES,
			max_capacity_per_slot:       DEFAULT_MAX_CAPACITY_PER_SLOT,
			business_hours:              std::array::from_fn(|weekday| {
				DayHours::template(weekday != 0)
			}),
			blocked_dates:               BTreeSet::new(),
			date_overrides:              BTreeMap::new(),
			cancellation_deadline_hours: DEFAULT_CANCELLATION_DEADLINE_HOURS,
			cancellation_policy:         String::new(),
		}
	}
}

impl ReservationSettings {
	/// The business hours that apply to the weekday of `date`
	#[must_use]
	pub fn hours_for(&self, date: NaiveDate) -> &DayHours {
		let weekday = date.weekday().num_days_from_sunday() as usize;

		&self.business_hours[weekday]
	}

	/// Bookings a single slot on `date` can hold
	#[must_use]
	pub fn slot_capacity_for(&self, date: NaiveDate) -> u32 {
		self.max_capacity_per_slot
			.min(self.hours_for(date).max_capacity_per_day)
	}

	/// Produce the exact document shape that gets persisted
	///
	/// Optional fields are only emitted when they carry meaning, so stored
	/// documents never accumulate stale temporary fields
	///
	/// # Errors
	/// Fails if serialization fails
	pub fn sanitize_for_write(&self) -> Result<serde_json::Value, serde_json::Error> {
		let mut clean = self.clone();

		for day in &mut clean.business_hours {
			day.alternate_slot_sets.retain(|set| !set.is_empty());

			if !day.allow_multiple_slots {
				day.slot_interval = None;
			}
		}

		clean.date_overrides.retain(|_, o| !o.allowed_slots.is_empty());

		serde_json::to_value(clean)
	}
}
