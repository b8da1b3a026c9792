//! Derive the bookable slots of a single date

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{DayHours, ReservationSettings, SlotTime};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
	pub time:      SlotTime,
	pub available: bool,
}

/// Which configuration rule produced the slots of a date
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotSource {
	Blocked,
	Closed,
	DateOverride,
	AllowedSlots,
	AlternateSlotSets,
	Interval,
	Single,
}

/// All candidate slot grids of a date
///
/// Alternate slot sets are mutually exclusive and are never merged, each set
/// becomes its own grid. Every other source produces a single grid
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySlots {
	pub date:   NaiveDate,
	pub source: SlotSource,
	pub grids:  Vec<Vec<TimeSlot>>,
}

impl DaySlots {
	fn empty(date: NaiveDate, source: SlotSource) -> Self {
		Self { date, source, grids: vec![] }
	}

	#[must_use]
	pub fn is_empty(&self) -> bool { self.grids.iter().all(Vec::is_empty) }

	fn find(&self, time: SlotTime) -> Option<&TimeSlot> {
		self.grids.iter().flatten().find(|slot| slot.time == time)
	}

	/// Whether `time` is a candidate in any grid, booked or not
	#[must_use]
	pub fn contains(&self, time: SlotTime) -> bool { self.find(time).is_some() }

	/// Whether `time` is a candidate that can still take a booking
	#[must_use]
	pub fn is_bookable(&self, time: SlotTime) -> bool {
		self.find(time).is_some_and(|slot| slot.available)
	}
}

/// Compute the slots for `date` given the bookings that already exist
///
/// A time present in `booked_times` but missing from `booked_count_by_time`
/// counts as a single booking
#[must_use]
pub fn compute_slots(
	settings: &ReservationSettings,
	date: NaiveDate,
	booked_times: &HashSet<SlotTime>,
	booked_count_by_time: &HashMap<SlotTime, u32>,
) -> DaySlots {
	if settings.blocked_dates.contains(&date) {
		return DaySlots::empty(date, SlotSource::Blocked);
	}

	let day = settings.hours_for(date);
	let capacity = settings.slot_capacity_for(date);

	if capacity == 0 {
		return DaySlots::empty(date, SlotSource::Closed);
	}

	let (source, candidates) =
		if let Some(o) = settings.date_overrides.get(&date) {
			(SlotSource::DateOverride, vec![o.allowed_slots.clone()])
		} else if !day.is_open {
			return DaySlots::empty(date, SlotSource::Closed);
		} else {
			weekday_candidates(day, settings.slot_duration)
		};

	let booked = |time: &SlotTime| {
		booked_count_by_time
			.get(time)
			.copied()
			.unwrap_or(u32::from(booked_times.contains(time)))
	};

	// BTreeSet iteration keeps every grid sorted and free of duplicates
	let grids: Vec<Vec<TimeSlot>> = candidates
		.into_iter()
		.map(|grid| {
			grid.into_iter()
				.map(|time| TimeSlot { time, available: booked(&time) < capacity })
				.collect::<Vec<_>>()
		})
		.collect();

	DaySlots { date, source, grids }
}

fn weekday_candidates(
	day: &DayHours,
	slot_duration: u32,
) -> (SlotSource, Vec<BTreeSet<SlotTime>>) {
	if !day.allowed_slots.is_empty() {
		return (SlotSource::AllowedSlots, vec![day.allowed_slots.clone()]);
	}

	if !day.alternate_slot_sets.is_empty() {
		return (SlotSource::AlternateSlotSets, day.alternate_slot_sets.clone());
	}

	let close = day.close.minutes();

	if day.allow_multiple_slots {
		let step = day.slot_interval.unwrap_or(slot_duration).max(1);

		let mut grid = BTreeSet::new();
		let mut start = day.open;

		loop {
			if start.minutes().saturating_add(slot_duration) > close {
				break;
			}

			grid.insert(start);

			match start.add_minutes(step) {
				Some(next) => start = next,
				None => break,
			}
		}

		return (SlotSource::Interval, vec![grid]);
	}

	let grid = if day.open.minutes().saturating_add(slot_duration) <= close {
		BTreeSet::from([day.open])
	} else {
		BTreeSet::new()
	};

	(SlotSource::Single, vec![grid])
}
