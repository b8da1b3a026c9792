//! Turn an untrusted stored document into [`ReservationSettings`]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};

use crate::{DateOverride, DayHours, ReservationSettings, SlotTime, WEEKDAY_NAMES};

static DATE_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Normalize a raw (possibly partial or missing) settings document
///
/// Never fails, every field that is missing or cannot be understood falls
/// back to its default
#[must_use]
pub fn normalize(raw: Option<&Value>) -> ReservationSettings {
	let defaults = ReservationSettings::default();

	let Some(Value::Object(raw)) = raw else {
		if raw.is_some_and(|v| !v.is_null()) {
			debug!("settings document is not an object, using defaults");
		}

		return defaults;
	};

	let slot_duration =
		positive(raw.get("slotDuration")).unwrap_or(defaults.slot_duration);

	let business_hours = business_hours(
		raw.get("businessHours"),
		&defaults.business_hours,
		slot_duration,
	);

	ReservationSettings {
		slot_duration,
		max_capacity_per_slot: positive(raw.get("maxCapacityPerSlot"))
			.unwrap_or(defaults.max_capacity_per_slot),
		business_hours,
		blocked_dates: date_set(raw.get("blockedDates")),
		date_overrides: date_overrides(raw.get("dateOverrides")),
		cancellation_deadline_hours: positive(
			raw.get("cancellationDeadlineHours"),
		)
		.unwrap_or(defaults.cancellation_deadline_hours),
		cancellation_policy: raw
			.get("cancellationPolicy")
			.and_then(Value::as_str)
			.map(str::to_string)
			.unwrap_or(defaults.cancellation_policy),
	}
}

/// A finite, positive whole number, accepting numeric strings
fn positive(value: Option<&Value>) -> Option<u32> {
	let number = match value? {
		Value::Number(n) => n.as_f64()?,
		Value::String(s) => s.trim().parse::<f64>().ok()?,
		_ => return None,
	};

	if !number.is_finite() {
		return None;
	}

	let number = number.trunc();

	if number < 1.0 || number > f64::from(u32::MAX) {
		return None;
	}

	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	Some(number as u32)
}

fn time(value: Option<&Value>) -> Option<SlotTime> {
	value?.as_str()?.trim().parse().ok()
}

/// Deduplicated set of valid times, invalid entries are dropped
fn time_set(value: Option<&Value>) -> BTreeSet<SlotTime> {
	let Some(Value::Array(items)) = value else {
		return BTreeSet::new();
	};

	items.iter().filter_map(|v| time(Some(v))).collect()
}

fn date(raw: &str) -> Option<NaiveDate> {
	let raw = raw.trim();

	if !DATE_REGEX.is_match(raw) {
		return None;
	}

	NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn date_set(value: Option<&Value>) -> BTreeSet<NaiveDate> {
	let Some(Value::Array(items)) = value else {
		return BTreeSet::new();
	};

	items.iter().filter_map(Value::as_str).filter_map(date).collect()
}

fn date_overrides(value: Option<&Value>) -> BTreeMap<NaiveDate, DateOverride> {
	let Some(Value::Object(entries)) = value else {
		return BTreeMap::new();
	};

	entries
		.iter()
		.filter_map(|(key, entry)| {
			let day = date(key)?;
			let allowed_slots = time_set(entry.get("allowedSlots"));

			if allowed_slots.is_empty() {
				return None;
			}

			Some((day, DateOverride { allowed_slots }))
		})
		.collect()
}

fn business_hours(
	value: Option<&Value>,
	template: &[DayHours; 7],
	slot_duration: u32,
) -> [DayHours; 7] {
	std::array::from_fn(|weekday| {
		let entry = match value {
			Some(Value::Array(days)) => days.get(weekday),
			Some(Value::Object(days)) => keyed_day(days, weekday),
			_ => None,
		};

		day_hours(entry, &template[weekday], slot_duration)
	})
}

fn keyed_day(days: &Map<String, Value>, weekday: usize) -> Option<&Value> {
	days.get(&weekday.to_string()).or_else(|| {
		days.iter()
			.find(|(k, _)| k.eq_ignore_ascii_case(WEEKDAY_NAMES[weekday]))
			.map(|(_, v)| v)
	})
}

fn day_hours(
	value: Option<&Value>,
	template: &DayHours,
	slot_duration: u32,
) -> DayHours {
	let Some(Value::Object(day)) = value else {
		return template.clone();
	};

	let allow_multiple_slots = day
		.get("allowMultipleSlots")
		.and_then(Value::as_bool)
		.unwrap_or(false);

	let slot_interval = allow_multiple_slots
		.then(|| positive(day.get("slotInterval")).unwrap_or(slot_duration));

	let alternate_slot_sets = match day.get("alternateSlotSets") {
		Some(Value::Array(sets)) => {
			sets.iter()
				.map(|set| time_set(Some(set)))
				.filter(|set| !set.is_empty())
				.collect()
		},
		_ => vec![],
	};

	DayHours {
		is_open: day
			.get("isOpen")
			.and_then(Value::as_bool)
			.unwrap_or(template.is_open),
		open: time(day.get("open")).unwrap_or(template.open),
		close: time(day.get("close")).unwrap_or(template.close),
		max_capacity_per_day: positive(day.get("maxCapacityPerDay"))
			.unwrap_or(template.max_capacity_per_day),
		allowed_slots: time_set(day.get("allowedSlots")),
		alternate_slot_sets,
		allow_multiple_slots,
		slot_interval,
	}
}
