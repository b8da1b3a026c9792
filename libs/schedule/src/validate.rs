use serde::{Deserialize, Serialize};

use crate::{FieldError, ReservationSettings};

/// Outcome of [`validate`], callers decide whether to reject a write
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
	pub ok:     bool,
	pub errors: Vec<FieldError>,
}

/// Check the invariants a complete settings document has to uphold
#[must_use]
pub fn validate(settings: &ReservationSettings) -> ValidationReport {
	let mut errors = vec![];

	if settings.slot_duration == 0 {
		errors.push(FieldError::new(
			"slotDuration",
			"slot duration must be at least one minute",
		));
	}

	if settings.max_capacity_per_slot == 0 {
		errors.push(FieldError::new(
			"maxCapacityPerSlot",
			"slot capacity must be at least 1",
		));
	}

	if settings.cancellation_deadline_hours == 0 {
		errors.push(FieldError::new(
			"cancellationDeadlineHours",
			"cancellation deadline must be at least one hour",
		));
	}

	for (weekday, day) in settings.business_hours.iter().enumerate() {
		let path = format!("businessHours.{weekday}");

		if day.max_capacity_per_day == 0 {
			errors.push(FieldError::new(
				format!("{path}.maxCapacityPerDay"),
				"daily capacity must be at least 1",
			));
		}

		if !day.is_open {
			continue;
		}

		if day.close <= day.open {
			errors.push(FieldError::new(
				format!("{path}.close"),
				format!(
					"closing time {} must be after opening time {}",
					day.close, day.open
				),
			));
		} else if day.span_minutes() < settings.slot_duration {
			errors.push(FieldError::new(
				path.clone(),
				format!(
					"opening hours {}-{} are shorter than one {} minute slot",
					day.open, day.close, settings.slot_duration
				),
			));
		}

		if day.allow_multiple_slots && day.slot_interval.is_none_or(|i| i == 0) {
			errors.push(FieldError::new(
				format!("{path}.slotInterval"),
				"slot interval must be at least one minute",
			));
		}
	}

	ValidationReport { ok: errors.is_empty(), errors }
}
