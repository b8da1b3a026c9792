use chrono::NaiveDate;
use common::{Error, FieldError};
use schedule::ReservationSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::AuditAction;

const PATCH_KEYS: [&str; 4] =
	["blockedDate", "block", "clearBlockedDates", "clearDateOverrides"];

/// A narrow settings mutation
///
/// Applied on top of the stored settings without validating the rest of the
/// document, so it also works when that document is inconsistent
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
	pub blocked_date:         Option<NaiveDate>,
	pub block:                Option<bool>,
	pub clear_blocked_dates:  Option<bool>,
	pub clear_date_overrides: Option<bool>,
}

impl SettingsPatch {
	/// Parse a patch body, rejecting any key that is not a known action
	///
	/// # Errors
	/// Fails if the body is not an object, is empty, contains unknown keys or
	/// pairs `blockedDate` and `block` incompletely
	pub fn from_body(body: Value) -> Result<Self, Error> {
		let Value::Object(map) = &body else {
			return Err(Error::invalid_field("body", "must be a JSON object"));
		};

		if map.is_empty() {
			return Err(Error::invalid_field("body", "contains no action"));
		}

		let mut errors: Vec<FieldError> = map
			.keys()
			.filter(|key| !PATCH_KEYS.contains(&key.as_str()))
			.map(|key| FieldError::new(key.clone(), "is not a recognized action"))
			.collect();

		if !errors.is_empty() {
			errors.sort_by(|a, b| a.field.cmp(&b.field));

			return Err(Error::ValidationFailed(errors));
		}

		for key in PATCH_KEYS {
			let Some(value) = map.get(key) else { continue };

			let valid = match key {
				"blockedDate" => value
					.as_str()
					.is_some_and(|d| d.parse::<NaiveDate>().is_ok()),
				_ => value.is_boolean(),
			};

			if !valid {
				let expected = if key == "blockedDate" {
					"must be a YYYY-MM-DD date"
				} else {
					"must be a boolean"
				};

				errors.push(FieldError::new(key, expected));
			}
		}

		if !errors.is_empty() {
			return Err(Error::ValidationFailed(errors));
		}

		let patch: Self = serde_json::from_value(body)
			.map_err(|e| Error::invalid_field("body", e.to_string()))?;

		match (patch.blocked_date, patch.block) {
			(Some(_), None) => {
				Err(Error::invalid_field("block", "is required with blockedDate"))
			},
			(None, Some(_)) => {
				Err(Error::invalid_field("blockedDate", "is required with block"))
			},
			_ => Ok(patch),
		}
	}

	/// Apply this patch to `settings`, returns the audit action it amounts to
	pub fn apply(&self, settings: &mut ReservationSettings) -> AuditAction {
		let mut actions = vec![];

		if self.clear_blocked_dates == Some(true) {
			settings.blocked_dates.clear();
			actions.push(AuditAction::ClearBlockedDates);
		}

		if self.clear_date_overrides == Some(true) {
			settings.date_overrides.clear();
			actions.push(AuditAction::ClearDateOverrides);
		}

		if let (Some(date), Some(block)) = (self.blocked_date, self.block) {
			if block {
				settings.blocked_dates.insert(date);
				actions.push(AuditAction::BlockDate);
			} else {
				settings.blocked_dates.remove(&date);
				actions.push(AuditAction::UnblockDate);
			}
		}

		match actions.as_slice() {
			[single] => *single,
			_ => AuditAction::Patch,
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn rejected_fields(body: Value) -> Vec<String> {
		match SettingsPatch::from_body(body) {
			Err(Error::ValidationFailed(errors)) => {
				errors.into_iter().map(|e| e.field).collect()
			},
			other => panic!("expected validation failure, got {other:?}"),
		}
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let body = json!({ "blockedDate": "2026-12-24", "block": true, "slotDuration": 60 });

		assert_eq!(rejected_fields(body), ["slotDuration"]);
	}

	#[test]
	fn empty_and_incomplete_bodies_are_rejected() {
		assert_eq!(rejected_fields(json!({})), ["body"]);
		assert_eq!(rejected_fields(json!([])), ["body"]);
		assert_eq!(rejected_fields(json!({ "blockedDate": "2026-12-24" })), ["block"]);
		assert_eq!(rejected_fields(json!({ "block": false })), ["blockedDate"]);
		assert_eq!(
			rejected_fields(json!({ "blockedDate": "24/12/2026", "block": true })),
			["blockedDate"]
		);
	}

	#[test]
	fn blocking_and_unblocking_a_date() {
		let mut settings = ReservationSettings::default();
		let date: NaiveDate = "2026-12-24".parse().unwrap();

		let block =
			SettingsPatch::from_body(json!({ "blockedDate": "2026-12-24", "block": true }))
				.unwrap();
		assert_eq!(block.apply(&mut settings), AuditAction::BlockDate);
		assert!(settings.blocked_dates.contains(&date));

		let unblock =
			SettingsPatch::from_body(json!({ "blockedDate": "2026-12-24", "block": false }))
				.unwrap();
		assert_eq!(unblock.apply(&mut settings), AuditAction::UnblockDate);
		assert!(settings.blocked_dates.is_empty());
	}

	#[test]
	fn combined_actions_are_a_patch() {
		let mut settings = ReservationSettings::default();
		settings.blocked_dates.insert("2026-12-24".parse().unwrap());

		let patch = SettingsPatch::from_body(json!({
			"clearBlockedDates": true,
			"clearDateOverrides": true,
		}))
		.unwrap();

		assert_eq!(patch.apply(&mut settings), AuditAction::Patch);
		assert!(settings.blocked_dates.is_empty());
	}
}
