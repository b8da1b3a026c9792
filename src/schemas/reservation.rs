use chrono::NaiveDate;
use common::{Error, FieldError, field_errors};
use schedule::SlotTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

/// Largest difference between a stated amount and the one derived from the
/// other amounts
pub const AMOUNT_TOLERANCE: f64 = 0.5;

fn not_blank(value: &str) -> Result<(), ValidationError> {
	if value.trim().is_empty() {
		return Err(ValidationError::new("blank").with_message("cannot be blank".into()));
	}

	Ok(())
}

fn valid_date(value: &str) -> Result<(), ValidationError> {
	not_blank(value)?;

	value.trim().parse::<NaiveDate>().map(|_| ()).map_err(|_| {
		ValidationError::new("date").with_message("must be a YYYY-MM-DD date".into())
	})
}

fn valid_time(value: &str) -> Result<(), ValidationError> {
	not_blank(value)?;

	value.trim().parse::<SlotTime>().map(|_| ()).map_err(|_| {
		ValidationError::new("time").with_message("must be a HH:MM time".into())
	})
}

/// A reservation as submitted by the booking form
#[derive(Clone, Debug, Default, Deserialize, Serialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateReservationRequest {
	#[validate(custom(function = "valid_date"))]
	pub date:              String,
	#[validate(custom(function = "valid_time"))]
	pub time:              String,
	#[validate(custom(function = "not_blank"))]
	pub customer_name:     String,
	#[validate(email(message = "invalid email", code = "email"))]
	pub customer_email:    String,
	#[validate(custom(function = "not_blank"))]
	pub customer_phone:    String,
	#[validate(custom(function = "not_blank"))]
	pub service_name:      String,
	#[validate(range(min = 0.0, message = "cannot be negative"))]
	pub price:             f64,
	#[validate(range(min = 0.0, message = "cannot be negative"))]
	pub maintenance_price: f64,
	#[validate(range(min = 0.0, message = "cannot be negative"))]
	pub total_price:       f64,
	#[validate(range(min = 0, message = "cannot be negative"))]
	pub points_used:       i32,
	#[validate(range(min = 0.0, message = "cannot be negative"))]
	pub final_price:       f64,
	pub intake_form:       Value,
}

/// A checked reservation request
#[derive(Clone, Debug)]
pub struct BookingRequest {
	pub date:              NaiveDate,
	pub time:              SlotTime,
	pub customer_name:     String,
	pub customer_email:    String,
	pub customer_phone:    String,
	pub service_name:      String,
	pub price:             f64,
	pub maintenance_price: f64,
	pub total_price:       f64,
	pub points_used:       i32,
	pub final_price:       f64,
	pub intake_form:       Value,
}

impl CreateReservationRequest {
	/// Cross-field checks on the amounts, fields are reported by the amount
	/// that does not add up
	fn amount_errors(&self) -> Vec<FieldError> {
		let mut errors = vec![];
		let points = f64::from(self.points_used);

		if (self.price + self.maintenance_price - self.total_price).abs()
			> AMOUNT_TOLERANCE
		{
			errors.push(FieldError::new(
				"totalPrice",
				"must equal price plus maintenancePrice",
			));
		}

		if (self.total_price - points - self.final_price).abs() > AMOUNT_TOLERANCE {
			errors.push(FieldError::new(
				"finalPrice",
				"must equal totalPrice minus pointsUsed",
			));
		}

		if points > self.total_price {
			errors.push(FieldError::new("pointsUsed", "cannot exceed totalPrice"));
		}

		errors
	}

	/// Validate every field and turn the request into a [`BookingRequest`]
	///
	/// # Errors
	/// Fails with every rejected field at once
	pub fn into_booking(self) -> Result<BookingRequest, Error> {
		let mut errors = match self.validate() {
			Ok(()) => vec![],
			Err(e) => field_errors(&e),
		};

		errors.extend(self.amount_errors());

		if !errors.is_empty() {
			errors.sort_by(|a, b| a.field.cmp(&b.field));

			return Err(Error::ValidationFailed(errors));
		}

		let date = self
			.date
			.trim()
			.parse()
			.map_err(|_| Error::invalid_field("date", "must be a YYYY-MM-DD date"))?;
		let time = self
			.time
			.trim()
			.parse()
			.map_err(|_| Error::invalid_field("time", "must be a HH:MM time"))?;

		let intake_form = match self.intake_form {
			Value::Null => Value::Object(serde_json::Map::new()),
			form => form,
		};

		Ok(BookingRequest {
			date,
			time,
			customer_name: self.customer_name.trim().to_string(),
			customer_email: self.customer_email.trim().to_lowercase(),
			customer_phone: self.customer_phone.trim().to_string(),
			service_name: self.service_name.trim().to_string(),
			price: self.price,
			maintenance_price: self.maintenance_price,
			total_price: self.total_price,
			points_used: self.points_used,
			final_price: self.final_price,
			intake_form,
		})
	}
}

/// Response to a committed reservation
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationCreated {
	pub reservation_id:         i32,
	pub birthday_bonus_applied: bool,
	/// Balance after the booking, only for registered customers
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub points_balance:         Option<i32>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request() -> CreateReservationRequest {
		CreateReservationRequest {
			date: "2026-10-19".into(),
			time: "18:30".into(),
			customer_name: "Hanako".into(),
			customer_email: "Hanako@Example.com".into(),
			customer_phone: "090-0000-0000".into(),
			service_name: "Extensions".into(),
			price: 20000.0,
			maintenance_price: 2000.0,
			total_price: 22000.0,
			points_used: 0,
			final_price: 22000.0,
			intake_form: Value::Null,
		}
	}

	fn fields(err: Error) -> Vec<String> {
		match err {
			Error::ValidationFailed(errors) => {
				errors.into_iter().map(|e| e.field).collect()
			},
			other => panic!("expected validation failure, got {other:?}"),
		}
	}

	#[test]
	fn consistent_amounts_are_accepted() {
		let booking = request().into_booking().unwrap();

		assert_eq!(booking.customer_email, "hanako@example.com");
		assert_eq!(booking.time.to_string(), "18:30");
		assert!(booking.intake_form.is_object());
	}

	#[test]
	fn total_must_match_its_parts() {
		let mut req = request();
		req.total_price = 22500.0;
		req.final_price = 22500.0;

		assert_eq!(fields(req.into_booking().unwrap_err()), ["totalPrice"]);
	}

	#[test]
	fn rounding_within_half_a_unit_is_tolerated() {
		let mut req = request();
		req.total_price = 22000.4;
		req.final_price = 22000.0;

		assert!(req.into_booking().is_ok());
	}

	#[test]
	fn points_are_deducted_from_the_final_price() {
		let mut req = request();
		req.points_used = 1000;

		assert_eq!(fields(req.clone().into_booking().unwrap_err()), ["finalPrice"]);

		req.final_price = 21000.0;
		assert!(req.into_booking().is_ok());
	}

	#[test]
	fn every_invalid_field_is_reported() {
		let req = CreateReservationRequest {
			time: "25:00".into(),
			customer_email: "not-an-email".into(),
			..request()
		};
		let req = CreateReservationRequest { customer_name: "  ".into(), ..req };

		assert_eq!(
			fields(req.into_booking().unwrap_err()),
			["customerEmail", "customerName", "time"]
		);
	}
}
