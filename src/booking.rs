//! Creating reservations
//!
//! Cheap checks run first against cached settings. The capacity re-check,
//! the reservation insert and every point movement then commit or roll back
//! together in one database transaction, serialized per slot by an advisory
//! lock

use chrono::{Datelike, NaiveDate};
use common::Error;
use customer::{Customer, NewPointLedgerEntry};
use db::PointKind;
use diesel::prelude::*;
use reservation::{NewReservation, Reservation};

use crate::AppState;
use crate::availability;
use crate::mailer::{CancellationTerms, ReservationMail};
use crate::schemas::reservation::{BookingRequest, ReservationCreated};

/// What the atomic phase committed
#[derive(Debug)]
struct Booked {
	reservation:    Reservation,
	birthday_bonus: Option<i32>,
	points_balance: Option<i32>,
}

/// Inputs of the atomic phase that do not come from the request
#[derive(Clone, Copy, Debug)]
struct BookingTerms {
	customer_id:    Option<i32>,
	capacity:       u32,
	today:          NaiveDate,
	birthday_bonus: i32,
}

/// Book a slot
///
/// # Errors
/// Fails if the request is invalid, the slot is taken, the customer does not
/// have enough points or the database is unreachable
#[instrument(skip(state))]
pub async fn create_reservation(
	state: &AppState,
	request: BookingRequest,
) -> Result<ReservationCreated, Error> {
	let now = state.config.business_now();

	if request.date.and_time(request.time.to_naive()) < now {
		return Err(Error::invalid_field("time", "is in the past"));
	}

	let settings = availability::current_settings(state).await?;

	if !availability::candidate_slots(&settings, request.date).contains(request.time) {
		return Err(Error::invalid_field("time", "is not a bookable slot on this date"));
	}

	let conn = state.database_pool.get().await?;

	let customer = Customer::get_by_email(&request.customer_email, &conn).await?;

	if request.points_used > 0 {
		let Some(customer) = &customer else {
			return Err(Error::invalid_field(
				"pointsUsed",
				"points can only be used by registered customers",
			));
		};

		if request.points_used > customer.points {
			return Err(Error::InsufficientPoints {
				available: customer.points,
				requested: request.points_used,
			});
		}
	}

	let terms = BookingTerms {
		customer_id:    customer.as_ref().map(|c| c.id),
		capacity:       settings.slot_capacity_for(request.date),
		today:          now.date(),
		birthday_bonus: state.config.birthday_bonus_points,
	};

	let date = request.date;

	let booked = conn
		.interact(move |conn| {
			conn.transaction::<_, Error, _>(|conn| book(&request, terms, conn))
		})
		.await??;

	info!(
		"booked reservation {} on {} at {}",
		booked.reservation.id, booked.reservation.date, booked.reservation.time
	);

	availability::invalidate_date(&state.cache, date).await;

	let mail = ReservationMail::new(
		&booked.reservation,
		booked.birthday_bonus,
		CancellationTerms {
			deadline_hours: settings.cancellation_deadline_hours,
			policy:         settings.cancellation_policy,
		},
	);
	notify(state, mail);

	Ok(ReservationCreated {
		reservation_id:         booked.reservation.id,
		birthday_bonus_applied: booked.birthday_bonus.is_some(),
		points_balance:         booked.points_balance,
	})
}

/// The atomic phase, must run inside a transaction
fn book(
	request: &BookingRequest,
	terms: BookingTerms,
	conn: &mut PgConnection,
) -> Result<Booked, Error> {
	let (date, time) = (request.date, request.time);

	Reservation::lock_slot(date, time, conn)?;

	let taken = Reservation::count_at(date, time, conn)?;
	if taken >= i64::from(terms.capacity) {
		return Err(Error::SlotUnavailable { date, time });
	}

	let reservation = NewReservation {
		date,
		time: time.to_naive(),
		customer_id: terms.customer_id,
		customer_name: request.customer_name.clone(),
		customer_email: request.customer_email.clone(),
		customer_phone: request.customer_phone.clone(),
		service_name: request.service_name.clone(),
		price: request.price,
		maintenance_price: request.maintenance_price,
		total_price: request.total_price,
		points_used: request.points_used,
		final_price: request.final_price,
		intake_form: request.intake_form.clone(),
	}
	.insert(conn)?;

	let Some(customer_id) = terms.customer_id else {
		return Ok(Booked { reservation, birthday_bonus: None, points_balance: None });
	};

	let customer = Customer::lock(customer_id, conn)?;
	let mut balance = customer.points;
	let mut birthday_bonus = None;

	if terms.birthday_bonus > 0 && customer.has_birthday_on(terms.today) {
		let year = terms.today.year();

		let credited = NewPointLedgerEntry {
			customer_id,
			kind: PointKind::Birthday,
			amount: terms.birthday_bonus,
			year: Some(year),
			description: format!("birthday bonus {year}"),
			reservation_id: Some(reservation.id),
		}
		.insert_once(conn)?;

		if credited {
			balance = Customer::credit(customer_id, terms.birthday_bonus, conn)?;
			birthday_bonus = Some(terms.birthday_bonus);

			info!("credited birthday bonus {year} to customer {customer_id}");
		}
	}

	if request.points_used > 0 {
		let Some(remaining) = Customer::debit(customer_id, request.points_used, conn)?
		else {
			return Err(Error::InsufficientPoints {
				available: balance,
				requested: request.points_used,
			});
		};

		NewPointLedgerEntry {
			customer_id,
			kind: PointKind::Use,
			amount: -request.points_used,
			year: None,
			description: format!("used on reservation {}", reservation.id),
			reservation_id: Some(reservation.id),
		}
		.insert(conn)?;

		balance = remaining;
	}

	Ok(Booked { reservation, birthday_bonus, points_balance: Some(balance) })
}

/// Queue the customer confirmation and the operator notice
///
/// Runs detached, each mail gets the configured notification timeout and
/// failures are only logged
fn notify(state: &AppState, mail: ReservationMail) {
	let mailer = state.mailer.clone();
	let timeout = state.config.notification_timeout;

	tokio::spawn(async move {
		let id = mail.reservation_id;

		match tokio::time::timeout(timeout, mailer.send_reservation_confirmed(&mail))
			.await
		{
			Ok(Ok(())) => {},
			Ok(Err(e)) => warn!("could not send confirmation for {id} -- {e}"),
			Err(_) => warn!("timed out sending confirmation for {id}"),
		}

		match tokio::time::timeout(timeout, mailer.send_reservation_received(&mail))
			.await
		{
			Ok(Ok(())) => {},
			Ok(Err(e)) => warn!("could not notify operator of {id} -- {e}"),
			Err(_) => warn!("timed out notifying operator of {id}"),
		}
	});
}
