use askama::Template;
use common::Error;
use lettre::Address;
use lettre::message::Mailbox;
use reservation::Reservation;
use serde::Serialize;

use crate::mailer::Mailer;

/// Everything a reservation mail shows, taken from a committed reservation
#[derive(Clone, Debug, Serialize)]
pub struct ReservationMail {
	pub reservation_id: i32,
	pub customer_name:  String,
	pub customer_email: String,
	pub customer_phone: String,
	pub service_name:   String,
	pub date:           String,
	pub time:           String,
	pub total_price:    f64,
	pub points_used:    i32,
	pub final_price:    f64,
	pub birthday_bonus: Option<i32>,
	pub cancellation:   CancellationTerms,
}

#[derive(Clone, Debug, Serialize)]
pub struct CancellationTerms {
	pub deadline_hours: u32,
	pub policy:         String,
}

impl ReservationMail {
	#[must_use]
	pub fn new(
		reservation: &Reservation,
		birthday_bonus: Option<i32>,
		cancellation: CancellationTerms,
	) -> Self {
		Self {
			reservation_id: reservation.id,
			customer_name: reservation.customer_name.clone(),
			customer_email: reservation.customer_email.clone(),
			customer_phone: reservation.customer_phone.clone(),
			service_name: reservation.service_name.clone(),
			date: reservation.date.format("%Y-%m-%d").to_string(),
			time: reservation.time.format("%H:%M").to_string(),
			total_price: reservation.total_price,
			points_used: reservation.points_used,
			final_price: reservation.final_price,
			birthday_bonus,
			cancellation,
		}
	}
}

impl TryFrom<&ReservationMail> for Mailbox {
	type Error = Error;

	fn try_from(value: &ReservationMail) -> Result<Self, Self::Error> {
		let address = value.customer_email.parse::<Address>()?;

		Ok(Mailbox::new(Some(value.customer_name.clone()), address))
	}
}

#[derive(Clone, Debug, Template)]
#[template(path = "reservation_confirmed.txt")]
struct ReservationConfirmedTemplate<'a> {
	mail: &'a ReservationMail,
}

#[derive(Clone, Debug, Template)]
#[template(path = "reservation_received.txt")]
struct ReservationReceivedTemplate<'a> {
	mail: &'a ReservationMail,
}

impl Mailer {
	/// Send the customer a confirmation of their reservation
	#[instrument(skip_all, fields(reservation = mail.reservation_id))]
	pub(crate) async fn send_reservation_confirmed(
		&self,
		mail: &ReservationMail,
	) -> Result<(), Error> {
		let body = ReservationConfirmedTemplate { mail };

		let message = self.try_build_message(
			mail,
			"Your reservation has been received",
			&body.render()?,
		)?;

		self.send(message).await?;

		info!("queued confirmation for reservation {}", mail.reservation_id);

		Ok(())
	}

	/// Let the operator know a reservation was made
	///
	/// Does nothing when no operator address is configured
	#[instrument(skip_all, fields(reservation = mail.reservation_id))]
	pub(crate) async fn send_reservation_received(
		&self,
		mail: &ReservationMail,
	) -> Result<(), Error> {
		let Some(operator) = self.operator().cloned() else {
			return Ok(());
		};

		let body = ReservationReceivedTemplate { mail };

		let message = self.try_build_message(
			OperatorMailbox(operator),
			&format!("New reservation on {} at {}", mail.date, mail.time),
			&body.render()?,
		)?;

		self.send(message).await?;

		info!("queued operator notice for reservation {}", mail.reservation_id);

		Ok(())
	}
}

struct OperatorMailbox(Address);

impl TryFrom<OperatorMailbox> for Mailbox {
	type Error = Error;

	fn try_from(value: OperatorMailbox) -> Result<Self, Self::Error> {
		Ok(Mailbox::new(None, value.0))
	}
}
