#[macro_use]
extern crate tracing;

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use common::{DbConn, Error};
use db::{ReservationStatus, reservation};
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::Text;
use schedule::SlotTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(
	Clone, Debug, Deserialize, Identifiable, Queryable, Selectable, Serialize,
)]
#[diesel(table_name = reservation)]
#[diesel(check_for_backend(Pg))]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
	pub id:                i32,
	pub date:              NaiveDate,
	pub time:              NaiveTime,
	pub customer_id:       Option<i32>,
	pub customer_name:     String,
	pub customer_email:    String,
	pub customer_phone:    String,
	pub service_name:      String,
	pub price:             f64,
	pub maintenance_price: f64,
	pub total_price:       f64,
	pub points_used:       i32,
	pub final_price:       f64,
	pub status:            ReservationStatus,
	pub intake_form:       Value,
	pub created_at:        NaiveDateTime,
	pub updated_at:        NaiveDateTime,
}

impl Reservation {
	/// Get a [`Reservation`] given its id
	#[instrument(skip(conn))]
	pub async fn get_by_id(r_id: i32, conn: &DbConn) -> Result<Self, Error> {
		let reservation = conn
			.interact(move |conn| {
				use self::reservation::dsl::*;

				reservation.find(r_id).select(Self::as_select()).get_result(conn)
			})
			.await??;

		Ok(reservation)
	}

	/// Number of non-cancelled reservations per start time on a given date
	#[instrument(skip(conn))]
	pub async fn booked_counts(
		r_date: NaiveDate,
		conn: &DbConn,
	) -> Result<HashMap<SlotTime, u32>, Error> {
		let counts = conn.interact(move |conn| Self::counts_on(r_date, conn)).await??;

		Ok(counts)
	}

	/// Synchronous building block of [`Reservation::booked_counts`]
	pub fn counts_on(
		r_date: NaiveDate,
		conn: &mut PgConnection,
	) -> QueryResult<HashMap<SlotTime, u32>> {
		use self::reservation::dsl::*;

		let rows: Vec<(NaiveTime, i64)> = reservation
			.filter(date.eq(r_date))
			.filter(status.ne(ReservationStatus::Cancelled))
			.group_by(time)
			.select((time, count_star()))
			.load(conn)?;

		let mut counts = HashMap::new();
		for (t, n) in rows {
			let n = u32::try_from(n).unwrap_or(u32::MAX);
			*counts.entry(SlotTime::from_naive(t)).or_insert(0) += n;
		}

		Ok(counts)
	}

	/// Number of non-cancelled reservations at an exact date and time
	pub fn count_at(
		r_date: NaiveDate,
		r_time: SlotTime,
		conn: &mut PgConnection,
	) -> QueryResult<i64> {
		use self::reservation::dsl::*;

		reservation
			.filter(date.eq(r_date))
			.filter(time.eq(r_time.to_naive()))
			.filter(status.ne(ReservationStatus::Cancelled))
			.count()
			.get_result(conn)
	}

	/// Serialize concurrent bookings for one slot until the surrounding
	/// transaction ends
	pub fn lock_slot(
		r_date: NaiveDate,
		r_time: SlotTime,
		conn: &mut PgConnection,
	) -> QueryResult<()> {
		diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))")
			.bind::<Text, _>(format!("reservation:{r_date} {r_time}"))
			.execute(conn)?;

		Ok(())
	}
}

#[derive(Clone, Debug, Deserialize, Insertable, Serialize)]
#[diesel(table_name = reservation)]
#[diesel(check_for_backend(Pg))]
pub struct NewReservation {
	pub date:              NaiveDate,
	pub time:              NaiveTime,
	pub customer_id:       Option<i32>,
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

impl NewReservation {
	/// Insert this [`NewReservation`] as `pending`
	pub fn insert(self, conn: &mut PgConnection) -> QueryResult<Reservation> {
		let reservation = diesel::insert_into(reservation::table)
			.values(self)
			.returning(Reservation::as_returning())
			.get_result(conn)?;

		info!("created reservation {}", reservation.id);

		Ok(reservation)
	}
}
