//! Customer accounts and their point ledger
//!
//! Accounts are owned by the external account store, this crate only reads
//! them and keeps `points` in sync with the ledger

#[macro_use]
extern crate tracing;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use common::{DbConn, Error};
use db::{PointKind, customer, point_ledger};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
	Clone, Debug, Deserialize, Identifiable, Queryable, Selectable, Serialize,
)]
#[diesel(table_name = customer)]
#[diesel(check_for_backend(Pg))]
pub struct Customer {
	pub id:         i32,
	pub email:      String,
	pub name:       String,
	pub birthday:   Option<NaiveDate>,
	pub points:     i32,
	pub created_at: NaiveDateTime,
	pub updated_at: NaiveDateTime,
}

impl Customer {
	/// Get a [`Customer`] by their (case-insensitive) email
	#[instrument(skip(conn))]
	pub async fn get_by_email(
		c_email: &str,
		conn: &DbConn,
	) -> Result<Option<Self>, Error> {
		let c_email = c_email.trim().to_lowercase();

		let customer = conn
			.interact(move |conn| {
				use self::customer::dsl::*;

				customer
					.filter(email.eq(c_email))
					.select(Self::as_select())
					.first(conn)
					.optional()
			})
			.await??;

		Ok(customer)
	}

	/// Get a [`Customer`] by their id
	#[instrument(skip(conn))]
	pub async fn get_by_id(c_id: i32, conn: &DbConn) -> Result<Self, Error> {
		let customer = conn
			.interact(move |conn| {
				use self::customer::dsl::*;

				customer.find(c_id).select(Self::as_select()).get_result(conn)
			})
			.await??;

		Ok(customer)
	}

	/// Re-read a customer row and lock it until the transaction ends
	pub fn lock(c_id: i32, conn: &mut PgConnection) -> QueryResult<Self> {
		use self::customer::dsl::*;

		customer
			.find(c_id)
			.select(Self::as_select())
			.for_update()
			.get_result(conn)
	}

	/// Whether `today` is this customer's birthday
	///
	/// Birthdays on the 29th of february are celebrated on the 28th in
	/// non-leap years
	#[must_use]
	pub fn has_birthday_on(&self, today: NaiveDate) -> bool {
		let Some(birthday) = self.birthday else {
			return false;
		};

		if birthday.month() == today.month() && birthday.day() == today.day() {
			return true;
		}

		birthday.month() == 2
			&& birthday.day() == 29
			&& today.month() == 2
			&& today.day() == 28
			&& NaiveDate::from_ymd_opt(today.year(), 2, 29).is_none()
	}

	/// Add `amount` points, returning the new balance
	pub fn credit(
		c_id: i32,
		amount: i32,
		conn: &mut PgConnection,
	) -> QueryResult<i32> {
		use self::customer::dsl::*;

		diesel::update(customer.find(c_id))
			.set((points.eq(points + amount), updated_at.eq(diesel::dsl::now)))
			.returning(points)
			.get_result(conn)
	}

	/// Take `amount` points if the balance covers it, returning the new
	/// balance or `None` if it does not
	pub fn debit(
		c_id: i32,
		amount: i32,
		conn: &mut PgConnection,
	) -> QueryResult<Option<i32>> {
		use self::customer::dsl::*;

		diesel::update(customer.filter(id.eq(c_id)).filter(points.ge(amount)))
			.set((points.eq(points - amount), updated_at.eq(diesel::dsl::now)))
			.returning(points)
			.get_result(conn)
			.optional()
	}
}

#[derive(Clone, Debug, Deserialize, Insertable, Serialize)]
#[diesel(table_name = customer)]
#[diesel(check_for_backend(Pg))]
pub struct NewCustomer {
	pub email:    String,
	pub name:     String,
	pub birthday: Option<NaiveDate>,
}

impl NewCustomer {
	/// Insert this [`NewCustomer`] with an opening balance
	///
	/// A non-zero balance is recorded as a manual ledger entry so the
	/// balance always equals the ledger sum
	#[instrument(skip(conn))]
	pub async fn insert(
		mut self,
		opening_balance: i32,
		conn: &DbConn,
	) -> Result<Customer, Error> {
		self.email = self.email.trim().to_lowercase();

		let customer = conn
			.interact(move |conn| {
				conn.transaction::<_, diesel::result::Error, _>(|conn| {
					let created: Customer = diesel::insert_into(customer::table)
						.values(self)
						.returning(Customer::as_returning())
						.get_result(conn)?;

					if opening_balance == 0 {
						return Ok(created);
					}

					NewPointLedgerEntry {
						customer_id:    created.id,
						kind:           PointKind::Manual,
						amount:         opening_balance,
						year:           None,
						description:    "opening balance".to_string(),
						reservation_id: None,
					}
					.insert(conn)?;

					let points = Customer::credit(created.id, opening_balance, conn)?;

					Ok(Customer { points, ..created })
				})
			})
			.await??;

		info!("created customer {}", customer.id);

		Ok(customer)
	}
}

#[derive(
	Clone, Debug, Deserialize, Identifiable, Queryable, Selectable, Serialize,
)]
#[diesel(table_name = point_ledger)]
#[diesel(check_for_backend(Pg))]
pub struct PointLedgerEntry {
	pub id:             i32,
	pub customer_id:    i32,
	pub kind:           PointKind,
	pub amount:         i32,
	pub year:           Option<i32>,
	pub description:    String,
	pub reservation_id: Option<i32>,
	pub created_at:     NaiveDateTime,
}

impl PointLedgerEntry {
	/// Get the full ledger of a customer, oldest first
	#[instrument(skip(conn))]
	pub async fn for_customer(
		c_id: i32,
		conn: &DbConn,
	) -> Result<Vec<Self>, Error> {
		let entries = conn
			.interact(move |conn| {
				use self::point_ledger::dsl::*;

				point_ledger
					.filter(customer_id.eq(c_id))
					.order(id.asc())
					.select(Self::as_select())
					.get_results(conn)
			})
			.await??;

		Ok(entries)
	}
}

#[derive(Clone, Debug, Deserialize, Insertable, Serialize)]
#[diesel(table_name = point_ledger)]
#[diesel(check_for_backend(Pg))]
pub struct NewPointLedgerEntry {
	pub customer_id:    i32,
	pub kind:           PointKind,
	pub amount:         i32,
	pub year:           Option<i32>,
	pub description:    String,
	pub reservation_id: Option<i32>,
}

impl NewPointLedgerEntry {
	/// Append this entry to the ledger
	pub fn insert(self, conn: &mut PgConnection) -> QueryResult<PointLedgerEntry> {
		diesel::insert_into(point_ledger::table)
			.values(self)
			.returning(PointLedgerEntry::as_returning())
			.get_result(conn)
	}

	/// Append this entry unless a unique index already holds an equivalent
	/// one, returns whether a row was written
	pub fn insert_once(self, conn: &mut PgConnection) -> QueryResult<bool> {
		let inserted = diesel::insert_into(point_ledger::table)
			.values(self)
			.on_conflict_do_nothing()
			.execute(conn)?;

		Ok(inserted == 1)
	}
}
