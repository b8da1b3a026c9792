//! Persistence of the single reservation settings document and its audit
//! trail

#[macro_use]
extern crate tracing;

use chrono::NaiveDateTime;
use common::{DbConn, Error};
use db::{reservation_settings, settings_audit};
use diesel::pg::Pg;
use diesel::prelude::*;
use schedule::{ReservationSettings, normalize};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod diff;

pub use diff::{FieldChange, diff};

/// Id of the only row in `reservation_settings`
const SETTINGS_ROW: i32 = 1;

/// Read the stored document, missing rows yield `None`
fn read_raw(
	for_update: bool,
	conn: &mut PgConnection,
) -> QueryResult<Option<Value>> {
	use self::reservation_settings::dsl::*;

	let query = reservation_settings.find(SETTINGS_ROW).select(data);

	if for_update {
		query.for_update().first(conn).optional()
	} else {
		query.first(conn).optional()
	}
}

/// Load and normalize the current settings
pub fn load(conn: &mut PgConnection) -> QueryResult<ReservationSettings> {
	Ok(normalize(read_raw(false, conn)?.as_ref()))
}

/// Load and normalize the current settings while holding a row lock until
/// the surrounding transaction ends
///
/// The row is created from the defaults first if it does not exist yet, so
/// concurrent writers always serialize on it
pub fn load_for_update(
	conn: &mut PgConnection,
) -> Result<ReservationSettings, Error> {
	use self::reservation_settings::dsl::*;

	let defaults = ReservationSettings::default().sanitize_for_write()?;

	diesel::insert_into(reservation_settings)
		.values((id.eq(SETTINGS_ROW), data.eq(defaults)))
		.on_conflict_do_nothing()
		.execute(conn)?;

	Ok(normalize(read_raw(true, conn)?.as_ref()))
}

/// Sanitize and store `settings`, replacing the current document
pub fn store(
	settings: &ReservationSettings,
	conn: &mut PgConnection,
) -> Result<(), Error> {
	use self::reservation_settings::dsl::*;

	let document = settings.sanitize_for_write()?;

	diesel::insert_into(reservation_settings)
		.values((id.eq(SETTINGS_ROW), data.eq(&document)))
		.on_conflict(id)
		.do_update()
		.set((data.eq(&document), updated_at.eq(diesel::dsl::now)))
		.execute(conn)?;

	Ok(())
}

/// Get the current settings, falling back to the defaults when nothing has
/// been stored yet
#[instrument(skip(conn))]
pub async fn get(conn: &DbConn) -> Result<ReservationSettings, Error> {
	let settings = conn.interact(load).await??;

	Ok(settings)
}

#[derive(Clone, Debug, Deserialize, Queryable, Selectable, Serialize)]
#[diesel(table_name = settings_audit)]
#[diesel(check_for_backend(Pg))]
#[serde(rename_all = "camelCase")]
pub struct SettingsAudit {
	pub id:           i32,
	pub actor:        String,
	pub action:       String,
	pub before:       Value,
	pub after:        Value,
	pub diff:         Value,
	pub request_meta: Value,
	pub created_at:   NaiveDateTime,
}

impl SettingsAudit {
	/// Get the most recent audit events, newest first
	#[instrument(skip(conn))]
	pub async fn recent(limit: i64, conn: &DbConn) -> Result<Vec<Self>, Error> {
		let events = conn
			.interact(move |conn| {
				use self::settings_audit::dsl::*;

				settings_audit
					.order(id.desc())
					.limit(limit)
					.select(Self::as_select())
					.get_results(conn)
			})
			.await??;

		Ok(events)
	}
}

#[derive(Clone, Debug, Deserialize, Insertable, Serialize)]
#[diesel(table_name = settings_audit)]
#[diesel(check_for_backend(Pg))]
pub struct NewSettingsAudit {
	pub actor:        String,
	pub action:       String,
	pub before:       Value,
	pub after:        Value,
	pub diff:         Value,
	pub request_meta: Value,
}

impl NewSettingsAudit {
	/// Insert this [`NewSettingsAudit`]
	#[instrument(skip(self, conn))]
	pub async fn insert(self, conn: &DbConn) -> Result<SettingsAudit, Error> {
		let event = conn
			.interact(|conn| {
				diesel::insert_into(settings_audit::table)
					.values(self)
					.returning(SettingsAudit::as_returning())
					.get_result(conn)
			})
			.await??;

		debug!("recorded settings audit event {}", event.id);

		Ok(event)
	}
}
