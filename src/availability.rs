//! Cached read path for settings and per-date slots
//!
//! Slots are cached under `slots:{date}` and carry two tags: `slots`, dropped
//! whenever the settings change, and `slots:{date}`, dropped whenever a
//! booking for that date commits

use std::collections::{HashMap, HashSet};

use cache::{Cache, SetOptions};
use chrono::NaiveDate;
use common::Error;
use reservation::Reservation;
use schedule::{DaySlots, ReservationSettings, compute_slots};

use crate::AppState;

pub const SETTINGS_KEY: &str = "settings";
pub const SLOTS_TAG: &str = "slots";

#[must_use]
pub fn slots_key(date: NaiveDate) -> String { format!("slots:{date}") }

/// Get the normalized settings, from cache if possible
///
/// # Errors
/// Fails if the settings have to be loaded and the database is unreachable
pub async fn current_settings(
	state: &AppState,
) -> Result<ReservationSettings, Error> {
	let pool = state.database_pool.clone();

	state
		.cache
		.memoize(
			SETTINGS_KEY,
			state.config.settings_cache_ttl,
			SetOptions::default(),
			|| async move {
				let conn = pool.get().await?;

				settings::get(&conn).await
			},
		)
		.await
}

/// Get the slots of `date` including their current availability
///
/// # Errors
/// Fails if the slots have to be computed and the database is unreachable
#[instrument(skip(state))]
pub async fn day_slots(
	state: &AppState,
	date: NaiveDate,
) -> Result<DaySlots, Error> {
	let key = slots_key(date);

	// Settings are read inside the loader so a settings change racing this
	// load also discards the computed slots
	state
		.cache
		.memoize(
			&key,
			state.config.slot_cache_ttl,
			SetOptions::tagged([SLOTS_TAG, key.as_str()]),
			|| async move {
				let settings = current_settings(state).await?;
				let conn = state.database_pool.get().await?;
				let counts = Reservation::booked_counts(date, &conn).await?;

				Ok::<_, Error>(compute_slots(&settings, date, &HashSet::new(), &counts))
			},
		)
		.await
}

/// Candidate slots of `date` ignoring existing bookings
#[must_use]
pub fn candidate_slots(settings: &ReservationSettings, date: NaiveDate) -> DaySlots {
	compute_slots(settings, date, &HashSet::new(), &HashMap::new())
}

/// Drop cached slots of a single date
pub async fn invalidate_date(cache: &Cache, date: NaiveDate) {
	let dropped = cache.invalidate_by_tag(&slots_key(date)).await;

	debug!("invalidated {dropped} cached slot entries for {date}");
}

/// Drop the cached settings and every cached slot list derived from them
pub async fn invalidate_settings(cache: &Cache) {
	cache.delete(SETTINGS_KEY).await;

	let dropped = cache.invalidate_by_tag(SLOTS_TAG).await;

	debug!("invalidated settings and {dropped} cached slot entries");
}
