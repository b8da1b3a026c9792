//! Controllers for the slots of a single date

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use chrono::NaiveDate;
use common::Error;

use crate::{AppState, availability};

/// Get every candidate slot of a date with its current availability
#[instrument(skip(state))]
pub(crate) async fn get_slots(
	State(state): State<AppState>,
	Path(date): Path<String>,
) -> Result<impl IntoResponse, Error> {
	let date = date
		.parse::<NaiveDate>()
		.map_err(|_| Error::invalid_field("date", "must be a YYYY-MM-DD date"))?;

	let slots = availability::day_slots(&state, date).await?;

	Ok(Json(slots))
}
