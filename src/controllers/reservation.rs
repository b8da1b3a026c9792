//! Controllers for [`Reservation`](reservation::Reservation)s

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::Error;
use serde_json::Value;

use crate::schemas::reservation::CreateReservationRequest;
use crate::{AppState, booking};

/// Create a new reservation
#[instrument(skip_all)]
pub(crate) async fn create_reservation(
	State(state): State<AppState>,
	Json(body): Json<Value>,
) -> Result<impl IntoResponse, Error> {
	let request: CreateReservationRequest = serde_json::from_value(body)
		.map_err(|e| Error::invalid_field("body", e.to_string()))?;

	let request = request.into_booking()?;

	let created = booking::create_reservation(&state, request).await?;

	Ok((StatusCode::CREATED, Json(created)))
}
