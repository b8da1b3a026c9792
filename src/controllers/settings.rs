//! Controllers for the reservation settings

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use common::Error;
use diesel::Connection;
use schedule::{normalize, validate};
use serde_json::Value;

use crate::audit::{self, AuditAction, AuditContext};
use crate::schemas::settings::SettingsPatch;
use crate::{AppState, availability};

/// Get the current normalized settings
#[instrument(skip(state))]
pub(crate) async fn get_settings(
	State(state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
	let settings = availability::current_settings(&state).await?;

	Ok(Json(settings))
}

/// Replace the settings with a new document
///
/// The document is normalized first and rejected if the result is not a
/// consistent schedule
#[instrument(skip(state, body))]
pub(crate) async fn replace_settings(
	State(state): State<AppState>,
	context: AuditContext,
	Json(body): Json<Value>,
) -> Result<impl IntoResponse, Error> {
	let replacement = normalize(Some(&body));

	let report = validate(&replacement);
	if !report.ok {
		return Err(Error::ValidationFailed(report.errors));
	}

	let conn = state.database_pool.get().await?;

	let after = replacement.clone();
	let before = conn
		.interact(move |conn| {
			conn.transaction::<_, Error, _>(|conn| {
				let before = settings::load_for_update(conn)?;
				settings::store(&after, conn)?;

				Ok(before)
			})
		})
		.await??;

	info!("replaced reservation settings");

	availability::invalidate_settings(&state.cache).await;

	audit::record(
		state.database_pool.clone(),
		context,
		AuditAction::Replace,
		&before,
		&replacement,
	);

	Ok(Json(replacement))
}

/// Apply a narrow action to the settings
///
/// Only blocking dates and clearing blocked dates or overrides are allowed,
/// the rest of the stored document is carried over unchecked
#[instrument(skip(state, body))]
pub(crate) async fn patch_settings(
	State(state): State<AppState>,
	context: AuditContext,
	Json(body): Json<Value>,
) -> Result<impl IntoResponse, Error> {
	let patch = SettingsPatch::from_body(body)?;

	let conn = state.database_pool.get().await?;

	let (before, after, action) = conn
		.interact(move |conn| {
			conn.transaction::<_, Error, _>(|conn| {
				let before = settings::load_for_update(conn)?;

				let mut after = before.clone();
				let action = patch.apply(&mut after);

				settings::store(&after, conn)?;

				Ok((before, after, action))
			})
		})
		.await??;

	info!("patched reservation settings with {}", action.as_str());

	availability::invalidate_settings(&state.cache).await;

	audit::record(state.database_pool.clone(), context, action, &before, &after);

	Ok(Json(after))
}
