use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::controllers::healthcheck;
use crate::controllers::reservation::create_reservation;
use crate::controllers::settings::{get_settings, patch_settings, replace_settings};
use crate::controllers::slots::get_slots;

/// Get the app router
pub fn get_app_router(state: AppState) -> Router {
	let api_routes = Router::new()
		.route("/healthcheck", get(healthcheck))
		.nest("/slots", slot_routes())
		.nest("/reservations", reservation_routes())
		.nest("/settings", settings_routes());

	Router::new()
		.merge(api_routes)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(TimeoutLayer::new(Duration::from_secs(10)))
				.layer(CompressionLayer::new()),
		)
		.with_state(state)
}

/// Slot availability routes
fn slot_routes() -> Router<AppState> {
	Router::new().route("/{date}", get(get_slots))
}

/// Reservation routes
fn reservation_routes() -> Router<AppState> {
	Router::new().route("/", post(create_reservation))
}

/// Admin settings routes
fn settings_routes() -> Router<AppState> {
	Router::new().route(
		"/",
		get(get_settings).put(replace_settings).patch(patch_settings),
	)
}
