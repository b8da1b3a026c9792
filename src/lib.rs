//! # Salon booking backend library

#[macro_use]
extern crate tracing;

use axum::extract::FromRef;
use cache::Cache;
use common::DbPool;
use mailer::Mailer;

mod config;

pub mod audit;
pub mod availability;
pub mod booking;
pub mod controllers;
pub mod mailer;
pub mod routes;
pub mod schemas;

pub use config::*;

/// Common state of the app
#[derive(Clone)]
pub struct AppState {
	pub config:        Config,
	pub database_pool: DbPool,
	pub cache:         Cache,
	pub mailer:        Mailer,
}

impl FromRef<AppState> for Config {
	fn from_ref(input: &AppState) -> Self { input.config.clone() }
}

impl FromRef<AppState> for DbPool {
	fn from_ref(input: &AppState) -> Self { input.database_pool.clone() }
}

impl FromRef<AppState> for Cache {
	fn from_ref(input: &AppState) -> Self { input.cache.clone() }
}

impl FromRef<AppState> for Mailer {
	fn from_ref(input: &AppState) -> Self { input.mailer.clone() }
}
