#[macro_use]
extern crate tracing;

use cache::Cache;
use salon_booking::mailer::Mailer;
use salon_booking::{AppState, Config, routes};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::signal::unix::SignalKind;

#[tokio::main]
async fn main() {
	// Load the configuration from the environment first, it decides how
	// verbose logging is.
	let config = Config::from_env();

	tracing_subscriber::fmt()
		.pretty()
		.with_thread_names(true)
		.with_max_level(config.log_level)
		.init();

	let database_pool = config.create_database_pool();

	let cache = Cache::connect(config.cache_config()).await;
	let _sweeper = cache.spawn_sweeper(config.cache_sweep_interval);

	let stub_mailbox = config.create_stub_mailbox();
	let mailer = Mailer::new(&config, stub_mailbox);

	let listener = TcpListener::bind(&config.bind_address).await.unwrap();

	// Create the app router.
	let router =
		routes::get_app_router(AppState { config, database_pool, cache, mailer });

	// Start the server.
	debug!("listening on {}", listener.local_addr().unwrap());
	axum::serve(listener, router)
		.with_graceful_shutdown(shutdown_handler())
		.await
		.unwrap();
}

/// Gracefully shutdown the server on SIGINT or SIGTERM.
async fn shutdown_handler() {
	let ctrl_c = async {
		signal::ctrl_c().await.expect("COULD NOT INSTALL CTRL+C HANDLER");
	};

	let terminate = async {
		signal::unix::signal(SignalKind::terminate())
			.expect("COULD NOT INSTALL TERMINATE SIGNAL HANDLER")
			.recv()
			.await;
	};

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}
}
