use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use cache::CacheConfig;
use chrono::{FixedOffset, NaiveDateTime, Utc};
use common::DbPool;
use deadpool_diesel::postgres::{Manager, Pool};
use lettre::Address;
use tracing::Level;

use crate::mailer::StubMailbox;

#[derive(Clone, Debug)]
pub struct Config {
	pub database_url: String,

	pub redis_url:             Option<String>,
	pub cache_key_prefix:      String,
	pub cache_memory_capacity: usize,
	pub cache_compress_bytes:  usize,
	pub cache_sweep_interval:  Duration,
	pub slot_cache_ttl:        Duration,
	pub settings_cache_ttl:    Duration,

	pub birthday_bonus_points: i32,
	pub business_utc_offset:   FixedOffset,

	pub email_smtp_server:    String,
	pub email_address:        Address,
	pub email_smtp_password:  String,
	pub email_queue_size:     usize,
	pub operator_email:       Option<Address>,
	pub notification_timeout: Duration,

	pub log_level:    Level,
	pub bind_address: String,
}

impl Config {
	fn get_env_var(var: &str) -> String {
		std::env::var(var).unwrap_or_else(|_| panic!("{var} must be set"))
	}

	fn get_optional_env_var(var: &str) -> Option<String> {
		std::env::var(var).ok().filter(|v| !v.trim().is_empty())
	}

	fn get_env_var_or<T>(var: &str, default: T) -> T
	where
		T: FromStr,
		T::Err: std::fmt::Debug,
	{
		Self::get_optional_env_var(var).map_or(default, |v| {
			v.trim()
				.parse::<T>()
				.unwrap_or_else(|e| panic!("{var} is invalid -- {e:?}"))
		})
	}

	/// Create a new [`Config`] from environment variables
	///
	/// # Panics
	/// Panics if a required environment variable is missing or any variable
	/// cannot be parsed
	#[must_use]
	pub fn from_env() -> Self {
		let database_url = Self::get_env_var("DATABASE_URL");

		let redis_url = Self::get_optional_env_var("REDIS_URL");
		let cache_key_prefix =
			Self::get_env_var_or("CACHE_KEY_PREFIX", "salon:".to_string());
		let cache_memory_capacity =
			Self::get_env_var_or("CACHE_MEMORY_CAPACITY", 1024);
		let cache_compress_bytes =
			Self::get_env_var_or("CACHE_COMPRESS_THRESHOLD", 1024);
		let cache_sweep_interval = Duration::from_secs(
			Self::get_env_var_or("CACHE_SWEEP_INTERVAL_SECONDS", 60_u64).max(1),
		);
		let slot_cache_ttl =
			Duration::from_secs(Self::get_env_var_or("SLOT_CACHE_TTL_SECONDS", 300));
		let settings_cache_ttl = Duration::from_secs(Self::get_env_var_or(
			"SETTINGS_CACHE_TTL_SECONDS",
			600,
		));

		let birthday_bonus_points =
			Self::get_env_var_or("BIRTHDAY_BONUS_POINTS", 1000);
		let offset_minutes: i32 =
			Self::get_env_var_or("BUSINESS_UTC_OFFSET_MINUTES", 0);
		let business_utc_offset = FixedOffset::east_opt(offset_minutes * 60)
			.unwrap_or_else(|| {
				panic!("BUSINESS_UTC_OFFSET_MINUTES is out of range")
			});

		let email_smtp_server =
			Self::get_env_var_or("EMAIL_SMTP_SERVER", "stub".to_string());
		let email_address = Self::get_env_var_or(
			"EMAIL_ADDRESS",
			Address::new("noreply", "localhost")
				.unwrap_or_else(|e| panic!("invalid default address -- {e}")),
		);
		let email_smtp_password =
			Self::get_optional_env_var("EMAIL_SMTP_PASSWORD").unwrap_or_default();
		let email_queue_size = Self::get_env_var_or("EMAIL_QUEUE_SIZE", 64);
		let operator_email = Self::get_optional_env_var("OPERATOR_EMAIL").map(|v| {
			v.trim()
				.parse::<Address>()
				.unwrap_or_else(|e| panic!("OPERATOR_EMAIL is invalid -- {e}"))
		});
		let notification_timeout = Duration::from_millis(Self::get_env_var_or(
			"NOTIFICATION_TIMEOUT_MS",
			3000,
		));

		let log_level = Self::get_env_var_or("LOG_LEVEL", Level::DEBUG);
		let bind_address =
			Self::get_env_var_or("BIND_ADDRESS", "0.0.0.0:80".to_string());

		Self {
			database_url,
			redis_url,
			cache_key_prefix,
			cache_memory_capacity,
			cache_compress_bytes,
			cache_sweep_interval,
			slot_cache_ttl,
			settings_cache_ttl,
			birthday_bonus_points,
			business_utc_offset,
			email_smtp_server,
			email_address,
			email_smtp_password,
			email_queue_size,
			operator_email,
			notification_timeout,
			log_level,
			bind_address,
		}
	}

	/// Create a database pool for the given config
	///
	/// # Panics
	/// Panics if creating the pool fails
	#[must_use]
	pub fn create_database_pool(&self) -> DbPool {
		let manager = Manager::new(
			self.database_url.to_string(),
			deadpool_diesel::Runtime::Tokio1,
		);

		Pool::builder(manager).build().unwrap()
	}

	/// Settings for the two-tier cache
	#[must_use]
	pub fn cache_config(&self) -> CacheConfig {
		CacheConfig {
			redis_url: self.redis_url.clone(),
			key_prefix: self.cache_key_prefix.clone(),
			memory_capacity: self.cache_memory_capacity,
			compress_threshold: self.cache_compress_bytes,
			..CacheConfig::default()
		}
	}

	/// Create a stub mailbox if mails are not delivered over SMTP
	#[must_use]
	pub fn create_stub_mailbox(&self) -> Option<Arc<StubMailbox>> {
		if self.email_smtp_server == "stub" {
			Some(Arc::new(StubMailbox::default()))
		} else {
			None
		}
	}

	/// The current wall-clock time in the business timezone
	#[must_use]
	pub fn business_now(&self) -> NaiveDateTime {
		Utc::now().with_timezone(&self.business_utc_offset).naive_local()
	}
}
