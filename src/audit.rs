//! Who changed the settings and from where

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::{DbPool, Error};
use schedule::ReservationSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use settings::{NewSettingsAudit, diff};
use tokio::task::JoinHandle;

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const ANONYMOUS_ACTOR: &str = "anonymous";

/// Request metadata stored alongside every settings change
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
	pub method:        String,
	pub path:          String,
	pub user_agent:    Option<String>,
	pub forwarded_for: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AuditContext {
	pub actor: String,
	pub meta:  RequestMeta,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
	headers
		.get(name)
		.and_then(|v| v.to_str().ok())
		.map(str::trim)
		.filter(|v| !v.is_empty())
		.map(ToString::to_string)
}

impl<S: Send + Sync> FromRequestParts<S> for AuditContext {
	type Rejection = Infallible;

	async fn from_request_parts(
		parts: &mut Parts,
		_state: &S,
	) -> Result<Self, Self::Rejection> {
		let actor = header(&parts.headers, ACTOR_HEADER)
			.unwrap_or_else(|| ANONYMOUS_ACTOR.to_string());

		let meta = RequestMeta {
			method:        parts.method.to_string(),
			path:          parts.uri.path().to_string(),
			user_agent:    header(&parts.headers, "user-agent"),
			forwarded_for: header(&parts.headers, "x-forwarded-for"),
		};

		Ok(Self { actor, meta })
	}
}

/// The kind of change a settings mutation made
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditAction {
	Replace,
	BlockDate,
	UnblockDate,
	ClearBlockedDates,
	ClearDateOverrides,
	/// More than one narrow action in a single request
	Patch,
}

impl AuditAction {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Replace => "replace",
			Self::BlockDate => "blockDate",
			Self::UnblockDate => "unblockDate",
			Self::ClearBlockedDates => "clearBlockedDates",
			Self::ClearDateOverrides => "clearDateOverrides",
			Self::Patch => "patch",
		}
	}
}

fn build_event(
	context: AuditContext,
	action: AuditAction,
	before: &ReservationSettings,
	after: &ReservationSettings,
) -> Result<NewSettingsAudit, Error> {
	let before = before.sanitize_for_write()?;
	let after = after.sanitize_for_write()?;
	let changes = serde_json::to_value(diff(&before, &after))?;

	Ok(NewSettingsAudit {
		actor: context.actor,
		action: action.as_str().to_string(),
		before,
		after,
		diff: changes,
		request_meta: serde_json::to_value(context.meta)?,
	})
}

/// Record a settings change without holding up the request
///
/// Failures are logged and otherwise ignored
pub fn record(
	pool: DbPool,
	context: AuditContext,
	action: AuditAction,
	before: &ReservationSettings,
	after: &ReservationSettings,
) -> JoinHandle<()> {
	let event = build_event(context, action, before, after);

	tokio::spawn(async move {
		let result: Result<_, Error> = async {
			let conn = pool.get().await?;
			let event = event?.insert(&conn).await?;

			Ok(event)
		}
		.await;

		if let Err(e) = result {
			error!("could not record settings audit event -- {e}");
		}
	})
}
