//! Library-wide error types and [`From`] impls

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use diesel::result::DatabaseErrorKind;
use schedule::{FieldError, SlotTime};
use thiserror::Error;
use tokio::sync::mpsc;

/// Top level application error, can be converted into a [`Response`]
#[derive(Debug, Error)]
pub enum Error {
	/// One or more fields of the request were rejected
	#[error("the request contains invalid fields")]
	ValidationFailed(Vec<FieldError>),
	/// The requested slot was taken before the booking could commit
	#[error("the slot at {time} on {date} is no longer available")]
	SlotUnavailable { date: NaiveDate, time: SlotTime },
	/// The customer tried to spend more points than they own
	#[error("insufficient points, {available} available but {requested} requested")]
	InsufficientPoints { available: i32, requested: i32 },
	/// The database could not be reached
	#[error("service unavailable")]
	BackendUnavailable(String),
	/// Resource not found
	#[error("not found - {0}")]
	NotFound(String),
	/// Opaque internal server error
	#[error("internal server error")]
	Unknown,
}

impl Error {
	/// Build a [`Error::ValidationFailed`] for a single field
	#[must_use]
	pub fn invalid_field(
		field: impl Into<String>,
		message: impl Into<String>,
	) -> Self {
		Self::ValidationFailed(vec![FieldError::new(field, message)])
	}

	/// Stable machine-readable kind of this error
	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Self::ValidationFailed(_) => "validation_failed",
			Self::SlotUnavailable { .. } => "slot_unavailable",
			Self::InsufficientPoints { .. } => "insufficient_points",
			Self::BackendUnavailable(_) => "backend_unavailable",
			Self::NotFound(_) => "not_found",
			Self::Unknown => "unknown",
		}
	}

	/// Return a unique identifying code for this error
	///
	/// Codes are never reused once assigned, the frontend relies on them
	fn code(&self) -> i32 {
		match self {
			Self::ValidationFailed(_) => 1,
			Self::SlotUnavailable { .. } => 2,
			Self::InsufficientPoints { .. } => 3,
			Self::BackendUnavailable(_) => 4,
			Self::NotFound(_) => 5,
			Self::Unknown => 6,
		}
	}

	/// Return additional information about the error
	fn info(&self) -> Option<serde_json::Value> {
		match self {
			Self::ValidationFailed(errors) => {
				Some(serde_json::json!({ "fields": errors }))
			},
			Self::SlotUnavailable { date, time } => {
				Some(serde_json::json!({ "date": date, "time": time }))
			},
			Self::InsufficientPoints { available, requested } => {
				Some(serde_json::json!({
					"available": available,
					"requested": requested,
				}))
			},
			Self::NotFound(m) => Some(serde_json::json!({ "detail": m })),
			Self::BackendUnavailable(_) | Self::Unknown => None,
		}
	}

	#[must_use]
	pub fn status_code(&self) -> StatusCode {
		match self {
			Self::ValidationFailed(_) | Self::InsufficientPoints { .. } => {
				StatusCode::BAD_REQUEST
			},
			Self::SlotUnavailable { .. } => StatusCode::CONFLICT,
			Self::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
			Self::NotFound(_) => StatusCode::NOT_FOUND,
			Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

/// Convert an error into a [`Response`]
impl IntoResponse for Error {
	fn into_response(self) -> Response {
		match &self {
			Self::BackendUnavailable(reason) => {
				warn!("backend unavailable -- {reason}");
			},
			Self::Unknown => error!("{self:?}"),
			_ => debug!("{self:?}"),
		}

		let data = serde_json::json!({
			"kind": self.kind(),
			"code": self.code(),
			"message": self.to_string(),
			"info": self.info(),
		});

		(self.status_code(), axum::Json(data)).into_response()
	}
}

/// A list of possible internal errors
///
/// API end users should never see these details
#[derive(Debug, Error)]
pub enum InternalServerError {
	/// Error executing some database operation
	#[error("database error -- {0:?}")]
	DatabaseError(diesel::result::Error),
	/// Error interacting with a database connection
	#[error("database interaction error -- {0:?}")]
	DatabaseInteractionError(deadpool_diesel::InteractError),
	/// Malformed email
	#[error("invalid email -- {0:?}")]
	InvalidEmail(lettre::address::AddressError),
	/// Mailer stopped unexpectedly
	#[error("mailer stopped -- {0:?}")]
	MailerStopped(mpsc::error::SendError<lettre::Message>),
	/// Generic mailer error
	#[error("mail error -- {0:?}")]
	MailError(lettre::error::Error),
	/// Error rendering a template
	#[error("template error -- {0:?}")]
	TemplateError(askama::Error),
	/// Error related to `serde_json`
	#[error("serde_json error -- {0:?}")]
	SerdeJsonError(serde_json::Error),
}

// Map internal server errors to application errors
impl From<InternalServerError> for Error {
	fn from(value: InternalServerError) -> Self {
		error!("internal server error -- {value}");

		Self::Unknown
	}
}

/// Convert a `snake_case` field name to the `camelCase` used on the wire
fn camel_case(field: &str) -> String {
	let mut out = String::with_capacity(field.len());
	let mut upper = false;

	for c in field.chars() {
		if c == '_' {
			upper = !out.is_empty();
		} else if upper {
			out.extend(c.to_uppercase());
			upper = false;
		} else {
			out.push(c);
		}
	}

	out
}

/// Flatten validator errors into a sorted list of field errors
#[must_use]
pub fn field_errors(err: &validator::ValidationErrors) -> Vec<FieldError> {
	let mut fields: Vec<FieldError> = err
		.field_errors()
		.into_iter()
		.flat_map(|(field, errs)| {
			let field = camel_case(&field);

			errs.iter()
				.map(move |e| FieldError::new(field.clone(), e.to_string()))
		})
		.collect();

	fields.sort_by(|a, b| a.field.cmp(&b.field));

	fields
}

/// Map validation errors to application errors
impl From<validator::ValidationErrors> for Error {
	fn from(err: validator::ValidationErrors) -> Self {
		Self::ValidationFailed(field_errors(&err))
	}
}

/// Map database interaction errors to application errors
impl From<deadpool_diesel::InteractError> for Error {
	fn from(value: deadpool_diesel::InteractError) -> Self {
		InternalServerError::DatabaseInteractionError(value).into()
	}
}

/// Map database result errors to application errors
impl From<diesel::result::Error> for Error {
	fn from(err: diesel::result::Error) -> Self {
		match &err {
			// No rows returned by query that expected at least one
			diesel::result::Error::NotFound => {
				Self::NotFound("no context provided".to_string())
			},
			// The connection dropped mid-request
			diesel::result::Error::DatabaseError(
				DatabaseErrorKind::ClosedConnection,
				info,
			) => Self::BackendUnavailable(info.message().to_string()),
			diesel::result::Error::DatabaseError(
				DatabaseErrorKind::UnableToSendCommand,
				info,
			) => Self::BackendUnavailable(info.message().to_string()),
			_ => InternalServerError::DatabaseError(err).into(),
		}
	}
}

/// A pool that cannot hand out connections means the database is down or
/// was never configured
impl From<deadpool_diesel::PoolError> for Error {
	fn from(value: deadpool_diesel::PoolError) -> Self {
		Self::BackendUnavailable(value.to_string())
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		InternalServerError::SerdeJsonError(err).into()
	}
}

impl From<askama::Error> for Error {
	fn from(err: askama::Error) -> Self {
		InternalServerError::TemplateError(err).into()
	}
}

impl From<lettre::address::AddressError> for Error {
	fn from(err: lettre::address::AddressError) -> Self {
		InternalServerError::InvalidEmail(err).into()
	}
}

impl From<mpsc::error::SendError<lettre::Message>> for Error {
	fn from(err: mpsc::error::SendError<lettre::Message>) -> Self {
		InternalServerError::MailerStopped(err).into()
	}
}

impl From<lettre::error::Error> for Error {
	fn from(err: lettre::error::Error) -> Self {
		InternalServerError::MailError(err).into()
	}
}
