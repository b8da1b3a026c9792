//! Weekly schedule configuration and the slots derived from it

#[macro_use]
extern crate tracing;

use serde::{Deserialize, Serialize};

mod normalize;
mod settings;
mod slots;
mod time;
mod validate;

pub use normalize::normalize;
pub use settings::*;
pub use slots::*;
pub use time::*;
pub use validate::*;

/// A single rejected field, identified by its dotted path
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct FieldError {
	pub field:   String,
	pub message: String,
}

impl FieldError {
	#[must_use]
	pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
		Self { field: field.into(), message: message.into() }
	}
}
