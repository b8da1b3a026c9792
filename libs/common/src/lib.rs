#[macro_use]
extern crate tracing;

use deadpool_diesel::postgres::{Object, Pool};

mod error;

pub use error::*;
pub use schedule::FieldError;

/// An entire database pool
pub type DbPool = Pool;

/// A single database connection
pub type DbConn = Object;
