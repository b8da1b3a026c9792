//! Request and response bodies of the HTTP surface

pub mod reservation;
pub mod settings;
