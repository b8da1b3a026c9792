use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};

#[derive(
	Clone, Copy, DbEnum, Debug, Default, Deserialize, PartialEq, Eq, Serialize,
)]
#[ExistingTypePath = "crate::sql_types::ReservationStatus"]
#[serde(rename_all = "camelCase")]
pub enum ReservationStatus {
	#[default]
	Pending,
	Confirmed,
	Completed,
	Cancelled,
}

#[derive(
	Clone, Copy, DbEnum, Debug, Deserialize, PartialEq, Eq, Serialize,
)]
#[ExistingTypePath = "crate::sql_types::PointKind"]
#[serde(rename_all = "camelCase")]
pub enum PointKind {
	Birthday,
	Use,
	Manual,
	Earn,
}
