use axum::http::{HeaderName, HeaderValue, StatusCode};
use chrono::Weekday;
use schedule::{DaySlots, ReservationSettings, SlotSource};
use serde_json::{Value, json};

mod common;

use common::TestEnv;

/// Settings whose monday closes before it opens
fn inconsistent_settings() -> ReservationSettings {
	let mut settings = ReservationSettings::default();
	settings.business_hours[1].open = "18:00".parse().unwrap();
	settings.business_hours[1].close = "09:00".parse().unwrap();

	settings
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a postgres server at DATABASE_URL"]
async fn defaults_are_served_before_anything_is_stored() {
	let env = TestEnv::new().await;

	let response = env.app.get("/settings").await;
	assert_eq!(response.status_code(), StatusCode::OK);

	assert_eq!(response.json::<ReservationSettings>(), ReservationSettings::default());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a postgres server at DATABASE_URL"]
async fn replace_normalizes_and_audits() {
	let env = TestEnv::new().await;

	let response = env
		.app
		.put("/settings")
		.add_header(
			HeaderName::from_static("x-actor-id"),
			HeaderValue::from_static("owner"),
		)
		.add_header(
			HeaderName::from_static("user-agent"),
			HeaderValue::from_static("settings-test"),
		)
		.json(&json!({
			"slotDuration": "90",
			"maxCapacityPerSlot": 2,
			"businessHours": { "monday": { "isOpen": true, "open": "10:00", "close": "19:00", "maxCapacityPerDay": 2 } },
			"temporaryField": true,
		}))
		.await;

	assert_eq!(response.status_code(), StatusCode::OK);

	let stored = response.json::<ReservationSettings>();
	assert_eq!(stored.slot_duration, 90);
	assert_eq!(stored.max_capacity_per_slot, 2);

	let served = env.app.get("/settings").await.json::<Value>();
	assert_eq!(served["slotDuration"], 90);
	assert!(served.get("temporaryField").is_none());

	let events = env.wait_for_audit_events(1).await;
	assert_eq!(events[0].actor, "owner");
	assert_eq!(events[0].action, "replace");
	assert_eq!(events[0].request_meta["method"], "PUT");
	assert_eq!(events[0].request_meta["userAgent"], "settings-test");

	let paths: Vec<&str> = events[0]
		.diff
		.as_array()
		.unwrap()
		.iter()
		.filter_map(|c| c["path"].as_str())
		.collect();
	assert!(paths.contains(&"slotDuration"));
	assert!(paths.contains(&"maxCapacityPerSlot"));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a postgres server at DATABASE_URL"]
async fn replace_rejects_inconsistent_hours() {
	let env = TestEnv::new().await;

	let response = env
		.app
		.put("/settings")
		.json(&serde_json::to_value(inconsistent_settings()).unwrap())
		.await;

	assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

	let body = response.json::<Value>();
	assert_eq!(body["kind"], "validation_failed");
	assert_eq!(body["info"]["fields"][0]["field"], "businessHours.1.close");

	let served = env.app.get("/settings").await.json::<ReservationSettings>();
	assert_eq!(served, ReservationSettings::default());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a postgres server at DATABASE_URL"]
async fn blocking_a_date_works_on_an_inconsistent_base() {
	let env = TestEnv::new().await;

	env.store_settings(inconsistent_settings()).await;

	let tuesday = env.upcoming(Weekday::Tue);

	// Cached before the patch, must be dropped by it
	let open = env.app.get(&format!("/slots/{tuesday}")).await.json::<DaySlots>();
	assert_eq!(open.source, SlotSource::Single);

	let response = env
		.app
		.patch("/settings")
		.json(&json!({ "blockedDate": tuesday.to_string(), "block": true }))
		.await;

	assert_eq!(response.status_code(), StatusCode::OK);

	let stored = response.json::<ReservationSettings>();
	assert!(stored.blocked_dates.contains(&tuesday));
	assert_eq!(stored.business_hours[1], inconsistent_settings().business_hours[1]);

	let blocked = env.app.get(&format!("/slots/{tuesday}")).await.json::<DaySlots>();
	assert_eq!(blocked.source, SlotSource::Blocked);
	assert!(blocked.grids.is_empty());

	let events = env.wait_for_audit_events(1).await;
	assert_eq!(events[0].actor, "anonymous");
	assert_eq!(events[0].action, "blockDate");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a postgres server at DATABASE_URL"]
async fn patch_rejects_unrecognized_keys() {
	let env = TestEnv::new().await;

	let response = env
		.app
		.patch("/settings")
		.json(&json!({ "clearBlockedDates": true, "slotDuration": 30 }))
		.await;

	assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
	assert_eq!(response.json::<Value>()["info"]["fields"][0]["field"], "slotDuration");

	let response = env.app.patch("/settings").json(&json!({})).await;
	assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a postgres server at DATABASE_URL"]
async fn clearing_overrides_and_blocked_dates() {
	let env = TestEnv::new().await;

	let mut settings = ReservationSettings::default();
	let monday = env.upcoming(Weekday::Mon);
	settings.blocked_dates.insert(monday);
	settings.date_overrides.insert(
		env.upcoming(Weekday::Sun),
		schedule::DateOverride { allowed_slots: ["11:00".parse::<schedule::SlotTime>().unwrap()].into() },
	);
	env.store_settings(settings).await;

	let response = env
		.app
		.patch("/settings")
		.json(&json!({ "clearBlockedDates": true, "clearDateOverrides": true }))
		.await;

	assert_eq!(response.status_code(), StatusCode::OK);

	let stored = response.json::<ReservationSettings>();
	assert!(stored.blocked_dates.is_empty());
	assert!(stored.date_overrides.is_empty());

	let events = env.wait_for_audit_events(1).await;
	assert_eq!(events[0].action, "patch");
}
