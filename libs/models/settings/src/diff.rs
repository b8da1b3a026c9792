use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single changed leaf between two settings documents
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FieldChange {
	pub path:   String,
	pub before: Option<Value>,
	pub after:  Option<Value>,
}

/// List the changed paths between two JSON documents
///
/// Objects are compared key by key, anything else (arrays included) is
/// compared as a whole
#[must_use]
pub fn diff(before: &Value, after: &Value) -> Vec<FieldChange> {
	let mut changes = vec![];

	walk("", Some(before), Some(after), &mut changes);

	changes
}

fn join(prefix: &str, key: &str) -> String {
	if prefix.is_empty() { key.to_string() } else { format!("{prefix}.{key}") }
}

fn walk(
	path: &str,
	before: Option<&Value>,
	after: Option<&Value>,
	changes: &mut Vec<FieldChange>,
) {
	match (before, after) {
		(Some(Value::Object(b)), Some(Value::Object(a))) => {
			let mut keys: Vec<&String> = b.keys().chain(a.keys()).collect();
			keys.sort();
			keys.dedup();

			for key in keys {
				walk(&join(path, key), b.get(key), a.get(key), changes);
			}
		},
		(b, a) if b == a => {},
		(b, a) => {
			changes.push(FieldChange {
				path:   path.to_string(),
				before: b.cloned(),
				after:  a.cloned(),
			});
		},
	}
}
