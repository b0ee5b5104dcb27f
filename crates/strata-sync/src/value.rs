// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Dynamically typed SQLite values and result rows.

use std::cmp::Ordering;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// A value as SQLite stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
	Null,
	Integer(i64),
	Real(#[serde(with = "real")] f64),
	Text(String),
	Blob(Vec<u8>),
}

/// JSON has no NaN or infinities, so those travel as strings.
mod real {
	use serde::{Deserialize, Deserializer, Serializer};

	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Repr {
		Number(f64),
		Special(String),
	}

	pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
		if value.is_nan() {
			serializer.serialize_str("NaN")
		} else if value.is_infinite() && value.is_sign_positive() {
			serializer.serialize_str("Infinity")
		} else if value.is_infinite() {
			serializer.serialize_str("-Infinity")
		} else {
			serializer.serialize_f64(*value)
		}
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
		match Repr::deserialize(deserializer)? {
			Repr::Number(n) => Ok(n),
			Repr::Special(s) => match s.as_str() {
				"NaN" => Ok(f64::NAN),
				"Infinity" => Ok(f64::INFINITY),
				"-Infinity" => Ok(f64::NEG_INFINITY),
				other => Err(serde::de::Error::custom(format!(
					"expected a number, NaN or an infinity, got {other:?}"
				))),
			},
		}
	}
}

impl Value {
	fn storage_class(&self) -> u8 {
		match self {
			Value::Null => 0,
			Value::Integer(_) | Value::Real(_) => 1,
			Value::Text(_) => 2,
			Value::Blob(_) => 3,
		}
	}

	/// Compares two values the way SQLite orders them: NULL first, then
	/// numbers by value, then text, then blobs, both bytewise.
	pub fn sqlite_cmp(&self, other: &Value) -> Ordering {
		match (self, other) {
			(Value::Integer(a), Value::Integer(b)) => a.cmp(b),
			(Value::Integer(a), Value::Real(b)) => cmp_f64(*a as f64, *b),
			(Value::Real(a), Value::Integer(b)) => cmp_f64(*a, *b as f64),
			(Value::Real(a), Value::Real(b)) => cmp_f64(*a, *b),
			(Value::Text(a), Value::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
			(Value::Blob(a), Value::Blob(b)) => a.cmp(b),
			_ => self.storage_class().cmp(&other.storage_class()),
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Value::Integer(i) => Some(*i),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Text(s) => Some(s),
			_ => None,
		}
	}

	/// JSON rendering for display. Blobs become base64 strings.
	pub fn to_json(&self) -> serde_json::Value {
		match self {
			Value::Null => serde_json::Value::Null,
			Value::Integer(i) => serde_json::Value::from(*i),
			Value::Real(f) => serde_json::Number::from_f64(*f)
				.map(serde_json::Value::Number)
				.unwrap_or(serde_json::Value::Null),
			Value::Text(s) => serde_json::Value::String(s.clone()),
			Value::Blob(b) => serde_json::Value::String(STANDARD.encode(b)),
		}
	}
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
	a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Integer(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Value::Integer(v.into())
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Integer(v.into())
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Real(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::Text(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::Text(v)
	}
}

impl From<Vec<u8>> for Value {
	fn from(v: Vec<u8>) -> Self {
		Value::Blob(v)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(v: Option<T>) -> Self {
		v.map(Into::into).unwrap_or(Value::Null)
	}
}

/// One result row. Column names are shared by every row of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
	columns: Arc<[String]>,
	values: Vec<Value>,
}

impl Row {
	pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
		debug_assert_eq!(columns.len(), values.len());
		Self { columns, values }
	}

	pub fn columns(&self) -> &[String] {
		&self.columns
	}

	pub fn values(&self) -> &[Value] {
		&self.values
	}

	pub fn into_values(self) -> Vec<Value> {
		self.values
	}

	/// Case-insensitive lookup by column name, as SQLite resolves names.
	pub fn get(&self, column: &str) -> Option<&Value> {
		self.columns
			.iter()
			.position(|c| c.eq_ignore_ascii_case(column))
			.and_then(|i| self.values.get(i))
	}

	pub fn get_index(&self, index: usize) -> Option<&Value> {
		self.values.get(index)
	}

	pub fn to_json(&self) -> serde_json::Value {
		let map = self
			.columns
			.iter()
			.zip(&self.values)
			.map(|(c, v)| (c.clone(), v.to_json()))
			.collect();
		serde_json::Value::Object(map)
	}
}

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
	pub rows_affected: u64,
	pub last_insert_rowid: i64,
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn arb_value() -> impl Strategy<Value = Value> {
		prop_oneof![
			Just(Value::Null),
			(-1_000_000_000_000i64..1_000_000_000_000).prop_map(Value::Integer),
			(-1.0e12f64..1.0e12).prop_map(Value::Real),
			"[a-z0-9:-]{0,12}".prop_map(Value::Text),
			proptest::collection::vec(any::<u8>(), 0..8).prop_map(Value::Blob),
		]
	}

	#[test]
	fn storage_classes_are_ordered() {
		let ordered = [
			Value::Null,
			Value::Integer(i64::MAX),
			Value::Text(String::new()),
			Value::Blob(vec![]),
		];
		for pair in ordered.windows(2) {
			assert_eq!(pair[0].sqlite_cmp(&pair[1]), Ordering::Less);
		}
	}

	#[test]
	fn integers_and_reals_compare_numerically() {
		assert_eq!(
			Value::Integer(2).sqlite_cmp(&Value::Real(1.5)),
			Ordering::Greater
		);
		assert_eq!(
			Value::Real(2.0).sqlite_cmp(&Value::Integer(2)),
			Ordering::Equal
		);
	}

	#[test]
	fn iso_timestamps_compare_as_text() {
		let older = Value::from("2024-01-01T00:00:00Z");
		let newer = Value::from("2024-06-01T00:00:00Z");
		assert_eq!(newer.sqlite_cmp(&older), Ordering::Greater);
	}

	#[test]
	fn row_lookup_ignores_case() {
		let columns: Arc<[String]> = vec!["id".to_string(), "Body".to_string()].into();
		let row = Row::new(columns, vec![Value::Integer(1), Value::from("hello")]);

		assert_eq!(row.get("body"), Some(&Value::from("hello")));
		assert_eq!(row.get("missing"), None);
		assert_eq!(row.get_index(0), Some(&Value::Integer(1)));
	}

	#[test]
	fn json_rendering() {
		let columns: Arc<[String]> = vec!["n".to_string(), "b".to_string()].into();
		let row = Row::new(columns, vec![Value::Null, Value::Blob(b"hi".to_vec())]);
		assert_eq!(row.to_json(), serde_json::json!({"n": null, "b": "aGk="}));
	}

	#[test]
	fn serde_is_tagged() {
		let json = serde_json::to_string(&Value::Integer(5)).unwrap();
		assert_eq!(json, r#"{"type":"integer","value":5}"#);
		let back: Value = serde_json::from_str(&json).unwrap();
		assert_eq!(back, Value::Integer(5));
	}

	#[test]
	fn non_finite_reals_survive_serde() {
		let values = vec![
			Value::Real(f64::INFINITY),
			Value::Real(f64::NEG_INFINITY),
			Value::Real(2.5),
		];
		let json = serde_json::to_string(&values).unwrap();
		assert!(json.contains(r#"{"type":"real","value":"Infinity"}"#));
		let back: Vec<Value> = serde_json::from_str(&json).unwrap();
		assert_eq!(back, values);

		let json = serde_json::to_string(&Value::Real(f64::NAN)).unwrap();
		assert_eq!(json, r#"{"type":"real","value":"NaN"}"#);
		match serde_json::from_str::<Value>(&json).unwrap() {
			Value::Real(f) => assert!(f.is_nan()),
			other => panic!("expected real, got {other:?}"),
		}

		assert!(serde_json::from_str::<Value>(r#"{"type":"real","value":"lots"}"#).is_err());
	}

	#[test]
	fn option_conversion() {
		assert_eq!(Value::from(None::<i64>), Value::Null);
		assert_eq!(Value::from(Some("x")), Value::from("x"));
	}

	proptest! {
		#[test]
		fn ordering_is_antisymmetric(a in arb_value(), b in arb_value()) {
			prop_assert_eq!(a.sqlite_cmp(&b), b.sqlite_cmp(&a).reverse());
		}

		#[test]
		fn ordering_is_transitive(a in arb_value(), b in arb_value(), c in arb_value()) {
			if a.sqlite_cmp(&b) != Ordering::Greater && b.sqlite_cmp(&c) != Ordering::Greater {
				prop_assert_ne!(a.sqlite_cmp(&c), Ordering::Greater);
			}
		}

		#[test]
		fn ordering_is_reflexive(a in arb_value()) {
			prop_assert_eq!(a.sqlite_cmp(&a), Ordering::Equal);
		}
	}
}
