//! Small helpers for walking `serde_json::Value` trees with readable parse errors.

use serde_json::Value;

use crate::Error::Parse;

pub(crate) fn field<'v>(v: &'v Value, name: &str) -> crate::Result<&'v Value> {
	v.get(name).ok_or_else(|| Parse(format!("JSON has no {} field", name)))
}

pub(crate) fn str_field<'v>(v: &'v Value, name: &str) -> crate::Result<&'v str> {
	field(v, name)?.as_str().ok_or_else(|| Parse(format!("{} must be a string", name)))
}

pub(crate) fn u64_field(v: &Value, name: &str) -> crate::Result<u64> {
	field(v, name)?.as_u64().ok_or_else(|| Parse(format!("{} must be an unsigned integer", name)))
}

pub(crate) fn array_field<'v>(v: &'v Value, name: &str) -> crate::Result<&'v Vec<Value>> {
	field(v, name)?.as_array().ok_or_else(|| Parse(format!("{} must be an array", name)))
}

/// A non-empty string field, `None` when absent, null or empty.
pub(crate) fn opt_str_field<'v>(v: &'v Value, name: &str) -> Option<&'v str> {
	v.get(name).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

/// Turns an error response into the service's own message when it carries one.
///
/// Store services answer failures with `{"message": "..."}`, sometimes nested under `Product`.
pub(crate) fn error_message(body: &str) -> Option<String> {
	let json = serde_json::from_str::<Value>(body).ok()?;
	json.get("message")
		.or_else(|| json.get("Product").and_then(|p| p.get("message")))
		.and_then(|m| m.as_str())
		.map(|m| m.to_string())
}

/// Parses a store JSON response, mapping failures to [`crate::Error::Catalog`] or
/// [`crate::Error::Transport`].
pub(crate) fn parse_store_response(response: crate::transport::TransportResponse, url: &str) -> crate::Result<Value> {
	if !response.is_success() {
		if let Some(message) = error_message(&response.body) {
			return Err(crate::Error::Catalog(message));
		}
	}
	let response = response.error_for_status(url)?;
	Ok(serde_json::from_str::<Value>(&response.body)?)
}
