//! Structured body encoding.

// self
use crate::{_prelude::*, client::http::BodyMap, error::ConfigError};

/// JSON body type.
pub const JSON: &str = "application/json";
/// URL-encoded form body type.
pub const FORM: &str = "application/x-www-form-urlencoded";

/// Encodes `body` according to `body_type` (compared case-insensitively).
///
/// A missing body yields empty bytes and an empty content type. Form bodies are emitted in
/// key order with scalar values rendered as text.
pub fn prepare_body(body: Option<&BodyMap>, body_type: &str) -> Result<(Vec<u8>, String)> {
	let Some(body) = body else { return Ok((Vec::new(), String::new())) };
	let body_type = body_type.trim();

	if body_type.eq_ignore_ascii_case(JSON) {
		let bytes = serde_json::to_vec(body).map_err(ConfigError::from)?;

		Ok((bytes, JSON.into()))
	} else if body_type.eq_ignore_ascii_case(FORM) {
		let mut pairs: Vec<_> = body.iter().collect();

		pairs.sort_by(|a, b| a.0.cmp(b.0));

		let mut form = url::form_urlencoded::Serializer::new(String::new());

		for (key, value) in pairs {
			form.append_pair(key, &form_value(value));
		}

		Ok((form.finish().into_bytes(), FORM.into()))
	} else {
		Err(ConfigError::UnsupportedBodyType { body_type: body_type.into() }.into())
	}
}

fn form_value(value: &serde_json::Value) -> String {
	match value {
		serde_json::Value::String(s) => s.clone(),
		serde_json::Value::Null => String::new(),
		other => other.to_string(),
	}
}
