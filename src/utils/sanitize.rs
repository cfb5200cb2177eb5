use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// Keys whose values never reach the logs, compared case-insensitively.
const SENSITIVE_KEYS: &[&str] = &[
    "authorization",
    "authorization_code",
    "authorization_url",
    "access_code",
    "card",
    "card_type",
    "bin",
    "last4",
    "exp_month",
    "exp_year",
    "cvv",
    "pin",
    "signature",
    "bank",
    "account_name",
    "account_number",
    "receiver_bank_account_number",
    "secret",
    "secret_key",
    "token",
    "password",
    "x-paystack-signature",
];

/// Redacts sensitive fields in gateway payloads before logging. Walks nested
/// objects and arrays.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

/// Redacted rendering of a raw body. Non-JSON bodies are summarized by size.
pub fn sanitize_body(raw: &[u8]) -> String {
    match serde_json::from_slice::<Value>(raw) {
        Ok(json) => sanitize_json(&json).to_string(),
        Err(_) => format!("[non-json, {} bytes]", raw.len()),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&key.as_str())
}
