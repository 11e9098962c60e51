//! Secret-free renderings of requests for the log.

use std::collections::BTreeMap;

use serde_json::Value;
use url::form_urlencoded;

const REDACTED: &str = "[redacted]";
const MAX_LOGGED_BODY: usize = 2048;

const SECRET_HEADERS: &[&str] = &[
  "authorization",
  "proxy-authorization",
  "cookie",
  "set-cookie",
  "x-api-key",
  "x-auth-token",
];

const SECRET_FIELDS: &[&str] = &[
  "password",
  "token",
  "access_token",
  "refresh_token",
  "secret",
  "client_secret",
];

fn is_secret_field(name: &str) -> bool {
  let name = name.to_ascii_lowercase();
  SECRET_FIELDS.contains(&name.as_str())
}

pub(crate) fn headers(headers: &BTreeMap<String, String>) -> String {
  headers
    .iter()
    .map(|(name, value)| {
      if SECRET_HEADERS.contains(&name.as_str()) {
        format!("{}: {}", name, REDACTED)
      } else {
        format!("{}: {}", name, value)
      }
    })
    .collect::<Vec<_>>()
    .join(", ")
}

/// JSON and form bodies get secret fields masked; anything else is only
/// described by its size.
pub(crate) fn body(body: &[u8]) -> String {
  if let Ok(mut value) = serde_json::from_slice::<Value>(body) {
    mask(&mut value);
    return truncate(value.to_string());
  }

  match std::str::from_utf8(body) {
    Ok(text) if text.contains('=') && !text.contains(char::is_whitespace) => {
      let mut form = form_urlencoded::Serializer::new(String::new());
      for (name, value) in form_urlencoded::parse(text.as_bytes()) {
        if is_secret_field(&name) {
          form.append_pair(&name, REDACTED);
        } else {
          form.append_pair(&name, &value);
        }
      }
      truncate(form.finish())
    }
    _ => format!("<{} bytes>", body.len()),
  }
}

fn mask(value: &mut Value) {
  match value {
    Value::Object(fields) => {
      for (name, field) in fields.iter_mut() {
        if is_secret_field(name) {
          *field = Value::String(REDACTED.to_string());
        } else {
          mask(field);
        }
      }
    }
    Value::Array(items) => items.iter_mut().for_each(mask),
    _ => {}
  }
}

fn truncate(mut text: String) -> String {
  if text.len() > MAX_LOGGED_BODY {
    let mut end = MAX_LOGGED_BODY;
    while !text.is_char_boundary(end) {
      end -= 1;
    }
    text.truncate(end);
    text.push_str("…");
  }
  text
}
