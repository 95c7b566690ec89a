use std::collections::BTreeMap;

use serde_json::Value;

use crate::message_state::MessageState;

/// Default prefix used to distinguish header fields from payload fields when
/// both are flattened into a single stream entry.
pub const DEFAULT_HEADER_KEY_PREFIX: &str = "header:";

/// Headers plus payload for a single message, as sent to or received from the
/// broker. The broker itself only knows a flat field→value map of UTF-8
/// strings; `values` uses `serde_json::Value` so application code can build
/// and read structured payloads, with string/number/bool round-tripping
/// happening at `write_to`/`decode` time.
#[derive(Debug, Default, Clone)]
pub struct MessageContent {
    pub state: MessageState,
    pub values: BTreeMap<String, Value>,
}

impl MessageContent {
    pub fn new() -> Self {
        MessageContent::default()
    }

    /// Flatten `self` into `container`, using `prefix` to mark header keys.
    pub fn write_to(&self, container: &mut BTreeMap<String, String>, prefix: &str) {
        self.state.visit(|name, value| {
            container.insert(format!("{prefix}{name}"), value.to_string());
        });
        for (name, value) in &self.values {
            container.insert(name.clone(), encode_value(value));
        }
    }

    /// Split a flat field map back into headers and payload. Returns `None`
    /// if `container` is `None` ("nothing to decode").
    pub fn decode(
        container: Option<&BTreeMap<String, String>>,
        prefix: &str,
    ) -> Option<MessageContent> {
        let container = container?;
        let mut content = MessageContent::new();
        for (key, value) in container {
            match key.strip_prefix(prefix) {
                Some(header_name) => {
                    // Header names arriving off the wire are trusted as already
                    // valid; a malformed one is dropped rather than failing decode.
                    let _ = content.state.set(header_name, Some(value.clone()));
                }
                None => {
                    content.values.insert(key.clone(), decode_value(value));
                }
            }
        }
        Some(content)
    }
}

/// Marks a wire value as JSON-encoded rather than a plain passthrough string.
/// Without this, a string payload that happens to look like JSON (`"42"`,
/// `"true"`, `"null"`) would decode back as a number/bool/null instead of the
/// string it started as.
const JSON_VALUE_MARKER: &str = "json:";

/// A plain string is written as-is (not JSON-quoted), so a non-Rust consumer
/// reading the stream directly sees a readable value; anything else is
/// JSON-serialized behind [`JSON_VALUE_MARKER`] so numbers/bools/objects
/// survive the trip through a broker field, which only stores byte strings.
fn encode_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => format!("{JSON_VALUE_MARKER}{other}"),
    }
}

/// Inverse of [`encode_value`]: only values carrying [`JSON_VALUE_MARKER`] are
/// parsed as JSON; everything else is a plain string, verbatim.
fn decode_value(wire: &str) -> Value {
    match wire.strip_prefix(JSON_VALUE_MARKER) {
        Some(json) => serde_json::from_str(json).unwrap_or_else(|_| Value::String(wire.to_string())),
        None => Value::String(wire.to_string()),
    }
}
