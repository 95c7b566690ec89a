use std::collections::BTreeMap;

use crate::error::{GroupStreamError, GroupStreamResult};

const NAME_MAX_LENGTH: usize = 255;

/// A validated, ordered bag of header-style key/value pairs carried alongside
/// a message's payload (trace context, routing hints, retry counters, ...).
///
/// Keys must be non-empty, at most 255 bytes, and made up only of
/// `[A-Za-z0-9_-]`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MessageState {
    values: BTreeMap<String, String>,
}

impl MessageState {
    pub fn new() -> Self {
        MessageState::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Remove `name`, returning its prior value if any.
    pub fn del(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    /// Set `name` to `value`. Setting `None` on an absent key is a no-op;
    /// setting `None` on an existing key deletes it and returns the old value.
    pub fn set(&mut self, name: &str, value: Option<String>) -> GroupStreamResult<Option<String>> {
        validate_name(name)?;
        match value {
            None => Ok(self.values.remove(name)),
            Some(new_value) => {
                if self.values.get(name) == Some(&new_value) {
                    return Ok(Some(new_value));
                }
                Ok(self.values.insert(name.to_string(), new_value))
            }
        }
    }

    pub fn set_string(&mut self, name: &str, value: impl Into<String>) -> GroupStreamResult<()> {
        self.set(name, Some(value.into())).map(|_| ())
    }

    /// Visit every `(name, value)` pair in key order.
    pub fn visit(&self, mut f: impl FnMut(&str, &str)) {
        for (name, value) in &self.values {
            f(name, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn validate_name(name: &str) -> GroupStreamResult<()> {
    if name.is_empty() {
        return Err(GroupStreamError::lifecycle("header name must not be empty"));
    }
    if name.len() > NAME_MAX_LENGTH {
        return Err(GroupStreamError::lifecycle(format!(
            "header name exceeds {NAME_MAX_LENGTH} bytes: {name}"
        )));
    }
    if !name.chars().all(is_valid_name_char) {
        return Err(GroupStreamError::lifecycle(format!(
            "header name contains an invalid character: {name}"
        )));
    }
    Ok(())
}

fn is_valid_name_char(c: char) -> bool {
    c == '_' || c == '-' || c.is_ascii_alphanumeric()
}

/// Adapts a [`MessageState`] to the `get`/`set`/`keys` shape of
/// `opentelemetry::propagation::{Extractor, Injector}`, without this crate
/// taking the `opentelemetry` dependency. A downstream crate that already
/// depends on it can implement those traits for `MessageStateCarrier` in one
/// line.
pub struct MessageStateCarrier<'m> {
    state: &'m mut MessageState,
}

impl<'m> MessageStateCarrier<'m> {
    pub fn new(state: &'m mut MessageState) -> Self {
        MessageStateCarrier { state }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.state.value(key)
    }

    pub fn set(&mut self, key: &str, value: String) {
        // Trace-context keys are propagator-generated and already conform to
        // the header-name grammar; a validation failure here would silently
        // drop trace context, so fall back to dropping the header instead.
        let _ = self.state.set(key, Some(value));
    }

    pub fn keys(&self) -> Vec<&str> {
        self.state.values.keys().map(String::as_str).collect()
    }
}
