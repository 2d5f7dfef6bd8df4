/*!
    Opaque encoder settings.
*/

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/**
    Per-stream encoder settings as an open key/value map.

    The reversal pipeline never interprets these; they are handed to the
    writer untouched. Each backend documents the keys it understands and
    forwards the rest to its encoder.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncoderSettings(BTreeMap<String, String>);

impl EncoderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Builder-style insert.
    */
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /**
        Look up `key` and parse it, ignoring values that do not parse.
    */
    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for EncoderSettings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = Self::new();
        for (k, v) in iter {
            settings.insert(k, v);
        }
        settings
    }
}
