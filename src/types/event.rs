//! The cached resource: a list of events.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A single event as delivered by a data source.
///
/// `id`, `name` and `date` are the fields the cache reasons about; the
/// unordered multi-valued fields (`tags`, `categories`, `links`) are
/// normalised before hashing. Any other upstream field is kept verbatim in
/// `extra` so nothing is lost on a round trip through the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    pub fn new(id: impl Into<String>, name: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            date: date.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_links<I, S>(mut self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.links = links.into_iter().map(Into::into).collect();
        self
    }

    /// Attach an arbitrary upstream field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Whether the event carries a non-blank id, name and date.
    pub fn is_well_formed(&self) -> bool {
        !self.id.trim().is_empty() && !self.name.trim().is_empty() && !self.date.trim().is_empty()
    }
}

/// Accept strings, numbers and null where a string is expected.
///
/// Spreadsheet-backed upstreams happily emit numeric ids.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string, found {other}"
        ))),
    }
}

/// Where the currently held data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceTag {
    /// The primary upstream.
    Remote,
    /// A local file or the synthetic bootstrap record.
    Local,
    /// The secondary store.
    Store,
    /// Previously cached data served past its TTL.
    Cached,
}

impl DataSourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceTag::Remote => "remote",
            DataSourceTag::Local => "local",
            DataSourceTag::Store => "store",
            DataSourceTag::Cached => "cached",
        }
    }
}

impl fmt::Display for DataSourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_are_accepted() {
        let event: Event =
            serde_json::from_str(r#"{"id": 42, "name": "Jam", "date": "2025-06-21"}"#).unwrap();
        assert_eq!(event.id, "42");
        assert!(event.is_well_formed());
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let json = r#"{"id":"a","name":"Jam","date":"2025-06-21","venue":{"city":"Oslo"}}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.extra["venue"]["city"], "Oslo");
        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["venue"]["city"], "Oslo");
    }

    #[test]
    fn null_and_missing_fields_are_blank() {
        let event: Event = serde_json::from_str(r#"{"id": null, "name": "x"}"#).unwrap();
        assert!(event.id.is_empty());
        assert!(event.date.is_empty());
        assert!(!event.is_well_formed());
    }

    #[test]
    fn whitespace_only_is_not_well_formed() {
        assert!(!Event::new("a", "  ", "2025-01-01").is_well_formed());
    }

    #[test]
    fn source_tag_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DataSourceTag::Store).unwrap(),
            "\"store\""
        );
        assert_eq!(DataSourceTag::Cached.to_string(), "cached");
    }
}
