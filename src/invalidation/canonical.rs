//! Order-independent fingerprints of event sets.
//!
//! Two event lists that differ only in the order of the events, or in the
//! order of values inside `tags`, `categories` or `links`, hash identically.
//! `extra` needs no treatment: `serde_json::Map` keeps its keys sorted.

use std::collections::HashMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::Event;

/// Outcome of [`detect_changes()`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeDetectionResult {
    pub has_changes: bool,
    pub count_changed: bool,
    pub added_names: Vec<String>,
    pub removed_names: Vec<String>,
    pub modified_names: Vec<String>,
}

impl ChangeDetectionResult {
    /// One-line human summary, e.g. `"2 added, 1 modified"`.
    pub fn summary(&self) -> String {
        if !self.has_changes {
            return "no changes".to_string();
        }
        let parts: Vec<String> = [
            (self.added_names.len(), "added"),
            (self.removed_names.len(), "removed"),
            (self.modified_names.len(), "modified"),
        ]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, label)| format!("{n} {label}"))
        .collect();
        if parts.is_empty() {
            "event count changed".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Copy of `event` with every unordered multi-valued field sorted.
pub fn canonicalize(event: &Event) -> Event {
    let mut canonical = event.clone();
    canonical.tags.sort();
    canonical.categories.sort();
    canonical.links.sort();
    canonical
}

/// SHA-256 hex digest of one canonicalized event.
pub fn event_hash(event: &Event) -> String {
    digest(&canonical_bytes(event))
}

/// SHA-256 hex digest of a whole event set.
pub fn hash(events: &[Event]) -> String {
    let mut encoded: Vec<(&str, Vec<u8>)> = events
        .iter()
        .map(|e| (e.id.as_str(), canonical_bytes(e)))
        .collect();
    // Ties on id fall back to content so duplicate ids still sort deterministically.
    encoded.sort();

    let mut hasher = Sha256::new();
    hasher.update(b"[");
    for (i, (_, bytes)) in encoded.iter().enumerate() {
        if i > 0 {
            hasher.update(b",");
        }
        hasher.update(bytes);
    }
    hasher.update(b"]");
    hex::encode(hasher.finalize())
}

/// Diff two event sets by id.
pub fn detect_changes(old: &[Event], new: &[Event]) -> ChangeDetectionResult {
    let old_by_id: HashMap<&str, &Event> = old.iter().map(|e| (e.id.as_str(), e)).collect();
    let new_by_id: HashMap<&str, &Event> = new.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut result = ChangeDetectionResult {
        count_changed: old.len() != new.len(),
        ..Default::default()
    };

    for event in new {
        match old_by_id.get(event.id.as_str()) {
            None => push_unique(&mut result.added_names, display_name(event)),
            Some(previous) if event_hash(previous) != event_hash(event) => {
                push_unique(&mut result.modified_names, display_name(event))
            }
            Some(_) => {}
        }
    }
    for event in old {
        if !new_by_id.contains_key(event.id.as_str()) {
            push_unique(&mut result.removed_names, display_name(event));
        }
    }

    result.has_changes = result.count_changed
        || !result.added_names.is_empty()
        || !result.removed_names.is_empty()
        || !result.modified_names.is_empty();
    result
}

fn canonical_bytes(event: &Event) -> Vec<u8> {
    serde_json::to_vec(&canonicalize(event)).unwrap_or_default()
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn display_name(event: &Event) -> String {
    if event.name.trim().is_empty() {
        event.id.clone()
    } else {
        event.name.clone()
    }
}

fn push_unique(names: &mut Vec<String>, name: String) {
    if !names.contains(&name) {
        names.push(name);
    }
}
