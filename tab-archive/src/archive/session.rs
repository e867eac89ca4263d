//! Session-state codec
//!
//! The archive treats a tab's serialized navigation state as an opaque blob.
//! The few things it needs from the blob (the current entry's URL and title,
//! and a privacy-scrubbed copy for backups) go through the `SessionCodec`
//! trait, so the storage layer never depends on the host's format.

use serde_json::{Map, Value};

use crate::error::{ArchiveError, Result};

/// Fields that can carry typed form input; dropped from exported state
const PRIVATE_FIELDS: [&str; 2] = ["text", "postdata"];

/// Narrow contract over the host's session-state format
pub trait SessionCodec: Send + Sync {
    /// URL of the current navigation entry
    fn current_url(&self, blob: &str) -> Option<String>;

    /// Title of the current navigation entry, if the host recorded one
    fn current_title(&self, blob: &str) -> Option<String>;

    /// Strip typed text and post data and keep only the current entry
    fn scrub_private_fields(&self, blob: &str) -> Result<String>;

    /// Smallest valid state that navigates to `url`
    fn minimal(&self, url: &str, title: &str) -> String;
}

/// Codec for the host's JSON tab state:
/// `{"entries": [{"url", "title", "text", "postdata", "children": [..]}], "index": n}`
///
/// `index` is 1-based and defaults to the last entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSessionCodec;

impl JsonSessionCodec {
    fn parse(blob: &str) -> Result<Map<String, Value>> {
        match serde_json::from_str::<Value>(blob)? {
            Value::Object(map) => Ok(map),
            _ => Err(ArchiveError::Session(
                "tab state is not a JSON object".to_string(),
            )),
        }
    }

    /// Zero-based position of the current entry
    fn current_index(state: &Map<String, Value>) -> Option<usize> {
        let len = state.get("entries")?.as_array()?.len();
        if len == 0 {
            return None;
        }

        let index = match state.get("index").and_then(Value::as_u64) {
            Some(i) if i >= 1 => i as usize,
            _ => len,
        };

        Some(index.min(len) - 1)
    }

    fn current_entry(blob: &str) -> Option<Map<String, Value>> {
        let state = Self::parse(blob).ok()?;
        let index = Self::current_index(&state)?;
        match state.get("entries")?.as_array()?.get(index)? {
            Value::Object(entry) => Some(entry.clone()),
            _ => None,
        }
    }

    fn strip_private(entry: &mut Map<String, Value>) {
        for field in PRIVATE_FIELDS {
            entry.remove(field);
        }
    }
}

impl SessionCodec for JsonSessionCodec {
    fn current_url(&self, blob: &str) -> Option<String> {
        Self::current_entry(blob)?
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
    }

    fn current_title(&self, blob: &str) -> Option<String> {
        Self::current_entry(blob)?
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
    }

    fn scrub_private_fields(&self, blob: &str) -> Result<String> {
        let mut state = Self::parse(blob)?;
        let index = Self::current_index(&state)
            .ok_or_else(|| ArchiveError::Session("tab state has no entries".to_string()))?;

        let mut entry = match state.get("entries").and_then(|e| e.get(index)) {
            Some(Value::Object(entry)) => entry.clone(),
            _ => {
                return Err(ArchiveError::Session(
                    "current entry is not an object".to_string(),
                ))
            }
        };

        Self::strip_private(&mut entry);
        if let Some(Value::Array(children)) = entry.get_mut("children") {
            for child in children.iter_mut() {
                if let Value::Object(child) = child {
                    Self::strip_private(child);
                }
            }
        }

        state.insert("entries".to_string(), Value::Array(vec![Value::Object(entry)]));
        state.insert("index".to_string(), Value::from(1));

        Ok(serde_json::to_string(&Value::Object(state))?)
    }

    fn minimal(&self, url: &str, title: &str) -> String {
        serde_json::json!({
            "entries": [{ "url": url, "title": title }],
            "index": 1,
        })
        .to_string()
    }
}

/// Remove a trailing `#fragment`; archive keys ignore in-page anchors
pub fn strip_fragment(url: &str) -> &str {
    match url.find('#') {
        Some(pos) => &url[..pos],
        None => url,
    }
}

/// Normalize CR and CRLF line endings to LF
pub fn normalize_line_endings(blob: &str) -> String {
    if !blob.contains('\r') {
        return blob.to_string();
    }
    blob.replace("\r\n", "\n").replace('\r', "\n")
}
