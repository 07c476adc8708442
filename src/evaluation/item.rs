// src/evaluation/item.rs

//! Items as seen by the engine.
//!
//! [`ProjectItem`] is the evaluated, in-memory form carried by the lookup.
//! [`TaskItem`] is the plain value handed to tasks, stored in target results
//! and sent over the wire.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`ProjectItem`].
///
/// Removes and metadata modifications recorded in lookup scopes refer to
/// items by id, so a copy of an item that is re-added elsewhere is a
/// different item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    pub fn next() -> Self {
        ItemId(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub struct ProjectItem {
    id: ItemId,
    item_type: String,
    include: String,
    metadata: IndexMap<String, String>,
}

impl ProjectItem {
    pub fn new(item_type: impl Into<String>, include: impl Into<String>) -> Self {
        Self {
            id: ItemId::next(),
            item_type: item_type.into(),
            include: include.into(),
            metadata: IndexMap::new(),
        }
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_metadata(name, value);
        self
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    /// Evaluated (unescaped) include.
    pub fn include(&self) -> &str {
        &self.include
    }

    /// Custom metadata, in definition order.
    pub fn metadata(&self) -> &IndexMap<String, String> {
        &self.metadata
    }

    /// Metadata value by case-insensitive name, including well-known metadata.
    /// Unset metadata reads as the empty string.
    pub fn get_metadata(&self, name: &str) -> String {
        if let Some(value) = well_known_value(&self.include, name) {
            return value;
        }
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    pub fn has_metadata(&self, name: &str) -> bool {
        self.metadata.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    pub fn set_metadata(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .metadata
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some((_, existing)) => *existing = value,
            None => {
                self.metadata.insert(name, value);
            }
        }
    }

    pub fn remove_metadata(&mut self, name: &str) {
        self.metadata.retain(|k, _| !k.eq_ignore_ascii_case(name));
    }

    /// Same type, include and custom metadata (order-insensitive).
    pub fn is_equivalent(&self, other: &ProjectItem) -> bool {
        self.item_type.eq_ignore_ascii_case(&other.item_type)
            && self.include == other.include
            && self.metadata.len() == other.metadata.len()
            && self
                .metadata
                .iter()
                .all(|(k, v)| other.has_metadata(k) && other.get_metadata(k) == *v)
    }

    pub fn to_task_item(&self) -> TaskItem {
        TaskItem {
            item_spec: self.include.clone(),
            metadata: self
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn from_task_item(item_type: &str, item: &TaskItem) -> Self {
        let mut project_item = ProjectItem::new(item_type, item.item_spec.clone());
        for (k, v) in item.metadata.iter() {
            project_item.set_metadata(k.clone(), v.clone());
        }
        project_item
    }
}

fn well_known_value(include: &str, name: &str) -> Option<String> {
    let path = Path::new(include);
    let lower = name.to_ascii_lowercase();
    let value = match lower.as_str() {
        "identity" => include.to_string(),
        "filename" => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        "extension" => path
            .extension()
            .map(|s| format!(".{}", s.to_string_lossy()))
            .unwrap_or_default(),
        "relativedir" => match include.rfind(['/', '\\']) {
            Some(idx) => include[..=idx].to_string(),
            None => String::new(),
        },
        "recursivedir" => String::new(),
        _ => return None,
    };
    Some(value)
}

/// Item value passed to tasks and returned from targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TaskItem {
    pub item_spec: String,
    pub metadata: BTreeMap<String, String>,
}

impl TaskItem {
    pub fn new(item_spec: impl Into<String>) -> Self {
        Self {
            item_spec: item_spec.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    pub fn get_metadata(&self, name: &str) -> String {
        if let Some(value) = well_known_value(&self.item_spec, name) {
            return value;
        }
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }
}

/// Characters that must be `%XX`-escaped to survive expansion literally.
const ESCAPED_CHARS: &[char] = &['%', '*', '?', '@', '$', '(', ')', ';', '\''];

pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if ESCAPED_CHARS.contains(&c) {
            out.push_str(&format!("%{:02x}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode `%XX` sequences. Anything that is not a valid escape is kept as-is.
pub fn unescape(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
