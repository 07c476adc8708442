// src/evaluation/expander.rs

//! Property, item and metadata expansion.
//!
//! Supported forms:
//! - `$(Name)` property references
//! - `@(Type)`, `@(Type, 'sep')` and `@(Type->'%(Meta)')` item lists
//! - `%(Meta)` / `%(Type.Meta)` metadata, resolved against the current item
//!   or batching bucket
//!
//! Expansion output is escaped; callers that need the literal value go
//! through [`Expander::expand_unescaped`] or the item helpers.

use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::evaluation::batching::Bucket;
use crate::evaluation::item::{escape, unescape, ProjectItem, TaskItem};
use crate::evaluation::lookup::Lookup;
use crate::fs::FileSystem;

static PROPERTY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").expect("valid regex"));

static ITEM_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_\-]*)\s*(?:->\s*'([^']*)'\s*)?(?:,\s*'([^']*)'\s*)?$")
        .expect("valid regex")
});

static METADATA_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:([A-Za-z_][A-Za-z0-9_\-]*)\s*\.\s*)?([A-Za-z_][A-Za-z0-9_\-]*)\s*$")
        .expect("valid regex")
});

/// A parsed `@(...)` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemExpression {
    pub item_type: String,
    pub transform: Option<String>,
    pub separator: Option<String>,
}

impl ItemExpression {
    pub fn parse(inner: &str) -> Option<Self> {
        let caps = ITEM_EXPRESSION.captures(inner)?;
        Some(Self {
            item_type: caps.get(1)?.as_str().to_string(),
            transform: caps.get(2).map(|m| m.as_str().to_string()),
            separator: caps.get(3).map(|m| m.as_str().to_string()),
        })
    }
}

/// A `%(...)` reference, optionally qualified by item type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataReference {
    pub item_type: Option<String>,
    pub name: String,
}

impl MetadataReference {
    pub fn parse(inner: &str) -> Option<Self> {
        let caps = METADATA_REFERENCE.captures(inner)?;
        Some(Self {
            item_type: caps.get(1).map(|m| m.as_str().to_string()),
            name: caps.get(2)?.as_str().to_string(),
        })
    }
}

/// One `$()`/`@()`/`%()` reference or literal run found in an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment<'s> {
    Literal(&'s str),
    Property(&'s str),
    Items(&'s str),
    Metadata(&'s str),
}

/// Split an expression into literal runs and references.
///
/// An unterminated reference is kept as a literal.
pub fn fragments(expr: &str) -> Vec<Fragment<'_>> {
    let bytes = expr.as_bytes();
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;
    while i + 1 < bytes.len() {
        let sigil = bytes[i];
        if matches!(sigil, b'$' | b'@' | b'%') && bytes[i + 1] == b'(' {
            if let Some(end) = matching_paren(bytes, i + 1) {
                if literal_start < i {
                    out.push(Fragment::Literal(&expr[literal_start..i]));
                }
                let inner = &expr[i + 2..end];
                out.push(match sigil {
                    b'$' => Fragment::Property(inner),
                    b'@' => Fragment::Items(inner),
                    _ => Fragment::Metadata(inner),
                });
                i = end + 1;
                literal_start = i;
                continue;
            }
        }
        i += 1;
    }
    if literal_start < expr.len() {
        out.push(Fragment::Literal(&expr[literal_start..]));
    }
    out
}

fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quote = false;
    for (idx, b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'\'' => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on `;` outside of references and quotes.
pub fn split_top_level(expr: &str) -> Vec<&str> {
    let bytes = expr.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut start = 0;
    for (idx, b) in bytes.iter().enumerate() {
        match b {
            b'\'' if depth > 0 => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => depth = depth.saturating_sub(1),
            b';' if depth == 0 => {
                parts.push(&expr[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&expr[start..]);
    parts
}

/// Split an escaped, expanded string into unescaped, non-empty pieces.
pub fn split_semicolon_list(expanded: &str) -> Vec<String> {
    expanded
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(unescape)
        .collect()
}

/// Metadata references found in an expression, excluding those inside
/// item transforms.
pub fn metadata_references(expr: &str) -> Vec<MetadataReference> {
    fragments(expr)
        .into_iter()
        .filter_map(|f| match f {
            Fragment::Metadata(inner) => MetadataReference::parse(inner),
            _ => None,
        })
        .collect()
}

/// Item types referenced through `@(...)` in an expression.
pub fn item_references(expr: &str) -> Vec<String> {
    fragments(expr)
        .into_iter()
        .filter_map(|f| match f {
            Fragment::Items(inner) => ItemExpression::parse(inner).map(|e| e.item_type),
            _ => None,
        })
        .collect()
}

/// Item produced by expanding an include-like expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedItem {
    /// Unescaped item spec.
    pub include: String,
    /// Metadata carried over from a referenced item, if any.
    pub metadata: Option<IndexMap<String, String>>,
}

pub struct Expander<'a> {
    lookup: &'a Lookup,
    bucket: Option<&'a Bucket>,
    item: Option<&'a ProjectItem>,
    metadata_allowed: bool,
    file_system: Option<&'a dyn FileSystem>,
    base_dir: Option<&'a Path>,
}

impl<'a> Expander<'a> {
    /// Expander that leaves `%(...)` references untouched.
    pub fn new(lookup: &'a Lookup) -> Self {
        Self {
            lookup,
            bucket: None,
            item: None,
            metadata_allowed: true,
            file_system: None,
            base_dir: None,
        }
    }

    /// Reject `%(...)` references with MSB4191.
    pub fn without_metadata(mut self) -> Self {
        self.metadata_allowed = false;
        self
    }

    pub fn with_bucket(mut self, bucket: &'a Bucket) -> Self {
        self.bucket = Some(bucket);
        self
    }

    pub fn with_file_system(mut self, fs: &'a dyn FileSystem, base_dir: &'a Path) -> Self {
        self.file_system = Some(fs);
        self.base_dir = Some(base_dir);
        self
    }

    pub fn file_system(&self) -> Option<(&'a dyn FileSystem, &'a Path)> {
        match (self.file_system, self.base_dir) {
            (Some(fs), Some(dir)) => Some((fs, dir)),
            _ => None,
        }
    }

    /// Same context, with `%(...)` resolving against `item`.
    pub fn for_item(&self, item: &'a ProjectItem) -> Expander<'a> {
        Expander {
            lookup: self.lookup,
            bucket: self.bucket,
            item: Some(item),
            metadata_allowed: true,
            file_system: self.file_system,
            base_dir: self.base_dir,
        }
    }

    /// Expand to an escaped string.
    pub fn expand(&self, expr: &str, location: &ElementLocation) -> Result<String> {
        let mut out = String::with_capacity(expr.len());
        for fragment in fragments(expr) {
            match fragment {
                Fragment::Literal(text) => out.push_str(text),
                Fragment::Property(inner) => out.push_str(&self.property(inner, location)?),
                Fragment::Items(inner) => {
                    let expression = self.item_expression(inner, location)?;
                    let values = self.item_values(&expression, location)?;
                    let separator = expression.separator.as_deref().unwrap_or(";");
                    let joined: Vec<String> = values.into_iter().map(|(v, _)| escape(&v)).collect();
                    out.push_str(&joined.join(separator));
                }
                Fragment::Metadata(inner) => match self.metadata(inner, location)? {
                    Some(value) => out.push_str(&escape(&value)),
                    None => {
                        out.push_str("%(");
                        out.push_str(inner);
                        out.push(')');
                    }
                },
            }
        }
        Ok(out)
    }

    pub fn expand_unescaped(&self, expr: &str, location: &ElementLocation) -> Result<String> {
        Ok(unescape(&self.expand(expr, location)?))
    }

    /// Expand an include-like expression into items. `@(Type)` segments keep
    /// the referenced items' metadata.
    pub fn expand_into_items(
        &self,
        expr: &str,
        location: &ElementLocation,
    ) -> Result<Vec<ExpandedItem>> {
        let mut out = Vec::new();
        for piece in split_top_level(expr) {
            let trimmed = piece.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(inner) = whole_item_reference(trimmed) {
                let expression = self.item_expression(inner, location)?;
                if expression.separator.is_none() {
                    for (include, metadata) in self.item_values(&expression, location)? {
                        if !include.is_empty() {
                            out.push(ExpandedItem {
                                include,
                                metadata: Some(metadata),
                            });
                        }
                    }
                    continue;
                }
            }
            let expanded = self.expand(trimmed, location)?;
            out.extend(
                split_semicolon_list(&expanded)
                    .into_iter()
                    .map(|include| ExpandedItem {
                        include,
                        metadata: None,
                    }),
            );
        }
        Ok(out)
    }

    pub fn expand_into_task_items(
        &self,
        expr: &str,
        location: &ElementLocation,
    ) -> Result<Vec<TaskItem>> {
        Ok(self
            .expand_into_items(expr, location)?
            .into_iter()
            .map(|e| TaskItem {
                item_spec: e.include,
                metadata: e
                    .metadata
                    .unwrap_or_default()
                    .into_iter()
                    .collect(),
            })
            .collect())
    }

    /// Expand a `;`-separated list into unescaped strings.
    pub fn expand_into_strings(&self, expr: &str, location: &ElementLocation) -> Result<Vec<String>> {
        Ok(split_semicolon_list(&self.expand(expr, location)?))
    }

    /// Items of a type as seen from this expander (bucket first).
    pub fn items_of(&self, item_type: &str) -> Vec<ProjectItem> {
        if let Some(bucket) = self.bucket {
            if let Some(items) = bucket.items_of(item_type) {
                return items.to_vec();
            }
        }
        self.lookup.get_items(item_type)
    }

    pub fn lookup(&self) -> &'a Lookup {
        self.lookup
    }

    fn property(&self, inner: &str, location: &ElementLocation) -> Result<String> {
        let name = inner.trim();
        if !PROPERTY_NAME.is_match(name) {
            return Err(BuildError::invalid_project(
                codes::INVALID_ATTRIBUTE_VALUE,
                location,
                format!("unsupported property expression \"$({inner})\""),
            ));
        }
        Ok(self.lookup.get_property(name).unwrap_or_default())
    }

    fn item_expression(&self, inner: &str, location: &ElementLocation) -> Result<ItemExpression> {
        ItemExpression::parse(inner).ok_or_else(|| {
            BuildError::invalid_project(
                codes::INVALID_ATTRIBUTE_VALUE,
                location,
                format!("malformed item list expression \"@({inner})\""),
            )
        })
    }

    /// Unescaped includes (transformed if requested) with their metadata.
    fn item_values(
        &self,
        expression: &ItemExpression,
        location: &ElementLocation,
    ) -> Result<Vec<(String, IndexMap<String, String>)>> {
        let items = self.items_of(&expression.item_type);
        let mut out = Vec::with_capacity(items.len());
        for item in items.iter() {
            let value = match &expression.transform {
                Some(transform) => self.for_item(item).expand_unescaped(transform, location)?,
                None => item.include().to_string(),
            };
            out.push((value, item.metadata().clone()));
        }
        Ok(out)
    }

    /// Resolve a metadata reference; `None` leaves it in place.
    fn metadata(&self, inner: &str, location: &ElementLocation) -> Result<Option<String>> {
        let Some(reference) = MetadataReference::parse(inner) else {
            return Err(BuildError::invalid_project(
                codes::INVALID_ATTRIBUTE_VALUE,
                location,
                format!("malformed metadata reference \"%({inner})\""),
            ));
        };
        if let Some(item) = self.item {
            let applies = reference
                .item_type
                .as_deref()
                .is_none_or(|t| t.eq_ignore_ascii_case(item.item_type()));
            return Ok(Some(if applies {
                item.get_metadata(&reference.name)
            } else {
                String::new()
            }));
        }
        if let Some(bucket) = self.bucket {
            if let Some(value) = bucket.metadata_value(&reference) {
                return Ok(Some(value));
            }
        }
        if !self.metadata_allowed {
            return Err(BuildError::invalid_project(
                codes::METADATA_NOT_ALLOWED,
                location,
                format!(
                    "the reference to custom metadata \"%({inner})\" is not allowed in this condition"
                ),
            ));
        }
        Ok(None)
    }
}

/// If `expr` is exactly one `@(...)` reference, return its inner text.
fn whole_item_reference(expr: &str) -> Option<&str> {
    match fragments(expr).as_slice() {
        [Fragment::Items(inner)] => Some(*inner),
        _ => None,
    }
}
