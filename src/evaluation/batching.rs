// src/evaluation/batching.rs

//! Partitioning items into buckets by metadata value.
//!
//! Every `%(Meta)` or `%(Type.Meta)` reference in a set of expressions
//! contributes to the bucket key. Items of each batched type are grouped by
//! the values of the references that apply to them; inside a bucket,
//! `@(Type)` yields only that bucket's items and `%(...)` yields the bucket's
//! value.

use indexmap::IndexMap;
use tracing::trace;

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::evaluation::expander::{item_references, metadata_references, MetadataReference};
use crate::evaluation::item::ProjectItem;
use crate::evaluation::lookup::Lookup;

#[derive(Debug, Clone, Default)]
pub struct Bucket {
    items: IndexMap<String, Vec<ProjectItem>>,
    metadata: Vec<(MetadataReference, String)>,
    key: Vec<String>,
}

impl Bucket {
    /// Bucket items of a batched type; `None` when the type is not batched.
    pub fn items_of(&self, item_type: &str) -> Option<&[ProjectItem]> {
        self.items
            .get(&item_type.to_lowercase())
            .map(|v| v.as_slice())
    }

    /// Value this bucket holds for a metadata reference.
    pub fn metadata_value(&self, reference: &MetadataReference) -> Option<String> {
        self.metadata
            .iter()
            .find(|(r, _)| references_match(r, reference))
            .map(|(_, v)| v.clone())
    }

    /// All items held by this bucket, across batched types.
    pub fn items(&self) -> impl Iterator<Item = &ProjectItem> {
        self.items.values().flat_map(|v| v.iter())
    }

    /// `true` for the single bucket produced when nothing batches.
    pub fn is_trivial(&self) -> bool {
        self.items.is_empty() && self.metadata.is_empty()
    }
}

fn references_match(stored: &MetadataReference, wanted: &MetadataReference) -> bool {
    if !stored.name.eq_ignore_ascii_case(&wanted.name) {
        return false;
    }
    match (&stored.item_type, &wanted.item_type) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => true,
    }
}

fn push_unique_ref(refs: &mut Vec<MetadataReference>, reference: MetadataReference) {
    let exists = refs.iter().any(|r| {
        r.name.eq_ignore_ascii_case(&reference.name)
            && match (&r.item_type, &reference.item_type) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                (None, None) => true,
                _ => false,
            }
    });
    if !exists {
        refs.push(reference);
    }
}

fn push_unique_type(types: &mut Vec<String>, item_type: String) {
    if !types.iter().any(|t| t.eq_ignore_ascii_case(&item_type)) {
        types.push(item_type);
    }
}

/// Split the items referenced by `expressions` into buckets.
///
/// With no metadata references this yields exactly one trivial bucket.
pub fn bucketize(
    expressions: &[&str],
    lookup: &Lookup,
    location: &ElementLocation,
) -> Result<Vec<Bucket>> {
    let mut refs: Vec<MetadataReference> = Vec::new();
    let mut consumed: Vec<String> = Vec::new();
    for expr in expressions {
        for reference in metadata_references(expr) {
            push_unique_ref(&mut refs, reference);
        }
        for item_type in item_references(expr) {
            push_unique_type(&mut consumed, item_type);
        }
    }

    if refs.is_empty() {
        return Ok(vec![Bucket::default()]);
    }

    let mut batched: Vec<String> = Vec::new();
    for reference in refs.iter() {
        if let Some(t) = &reference.item_type {
            push_unique_type(&mut batched, t.clone());
        }
    }
    if let Some(unqualified) = refs.iter().find(|r| r.item_type.is_none()) {
        if consumed.is_empty() {
            return Err(BuildError::invalid_project(
                codes::INVALID_ATTRIBUTE_VALUE,
                location,
                format!(
                    "the metadata reference \"%({})\" must be qualified with an item type because no item list is referenced",
                    unqualified.name
                ),
            ));
        }
        for t in consumed.iter() {
            push_unique_type(&mut batched, t.clone());
        }
    }

    let mut buckets: Vec<Bucket> = Vec::new();
    for item_type in batched.iter() {
        let type_key = item_type.to_lowercase();
        for item in lookup.get_items(item_type) {
            let mut key = Vec::with_capacity(refs.len());
            let mut values = Vec::new();
            for reference in refs.iter() {
                let applies = reference
                    .item_type
                    .as_deref()
                    .is_none_or(|t| t.eq_ignore_ascii_case(item_type));
                if applies {
                    let value = item.get_metadata(&reference.name);
                    key.push(value.to_lowercase());
                    values.push((reference.clone(), value));
                } else {
                    key.push(String::new());
                }
            }
            let bucket = match buckets.iter().position(|b| b.key == key) {
                Some(idx) => &mut buckets[idx],
                None => {
                    let items = batched
                        .iter()
                        .map(|t| (t.to_lowercase(), Vec::new()))
                        .collect();
                    buckets.push(Bucket {
                        key,
                        items,
                        metadata: Vec::new(),
                    });
                    let last = buckets.len() - 1;
                    &mut buckets[last]
                }
            };
            for (reference, value) in values {
                if bucket.metadata_value(&reference).is_none() {
                    bucket.metadata.push((reference, value));
                }
            }
            bucket.items.entry(type_key.clone()).or_default().push(item);
        }
    }

    trace!(buckets = buckets.len(), refs = refs.len(), "bucketized items");
    Ok(buckets)
}
