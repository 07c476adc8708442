// src/intrinsic/item_group.rs

//! Item group execution.
//!
//! Each item element is one of:
//! - an add (`include`, optionally filtered by `exclude`)
//! - a remove (`remove`, optionally matched on metadata against one item list)
//! - a modify (neither; only inside targets), updating metadata in place
//!
//! Elements run in document order. Inside targets every element batches over
//! the metadata it references.

use globset::{GlobBuilder, GlobMatcher};
use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::evaluation::expander::{fragments, item_references, Fragment};
use crate::evaluation::{bucketize, evaluate_condition, Bucket, Expander, Lookup, MetadataModifications, ProjectItem};
use crate::intrinsic::IntrinsicContext;
use crate::project::model::{ItemDefinition, ItemGroupDefinition};
use crate::types::parse_bool;

/// How `MatchOnMetadata` compares values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchOnMetadataOptions {
    #[default]
    CaseSensitive,
    CaseInsensitive,
    PathLike,
}

impl MatchOnMetadataOptions {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "casesensitive" => Some(Self::CaseSensitive),
            "caseinsensitive" => Some(Self::CaseInsensitive),
            "pathlike" => Some(Self::PathLike),
            _ => None,
        }
    }

    pub fn matches(self, a: &str, b: &str) -> bool {
        match self {
            Self::CaseSensitive => a == b,
            Self::CaseInsensitive => a.eq_ignore_ascii_case(b),
            Self::PathLike => normalize_path(a).eq_ignore_ascii_case(&normalize_path(b)),
        }
    }
}

/// Forward slashes, no `.` segments, no duplicate or trailing separators.
pub fn normalize_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." if segments.last().is_some_and(|s| *s != "..") => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute { format!("/{joined}") } else { joined }
}

/// Matches item specs against one `exclude`/`remove` entry.
#[derive(Debug, Clone)]
enum SpecMatcher {
    Exact(String),
    Glob(GlobMatcher),
}

impl SpecMatcher {
    fn new(spec: &str, location: &ElementLocation) -> Result<Self> {
        let normalized = normalize_path(spec);
        if !spec.contains(['*', '?']) {
            return Ok(SpecMatcher::Exact(normalized));
        }
        let glob = GlobBuilder::new(&normalized)
            .case_insensitive(true)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                BuildError::invalid_project(
                    codes::INVALID_ATTRIBUTE_VALUE,
                    location,
                    format!("invalid wildcard \"{spec}\": {e}"),
                )
            })?;
        Ok(SpecMatcher::Glob(glob.compile_matcher()))
    }

    fn is_match(&self, include: &str) -> bool {
        let normalized = normalize_path(include);
        match self {
            SpecMatcher::Exact(spec) => spec.eq_ignore_ascii_case(&normalized),
            SpecMatcher::Glob(glob) => glob.is_match(&normalized),
        }
    }
}

fn matchers(specs: &[String], location: &ElementLocation) -> Result<Vec<SpecMatcher>> {
    specs.iter().map(|s| SpecMatcher::new(s, location)).collect()
}

fn matches_any(matchers: &[SpecMatcher], include: &str) -> bool {
    matchers.iter().any(|m| m.is_match(include))
}

pub fn execute_item_group(
    group: &ItemGroupDefinition,
    lookup: &mut Lookup,
    ctx: &IntrinsicContext<'_>,
    location: &ElementLocation,
) -> Result<()> {
    if !ctx.group_condition(group.condition.as_deref(), lookup, location)? {
        trace!(%location, "item group condition is false");
        return Ok(());
    }
    for (idx, item) in group.item.iter().enumerate() {
        let item_location = location.child(format!("item '{}' #{}", item.item_type, idx + 1));
        validate_item(item, ctx, &item_location)?;
        if item.include.is_some() {
            execute_add(item, lookup, ctx, &item_location)?;
        } else if item.remove.is_some() {
            execute_remove(item, lookup, ctx, &item_location)?;
        } else {
            execute_modify(item, lookup, ctx, &item_location)?;
        }
    }
    Ok(())
}

fn mutually_exclusive(location: &ElementLocation, a: &str, b: &str) -> BuildError {
    BuildError::invalid_project(
        codes::MUTUALLY_EXCLUSIVE_ATTRIBUTES,
        location,
        format!("the attributes \"{a}\" and \"{b}\" cannot be used together"),
    )
}

fn validate_item(item: &ItemDefinition, ctx: &IntrinsicContext<'_>, location: &ElementLocation) -> Result<()> {
    if item.item_type.trim().is_empty() {
        return Err(BuildError::invalid_project(
            codes::MISSING_ATTRIBUTE,
            location,
            "an item element must name its item type",
        ));
    }
    if item.include.is_some() && item.remove.is_some() {
        return Err(mutually_exclusive(location, "Include", "Remove"));
    }
    if item.keep_metadata.is_some() && item.remove_metadata.is_some() {
        return Err(mutually_exclusive(location, "KeepMetadata", "RemoveMetadata"));
    }
    if let Some(include) = item.include.as_deref() {
        if include.trim().is_empty() {
            return Err(BuildError::invalid_project(
                codes::MISSING_ATTRIBUTE,
                location,
                format!("the \"Include\" attribute of item \"{}\" must not be empty", item.item_type),
            ));
        }
    }
    if item.exclude.is_some() && item.include.is_none() {
        return Err(BuildError::invalid_project(
            codes::INVALID_ITEM_OPERATION,
            location,
            "the \"Exclude\" attribute is only valid together with \"Include\"",
        ));
    }
    if item.match_on_metadata.is_some() && item.remove.is_none() {
        return Err(BuildError::invalid_project(
            codes::INVALID_ITEM_OPERATION,
            location,
            "the \"MatchOnMetadata\" attribute is only valid together with \"Remove\"",
        ));
    }
    if item.match_on_metadata_options.is_some() && item.match_on_metadata.is_none() {
        return Err(BuildError::invalid_project(
            codes::INVALID_ITEM_OPERATION,
            location,
            "the \"MatchOnMetadataOptions\" attribute requires \"MatchOnMetadata\"",
        ));
    }
    if item.include.is_none() && item.remove.is_none() && !ctx.in_target {
        return Err(BuildError::invalid_project(
            codes::MISSING_ATTRIBUTE,
            location,
            format!(
                "the item \"{}\" outside a target must have an \"Include\" or \"Remove\" attribute",
                item.item_type
            ),
        ));
    }
    if item.remove.as_deref().is_some_and(|r| r.trim().is_empty()) {
        return Err(BuildError::invalid_project(
            codes::MISSING_ATTRIBUTE,
            location,
            format!("the \"Remove\" attribute of item \"{}\" must not be empty", item.item_type),
        ));
    }
    Ok(())
}

/// Buckets for an element: real batching inside targets, one trivial bucket
/// otherwise.
fn buckets_for(
    expressions: &[&str],
    lookup: &Lookup,
    ctx: &IntrinsicContext<'_>,
    location: &ElementLocation,
) -> Result<Vec<Bucket>> {
    if ctx.in_target {
        bucketize(expressions, lookup, location)
    } else {
        Ok(vec![Bucket::default()])
    }
}

fn bucket_expander<'l>(
    ctx: &IntrinsicContext<'l>,
    lookup: &'l Lookup,
    bucket: &'l Bucket,
) -> Expander<'l> {
    if ctx.in_target {
        ctx.expander(lookup).with_bucket(bucket)
    } else {
        ctx.expander(lookup).without_metadata()
    }
}

fn parse_flag(
    expander: &Expander<'_>,
    raw: Option<&str>,
    attribute: &str,
    default: bool,
    location: &ElementLocation,
) -> Result<bool> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value = expander.expand_unescaped(raw, location)?;
    if value.trim().is_empty() {
        return Ok(default);
    }
    parse_bool(&value).ok_or_else(|| {
        BuildError::invalid_project(
            codes::INVALID_BOOLEAN_ATTRIBUTE,
            location,
            format!("the \"{attribute}\" attribute has value \"{value}\", which is not a boolean"),
        )
    })
}

/// Which carried-over metadata names survive `KeepMetadata`/`RemoveMetadata`.
#[derive(Debug, Clone)]
enum MetadataFilter {
    All,
    Keep(Vec<String>),
    Remove(Vec<String>),
}

impl MetadataFilter {
    fn from_item(item: &ItemDefinition, expander: &Expander<'_>, location: &ElementLocation) -> Result<Self> {
        if let Some(keep) = item.keep_metadata.as_deref() {
            let names = expander.expand_into_strings(keep, location)?;
            return Ok(if names.is_empty() { Self::All } else { Self::Keep(names) });
        }
        if let Some(remove) = item.remove_metadata.as_deref() {
            let names = expander.expand_into_strings(remove, location)?;
            return Ok(if names.is_empty() { Self::All } else { Self::Remove(names) });
        }
        Ok(Self::All)
    }

    fn allows(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Keep(names) => names.iter().any(|n| n.eq_ignore_ascii_case(name)),
            Self::Remove(names) => !names.iter().any(|n| n.eq_ignore_ascii_case(name)),
        }
    }
}

/// Evaluate the element's metadata children against `item`; later
/// definitions of the same name win.
fn evaluate_metadata(
    item: &ItemDefinition,
    target: &ProjectItem,
    expander: &Expander<'_>,
    location: &ElementLocation,
) -> Result<Vec<(String, String)>> {
    let item_expander = expander.for_item(target);
    let mut values: IndexMap<String, (String, String)> = IndexMap::new();
    for metadata in item.metadata.iter() {
        let metadata_location = location.child(format!("metadata '{}'", metadata.name));
        let condition = metadata.condition.as_deref().unwrap_or("");
        if !evaluate_condition(condition, &item_expander, &metadata_location)? {
            continue;
        }
        let value = item_expander.expand_unescaped(&metadata.value, &metadata_location)?;
        values.insert(metadata.name.to_lowercase(), (metadata.name.clone(), value));
    }
    Ok(values.into_values().collect())
}

fn execute_add(
    item: &ItemDefinition,
    lookup: &mut Lookup,
    ctx: &IntrinsicContext<'_>,
    location: &ElementLocation,
) -> Result<()> {
    let include = item.include.as_deref().unwrap_or("");
    let exclude = item.exclude.as_deref().unwrap_or("");
    let condition = item.condition.as_deref().unwrap_or("");

    let buckets = buckets_for(&[include, exclude, condition], lookup, ctx, location)?;
    for bucket in buckets.iter() {
        let new_items = {
            let expander = bucket_expander(ctx, lookup, bucket);
            if !evaluate_condition(condition, &expander, location)? {
                continue;
            }
            let keep_duplicates = parse_flag(&expander, item.keep_duplicates.as_deref(), "KeepDuplicates", true, location)?;
            let filter = MetadataFilter::from_item(item, &expander, location)?;
            let excludes = matchers(&expander.expand_into_strings(exclude, location)?, location)?;

            let existing = if keep_duplicates {
                Vec::new()
            } else {
                lookup.get_items(&item.item_type)
            };

            let expanded_items = expander.expand_into_items(include, location)?;
            if expanded_items.is_empty() && !include.trim().is_empty() {
                return Err(BuildError::invalid_project(
                    codes::MISSING_ATTRIBUTE,
                    location,
                    format!(
                        "the \"Include\" attribute of item \"{}\" evaluated to an empty string: \"{}\"",
                        item.item_type,
                        include.trim()
                    ),
                ));
            }

            let mut new_items: Vec<ProjectItem> = Vec::new();
            for expanded in expanded_items {
                if matches_any(&excludes, &expanded.include) {
                    trace!(item = %expanded.include, "excluded");
                    continue;
                }
                let mut project_item = ProjectItem::new(item.item_type.clone(), expanded.include);
                for (name, value) in expanded.metadata.into_iter().flatten() {
                    if filter.allows(&name) {
                        project_item.set_metadata(name, value);
                    }
                }
                for (name, value) in evaluate_metadata(item, &project_item, &expander, location)? {
                    project_item.set_metadata(name, value);
                }
                if !keep_duplicates
                    && existing
                        .iter()
                        .chain(new_items.iter())
                        .any(|i| i.is_equivalent(&project_item))
                {
                    trace!(item = %project_item.include(), "dropping duplicate");
                    continue;
                }
                new_items.push(project_item);
            }
            new_items
        };
        debug!(item_type = %item.item_type, count = new_items.len(), "adding items");
        lookup.add_new_items(new_items);
    }
    Ok(())
}

/// The single `@(Type)` list a `MatchOnMetadata` remove may reference.
fn match_on_metadata_source(remove: &str, location: &ElementLocation) -> Result<String> {
    let referenced = item_references(remove);
    let whole = matches!(fragments(remove.trim()).as_slice(), [Fragment::Items(_)]);
    match referenced.as_slice() {
        [only] if whole => Ok(only.clone()),
        _ => Err(BuildError::invalid_project_with_help(
            codes::INVALID_ITEM_OPERATION,
            codes::MATCH_ON_METADATA_ONE_ITEM,
            location,
            "only one item type may be referenced when removing with MatchOnMetadata",
        )),
    }
}

fn execute_remove(
    item: &ItemDefinition,
    lookup: &mut Lookup,
    ctx: &IntrinsicContext<'_>,
    location: &ElementLocation,
) -> Result<()> {
    let remove = item.remove.as_deref().unwrap_or("");
    let condition = item.condition.as_deref().unwrap_or("");

    let match_on = match item.match_on_metadata.as_deref() {
        Some(names) => Some((match_on_metadata_source(remove, location)?, names)),
        None => None,
    };

    let buckets = buckets_for(&[remove, condition], lookup, ctx, location)?;
    for bucket in buckets.iter() {
        let doomed = {
            let expander = bucket_expander(ctx, lookup, bucket);
            if !evaluate_condition(condition, &expander, location)? {
                continue;
            }
            let existing = expander.items_of(&item.item_type);
            match &match_on {
                Some((source, names)) => {
                    let names = expander.expand_into_strings(names, location)?;
                    let raw_options = item.match_on_metadata_options.as_deref().unwrap_or("");
                    let options_value = expander.expand_unescaped(raw_options, location)?;
                    let options = MatchOnMetadataOptions::parse(&options_value).ok_or_else(|| {
                        BuildError::invalid_project(
                            codes::INVALID_ATTRIBUTE_VALUE,
                            location,
                            format!("\"{options_value}\" is not a valid MatchOnMetadataOptions value"),
                        )
                    })?;
                    let references = expander.items_of(source);
                    existing
                        .into_iter()
                        .filter(|candidate| {
                            references.iter().any(|r| {
                                names.iter().all(|n| {
                                    options.matches(&candidate.get_metadata(n), &r.get_metadata(n))
                                })
                            })
                        })
                        .collect::<Vec<_>>()
                }
                None => {
                    let specs = matchers(&expander.expand_into_strings(remove, location)?, location)?;
                    existing
                        .into_iter()
                        .filter(|candidate| matches_any(&specs, candidate.include()))
                        .collect::<Vec<_>>()
                }
            }
        };
        debug!(item_type = %item.item_type, count = doomed.len(), "removing items");
        lookup.remove_items(&doomed);
    }
    Ok(())
}

fn execute_modify(
    item: &ItemDefinition,
    lookup: &mut Lookup,
    ctx: &IntrinsicContext<'_>,
    location: &ElementLocation,
) -> Result<()> {
    let condition = item.condition.as_deref().unwrap_or("");
    let self_reference = format!("@({})", item.item_type);

    let buckets = buckets_for(&[condition, &self_reference], lookup, ctx, location)?;
    for bucket in buckets.iter() {
        let modifications = {
            let expander = bucket_expander(ctx, lookup, bucket);
            if !evaluate_condition(condition, &expander, location)? {
                continue;
            }
            let filter = MetadataFilter::from_item(item, &expander, location)?;
            let mut modifications: Vec<(ProjectItem, MetadataModifications)> = Vec::new();
            for existing in expander.items_of(&item.item_type) {
                let mut changes = MetadataModifications::new();
                if !matches!(filter, MetadataFilter::All) {
                    for name in existing.metadata().keys() {
                        if !filter.allows(name) {
                            changes.insert(name.clone(), None);
                        }
                    }
                }
                for (name, value) in evaluate_metadata(item, &existing, &expander, location)? {
                    changes.insert(name, Some(value));
                }
                if !changes.is_empty() {
                    modifications.push((existing, changes));
                }
            }
            modifications
        };
        debug!(item_type = %item.item_type, count = modifications.len(), "modifying items");
        for (existing, changes) in modifications {
            lookup.modify_items(std::slice::from_ref(&existing), &changes);
        }
    }
    Ok(())
}
