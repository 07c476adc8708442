// src/intrinsic/property_group.rs

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::evaluation::{bucketize, evaluate_condition};
use crate::evaluation::Lookup;
use crate::intrinsic::IntrinsicContext;
use crate::project::model::{PropertyDefinition, PropertyGroupDefinition};
use crate::project::is_reserved_property;

static VALID_PROPERTY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").expect("valid property name regex")
});

/// Run a property group. Each property sees the properties set before it.
pub fn execute_property_group(
    group: &PropertyGroupDefinition,
    lookup: &mut Lookup,
    ctx: &IntrinsicContext<'_>,
    location: &ElementLocation,
) -> Result<()> {
    if !ctx.group_condition(group.condition.as_deref(), lookup, location)? {
        trace!(%location, "property group condition is false");
        return Ok(());
    }
    for property in group.property.iter() {
        let property_location = location.child(format!("property '{}'", property.name));
        execute_property(property, lookup, ctx, &property_location)?;
    }
    Ok(())
}

fn execute_property(
    property: &PropertyDefinition,
    lookup: &mut Lookup,
    ctx: &IntrinsicContext<'_>,
    location: &ElementLocation,
) -> Result<()> {
    if !VALID_PROPERTY_NAME.is_match(&property.name) {
        return Err(BuildError::invalid_project(
            codes::INVALID_CHILD_ELEMENT,
            location,
            format!("\"{}\" is not a valid property name", property.name),
        ));
    }
    if is_reserved_property(&property.name) {
        return Err(BuildError::invalid_project(
            codes::RESERVED_PROPERTY,
            location,
            format!(
                "the property \"{}\" is reserved and cannot be modified",
                property.name
            ),
        ));
    }

    let condition = property.condition.as_deref().unwrap_or("");
    let mut value = None;
    if ctx.in_target {
        let buckets = bucketize(&[condition, property.value.as_str()], lookup, location)?;
        for bucket in buckets.iter() {
            let expander = ctx.expander(lookup).with_bucket(bucket);
            if evaluate_condition(condition, &expander, location)? {
                value = Some(expander.expand(&property.value, location)?);
            }
        }
    } else {
        let expander = ctx.expander(lookup).without_metadata();
        if evaluate_condition(condition, &expander, location)? {
            value = Some(expander.expand(&property.value, location)?);
        }
    }

    if let Some(value) = value {
        trace!(property = %property.name, %value, "setting property");
        if !lookup.set_property(&property.name, value) {
            debug!(property = %property.name, "global property not overridden");
        }
    }
    Ok(())
}
