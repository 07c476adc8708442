// src/intrinsic/choose.rs

//! `choose`/`when`/`otherwise` blocks.
//!
//! The first `when` whose condition holds is taken; otherwise the
//! `otherwise` branch, if present. During evaluation a choose block runs
//! twice, once per pass, and each pass only executes its own kind of group.

use tracing::trace;

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::evaluation::{evaluate_condition, Lookup};
use crate::intrinsic::{execute_item_group, execute_property_group, IntrinsicContext};
use crate::project::model::{ChooseBranch, ChooseDefinition};

/// Which groups a choose block executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationPass {
    Properties,
    Items,
    /// Inside targets, both in document order.
    All,
}

impl EvaluationPass {
    fn runs_properties(self) -> bool {
        matches!(self, EvaluationPass::Properties | EvaluationPass::All)
    }

    fn runs_items(self) -> bool {
        matches!(self, EvaluationPass::Items | EvaluationPass::All)
    }
}

pub fn execute_choose(
    choose: &ChooseDefinition,
    pass: EvaluationPass,
    lookup: &mut Lookup,
    ctx: &IntrinsicContext<'_>,
    location: &ElementLocation,
) -> Result<()> {
    if choose.when.is_empty() {
        return Err(BuildError::invalid_project(
            codes::INVALID_CHILD_ELEMENT,
            location,
            "a choose block must contain at least one \"when\" clause",
        ));
    }

    for (idx, when) in choose.when.iter().enumerate() {
        let when_location = location.child(format!("when #{}", idx + 1));
        let taken = {
            let expander = ctx.expander(lookup).without_metadata();
            evaluate_condition(&when.condition, &expander, &when_location.child("condition"))?
        };
        if taken {
            trace!(location = %when_location, "when clause taken");
            return execute_branch(&when.branch, pass, lookup, ctx, &when_location);
        }
    }

    match choose.otherwise.as_ref() {
        Some(otherwise) => {
            let otherwise_location = location.child("otherwise");
            trace!(location = %otherwise_location, "otherwise clause taken");
            execute_branch(otherwise, pass, lookup, ctx, &otherwise_location)
        }
        None => Ok(()),
    }
}

fn execute_branch(
    branch: &ChooseBranch,
    pass: EvaluationPass,
    lookup: &mut Lookup,
    ctx: &IntrinsicContext<'_>,
    location: &ElementLocation,
) -> Result<()> {
    if pass.runs_properties() {
        for (idx, group) in branch.property_group.iter().enumerate() {
            execute_property_group(group, lookup, ctx, &location.child(format!("property_group #{}", idx + 1)))?;
        }
    }
    if pass.runs_items() {
        for (idx, group) in branch.item_group.iter().enumerate() {
            execute_item_group(group, lookup, ctx, &location.child(format!("item_group #{}", idx + 1)))?;
        }
    }
    for (idx, nested) in branch.choose.iter().enumerate() {
        execute_choose(nested, pass, lookup, ctx, &location.child(format!("choose #{}", idx + 1)))?;
    }
    Ok(())
}
