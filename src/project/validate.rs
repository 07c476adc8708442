// src/project/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::evaluation::expander::split_top_level;
use crate::project::model::ProjectDefinition;

/// Characters a target name may not contain.
const INVALID_TARGET_NAME_CHARS: &[char] = &['$', '@', '%', '(', ')', ';', '\'', '*', '?', '.'];

/// Static checks on a freshly parsed project.
///
/// Only literal target references are checked here; references built from
/// properties are resolved when the targets run.
pub fn validate_project(definition: &ProjectDefinition, file: &str) -> Result<()> {
    let root = ElementLocation::new(file, "");
    validate_target_names(definition, &root)?;
    validate_target_references(definition, &root)?;
    validate_dependency_graph(definition, &root)?;
    Ok(())
}

fn validate_target_names(definition: &ProjectDefinition, root: &ElementLocation) -> Result<()> {
    for name in definition.target.keys() {
        if name.trim().is_empty() || name.contains(INVALID_TARGET_NAME_CHARS) {
            return Err(BuildError::invalid_project(
                codes::INVALID_ATTRIBUTE_VALUE,
                &root.child(format!("target '{name}'")),
                format!("\"{name}\" is not a valid target name"),
            ));
        }
    }
    Ok(())
}

/// Names in a `;`-separated list that contain no property, item or metadata
/// references.
pub(crate) fn literal_names(list: &str) -> Vec<String> {
    split_top_level(list)
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.contains(['$', '@', '%']))
        .map(str::to_string)
        .collect()
}

fn target_index(definition: &ProjectDefinition, name: &str) -> Option<usize> {
    definition
        .target
        .keys()
        .position(|k| k.eq_ignore_ascii_case(name))
}

fn missing_target(location: &ElementLocation, name: &str) -> BuildError {
    BuildError::invalid_project(
        codes::TARGET_NOT_FOUND,
        location,
        format!("the target \"{name}\" does not exist in the project"),
    )
}

fn validate_target_references(definition: &ProjectDefinition, root: &ElementLocation) -> Result<()> {
    let project_location = root.child("project");
    for name in definition
        .project
        .default_targets
        .iter()
        .chain(definition.project.initial_targets.iter())
    {
        for literal in literal_names(name) {
            if target_index(definition, &literal).is_none() {
                return Err(missing_target(&project_location, &literal));
            }
        }
    }

    for (name, target) in definition.target.iter() {
        let Some(depends) = target.depends_on_targets.as_deref() else {
            continue;
        };
        let location = root.child(format!("target '{name}'")).child("depends_on_targets");
        for dependency in literal_names(depends) {
            if target_index(definition, &dependency).is_none() {
                return Err(missing_target(&location, &dependency));
            }
        }
    }
    Ok(())
}

fn validate_dependency_graph(definition: &ProjectDefinition, root: &ElementLocation) -> Result<()> {
    // Edge direction: dependency -> dependent.
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    for idx in 0..definition.target.len() {
        graph.add_node(idx);
    }
    for (idx, target) in definition.target.values().enumerate() {
        let Some(depends) = target.depends_on_targets.as_deref() else {
            continue;
        };
        for dependency in literal_names(depends) {
            if let Some(dep_idx) = target_index(definition, &dependency) {
                graph.add_edge(dep_idx, idx, ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let name = definition
                .target
                .get_index(cycle.node_id())
                .map(|(name, _)| name.clone())
                .unwrap_or_default();
            Err(BuildError::invalid_project(
                codes::CIRCULAR_TARGET_DEPENDENCY,
                &root.child(format!("target '{name}'")),
                format!("there is a circular dependency in the target dependency graph involving target \"{name}\""),
            ))
        }
    }
}
