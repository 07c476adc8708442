// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod evaluation;
pub mod events;
pub mod fs;
pub mod intrinsic;
pub mod logging;
pub mod node;
pub mod project;
pub mod protocol;
pub mod registry;
pub mod request;
pub mod target;
pub mod tasks;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::resolve_settings;
use crate::engine::{BuildManager, BuildSubmission};
use crate::events::TracingEventSink;
use crate::fs::{FileSystem, RealFileSystem};
use crate::project::ProjectInstance;
use crate::tasks::builtin::parse_property_list;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings loading (file + environment overlay)
/// - the build manager and its task hosts
/// - Ctrl-C handling through the manager's cancellation token
///
/// A build that finishes with failures is returned as an error.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut settings = resolve_settings(args.settings.as_deref())?;
    if args.multi_threaded {
        settings.multi_threaded = true;
    }

    let global_properties = parse_property_list(&args.properties)
        .map_err(|entry| anyhow::anyhow!("the property \"{entry}\" is not of the form Name=Value"))?;
    let project = std::path::absolute(&args.project)
        .with_context(|| format!("cannot resolve project path {}", args.project.display()))?;
    let file_system: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    if args.dry_run {
        let instance = ProjectInstance::load(file_system, &project, global_properties, args.tools_version.as_deref())?;
        print_dry_run(&instance);
        return Ok(());
    }

    let manager = BuildManager::new(settings, file_system, Arc::new(TracingEventSink));

    // Ctrl-C → cancel the build.
    {
        let token = manager.cancellation_token();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            token.cancel();
        });
    }

    let submission = BuildSubmission {
        project: project.clone(),
        targets: args.targets.clone(),
        global_properties,
        tools_version: args.tools_version.clone(),
    };
    info!(project = %project.display(), targets = ?submission.targets, "build started");
    let outcome = manager.build(submission).await;
    if let Err(e) = manager.shutdown().await {
        warn!(error = %e, "task hosts did not shut down cleanly");
    }
    let result = outcome?;

    print_summary(&project, &result);
    if !result.succeeded() {
        bail!("build of {} failed", project.display());
    }
    Ok(())
}

fn print_summary(project: &Path, result: &request::BuildResult) {
    println!("buildforge: {}", project.display());
    for (target, target_result) in result.results_by_target().iter() {
        println!("  {target}: {:?} ({} item(s))", target_result.code(), target_result.items().len());
    }
    if let Some(error) = result.error() {
        println!("  error: {error}");
    }
    if result.is_canceled() {
        println!("  build canceled");
    }
    println!(
        "result: {}",
        if result.succeeded() { "succeeded" } else { "failed" }
    );
}

/// Simple dry-run output: print targets, their dependencies and the
/// registered tasks.
fn print_dry_run(project: &ProjectInstance) {
    println!("buildforge dry-run: {}", project.full_path().display());
    println!("  tools version = {}", project.tools_version());
    println!("  default targets = {:?}", project.default_targets());
    if !project.initial_targets().is_empty() {
        println!("  initial targets = {:?}", project.initial_targets());
    }
    println!();

    println!("targets ({}):", project.targets().len());
    for (name, target) in project.targets() {
        println!("  - {name}");
        if let Some(depends_on) = &target.depends_on_targets {
            println!("      depends_on: {depends_on}");
        }
        if let Some(before) = &target.before_targets {
            println!("      before: {before}");
        }
        if let Some(after) = &target.after_targets {
            println!("      after: {after}");
        }
        if let Some(condition) = &target.condition {
            println!("      condition: {condition}");
        }
        println!("      steps: {}", target.steps.len());
    }
    println!();

    let registry = project.registry();
    println!("registered tasks ({}):", registry.get_deep_count_of_registered_tasks());
    for (name, records) in registry.task_registrations() {
        for record in records {
            println!("  - {name} ({})", record.effective_factory_name());
        }
    }

    debug!("dry-run complete (no execution)");
}
