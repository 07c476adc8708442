mod common;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use buildforge::errors::{codes, BuildError, ElementLocation};
use buildforge::evaluation::Lookup;
use buildforge::events::BuildEvent;
use buildforge::fs::FileSystem;
use buildforge::project::ProjectInstance;
use buildforge::target::callbacks::TargetServices;
use buildforge::target::{
    TargetBuiltReason, TargetBuilder, TargetEntry, TargetEntryState, TargetResultCode, TargetResults, TargetSpecification,
};
use common::builders::{self, ProjectBuilder, TargetDefBuilder, TaskDefBuilder};
use common::{init_tracing, load_project, mock_fs_with_project, FakeTaskBuilder, StubCallbacks, PROJECT_PATH};

type TestResult = Result<(), Box<dyn Error>>;
type BuildResult<T> = Result<T, BuildError>;

fn run(
    project: &Arc<ProjectInstance>,
    tasks: &FakeTaskBuilder,
    callbacks: &mut StubCallbacks,
    targets: &[&str],
) -> BuildResult<(bool, TargetResults)> {
    let mut results = TargetResults::new();
    let mut lookup = project.create_lookup();
    let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
    let ok = TargetBuilder::new(Arc::clone(project), tasks, callbacks, &mut results)
        .build_targets(&mut lookup, &targets)?;
    project.commit(&lookup);
    Ok((ok, results))
}

#[test]
fn dependencies_run_once_and_in_order() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.Restore]
[[target.Restore.steps]]
kind = "task"
name = "Message"
parameters = { Text = "restore" }

[target.Compile]
depends_on_targets = "Restore"
[[target.Compile.steps]]
kind = "task"
name = "Message"
parameters = { Text = "compile" }

[target.Build]
depends_on_targets = "Restore;Compile"
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Text = "build" }
"#,
    )?;
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new();

    let (ok, results) = run(&project, &tasks, &mut callbacks, &["Build"])?;

    assert!(ok);
    assert_eq!(tasks.executed_targets(), vec!["Restore", "Compile", "Build"]);
    assert_eq!(results.len(), 3);
    assert_eq!(
        callbacks.sink.started_targets(),
        vec!["Restore".to_string(), "Compile".to_string(), "Build".to_string()]
    );
    Ok(())
}

#[test]
fn dependencies_run_before_before_targets_and_after_targets_run_last() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[project]
default_targets = ["Build"]

[target.Build]
depends_on_targets = "Prepare"
[[target.Build.steps]]
kind = "task"
name = "Message"

[target.Prepare]
[[target.Prepare.steps]]
kind = "task"
name = "Message"

[target.Pre]
before_targets = "Build"
[[target.Pre.steps]]
kind = "task"
name = "Message"

[target.Post]
after_targets = "Build"
[[target.Post.steps]]
kind = "task"
name = "Message"
"#,
    )?;
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new();

    let (ok, _) = run(&project, &tasks, &mut callbacks, &["Build"])?;

    assert!(ok);
    assert_eq!(tasks.executed_targets(), vec!["Prepare", "Pre", "Build", "Post"]);
    Ok(())
}

#[test]
fn failed_dependency_stops_siblings_and_owner() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.Build]
depends_on_targets = "A;B"
[[target.Build.steps]]
kind = "task"
name = "Message"

[target.A]
[[target.A.steps]]
kind = "task"
name = "Fail"

[target.B]
[[target.B.steps]]
kind = "task"
name = "Message"
"#,
    )?;
    let tasks = FakeTaskBuilder::new().failing("Fail");
    let mut callbacks = StubCallbacks::new();

    let (ok, results) = run(&project, &tasks, &mut callbacks, &["Build"])?;

    assert!(!ok);
    assert_eq!(tasks.executed_names(), vec!["A.Fail"]);
    assert!(!results.contains("B"));
    let build = results.get("Build").ok_or("Build has no result")?;
    assert_eq!(build.code(), TargetResultCode::Failure);
    assert!(callbacks.sink.finished_targets().contains(&("Build".to_string(), false)));
    Ok(())
}

#[test]
fn request_stops_at_first_failed_target() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.First]
[[target.First.steps]]
kind = "task"
name = "Fail"

[target.Second]
[[target.Second.steps]]
kind = "task"
name = "Message"
"#,
    )?;
    let tasks = FakeTaskBuilder::new().failing("Fail");
    let mut callbacks = StubCallbacks::new();

    let (ok, results) = run(&project, &tasks, &mut callbacks, &["First", "Second"])?;

    assert!(!ok);
    assert!(!results.contains("Second"));
    Ok(())
}

#[test]
fn on_error_targets_run_after_a_failure() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Fail"
[[target.Build.steps]]
kind = "task"
name = "Message"
[[target.Build.steps]]
kind = "on_error"
execute_targets = "Cleanup"
[[target.Build.steps]]
kind = "on_error"
condition = "'$(NeverSet)' == 'yes'"
execute_targets = "NotThis"

[target.Cleanup]
[[target.Cleanup.steps]]
kind = "task"
name = "Message"

[target.NotThis]
[[target.NotThis.steps]]
kind = "task"
name = "Message"
"#,
    )?;
    let tasks = FakeTaskBuilder::new().failing("Fail");
    let mut callbacks = StubCallbacks::new();

    let (ok, results) = run(&project, &tasks, &mut callbacks, &["Build"])?;

    assert!(!ok);
    assert_eq!(tasks.executed_names(), vec!["Build.Fail", "Cleanup.Message"]);
    assert!(!results.contains("NotThis"));
    assert_eq!(results.get("Cleanup").map(|r| r.succeeded()), Some(true));
    Ok(())
}

#[test]
fn failed_after_target_fails_its_owner() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Message"

[target.Verify]
after_targets = "Build"
[[target.Verify.steps]]
kind = "task"
name = "Fail"
"#,
    )?;
    let tasks = FakeTaskBuilder::new().failing("Fail");
    let mut callbacks = StubCallbacks::new();

    let (ok, results) = run(&project, &tasks, &mut callbacks, &["Build"])?;

    assert!(!ok);
    assert_eq!(results.get("Build").map(|r| r.code()), Some(TargetResultCode::Failure));
    Ok(())
}

#[test]
fn after_targets_do_not_run_when_the_target_fails() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Fail"

[target.Report]
after_targets = "Build"
[[target.Report.steps]]
kind = "task"
name = "Message"
"#,
    )?;
    let tasks = FakeTaskBuilder::new().failing("Fail");
    let mut callbacks = StubCallbacks::new();

    run(&project, &tasks, &mut callbacks, &["Build"])?;

    assert_eq!(tasks.executed_targets(), vec!["Build"]);
    Ok(())
}

#[test]
fn false_condition_skips_target_and_its_dependencies() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[[property_group]]
[[property_group.property]]
name = "Enabled"
value = "false"

[target.Build]
condition = "'$(Enabled)' == 'true'"
depends_on_targets = "Restore"
[[target.Build.steps]]
kind = "task"
name = "Message"

[target.Restore]
[[target.Restore.steps]]
kind = "task"
name = "Message"
"#,
    )?;
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new();

    let (ok, results) = run(&project, &tasks, &mut callbacks, &["Build"])?;

    assert!(ok);
    assert!(tasks.executed().is_empty());
    assert_eq!(results.get("Build").map(|r| r.code()), Some(TargetResultCode::Skipped));
    assert!(callbacks.sink.started_targets().is_empty());
    assert!(callbacks
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, BuildEvent::TargetSkipped { target, .. } if target == "Build")));
    Ok(())
}

#[test]
fn cycle_through_property_dependencies_is_reported_at_run_time() -> TestResult {
    init_tracing();
    // The literal graph has no cycle; it only appears once $(ADeps) expands.
    let project = load_project(
        r#"
[[property_group]]
[[property_group.property]]
name = "ADeps"
value = "B"

[target.A]
depends_on_targets = "$(ADeps)"

[target.B]
depends_on_targets = "A"
"#,
    )?;
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new();

    let err = run(&project, &tasks, &mut callbacks, &["A"]).err().ok_or("expected a cycle error")?;

    assert_eq!(err.code(), Some(codes::CIRCULAR_TARGET_DEPENDENCY));
    Ok(())
}

#[test]
fn missing_target_is_an_invalid_project_error() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.Build]
"#,
    )?;
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new();

    let err = run(&project, &tasks, &mut callbacks, &["Nope"]).err().ok_or("expected an error")?;

    assert_eq!(err.code(), Some(codes::TARGET_NOT_FOUND));
    assert!(err.is_invalid_project());
    Ok(())
}

#[test]
fn literal_cycle_is_rejected_when_loading() -> TestResult {
    init_tracing();
    let err = load_project(
        r#"
[target.A]
depends_on_targets = "B"

[target.B]
depends_on_targets = "A"
"#,
    )
    .err()
    .ok_or("expected the load to fail")?;

    assert_eq!(err.code(), Some(codes::CIRCULAR_TARGET_DEPENDENCY));
    Ok(())
}

#[test]
fn already_built_targets_are_reused() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.Restore]
[[target.Restore.steps]]
kind = "task"
name = "Message"

[target.Build]
depends_on_targets = "Restore"
[[target.Build.steps]]
kind = "task"
name = "Message"
"#,
    )?;
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new();
    let mut results = TargetResults::new();
    let mut lookup = project.create_lookup();

    {
        let mut builder = TargetBuilder::new(Arc::clone(&project), &tasks, &mut callbacks, &mut results);
        assert!(builder.build_targets(&mut lookup, &["Restore".to_string()])?);
        assert!(builder.build_targets(&mut lookup, &["Build".to_string(), "Restore".to_string()])?);
    }

    assert_eq!(tasks.executed_names(), vec!["Restore.Message", "Build.Message"]);
    Ok(())
}

#[test]
fn outputs_are_returned_without_duplicates() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.Build]
outputs = "bin/app.exe;bin/app.exe;bin/app.pdb"

[target.Pack]
outputs = "out/a.nupkg;out/a.nupkg"
keep_duplicate_outputs = true
"#,
    )?;
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new();

    let (_, results) = run(&project, &tasks, &mut callbacks, &["Build", "Pack"])?;

    let build: Vec<&str> = results
        .get("Build")
        .ok_or("no Build result")?
        .items()
        .iter()
        .map(|i| i.item_spec.as_str())
        .collect();
    assert_eq!(build, vec!["bin/app.exe", "bin/app.pdb"]);
    assert_eq!(results.get("Pack").map(|r| r.items().len()), Some(2));
    Ok(())
}

#[test]
fn returns_takes_over_from_outputs() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.Build]
outputs = "bin/app.exe"
returns = "bin/app.dll"

[target.Other]
outputs = "bin/other.exe"
"#,
    )?;
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new().with_output_logging();

    let (_, results) = run(&project, &tasks, &mut callbacks, &["Build", "Other"])?;

    let build = results.get("Build").ok_or("no Build result")?;
    assert_eq!(build.items().len(), 1);
    assert_eq!(build.items()[0].item_spec, "bin/app.dll");
    // Once any target declares returns, the others return nothing.
    assert!(results.get("Other").ok_or("no Other result")?.items().is_empty());

    let logged = callbacks.sink.events().into_iter().find_map(|e| match e {
        BuildEvent::TargetFinished { target, target_outputs, .. } if target == "Build" => target_outputs,
        _ => None,
    });
    assert_eq!(logged.map(|items| items.len()), Some(1));
    Ok(())
}

#[test]
fn target_outputs_are_not_logged_by_default() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.Build]
outputs = "bin/app.exe"
"#,
    )?;
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new();

    run(&project, &tasks, &mut callbacks, &["Build"])?;

    assert!(callbacks.sink.events().iter().all(|e| !matches!(
        e,
        BuildEvent::TargetFinished {
            target_outputs: Some(_),
            ..
        }
    )));
    Ok(())
}

const INCREMENTAL_PROJECT: &str = r#"
[target.Compile]
inputs = "src/main.rs"
outputs = "bin/app"
[[target.Compile.steps]]
kind = "task"
name = "Message"
"#;

fn incremental_project(input_secs: Option<u64>, output_secs: Option<u64>) -> BuildResult<Arc<ProjectInstance>> {
    let fs = mock_fs_with_project(INCREMENTAL_PROJECT);
    if let Some(secs) = input_secs {
        fs.add_file_at("/src/app/src/main.rs", "fn main() {}", secs);
    }
    if let Some(secs) = output_secs {
        fs.add_file_at("/src/app/bin/app", "binary", secs);
    }
    let fs: Arc<dyn FileSystem> = fs;
    Ok(Arc::new(ProjectInstance::load(fs, Path::new(PROJECT_PATH), Default::default(), None)?))
}

#[test]
fn up_to_date_outputs_skip_the_target() -> TestResult {
    init_tracing();
    let project = incremental_project(Some(100), Some(200))?;
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new();

    let (ok, results) = run(&project, &tasks, &mut callbacks, &["Compile"])?;

    assert!(ok);
    assert!(tasks.executed().is_empty());
    let compile = results.get("Compile").ok_or("no Compile result")?;
    assert_eq!(compile.code(), TargetResultCode::Skipped);
    assert_eq!(compile.items().len(), 1);
    Ok(())
}

#[test]
fn stale_or_missing_outputs_run_the_target() -> TestResult {
    init_tracing();
    for (input, output) in [(Some(300), Some(200)), (Some(100), None)] {
        let project = incremental_project(input, output)?;
        let tasks = FakeTaskBuilder::new();
        let mut callbacks = StubCallbacks::new();

        let (ok, results) = run(&project, &tasks, &mut callbacks, &["Compile"])?;

        assert!(ok);
        assert_eq!(tasks.executed_names(), vec!["Compile.Message"]);
        assert_eq!(results.get("Compile").map(|r| r.code()), Some(TargetResultCode::Success));
    }
    Ok(())
}

#[test]
fn property_changes_inside_targets_are_committed() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "property_group"
[[target.Build.steps.property]]
name = "OutDir"
value = "bin/"

[[target.Build.steps]]
kind = "item_group"
[[target.Build.steps.item]]
type = "Built"
include = "$(OutDir)app.exe"
"#,
    )?;
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new();

    run(&project, &tasks, &mut callbacks, &["Build"])?;

    assert_eq!(project.get_property("OutDir").as_deref(), Some("bin/"));
    assert_eq!(project.item_specs("Built"), vec!["bin/app.exe"]);
    Ok(())
}

fn layered_project() -> BuildResult<Arc<ProjectInstance>> {
    let definition = ProjectBuilder::new()
        .default_targets(&["Build"])
        .property("Flavor", "fast")
        .item(builders::item("Src", "a.rs;b.rs", &[("Lang", "rust")]))
        .target("Prep", TargetDefBuilder::new().before("Build").message("prep").build())
        .target(
            "Build",
            TargetDefBuilder::new()
                .condition("'$(Flavor)' == 'fast'")
                .set_property("Out", "bin")
                .add_item(builders::item("Bin", "$(Out)/app", &[]))
                .task(
                    TaskDefBuilder::new("Compile")
                        .param("Sources", "@(Src)")
                        .continue_on_error("false")
                        .build(),
                )
                .on_error("Cleanup")
                .returns("@(Bin)")
                .build(),
        )
        .target("Cleanup", TargetDefBuilder::new().message("cleanup").build())
        .target("Report", TargetDefBuilder::new().after("Build").message("report").build())
        .build();
    let fs: Arc<dyn FileSystem> = mock_fs_with_project("");
    let project =
        ProjectInstance::evaluate(fs, Path::new(PROJECT_PATH), Arc::new(definition), Default::default(), None)?;
    Ok(Arc::new(project))
}

#[test]
fn before_and_after_targets_wrap_a_successful_target() -> TestResult {
    init_tracing();
    let project = layered_project()?;
    assert_eq!(project.item_specs("Src"), vec!["a.rs", "b.rs"]);
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new();

    let (ok, results) = run(&project, &tasks, &mut callbacks, &["Build"])?;

    assert!(ok);
    assert_eq!(
        tasks.executed_names(),
        vec!["Prep.Message", "Build.Compile", "Report.Message"]
    );
    let build = results.get("Build").ok_or("no Build result")?;
    let returned: Vec<&str> = build.items().iter().map(|i| i.item_spec.as_str()).collect();
    assert_eq!(returned, vec!["bin/app"]);
    assert!(!results.contains("Cleanup"));
    Ok(())
}

#[test]
fn a_failing_target_runs_its_error_targets_instead_of_after_targets() -> TestResult {
    init_tracing();
    let project = layered_project()?;
    let tasks = FakeTaskBuilder::new().failing("Compile");
    let mut callbacks = StubCallbacks::new();

    let (ok, results) = run(&project, &tasks, &mut callbacks, &["Build"])?;

    assert!(!ok);
    assert_eq!(
        tasks.executed_names(),
        vec!["Prep.Message", "Build.Compile", "Cleanup.Message"]
    );
    assert_eq!(results.get("Build").map(|r| r.code()), Some(TargetResultCode::Failure));
    assert!(!results.contains("Report"));
    Ok(())
}

const FAILING_BUILD: &str = r#"
[target.Restore]
[[target.Restore.steps]]
kind = "task"
name = "Message"

[target.Build]
depends_on_targets = "Restore"
[[target.Build.steps]]
kind = "task"
name = "Fail"
[[target.Build.steps]]
kind = "on_error"
execute_targets = "Cleanup"

[target.Cleanup]
[[target.Cleanup.steps]]
kind = "task"
name = "Message"
"#;

fn is_internal<T>(result: BuildResult<T>) -> bool {
    matches!(result, Err(BuildError::Internal(_)))
}

fn build_entry(project: &ProjectInstance) -> BuildResult<TargetEntry> {
    let spec = TargetSpecification::new("Build", ElementLocation::new(PROJECT_PATH, "request"));
    TargetEntry::new(project, &spec, None, TargetBuiltReason::None)
}

fn execute(
    entry: &mut TargetEntry,
    project: &Arc<ProjectInstance>,
    tasks: &FakeTaskBuilder,
    callbacks: &mut StubCallbacks,
    results: &mut TargetResults,
    lookup: &mut Lookup,
) -> BuildResult<()> {
    let mut services = TargetServices {
        project,
        task_builder: tasks,
        callbacks,
        results,
        active_targets: vec![entry.name().to_string()],
    };
    entry.execute_target(&mut services, lookup)
}

#[test]
fn target_entry_rejects_every_out_of_order_call() -> TestResult {
    init_tracing();
    let project = load_project(FAILING_BUILD)?;
    let tasks = FakeTaskBuilder::new().failing("Fail");
    let mut callbacks = StubCallbacks::new();
    let mut results = TargetResults::new();
    let mut lookup = project.create_lookup();
    let mut entry = build_entry(&project)?;

    assert_eq!(entry.state(), TargetEntryState::Dependencies);
    assert!(is_internal(execute(&mut entry, &project, &tasks, &mut callbacks, &mut results, &mut lookup)));
    assert!(is_internal(entry.mark_dependency_failed()));
    assert!(is_internal(entry.get_error_targets()));
    assert!(is_internal(entry.gather_results(&project, &lookup)));
    assert_eq!(entry.state(), TargetEntryState::Dependencies);
    assert!(tasks.executed_names().is_empty());

    let dependencies = entry.get_dependencies(&project, &lookup)?;
    assert_eq!(dependencies.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(), vec!["Restore"]);
    assert_eq!(entry.state(), TargetEntryState::Execution);
    assert!(is_internal(entry.get_dependencies(&project, &lookup)));
    assert!(is_internal(entry.get_error_targets()));
    assert!(is_internal(entry.gather_results(&project, &lookup)));
    assert_eq!(entry.state(), TargetEntryState::Execution);

    execute(&mut entry, &project, &tasks, &mut callbacks, &mut results, &mut lookup)?;
    assert_eq!(entry.state(), TargetEntryState::ErrorExecution);
    assert_eq!(tasks.executed_names(), vec!["Build.Fail"]);
    assert!(is_internal(execute(&mut entry, &project, &tasks, &mut callbacks, &mut results, &mut lookup)));
    assert!(is_internal(entry.get_dependencies(&project, &lookup)));
    assert!(is_internal(entry.mark_dependency_failed()));
    assert!(is_internal(entry.gather_results(&project, &lookup)));
    assert_eq!(entry.state(), TargetEntryState::ErrorExecution);

    let error_targets = entry.get_error_targets()?;
    assert_eq!(error_targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["Cleanup"]);
    assert_eq!(entry.state(), TargetEntryState::Completed);
    assert!(is_internal(entry.get_error_targets()));
    assert!(is_internal(entry.get_dependencies(&project, &lookup)));
    assert!(is_internal(entry.mark_dependency_failed()));
    assert!(is_internal(execute(&mut entry, &project, &tasks, &mut callbacks, &mut results, &mut lookup)));

    assert_eq!(entry.gather_results(&project, &lookup)?.code(), TargetResultCode::Failure);
    assert_eq!(tasks.executed_names(), vec!["Build.Fail"]);
    Ok(())
}

#[test]
fn failed_dependency_completes_the_entry_without_running_it() -> TestResult {
    init_tracing();
    let project = load_project(FAILING_BUILD)?;
    let tasks = FakeTaskBuilder::new();
    let mut callbacks = StubCallbacks::new();
    let mut results = TargetResults::new();
    let mut lookup = project.create_lookup();
    let mut entry = build_entry(&project)?;

    entry.get_dependencies(&project, &lookup)?;
    entry.mark_dependency_failed()?;
    assert_eq!(entry.state(), TargetEntryState::Completed);
    assert!(is_internal(entry.mark_dependency_failed()));
    assert!(is_internal(execute(&mut entry, &project, &tasks, &mut callbacks, &mut results, &mut lookup)));
    assert_eq!(entry.gather_results(&project, &lookup)?.code(), TargetResultCode::Failure);
    assert!(tasks.executed_names().is_empty());
    Ok(())
}

#[test]
fn false_condition_skips_straight_to_completed() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[target.Build]
condition = "'$(Enabled)' == 'true'"
depends_on_targets = "Restore"
[[target.Build.steps]]
kind = "task"
name = "Message"
"#,
    )?;
    let lookup = project.create_lookup();
    let mut entry = build_entry(&project)?;

    assert!(entry.get_dependencies(&project, &lookup)?.is_empty());
    assert_eq!(entry.state(), TargetEntryState::Completed);
    assert!(is_internal(entry.mark_dependency_failed()));
    assert_eq!(entry.gather_results(&project, &lookup)?.code(), TargetResultCode::Skipped);
    Ok(())
}
