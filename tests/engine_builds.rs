mod common;

use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use buildforge::config::BuildSettings;
use buildforge::engine::{merge_global_properties, BuildManager, BuildSubmission};
use buildforge::errors::{codes, BuildError};
use buildforge::events::BuildEvent;
use buildforge::fs::mock::MockFileSystem;
use buildforge::protocol::ProjectInvocation;
use buildforge::request::BuildResultCode;
use common::{init_tracing, mock_fs_with_project, FakeTaskBuilder, RecordingEventSink, PROJECT_PATH};

type TestResult = Result<(), Box<dyn Error>>;

const LIB_PATH: &str = "/src/app/lib/lib.proj";

const LIB_PROJECT: &str = r#"
[[property_group]]
[[property_group.property]]
name = "Configuration"
value = "Debug"
condition = "'$(Configuration)' == ''"

[target.Build]
outputs = "bin/$(Configuration)/lib.dll"
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Text = "lib: $(Configuration)" }
"#;

fn manager(fs: Arc<MockFileSystem>, sink: &RecordingEventSink) -> BuildManager {
    BuildManager::new(BuildSettings::default(), fs, Arc::new(sink.clone()))
}

#[test]
fn msbuild_task_builds_child_projects_with_properties() -> TestResult {
    init_tracing();
    let fs = mock_fs_with_project(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "MSBuild"
parameters = { Projects = "lib/lib.proj", Properties = "Configuration=Release" }
output = [{ task_parameter = "TargetOutputs", item_name = "Libs" }]
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Text = "got @(Libs) from %(Libs.MSBuildSourceTargetName)" }
"#,
    );
    fs.add_file(LIB_PATH, LIB_PROJECT);
    let sink = RecordingEventSink::new();
    let manager = manager(fs, &sink);

    let result = manager.build_blocking(BuildSubmission::new(PROJECT_PATH).with_targets(["Build"]))?;

    assert!(result.succeeded(), "errors: {:?}", sink.errors());
    let messages = sink.messages();
    assert!(messages.contains(&"lib: Release".to_string()));
    assert!(messages.contains(&"got bin/Release/lib.dll from Build".to_string()));
    assert_eq!(manager.configuration_count(), 2);
    Ok(())
}

#[test]
fn child_failure_fails_the_msbuild_task() -> TestResult {
    init_tracing();
    let fs = mock_fs_with_project(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "MSBuild"
parameters = { Projects = "lib/lib.proj" }
"#,
    );
    fs.add_file(
        LIB_PATH,
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Error"
parameters = { Text = "lib is broken", Code = "LIB001" }
"#,
    );
    let sink = RecordingEventSink::new();

    let result = manager(fs, &sink).build_blocking(BuildSubmission::new(PROJECT_PATH))?;

    assert_eq!(result.overall_result(), BuildResultCode::Failure);
    assert_eq!(sink.error_codes(), vec!["LIB001"]);
    Ok(())
}

#[test]
fn project_building_itself_is_a_circular_reference() -> TestResult {
    init_tracing();
    let fs = mock_fs_with_project(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "MSBuild"
parameters = { Projects = "app.proj", Targets = "Other" }

[target.Other]
"#,
    );
    let sink = RecordingEventSink::new();

    let result = manager(fs, &sink).build_blocking(BuildSubmission::new(PROJECT_PATH).with_targets(["Build"]))?;

    assert!(!result.succeeded());
    assert!(sink.error_codes().contains(&codes::CIRCULAR_PROJECT_REFERENCE.to_string()));
    Ok(())
}

#[test]
fn missing_child_project_is_reported_as_a_failed_child() -> TestResult {
    init_tracing();
    let fs = mock_fs_with_project(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "MSBuild"
parameters = { Projects = "nowhere/none.proj" }
"#,
    );
    let sink = RecordingEventSink::new();

    let result = manager(fs, &sink).build_blocking(BuildSubmission::new(PROJECT_PATH))?;

    assert!(!result.succeeded());
    Ok(())
}

#[test]
fn results_cache_serves_repeated_child_requests() -> TestResult {
    init_tracing();
    let fs = mock_fs_with_project(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "MSBuild"
parameters = { Projects = "lib/lib.proj", Targets = "Build", UseResultsCache = "true" }
output = [{ task_parameter = "TargetOutputs", item_name = "First" }]
[[target.Build.steps]]
kind = "task"
name = "MSBuild"
parameters = { Projects = "lib/lib.proj", Targets = "Build", UseResultsCache = "true" }
output = [{ task_parameter = "TargetOutputs", item_name = "Second" }]
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Text = "@(First) | @(Second)" }
"#,
    );
    fs.add_file(LIB_PATH, LIB_PROJECT);
    let sink = RecordingEventSink::new();

    let result = manager(fs, &sink).build_blocking(BuildSubmission::new(PROJECT_PATH))?;

    assert!(result.succeeded(), "errors: {:?}", sink.errors());
    let messages = sink.messages();
    assert_eq!(messages.iter().filter(|m| m.as_str() == "lib: Debug").count(), 1);
    assert!(messages.contains(&"bin/Debug/lib.dll | bin/Debug/lib.dll".to_string()));
    Ok(())
}

#[test]
fn second_submission_reuses_target_results() -> TestResult {
    init_tracing();
    let fs = mock_fs_with_project(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Message"
"#,
    );
    let sink = RecordingEventSink::new();
    let tasks = FakeTaskBuilder::new();
    let manager = BuildManager::with_task_builder(
        BuildSettings::default(),
        fs,
        Arc::new(sink.clone()),
        Arc::new(tasks.clone()),
    );

    manager.build_blocking(BuildSubmission::new(PROJECT_PATH))?;
    manager.build_blocking(BuildSubmission::new(PROJECT_PATH))?;
    assert_eq!(tasks.executed().len(), 1);
    assert_eq!(manager.configuration_count(), 1);

    // Different global properties make a different configuration.
    manager.build_blocking(BuildSubmission::new(PROJECT_PATH).with_property("Configuration", "Release"))?;
    assert_eq!(tasks.executed().len(), 2);
    assert_eq!(manager.configuration_count(), 2);
    Ok(())
}

#[test]
fn initial_targets_run_before_requested_targets() -> TestResult {
    init_tracing();
    let fs = mock_fs_with_project(
        r#"
[project]
initial_targets = ["Check"]
default_targets = ["Build"]

[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Message"

[target.Check]
[[target.Check.steps]]
kind = "task"
name = "Message"
"#,
    );
    let sink = RecordingEventSink::new();
    let tasks = FakeTaskBuilder::new();
    let manager = BuildManager::with_task_builder(
        BuildSettings::default(),
        fs,
        Arc::new(sink.clone()),
        Arc::new(tasks.clone()),
    );

    let result = manager.build_blocking(BuildSubmission::new(PROJECT_PATH))?;

    assert!(result.succeeded());
    assert_eq!(tasks.executed_targets(), vec!["Check", "Build"]);
    assert_eq!(result.initial_targets(), ["Check".to_string()]);
    assert_eq!(result.default_targets(), ["Build".to_string()]);
    Ok(())
}

#[test]
fn invalid_project_becomes_an_error_result() -> TestResult {
    init_tracing();
    let fs = mock_fs_with_project(
        r#"
[target.A]
depends_on_targets = "Missing"
"#,
    );
    let sink = RecordingEventSink::new();

    let result = manager(fs, &sink).build_blocking(BuildSubmission::new(PROJECT_PATH))?;

    assert!(!result.succeeded());
    assert!(result.error().is_some());
    assert_eq!(sink.error_codes(), vec![codes::TARGET_NOT_FOUND]);
    Ok(())
}

#[test]
fn project_events_bracket_the_build() -> TestResult {
    init_tracing();
    let fs = mock_fs_with_project(
        r#"
[target.Build]
"#,
    );
    let sink = RecordingEventSink::new();

    manager(fs, &sink).build_blocking(BuildSubmission::new(PROJECT_PATH).with_property("Flavor", "fast"))?;

    let events = sink.events();
    match events.first() {
        Some(BuildEvent::ProjectStarted {
            project_file,
            global_properties,
            ..
        }) => {
            assert_eq!(project_file, PROJECT_PATH);
            assert_eq!(global_properties.get("Flavor").map(String::as_str), Some("fast"));
        }
        other => panic!("expected ProjectStarted first, got {other:?}"),
    }
    assert!(matches!(
        events.last(),
        Some(BuildEvent::ProjectFinished { succeeded: true, .. })
    ));
    Ok(())
}

#[test]
fn merge_global_properties_removes_then_overrides() {
    let inherited: BTreeMap<String, String> = [
        ("Configuration".to_string(), "Debug".to_string()),
        ("Platform".to_string(), "x64".to_string()),
        ("Trace".to_string(), "on".to_string()),
    ]
    .into_iter()
    .collect();
    let invocation = ProjectInvocation {
        project_file: "lib.proj".to_string(),
        global_properties: Some([("configuration".to_string(), "Release".to_string())].into_iter().collect()),
        remove_global_properties: vec![" trace ".to_string()],
        tools_version: None,
    };

    let merged = merge_global_properties(&inherited, &invocation);

    assert_eq!(merged.len(), 2);
    assert_eq!(merged.get("configuration").map(String::as_str), Some("Release"));
    assert!(!merged.contains_key("Configuration"));
    assert_eq!(merged.get("Platform").map(String::as_str), Some("x64"));
}

#[tokio::test]
async fn async_build_and_cancellation() -> TestResult {
    init_tracing();
    let fs = mock_fs_with_project(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Text = "async" }
"#,
    );
    let sink = RecordingEventSink::new();
    let manager = manager(fs, &sink);

    let result = buildforge_test_utils::with_timeout(manager.build(BuildSubmission::new(PROJECT_PATH))).await?;
    assert!(result.succeeded());
    assert!(sink.messages().contains(&"async".to_string()));

    manager.cancel();
    let err = manager
        .build(BuildSubmission::new(Path::new(PROJECT_PATH)))
        .await
        .err()
        .ok_or("expected the cancelled build to fail")?;
    assert!(matches!(err, BuildError::Cancelled));

    manager.shutdown().await?;
    Ok(())
}
