mod common;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use buildforge::config::BuildSettings;
use buildforge::engine::{BuildManager, BuildSubmission};
use buildforge::errors::codes;
use buildforge::request::BuildResult;
use common::{init_tracing, mock_fs_with_project, RecordingEventSink, PROJECT_PATH};

type TestResult = Result<(), Box<dyn Error>>;

fn build(toml: &str, targets: &[&str]) -> Result<(BuildResult, RecordingEventSink), Box<dyn Error>> {
    let fs = mock_fs_with_project(toml);
    let sink = RecordingEventSink::new();
    let manager = BuildManager::new(BuildSettings::default(), fs, Arc::new(sink.clone()));
    let submission = BuildSubmission::new(Path::new(PROJECT_PATH)).with_targets(targets.iter().copied());
    let result = manager.build_blocking(submission)?;
    Ok((result, sink))
}

#[test]
fn message_task_logs_expanded_text() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[[property_group]]
[[property_group.property]]
name = "Configuration"
value = "Release"

[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Text = "Building $(Configuration)", Importance = "high" }
"#,
        &["Build"],
    )?;

    assert!(result.succeeded());
    assert!(sink.messages().contains(&"Building Release".to_string()));
    Ok(())
}

#[test]
fn error_task_fails_and_stops_the_target() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Error"
parameters = { Text = "boom", Code = "APP001" }
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Text = "after the error" }
"#,
        &["Build"],
    )?;

    assert!(!result.succeeded());
    assert_eq!(sink.error_codes(), vec!["APP001"]);
    assert!(!sink.messages().contains(&"after the error".to_string()));
    Ok(())
}

#[test]
fn warn_and_continue_turns_failure_into_a_warning() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Error"
continue_on_error = true
parameters = { Text = "boom" }
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Text = "last result: $(MSBuildLastTaskResult)" }
"#,
        &["Build"],
    )?;

    assert!(result.succeeded());
    assert!(sink.warnings().iter().any(|w| w.contains("ContinueOnError")));
    assert!(sink.messages().contains(&"last result: false".to_string()));
    Ok(())
}

#[test]
fn error_and_continue_runs_later_tasks_but_fails_the_target() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Error"
continue_on_error = "ErrorAndContinue"
parameters = { Text = "boom" }
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Text = "still running" }
"#,
        &["Build"],
    )?;

    assert!(!result.succeeded());
    assert!(sink.messages().contains(&"still running".to_string()));
    Ok(())
}

#[test]
fn invalid_continue_on_error_value_is_rejected() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Message"
continue_on_error = "maybe"
parameters = { Text = "hi" }
"#,
        &["Build"],
    )?;

    assert!(!result.succeeded());
    assert_eq!(sink.error_codes(), vec![codes::INVALID_ATTRIBUTE_VALUE]);
    Ok(())
}

#[test]
fn unknown_task_is_reported() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Frobnicate"
"#,
        &["Build"],
    )?;

    assert!(!result.succeeded());
    assert_eq!(sink.error_codes(), vec![codes::TASK_NOT_FOUND]);
    Ok(())
}

#[test]
fn unknown_and_missing_parameters_are_reported() -> TestResult {
    init_tracing();
    let (_, sink) = build(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Txt = "typo" }
"#,
        &["Build"],
    )?;
    assert_eq!(sink.error_codes(), vec![codes::UNKNOWN_TASK_PARAMETER]);

    let (_, sink) = build(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Exec"
"#,
        &["Build"],
    )?;
    assert_eq!(sink.error_codes(), vec![codes::MISSING_REQUIRED_PARAMETER]);
    Ok(())
}

#[test]
fn false_task_condition_skips_the_task() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Error"
condition = "'$(Strict)' == 'true'"
parameters = { Text = "strict mode" }
"#,
        &["Build"],
    )?;

    assert!(result.succeeded());
    assert!(sink.errors().is_empty());
    Ok(())
}

const INLINE_GREETER: &str = r#"
[[using_task]]
task_name = "Greet"
task_factory = "RoslynCodeTaskFactory"
assembly_file = "tasks.dll"

[using_task.parameter_group.Name]
required = true

[using_task.parameter_group.Greeting]
output = true

[using_task.parameter_group.Files]
type = "ITaskItem[]"
output = true

[using_task.task]
contents = """
log.high: greeting {Name}
Greeting = Hello, {Name}!
Files = {Name}.txt;{Name}.md
"""
"#;

#[test]
fn inline_task_outputs_bind_to_properties_and_items() -> TestResult {
    init_tracing();
    let project = format!(
        r#"{INLINE_GREETER}
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Greet"
parameters = {{ Name = "World" }}
output = [
  {{ task_parameter = "Greeting", property_name = "Message" }},
  {{ task_parameter = "Files", item_name = "Generated" }},
]
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = {{ Text = "$(Message) @(Generated)" }}
"#
    );
    let (result, sink) = build(&project, &["Build"])?;

    assert!(result.succeeded(), "errors: {:?}", sink.errors());
    let messages = sink.messages();
    assert!(messages.contains(&"greeting World".to_string()));
    assert!(messages.contains(&"Hello, World! World.txt;World.md".to_string()));
    Ok(())
}

#[test]
fn output_naming_both_an_item_and_a_property_is_rejected() -> TestResult {
    init_tracing();
    let project = format!(
        r#"{INLINE_GREETER}
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Greet"
parameters = {{ Name = "World" }}
output = [{{ task_parameter = "Greeting", property_name = "P", item_name = "I" }}]
"#
    );
    let (result, sink) = build(&project, &["Build"])?;

    assert!(!result.succeeded());
    assert_eq!(sink.error_codes(), vec![codes::MUTUALLY_EXCLUSIVE_ATTRIBUTES]);
    Ok(())
}

#[test]
fn task_outputs_cannot_overwrite_reserved_properties() -> TestResult {
    init_tracing();
    let project = format!(
        r#"{INLINE_GREETER}
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Greet"
parameters = {{ Name = "World" }}
output = [{{ task_parameter = "Greeting", property_name = "MSBuildProjectFile" }}]
"#
    );
    let (result, sink) = build(&project, &["Build"])?;

    assert!(!result.succeeded());
    assert_eq!(sink.error_codes(), vec![codes::RESERVED_PROPERTY]);
    Ok(())
}

#[test]
fn inline_error_line_fails_the_task() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[[using_task]]
task_name = "Check"
task_factory = "CodeTaskFactory"

[using_task.parameter_group.Value]

[using_task.task]
contents = """
warn: checking {Value}
error: {Value} is not allowed
"""

[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Check"
parameters = { Value = "x" }
"#,
        &["Build"],
    )?;

    assert!(!result.succeeded());
    assert_eq!(sink.warnings(), vec!["checking x"]);
    assert!(sink
        .errors()
        .iter()
        .any(|e| matches!(e, buildforge::events::BuildEvent::Error { text, .. } if text == "x is not allowed")));
    Ok(())
}

#[test]
fn assigning_an_input_parameter_in_an_inline_body_is_invalid() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[[using_task]]
task_name = "Broken"
task_factory = "RoslynCodeTaskFactory"

[using_task.parameter_group.Value]

[using_task.task]
contents = "Value = overwritten"

[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Broken"
"#,
        &["Build"],
    )?;

    assert!(!result.succeeded());
    assert_eq!(sink.error_codes(), vec![codes::INVALID_TASK_BODY]);
    Ok(())
}

#[test]
fn call_target_returns_the_called_targets_outputs() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "CallTarget"
parameters = { Targets = "Helper" }
output = [{ task_parameter = "TargetOutputs", item_name = "Called" }]
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Text = "called: @(Called)" }

[target.Helper]
outputs = "helper.out"
[[target.Helper.steps]]
kind = "task"
name = "Message"
parameters = { Text = "in helper" }
"#,
        &["Build"],
    )?;

    assert!(result.succeeded());
    let messages = sink.messages();
    assert!(messages.contains(&"in helper".to_string()));
    assert!(messages.contains(&"called: helper.out".to_string()));
    Ok(())
}

fn sightings(sink: &RecordingEventSink) -> Vec<String> {
    sink.messages().into_iter().filter(|m| m.contains(" sees ")).collect()
}

#[test]
fn call_target_changes_reach_later_calls_and_later_targets_but_not_the_caller() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "CallTarget"
parameters = { Targets = "SetFlag" }
[[target.Build.steps]]
kind = "task"
name = "CallTarget"
parameters = { Targets = "ReadFlag" }
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Text = "caller sees [$(FromA)]" }

[target.SetFlag]
[[target.SetFlag.steps]]
kind = "property_group"
[[target.SetFlag.steps.property]]
name = "FromA"
value = "1"

[target.ReadFlag]
[[target.ReadFlag.steps]]
kind = "task"
name = "Message"
parameters = { Text = "B sees [$(FromA)]" }

[target.After]
after_targets = "Build"
[[target.After.steps]]
kind = "task"
name = "Message"
parameters = { Text = "after sees [$(FromA)]" }
"#,
        &["Build"],
    )?;

    assert!(result.succeeded());
    assert_eq!(sightings(&sink), vec!["B sees [1]", "caller sees []", "after sees [1]"]);
    Ok(())
}

#[test]
fn each_target_bucket_sees_only_its_own_items() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[[item_group]]
[[item_group.item]]
type = "Src"
include = "a.c;b.c"

[target.Compile]
inputs = "@(Src)"
outputs = "%(Src.Filename).o"
[[target.Compile.steps]]
kind = "task"
name = "Message"
parameters = { Text = "bucket sees [@(Src)] made [@(Made)]" }
[[target.Compile.steps]]
kind = "item_group"
[[target.Compile.steps.item]]
type = "Made"
include = "made"

[target.Build]
depends_on_targets = "Compile"
[[target.Build.steps]]
kind = "task"
name = "Message"
parameters = { Text = "after sees [@(Made)]" }
"#,
        &["Build"],
    )?;

    assert!(result.succeeded());
    assert_eq!(
        sightings(&sink),
        vec!["bucket sees [a.c] made []", "bucket sees [b.c] made []", "after sees [made;made]"]
    );
    Ok(())
}

#[test]
fn unsupported_task_host_runtime_is_rejected() -> TestResult {
    init_tracing();
    let (result, sink) = build(
        r#"
[target.Build]
[[target.Build.steps]]
kind = "task"
name = "Message"
runtime = "CLR2"
parameters = { Text = "old runtime" }
"#,
        &["Build"],
    )?;

    assert!(!result.succeeded());
    assert_eq!(sink.error_codes(), vec![codes::UNSUPPORTED_TASK_HOST_RUNTIME]);
    Ok(())
}
