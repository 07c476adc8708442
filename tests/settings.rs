use std::error::Error;
use std::io::Write;

use buildforge::config::{load_and_validate, load_from_str, resolve_settings, BuildSettings, RawSettingsFile};
use buildforge::errors::BuildError;
use buildforge::types::TaskHostRuntime;
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

fn settings_file(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    write!(file, "{contents}")?;
    Ok(file)
}

#[test]
fn empty_file_gives_defaults() -> TestResult {
    let settings = BuildSettings::try_from(load_from_str("")?)?;

    assert!(!settings.multi_threaded);
    assert!(!settings.disable_in_proc_node);
    assert!(!settings.target_output_logging);
    assert_eq!(settings.default_tools_version, "Current");
    assert_eq!(settings.supported_runtimes, vec![TaskHostRuntime::Net, TaskHostRuntime::Clr4]);
    assert!(settings.thread_safe_tasks.is_task_thread_safe(Some("Message")));
    Ok(())
}

#[test]
fn file_settings_are_loaded_and_validated() -> TestResult {
    let file = settings_file(
        r#"
[build]
multi_threaded = true
target_output_logging = true
default_tools_version = " 17.0 "

[task_host]
thread_safe_tasks = ["Copy", "Touch"]
supported_runtimes = ["NET", "CLR2"]
"#,
    )?;

    let settings = load_and_validate(file.path())?;

    assert!(settings.multi_threaded);
    assert!(settings.target_output_logging);
    assert_eq!(settings.default_tools_version, "17.0");
    assert_eq!(settings.supported_runtimes, vec![TaskHostRuntime::Net, TaskHostRuntime::Clr2]);
    assert!(settings.thread_safe_tasks.is_task_thread_safe(Some("copy")));
    assert!(settings.thread_safe_tasks.is_task_thread_safe(Some("MSBuild")));
    assert!(!settings.thread_safe_tasks.is_task_thread_safe(Some("Exec")));

    let provider = settings.node_provider();
    assert!(provider.is_multi_threaded());
    assert!(!provider.is_out_of_proc());
    assert!(!provider.should_task_execute_out_of_proc(Some("Touch")));
    assert!(provider.should_task_execute_out_of_proc(Some("Exec")));
    Ok(())
}

#[test]
fn invalid_settings_are_config_errors() -> TestResult {
    let cases = [
        "[build]\ndefault_tools_version = \"  \"\n",
        "[task_host]\nthread_safe_tasks = [\"Copy\", \" \"]\n",
        "[task_host]\nsupported_runtimes = []\n",
        "[task_host]\nsupported_runtimes = [\"CLR9\"]\n",
    ];
    for contents in cases {
        let raw: RawSettingsFile = load_from_str(contents)?;
        match BuildSettings::try_from(raw) {
            Err(BuildError::ConfigError(_)) => {}
            Err(e) => panic!("expected a ConfigError for {contents:?}, got {e:?}"),
            Ok(_) => panic!("expected {contents:?} to be rejected"),
        }
    }
    Ok(())
}

#[test]
fn malformed_toml_is_a_parse_error() -> TestResult {
    let file = settings_file("[build\nmulti_threaded = yes\n")?;

    match load_and_validate(file.path()) {
        Err(BuildError::TomlError(_)) => Ok(()),
        other => Err(format!("expected a TOML error, got {other:?}").into()),
    }
}

#[test]
fn missing_explicit_file_is_an_io_error() {
    let result = resolve_settings(Some(std::path::Path::new("/nonexistent/buildforge.toml")));
    assert!(matches!(result, Err(BuildError::IoError(_))));
}

#[test]
fn explicit_file_is_used_by_resolve_settings() -> TestResult {
    let file = settings_file("[build]\ndisable_in_proc_node = true\n")?;

    let settings = resolve_settings(Some(file.path()))?;

    assert!(settings.disable_in_proc_node);
    assert!(settings.node_provider().is_out_of_proc());
    Ok(())
}

#[test]
fn environment_value_switches_output_logging_on() {
    let enabled = |value: Option<&str>| {
        BuildSettings::default()
            .with_target_output_logging_env(value)
            .target_output_logging
    };

    assert!(enabled(Some("1")));
    assert!(enabled(Some("true")));
    assert!(!enabled(Some("0")));
    assert!(!enabled(Some("FALSE")));
    assert!(!enabled(Some("  ")));
    assert!(!enabled(None));

    // The overlay never switches a file setting off.
    let from_file = BuildSettings {
        target_output_logging: true,
        ..BuildSettings::default()
    };
    assert!(from_file.with_target_output_logging_env(Some("0")).target_output_logging);
}
