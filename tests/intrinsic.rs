mod common;

use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use buildforge::errors::{codes, ElementLocation};
use buildforge::fs::FileSystem;
use buildforge::intrinsic::{execute_item_group, IntrinsicContext};
use buildforge::project::model::ItemGroupDefinition;
use buildforge::project::ProjectInstance;
use common::{init_tracing, load_project, mock_fs_with_project, PROJECT_PATH};

type TestResult = Result<(), Box<dyn Error>>;

fn load_error_code(toml: &str) -> Result<Option<&'static str>, Box<dyn Error>> {
    init_tracing();
    let err = load_project(toml).err().ok_or("expected the project to be rejected")?;
    Ok(err.code())
}

#[test]
fn properties_see_earlier_properties_and_respect_conditions() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[[property_group]]
[[property_group.property]]
name = "Configuration"
value = "Debug"
[[property_group.property]]
name = "OutDir"
value = "bin/$(Configuration)/"
[[property_group.property]]
name = "Optimize"
value = "true"
condition = "'$(Configuration)' == 'Release'"

[[property_group]]
condition = "'$(Configuration)' == 'Debug'"
[[property_group.property]]
name = "DebugSymbols"
value = "full"
"#,
    )?;

    assert_eq!(project.get_property("OutDir").as_deref(), Some("bin/Debug/"));
    assert_eq!(project.get_property("Optimize"), None);
    assert_eq!(project.get_property("DebugSymbols").as_deref(), Some("full"));
    assert_eq!(project.get_property("MSBuildProjectName").as_deref(), Some("app"));
    Ok(())
}

#[test]
fn global_properties_are_not_overridden() -> TestResult {
    init_tracing();
    let fs: Arc<dyn FileSystem> = mock_fs_with_project(
        r#"
[[property_group]]
[[property_group.property]]
name = "Configuration"
value = "Debug"
"#,
    );
    let globals: BTreeMap<String, String> = [("Configuration".to_string(), "Release".to_string())].into();

    let project = ProjectInstance::load(fs, Path::new(PROJECT_PATH), globals, None)?;

    assert_eq!(project.get_property("Configuration").as_deref(), Some("Release"));
    Ok(())
}

#[test]
fn reserved_and_malformed_property_names_are_rejected() -> TestResult {
    let reserved = load_error_code(
        r#"
[[property_group]]
[[property_group.property]]
name = "MSBuildProjectFile"
value = "other.proj"
"#,
    )?;
    assert_eq!(reserved, Some(codes::RESERVED_PROPERTY));

    let malformed = load_error_code(
        r#"
[[property_group]]
[[property_group.property]]
name = "1st"
value = "x"
"#,
    )?;
    assert_eq!(malformed, Some(codes::INVALID_CHILD_ELEMENT));
    Ok(())
}

#[test]
fn item_groups_include_exclude_and_remove() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[[item_group]]
[[item_group.item]]
type = "Compile"
include = "src/main.rs;src/lib.rs;src/gen/schema.rs;tests/it.rs"
exclude = "src/gen/*.rs"
[[item_group.item]]
type = "Compile"
include = "src/main.rs"
keep_duplicates = false
[[item_group.item]]
type = "Compile"
remove = "tests/*"
"#,
    )?;

    assert_eq!(project.item_specs("Compile"), vec!["src/main.rs", "src/lib.rs"]);
    Ok(())
}

#[test]
fn item_metadata_is_evaluated_per_item() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[[item_group]]
[[item_group.item]]
type = "Source"
include = "a.c;b.rs"
[[item_group.item.metadata]]
name = "Lang"
value = "c"
condition = "'%(Extension)' == '.c'"
[[item_group.item.metadata]]
name = "Lang"
value = "rust"
condition = "'%(Extension)' == '.rs'"
"#,
    )?;

    let state = project.state();
    let langs: Vec<String> = state.items_of("Source").iter().map(|i| i.get_metadata("Lang")).collect();
    assert_eq!(langs, vec!["c", "rust"]);
    Ok(())
}

#[test]
fn remove_can_match_on_metadata_of_one_item_list() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[[item_group]]
[[item_group.item]]
type = "Package"
include = "serde;tokio;regex"
[[item_group.item]]
type = "Banned"
include = "TOKIO"

[[item_group]]
[[item_group.item]]
type = "Package"
remove = "@(Banned)"
match_on_metadata = "Identity"
match_on_metadata_options = "CaseInsensitive"
"#,
    )?;

    assert_eq!(project.item_specs("Package"), vec!["serde", "regex"]);

    let code = load_error_code(
        r#"
[[item_group]]
[[item_group.item]]
type = "Package"
remove = "@(Banned);@(Other)"
match_on_metadata = "Identity"
"#,
    )?;
    assert_eq!(code, Some(codes::INVALID_ITEM_OPERATION));
    Ok(())
}

#[test]
fn malformed_item_elements_are_rejected() -> TestResult {
    let cases = [
        (
            "include = \"a\"\nremove = \"b\"",
            codes::MUTUALLY_EXCLUSIVE_ATTRIBUTES,
        ),
        ("exclude = \"a\"\nremove = \"b\"", codes::INVALID_ITEM_OPERATION),
        ("include = \"  \"", codes::MISSING_ATTRIBUTE),
        // A bare element only modifies items inside a target.
        ("condition = \"true\"", codes::MISSING_ATTRIBUTE),
    ];
    for (attributes, expected) in cases {
        let code = load_error_code(&format!(
            "[[item_group]]\n[[item_group.item]]\ntype = \"Thing\"\n{attributes}\n"
        ))?;
        assert_eq!(code, Some(expected), "{attributes}");
    }
    Ok(())
}

#[test]
fn metadata_is_not_allowed_outside_targets() -> TestResult {
    let code = load_error_code(
        r#"
[[property_group]]
condition = "'%(Lang)' == 'c'"
[[property_group.property]]
name = "X"
value = "y"
"#,
    )?;
    assert_eq!(code, Some(codes::METADATA_NOT_ALLOWED));
    Ok(())
}

#[test]
fn choose_takes_the_first_matching_branch() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[[property_group]]
[[property_group.property]]
name = "Platform"
value = "arm64"

[[choose]]
[[choose.when]]
condition = "'$(Platform)' == 'x64'"
[[choose.when.property_group]]
[[choose.when.property_group.property]]
name = "Arch"
value = "amd64"

[[choose.when]]
condition = "'$(Platform)' == 'arm64'"
[[choose.when.property_group]]
[[choose.when.property_group.property]]
name = "Arch"
value = "aarch64"
[[choose.when.item_group]]
[[choose.when.item_group.item]]
type = "Runtime"
include = "$(Arch)-linux"

[choose.otherwise]
[[choose.otherwise.property_group]]
[[choose.otherwise.property_group.property]]
name = "Arch"
value = "unknown"
"#,
    )?;

    assert_eq!(project.get_property("Arch").as_deref(), Some("aarch64"));
    assert_eq!(project.item_specs("Runtime"), vec!["aarch64-linux"]);
    Ok(())
}

#[test]
fn choose_without_when_is_invalid() -> TestResult {
    let code = load_error_code(
        r#"
[[choose]]
[choose.otherwise]
"#,
    )?;
    assert_eq!(code, Some(codes::INVALID_CHILD_ELEMENT));
    Ok(())
}

#[test]
fn bare_item_element_inside_a_target_batches_over_metadata() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[[item_group]]
[[item_group.item]]
type = "Source"
include = "a.c;b.rs;c.rs"
[[item_group.item.metadata]]
name = "Lang"
value = "%(Extension)"
"#,
    )?;
    let group: ItemGroupDefinition = toml::from_str(
        r#"
[[item]]
type = "Source"
condition = "'%(Lang)' == '.rs'"
[[item.metadata]]
name = "Tool"
value = "cargo"
"#,
    )?;

    let mut lookup = project.create_lookup();
    let ctx = IntrinsicContext::target(project.file_system().as_ref(), project.directory());
    execute_item_group(&group, &mut lookup, &ctx, &ElementLocation::new(PROJECT_PATH, "target 'Build'"))?;

    let tools: Vec<(String, String)> = lookup
        .get_items("Source")
        .iter()
        .map(|i| (i.include().to_string(), i.get_metadata("Tool")))
        .collect();
    assert_eq!(
        tools,
        vec![
            ("a.c".to_string(), String::new()),
            ("b.rs".to_string(), "cargo".to_string()),
            ("c.rs".to_string(), "cargo".to_string()),
        ]
    );
    Ok(())
}

#[test]
fn include_that_expands_to_nothing_is_invalid() -> TestResult {
    let code = load_error_code(
        r#"
[[item_group]]
[[item_group.item]]
type = "Compile"
include = "$(Nothing)"
"#,
    )?;
    assert_eq!(code, Some(codes::MISSING_ATTRIBUTE));

    let project = load_project("[target.Build]\n")?;
    let group: ItemGroupDefinition = toml::from_str(
        r#"
[[item]]
type = "Generated"
include = "$(NotSetEither);$(Nor)"
"#,
    )?;
    let mut lookup = project.create_lookup();
    let ctx = IntrinsicContext::target(project.file_system().as_ref(), project.directory());
    let err = execute_item_group(&group, &mut lookup, &ctx, &ElementLocation::new(PROJECT_PATH, "target 'Build'"))
        .err()
        .ok_or("expected the empty include to be rejected")?;
    assert_eq!(err.code(), Some(codes::MISSING_ATTRIBUTE));
    assert!(lookup.get_items("Generated").is_empty());
    Ok(())
}

#[test]
fn metadata_in_a_group_condition_is_rejected_inside_targets_too() -> TestResult {
    init_tracing();
    let project = load_project(
        r#"
[[item_group]]
[[item_group.item]]
type = "Source"
include = "a.c;b.rs"
[[item_group.item.metadata]]
name = "Lang"
value = "%(Extension)"
"#,
    )?;
    let location = ElementLocation::new(PROJECT_PATH, "target 'Build'");
    let ctx = IntrinsicContext::target(project.file_system().as_ref(), project.directory());

    let group_level: ItemGroupDefinition = toml::from_str(
        r#"
condition = "'%(Lang)' == '.c'"
[[item]]
type = "Native"
include = "@(Source)"
"#,
    )?;
    let mut lookup = project.create_lookup();
    let err = execute_item_group(&group_level, &mut lookup, &ctx, &location)
        .err()
        .ok_or("expected a group-level metadata condition to be rejected")?;
    assert_eq!(err.code(), Some(codes::METADATA_NOT_ALLOWED));

    let per_item: ItemGroupDefinition = toml::from_str(
        r#"
[[item]]
type = "Native"
include = "@(Source)"
condition = "'%(Lang)' == '.c'"
"#,
    )?;
    let mut lookup = project.create_lookup();
    execute_item_group(&per_item, &mut lookup, &ctx, &location)?;
    let native: Vec<String> = lookup.get_items("Native").iter().map(|i| i.include().to_string()).collect();
    assert_eq!(native, vec!["a.c"]);
    Ok(())
}
