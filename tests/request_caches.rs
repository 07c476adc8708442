mod common;

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use buildforge::errors::BuildError;
use buildforge::evaluation::TaskItem;
use buildforge::fs::FileSystem;
use buildforge::protocol::translator::{from_bytes, to_bytes};
use buildforge::request::{
    BuildEventContext, BuildRequest, BuildRequestConfiguration, BuildResult, BuildResultCode, ConfigCache,
    ConfigurationMetadata, HostServices, ResultsCache, INVALID_CONFIGURATION_ID, INVALID_GLOBAL_REQUEST_ID,
};
use buildforge::target::TargetResult;
use common::{init_tracing, mock_fs_with_project, PROJECT_PATH};

type TestResult = Result<(), Box<dyn Error>>;
type BuildResultOf<T> = Result<T, BuildError>;

fn request(configuration_id: i32, targets: &[&str]) -> BuildResultOf<BuildRequest> {
    BuildRequest::new(
        1,
        1,
        configuration_id,
        Some(targets.iter().map(|t| t.to_string()).collect()),
        None,
        BuildEventContext::INVALID,
        None,
    )
}

fn metadata(path: &str, configuration: Option<&str>) -> ConfigurationMetadata {
    let mut globals = BTreeMap::new();
    if let Some(value) = configuration {
        globals.insert("Configuration".to_string(), value.to_string());
    }
    ConfigurationMetadata::new(path, globals, "Current")
}

#[test]
fn request_requires_a_target_list() {
    let err = BuildRequest::new(1, 1, 0, None, None, BuildEventContext::INVALID, None).err();
    assert!(matches!(err, Some(BuildError::ArgumentNull("targets"))));
}

#[test]
fn request_inherits_its_parents_global_id() -> TestResult {
    let mut parent = request(0, &["Build"])?;
    assert_eq!(parent.global_request_id(), INVALID_GLOBAL_REQUEST_ID);
    parent.set_global_request_id(7);

    let child = BuildRequest::new(
        1,
        2,
        INVALID_CONFIGURATION_ID,
        Some(Vec::new()),
        None,
        BuildEventContext::new(1, 0, 3),
        Some(&parent),
    )?;

    assert_eq!(child.parent_global_request_id(), 7);
    assert_eq!(child.parent_build_event_context().project_context_id, 3);
    assert!(child.targets().is_empty());
    Ok(())
}

#[test]
fn configuration_resolves_once() -> TestResult {
    let mut request = request(INVALID_CONFIGURATION_ID, &["Build"])?;
    assert!(!request.is_configuration_resolved());

    assert!(request.resolve_configuration(-3).is_err());
    request.resolve_configuration(4)?;
    assert!(request.is_configuration_resolved());

    // Same id again is fine, another one is a bug.
    request.resolve_configuration(4)?;
    assert!(matches!(request.resolve_configuration(5), Err(BuildError::Internal(_))));
    assert_eq!(request.configuration_id(), 4);
    Ok(())
}

#[test]
fn host_objects_are_keyed_by_project_target_and_task() {
    let mut services = HostServices::new();
    services.register_host_object("/src/app/app.proj", "Build", "Csc", "compiler-host");

    assert_eq!(
        services.get_host_object("/src/app/app.proj", "build", "CSC"),
        Some("compiler-host")
    );
    assert_eq!(services.get_host_object("/src/app/app.proj", "Pack", "Csc"), None);
    assert!(services.has_host_objects("/src/app/app.proj"));
    assert!(!services.has_host_objects("/src/app/other.proj"));
}

#[test]
fn config_cache_finds_configurations_by_structure() -> TestResult {
    let mut cache = ConfigCache::new();
    cache.add(BuildRequestConfiguration::new(3, metadata("/src/a.proj", Some("Debug"))))?;
    cache.add(BuildRequestConfiguration::new(1, metadata("/src/a.proj", Some("Release"))))?;

    let found = cache.get_matching_configuration(&metadata("/src/a.proj", Some("Release")));
    assert_eq!(found.map(BuildRequestConfiguration::id), Some(1));
    assert!(cache.get_matching_configuration(&metadata("/src/a.proj", None)).is_none());
    assert_eq!(cache.get_smallest_config_id()?, 1);

    let ids: Vec<i32> = cache.iter().map(BuildRequestConfiguration::id).collect();
    assert_eq!(ids, vec![1, 3]);
    Ok(())
}

#[test]
fn config_cache_rejects_duplicate_and_invalid_ids() -> TestResult {
    let mut cache = ConfigCache::new();
    cache.add(BuildRequestConfiguration::new(1, metadata("/src/a.proj", None)))?;

    let duplicate = cache.add(BuildRequestConfiguration::new(1, metadata("/src/b.proj", None)));
    assert!(matches!(duplicate, Err(BuildError::Internal(_))));
    let invalid = cache.add(BuildRequestConfiguration::new(-1, metadata("/src/c.proj", None)));
    assert!(matches!(invalid, Err(BuildError::Internal(_))));

    cache.clear();
    assert!(cache.get_smallest_config_id().is_err());
    Ok(())
}

#[test]
fn removing_a_configuration_hands_its_structure_to_a_twin() -> TestResult {
    let mut cache = ConfigCache::new();
    let original = BuildRequestConfiguration::new(1, metadata("/src/a.proj", None));
    let twin = original.share_with_new_id(2)?;
    cache.add(original)?;
    cache.add(twin)?;

    assert_eq!(
        cache.get_matching_configuration(&metadata("/src/a.proj", None)).map(|c| c.id()),
        Some(1)
    );
    assert!(cache.remove(1).is_some());
    assert_eq!(
        cache.get_matching_configuration(&metadata("/src/a.proj", None)).map(|c| c.id()),
        Some(2)
    );
    assert!(cache.remove(1).is_none());
    assert_eq!(cache.len(), 1);
    Ok(())
}

#[test]
fn configurations_load_lazily_and_unload_keeping_target_lists() -> TestResult {
    init_tracing();
    let fs: Arc<dyn FileSystem> = mock_fs_with_project(
        r#"
[project]
default_targets = ["Build"]

[target.Build]
"#,
    );
    let mut cache = ConfigCache::new();
    cache.add(BuildRequestConfiguration::new(1, metadata(PROJECT_PATH, Some("Debug"))))?;

    let configuration = cache.get_mut(1).ok_or("configuration 1 missing")?;
    assert!(!configuration.is_loaded());
    assert!(configuration.default_targets().is_none());

    let project = configuration.load(Arc::clone(&fs))?;
    assert_eq!(project.get_property("Configuration").as_deref(), Some("Debug"));
    let again = configuration.load(Arc::clone(&fs))?;
    assert!(Arc::ptr_eq(&project, &again));

    cache.unload_all();
    let configuration = cache.get(1).ok_or("configuration 1 missing")?;
    assert!(!configuration.is_loaded());
    assert_eq!(configuration.default_targets(), Some(&["Build".to_string()][..]));
    Ok(())
}

#[test]
fn config_cache_survives_translation_without_projects() -> TestResult {
    init_tracing();
    let fs: Arc<dyn FileSystem> = mock_fs_with_project("[target.Build]\n");
    let mut loaded = BuildRequestConfiguration::new(2, metadata(PROJECT_PATH, None));
    loaded.load(fs)?;

    let mut cache = ConfigCache::new();
    cache.add(loaded)?;
    cache.add(BuildRequestConfiguration::new(5, metadata("/src/b.proj", Some("Release"))))?;

    let back: ConfigCache = from_bytes(&to_bytes(&cache)?)?;

    assert_eq!(back, cache);
    assert!(back.get(2).is_some_and(|c| !c.is_loaded()));
    assert_eq!(
        back.get_matching_configuration(&metadata("/src/b.proj", Some("Release"))).map(|c| c.id()),
        Some(5)
    );
    Ok(())
}

fn result_with(configuration_id: i32, targets: &[(&str, TargetResult)]) -> BuildResultOf<BuildResult> {
    let mut result = BuildResult::new(&request(configuration_id, &[])?);
    for (name, target) in targets {
        result.add_result_for_target(name, target.clone());
    }
    Ok(result)
}

#[test]
fn results_cache_merges_per_configuration() -> TestResult {
    let mut cache = ResultsCache::new();
    cache.add_result(result_with(1, &[("Restore", TargetResult::success(Vec::new()))])?);
    cache.add_result(result_with(
        1,
        &[("Build", TargetResult::success(vec![TaskItem::new("app.dll")]))],
    )?);
    cache.add_result(result_with(2, &[("Build", TargetResult::failure())])?);

    assert_eq!(cache.len(), 2);
    let first = cache.get_result_for_configuration(1).ok_or("no result for 1")?;
    assert!(first.has_results_for_target("restore"));
    assert!(first.has_results_for_target("BUILD"));
    assert!(first.succeeded());
    assert_eq!(
        cache.get_result_for_configuration(2).map(BuildResult::overall_result),
        Some(BuildResultCode::Failure)
    );

    cache.clear_results_for_configuration(2);
    assert!(cache.get_result_for_configuration(2).is_none());
    Ok(())
}

#[test]
fn results_cache_satisfies_only_fully_covered_requests() -> TestResult {
    let mut cache = ResultsCache::new();
    cache.add_result(result_with(
        1,
        &[
            ("Restore", TargetResult::success(Vec::new())),
            ("Build", TargetResult::success(vec![TaskItem::new("app.dll")])),
        ],
    )?);

    assert!(cache.satisfy_request(&request(1, &["Build"])?, &[]).is_some());
    assert!(cache.satisfy_request(&request(1, &["Build", "Pack"])?, &[]).is_none());
    assert!(cache.satisfy_request(&request(2, &["Build"])?, &[]).is_none());

    // A request naming no targets is checked against the ones supplied.
    let defaults = vec!["Restore".to_string(), "Build".to_string()];
    assert!(cache.satisfy_request(&request(1, &[])?, &defaults).is_some());
    assert!(cache.satisfy_request(&request(1, &[])?, &[]).is_none());
    Ok(())
}

#[test]
fn build_result_reports_errors_cancellation_and_outputs() -> TestResult {
    let mut result = result_with(
        1,
        &[
            ("Build", TargetResult::success(vec![TaskItem::new("app.dll")])),
            ("Check", TargetResult::skipped(Vec::new())),
        ],
    )?;
    assert!(result.succeeded());

    let outputs = result.target_outputs(&["Build".to_string(), "Missing".to_string()]);
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs.get("Build").map(Vec::len), Some(1));

    result.mark_canceled();
    assert!(result.is_canceled());
    assert_eq!(result.overall_result(), BuildResultCode::Failure);

    let mut errored = result_with(1, &[])?;
    errored.set_error("the project file could not be loaded");
    assert!(!errored.succeeded());
    assert_eq!(errored.error(), Some("the project file could not be loaded"));
    Ok(())
}
