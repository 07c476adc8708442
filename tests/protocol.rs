use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;

use buildforge::errors::{BuildError, ElementLocation};
use buildforge::evaluation::TaskItem;
use buildforge::events::BuildEvent;
use buildforge::protocol::translator::{from_bytes, packet_from_bytes, packet_to_bytes, to_bytes};
use buildforge::protocol::{
    BuildEngineVariant, NodeShutdown, NodeShutdownReason, Packet, PacketType, ReadTranslator,
    TargetOutputs, TaskHostBuildRequest, TaskHostBuildResponse, TaskHostConfiguration, TaskHostTaskComplete,
    WriteTranslator,
};
use buildforge::registry::param_types::TaskParameterValue;
use buildforge::registry::{AssemblyLoadInfo, RegisteredTaskRecord, TaskFactoryParameters, TaskRegistry};
use buildforge::request::{BuildEventContext, BuildRequest, HostServices};
use buildforge::types::{MessageImportance, TaskHostArchitecture, TaskHostRuntime};

type TestResult = Result<(), Box<dyn Error>>;

fn outputs(target: &str, specs: &[&str]) -> TargetOutputs {
    let mut map = TargetOutputs::new();
    map.insert(target.to_string(), specs.iter().map(|s| TaskItem::new(*s)).collect());
    map
}

#[test]
fn packets_survive_a_stream_in_order() -> TestResult {
    let record = RegisteredTaskRecord::new(
        "Message",
        TaskFactoryParameters::new().with_runtime("CLR4"),
        AssemblyLoadInfo::Name("Microsoft.Build.Tasks.Core".to_string()),
        "",
        None,
        ElementLocation::new("/src/app/app.proj", "using_task"),
    );
    let mut parameters = indexmap::IndexMap::new();
    parameters.insert("Text".to_string(), TaskParameterValue::string("hello"));
    let configuration = TaskHostConfiguration {
        task_name: "Message".to_string(),
        record,
        project_file: "/src/app/app.proj".to_string(),
        project_directory: PathBuf::from("/src/app"),
        parameters,
        runtime: TaskHostRuntime::Clr4,
        architecture: TaskHostArchitecture::X64,
    };
    let packets = vec![
        Packet::TaskHostConfiguration(Box::new(configuration)),
        Packet::LogMessage(BuildEvent::message(MessageImportance::High, "hello")),
        Packet::TaskHostTaskComplete(TaskHostTaskComplete::failed("task blew up")),
        Packet::NodeShutdown(NodeShutdown {
            reason: NodeShutdownReason::BuildComplete,
        }),
    ];

    let mut writer = WriteTranslator::new(Vec::new());
    for packet in &packets {
        writer.write_packet(packet)?;
    }
    let bytes = writer.into_inner();

    let mut reader = ReadTranslator::new(bytes.as_slice());
    let mut read = Vec::new();
    while let Some(packet) = reader.read_packet()? {
        read.push(packet);
    }
    assert_eq!(read, packets);
    Ok(())
}

#[test]
fn null_and_empty_target_outputs_stay_distinct() -> TestResult {
    let responses = [
        TaskHostBuildResponse::for_single_project(1, true, None),
        TaskHostBuildResponse::for_single_project(2, true, Some(TargetOutputs::new())),
        TaskHostBuildResponse::for_build_engine_result(3, false, None),
        TaskHostBuildResponse::for_build_engine_result(4, true, Some(Vec::new())),
        TaskHostBuildResponse::for_build_engine_result(5, true, Some(vec![outputs("Build", &["a.dll"])])),
    ];

    for response in responses {
        let back: TaskHostBuildResponse = from_bytes(&to_bytes(&response)?)?;
        assert_eq!(back, response);
    }

    let none: TaskHostBuildResponse = from_bytes(&to_bytes(&TaskHostBuildResponse::for_single_project(1, true, None))?)?;
    assert!(none.get_target_outputs_for_single_project().is_none());
    let empty: TaskHostBuildResponse =
        from_bytes(&to_bytes(&TaskHostBuildResponse::for_single_project(2, true, Some(TargetOutputs::new())))?)?;
    assert_eq!(empty.get_target_outputs_for_single_project().map(|o| o.len()), Some(0));
    Ok(())
}

#[test]
fn response_accessors_follow_the_request_shape() {
    let single = TaskHostBuildResponse::for_single_project(7, true, Some(outputs("Build", &["a.dll", "b.dll"])));
    assert!(single.get_target_outputs_for_build_engine_result().is_none());
    assert_eq!(single.all_output_items().len(), 2);
    assert_eq!(single.with_request_id(9).request_id(), 9);

    let parallel = TaskHostBuildResponse::for_build_engine_result(
        1,
        false,
        Some(vec![outputs("Build", &["a.dll"]), outputs("Pack", &["a.nupkg"])]),
    );
    assert!(!parallel.overall_result());
    assert!(parallel.get_target_outputs_for_single_project().is_none());
    assert_eq!(parallel.get_target_outputs_for_build_engine_result().map(<[_]>::len), Some(2));
    assert_eq!(parallel.all_output_items().len(), 2);
}

#[test]
fn request_variants_flatten_into_invocations() {
    let mut release = BTreeMap::new();
    release.insert("Configuration".to_string(), "Release".to_string());

    let be1 = TaskHostBuildRequest::build_engine1("a.proj", vec!["Build".to_string()], Some(release.clone()));
    assert_eq!(be1.variant(), BuildEngineVariant::BuildEngine1);
    assert!(!be1.is_multi_project());
    assert!(be1.return_target_outputs());
    assert_eq!(be1.invocations()[0].global_properties.as_ref(), Some(&release));

    let be2 = TaskHostBuildRequest::build_engine2_single("a.proj", Vec::new(), None, Some("17.0".to_string()));
    assert_eq!(be2.invocations()[0].tools_version.as_deref(), Some("17.0"));

    let parallel = TaskHostBuildRequest::build_engine2_parallel(
        vec!["a.proj".to_string(), "b.proj".to_string()],
        vec!["Build".to_string()],
        vec![Some(release.clone())],
        Vec::new(),
        true,
        false,
    );
    assert!(parallel.is_multi_project());
    assert!(parallel.use_results_cache());
    assert!(!parallel.unload_projects_on_completion());
    let invocations = parallel.invocations();
    assert_eq!(invocations.len(), 2);
    assert_eq!(invocations[0].global_properties.as_ref(), Some(&release));
    // Arrays shorter than the project list leave the rest unset.
    assert!(invocations[1].global_properties.is_none());
    assert!(invocations[1].tools_version.is_none());

    let be3 = TaskHostBuildRequest::build_engine3_parallel(
        vec!["a.proj".to_string()],
        Vec::new(),
        vec![None],
        vec![Some(vec!["Platform".to_string()])],
        vec![None],
        false,
    );
    assert_eq!(be3.variant(), BuildEngineVariant::BuildEngine3Parallel);
    assert!(!be3.return_target_outputs());
    assert!(!be3.use_results_cache());
    assert_eq!(be3.invocations()[0].remove_global_properties, vec!["Platform"]);
}

#[test]
fn reading_the_wrong_type_is_an_error() -> TestResult {
    let bytes = to_bytes(&NodeShutdown {
        reason: NodeShutdownReason::Requested,
    })?;

    let err = from_bytes::<TaskHostTaskComplete>(&bytes).err().ok_or("expected a type mismatch")?;
    assert!(matches!(err, BuildError::Translation(_)));
    Ok(())
}

#[test]
fn malformed_frames_are_rejected() -> TestResult {
    let frame = packet_to_bytes(&Packet::LogMessage(BuildEvent::warning(Some("W1"), "careful")))?;
    assert_eq!(frame[0], PacketType::LogMessage as u8);

    // Empty input is not a packet.
    assert!(matches!(packet_from_bytes(&[]), Err(BuildError::Translation(_))));
    // Header cut short.
    assert!(matches!(packet_from_bytes(&frame[..3]), Err(BuildError::Translation(_))));
    // Payload cut short.
    assert!(matches!(
        packet_from_bytes(&frame[..frame.len() - 1]),
        Err(BuildError::Translation(_))
    ));
    // Unknown packet type.
    let mut unknown = frame.clone();
    unknown[0] = 42;
    assert!(matches!(packet_from_bytes(&unknown), Err(BuildError::Translation(_))));

    assert_eq!(
        packet_from_bytes(&frame)?,
        Packet::LogMessage(BuildEvent::warning(Some("W1"), "careful"))
    );
    Ok(())
}

#[test]
fn packet_type_bytes_are_stable() {
    for byte in 1u8..=9 {
        let packet_type = PacketType::try_from(byte);
        assert!(packet_type.is_ok(), "type byte {byte}");
        assert_eq!(packet_type.map(|t| t as u8), Ok(byte));
    }
    assert_eq!(PacketType::try_from(0), Err(0));
    assert_eq!(PacketType::try_from(10), Err(10));
}

#[test]
fn request_id_is_stamped_after_construction() -> TestResult {
    let mut request = TaskHostBuildRequest::build_engine1("a.proj", vec!["Build".to_string()], None);
    assert_eq!(request.request_id(), 0);
    request.set_request_id(12);

    let back: TaskHostBuildRequest = from_bytes(&to_bytes(&request)?)?;

    assert_eq!(back.request_id(), 12);
    assert_eq!(back.variant(), BuildEngineVariant::BuildEngine1);
    assert!(back.invocations()[0].global_properties.is_none());
    Ok(())
}

#[test]
fn build_request_keeps_host_services_and_its_configuration() -> TestResult {
    let mut host_services = HostServices::new();
    host_services.register_host_object("/src/app/app.proj", "Build", "Csc", "host:csc");
    let parent_context = BuildEventContext::new(1, 2, 3);
    let mut request = BuildRequest::new(
        1,
        4,
        -1,
        Some(vec!["Build".to_string(), "Pack".to_string()]),
        Some(host_services.clone()),
        parent_context,
        None,
    )?;
    assert!(!request.is_configuration_resolved());
    request.resolve_configuration(9)?;
    request.set_global_request_id(17);

    let back: BuildRequest = from_bytes(&to_bytes(&request)?)?;

    assert_eq!(back, request);
    assert_eq!(back.configuration_id(), 9);
    assert!(back.is_configuration_resolved());
    assert_eq!(back.global_request_id(), 17);
    assert_eq!(back.targets(), ["Build", "Pack"]);
    assert_eq!(back.parent_build_event_context(), parent_context);
    assert_eq!(back.host_services(), Some(&host_services));
    assert_eq!(
        back.host_services().and_then(|h| h.get_host_object("/src/app/app.proj", "Build", "Csc")),
        Some("host:csc")
    );

    let bare = BuildRequest::new(1, 5, 2, Some(Vec::new()), None, BuildEventContext::INVALID, Some(&request))?;
    let back: BuildRequest = from_bytes(&to_bytes(&bare)?)?;
    assert!(back.host_services().is_none());
    assert!(back.targets().is_empty());
    assert_eq!(back.parent_global_request_id(), 17);
    Ok(())
}

#[test]
fn core_task_registry_survives_the_wire() -> TestResult {
    let registry = TaskRegistry::core("17.0");
    assert!(registry.get_deep_count_of_registered_tasks() > 0);

    let back: TaskRegistry = from_bytes(&to_bytes(&registry)?)?;

    assert_eq!(back, registry);
    assert_eq!(back.tools_version(), "17.0");
    assert!(back.has_core_tasks());
    assert_eq!(back.get_deep_count_of_registered_tasks(), registry.get_deep_count_of_registered_tasks());
    assert_eq!(back.records_for("message").len(), 1);
    assert!(back.cache().is_empty());
    Ok(())
}

#[test]
fn parallel_task_host_requests_survive_the_wire() -> TestResult {
    let mut debug = BTreeMap::new();
    debug.insert("Configuration".to_string(), "Debug".to_string());

    let be2 = TaskHostBuildRequest::build_engine2_parallel(
        vec!["a.proj".to_string(), "b.proj".to_string()],
        vec!["Build".to_string(), "Test".to_string()],
        vec![Some(debug.clone()), None],
        vec![None, Some("17.0".to_string())],
        false,
        true,
    )
    .with_request_id(3);
    let back: TaskHostBuildRequest = from_bytes(&to_bytes(&be2)?)?;
    assert_eq!(back, be2);
    assert_eq!(back.variant(), BuildEngineVariant::BuildEngine2Parallel);
    assert_eq!(back.request_id(), 3);
    assert!(back.unload_projects_on_completion());
    assert!(!back.use_results_cache());
    assert_eq!(back.invocations(), be2.invocations());

    let be3 = TaskHostBuildRequest::build_engine3_parallel(
        vec!["a.proj".to_string(), "b.proj".to_string()],
        vec!["Build".to_string()],
        vec![None, Some(debug)],
        vec![Some(Vec::new()), None],
        vec![Some("17.0".to_string()), None],
        true,
    )
    .with_request_id(4);
    let back: TaskHostBuildRequest = from_bytes(&to_bytes(&be3)?)?;
    assert_eq!(back, be3);
    assert_eq!(back.variant(), BuildEngineVariant::BuildEngine3Parallel);
    assert!(back.return_target_outputs());
    assert_eq!(back.payload(), be3.payload());
    Ok(())
}

#[test]
fn per_project_outputs_keep_null_apart_from_empty_on_the_wire() -> TestResult {
    let null = TaskHostBuildResponse::for_build_engine_result(1, true, None);
    let empty = TaskHostBuildResponse::for_build_engine_result(2, true, Some(Vec::new()));
    let with_empty_project = TaskHostBuildResponse::for_build_engine_result(3, true, Some(vec![TargetOutputs::new()]));

    let null: TaskHostBuildResponse = from_bytes(&to_bytes(&null)?)?;
    let empty: TaskHostBuildResponse = from_bytes(&to_bytes(&empty)?)?;
    let with_empty_project: TaskHostBuildResponse = from_bytes(&to_bytes(&with_empty_project)?)?;

    assert!(null.get_target_outputs_for_build_engine_result().is_none());
    assert_eq!(empty.get_target_outputs_for_build_engine_result().map(<[_]>::len), Some(0));
    assert_eq!(with_empty_project.get_target_outputs_for_build_engine_result().map(<[_]>::len), Some(1));
    assert_ne!(null, empty.clone().with_request_id(1));
    assert!(with_empty_project.all_output_items().is_empty());
    Ok(())
}
