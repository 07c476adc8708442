// src/node/task_host.rs

//! Task hosts: isolated nodes that run one task at a time.
//!
//! A host is a dedicated thread with its own factory registry. It talks to
//! the build only through framed packets (see [`crate::protocol`]) over a
//! pair of channels, the same bytes a host in another process would see.
//! The parent side of a hosted task is [`TaskHostProxy`], which looks like
//! any other [`Task`] to the task builder.

use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::errors::{BuildError, Result};
use crate::events::BuildEvent;
use crate::protocol::translator::{packet_from_bytes, packet_to_bytes};
use crate::protocol::{
    NodeShutdown, NodeShutdownReason, Packet, TaskHostBuildRequest, TaskHostBuildResponse,
    TaskHostConfiguration, TaskHostTaskComplete,
};
use crate::registry::param_types::TaskParameterValue;
use crate::registry::{FactoryRegistry, RegisteredTaskRecord, TaskLibraryCatalog};
use crate::tasks::{BuildEngine, CallTargetResult, Task};
use crate::types::{TaskHostArchitecture, TaskHostRuntime};

const CHANNEL_CAPACITY: usize = 64;

type HostKey = (TaskHostRuntime, TaskHostArchitecture);

/// Launches task hosts on demand and hands them out one task at a time.
///
/// One host per runtime/architecture pair is started the first time it is
/// needed. A second host for the same pair is only started while the first
/// is busy, which happens when a hosted task builds a project that hosts
/// another task.
#[derive(Debug)]
pub struct NodeManager {
    catalog: Arc<TaskLibraryCatalog>,
    nodes: Mutex<HashMap<HostKey, Vec<Arc<TaskHostNode>>>>,
    next_node_id: AtomicUsize,
}

impl NodeManager {
    pub fn new(catalog: Arc<TaskLibraryCatalog>) -> Self {
        Self {
            catalog,
            nodes: Mutex::new(HashMap::new()),
            next_node_id: AtomicUsize::new(1),
        }
    }

    /// An idle host for the pair, launching one if none is free.
    pub fn acquire(&self, runtime: TaskHostRuntime, architecture: TaskHostArchitecture) -> Result<NodeLease> {
        let key = (runtime.resolve(), architecture.resolve());
        let mut nodes = self.nodes.lock();
        let pool = nodes.entry(key).or_default();
        if let Some(node) = pool.iter().find(|n| n.try_claim()) {
            trace!(node = node.id(), %runtime, %architecture, "reusing task host");
            return Ok(NodeLease { node: Arc::clone(node) });
        }

        let id = self.next_node_id.fetch_add(1, Ordering::Relaxed);
        let node = Arc::new(TaskHostNode::launch(id, key.0, key.1, Arc::clone(&self.catalog))?);
        node.try_claim();
        pool.push(Arc::clone(&node));
        Ok(NodeLease { node })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().values().map(Vec::len).sum()
    }

    /// Tell every host to exit and wait for them.
    pub fn shutdown(&self, reason: NodeShutdownReason) {
        let nodes: Vec<Arc<TaskHostNode>> = self.nodes.lock().drain().flat_map(|(_, pool)| pool).collect();
        if nodes.is_empty() {
            return;
        }
        info!(hosts = nodes.len(), ?reason, "shutting down task hosts");
        for node in nodes {
            node.shutdown(reason);
        }
    }
}

/// Exclusive use of a host until dropped.
#[derive(Debug)]
pub struct NodeLease {
    node: Arc<TaskHostNode>,
}

impl Deref for NodeLease {
    type Target = TaskHostNode;

    fn deref(&self) -> &TaskHostNode {
        &self.node
    }
}

impl Drop for NodeLease {
    fn drop(&mut self) {
        self.node.busy.store(false, Ordering::Release);
    }
}

/// Parent-side handle of a running host.
#[derive(Debug)]
pub struct TaskHostNode {
    id: usize,
    runtime: TaskHostRuntime,
    architecture: TaskHostArchitecture,
    busy: AtomicBool,
    to_host: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    from_host: Mutex<mpsc::Receiver<Vec<u8>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TaskHostNode {
    fn launch(
        id: usize,
        runtime: TaskHostRuntime,
        architecture: TaskHostArchitecture,
        catalog: Arc<TaskLibraryCatalog>,
    ) -> Result<Self> {
        let (to_host, host_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (host_tx, from_host) = mpsc::channel(CHANNEL_CAPACITY);
        let thread = thread::Builder::new()
            .name(format!("task-host-{id}-{runtime}-{architecture}"))
            .spawn(move || run_task_host(id, catalog, host_rx, host_tx))?;
        info!(node = id, %runtime, %architecture, "task host launched");
        Ok(Self {
            id,
            runtime,
            architecture,
            busy: AtomicBool::new(false),
            to_host: Mutex::new(Some(to_host)),
            from_host: Mutex::new(from_host),
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn runtime(&self) -> TaskHostRuntime {
        self.runtime
    }

    pub fn architecture(&self) -> TaskHostArchitecture {
        self.architecture
    }

    fn try_claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn send(&self, packet: &Packet) -> Result<()> {
        let bytes = packet_to_bytes(packet)?;
        let sender = self
            .to_host
            .lock()
            .clone()
            .ok_or_else(|| BuildError::TaskHost(format!("task host {} has been shut down", self.id)))?;
        sender
            .blocking_send(bytes)
            .map_err(|_| BuildError::TaskHost(format!("task host {} is no longer running", self.id)))
    }

    pub fn receive(&self) -> Result<Packet> {
        let bytes = self
            .from_host
            .lock()
            .blocking_recv()
            .ok_or_else(|| BuildError::TaskHost(format!("task host {} exited unexpectedly", self.id)))?;
        packet_from_bytes(&bytes)
    }

    fn shutdown(&self, reason: NodeShutdownReason) {
        if let Some(sender) = self.to_host.lock().take() {
            match packet_to_bytes(&Packet::NodeShutdown(NodeShutdown { reason })) {
                Ok(bytes) => {
                    // Dropping the sender closes the channel even if the
                    // shutdown packet does not fit.
                    if sender.try_send(bytes).is_err() {
                        debug!(node = self.id, "shutdown packet not delivered, closing channel");
                    }
                }
                Err(e) => warn!(node = self.id, error = %e, "failed to encode shutdown packet"),
            }
        }
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                warn!(node = self.id, "task host thread panicked");
            }
        }
        debug!(node = self.id, "task host stopped");
    }
}

/// Host main loop: one configuration in, one completion out.
fn run_task_host(
    id: usize,
    catalog: Arc<TaskLibraryCatalog>,
    mut from_parent: mpsc::Receiver<Vec<u8>>,
    to_parent: mpsc::Sender<Vec<u8>>,
) {
    let factories = FactoryRegistry::with_defaults(catalog);
    while let Some(bytes) = from_parent.blocking_recv() {
        let packet = match packet_from_bytes(&bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(node = id, error = %e, "task host dropped an unreadable packet");
                continue;
            }
        };
        match packet {
            Packet::TaskHostConfiguration(configuration) => {
                debug!(node = id, task = %configuration.task_name, "task host received task");
                let mut engine = HostBuildEngine {
                    node: id,
                    from_parent: &mut from_parent,
                    to_parent: &to_parent,
                    project_file: configuration.project_file.clone(),
                    project_directory: configuration.project_directory.clone(),
                    next_request_id: 1,
                };
                let complete = execute_hosted(&factories, *configuration, &mut engine)
                    .unwrap_or_else(|e| TaskHostTaskComplete::failed(e.to_string()));
                if send_to(&to_parent, &Packet::TaskHostTaskComplete(complete)).is_err() {
                    break;
                }
            }
            Packet::NodeShutdown(shutdown) => {
                debug!(node = id, reason = ?shutdown.reason, "task host exiting");
                break;
            }
            other => warn!(node = id, packet = %other.packet_type(), "task host ignored an unexpected packet"),
        }
    }
}

fn execute_hosted(
    factories: &FactoryRegistry,
    configuration: TaskHostConfiguration,
    engine: &mut HostBuildEngine<'_>,
) -> Result<TaskHostTaskComplete> {
    let record = &configuration.record;
    let task_type = factories.task_type_for(record, &record.location)?;
    let mut task = task_type.create();
    for (name, value) in configuration.parameters {
        task.set_parameter(&name, value).map_err(|message| {
            BuildError::TaskHost(format!(
                "failed to set the parameter \"{name}\" of the task \"{}\": {message}",
                configuration.task_name
            ))
        })?;
    }
    let success = task.execute(engine)?;
    let outputs = task_type
        .parameters()
        .iter()
        .filter(|p| p.output)
        .filter_map(|p| task.get_output(&p.name).map(|value| (p.name.clone(), value)))
        .collect();
    Ok(TaskHostTaskComplete {
        success,
        outputs,
        error: None,
    })
}

fn send_to(sender: &mpsc::Sender<Vec<u8>>, packet: &Packet) -> Result<()> {
    let bytes = packet_to_bytes(packet)?;
    sender
        .blocking_send(bytes)
        .map_err(|_| BuildError::TaskHost("the parent node is gone".to_string()))
}

/// Engine seen by a task running inside a host. Everything is forwarded to
/// the parent as packets.
struct HostBuildEngine<'c> {
    node: usize,
    from_parent: &'c mut mpsc::Receiver<Vec<u8>>,
    to_parent: &'c mpsc::Sender<Vec<u8>>,
    project_file: String,
    project_directory: PathBuf,
    next_request_id: i32,
}

impl BuildEngine for HostBuildEngine<'_> {
    fn log(&mut self, event: BuildEvent) {
        if let Err(e) = send_to(self.to_parent, &Packet::LogMessage(event)) {
            warn!(node = self.node, error = %e, "failed to forward log event");
        }
    }

    fn build_project_files(&mut self, request: TaskHostBuildRequest) -> Result<TaskHostBuildResponse> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        send_to(
            self.to_parent,
            &Packet::TaskHostBuildRequest(request.with_request_id(request_id)),
        )?;
        loop {
            let bytes = self.from_parent.blocking_recv().ok_or_else(|| {
                BuildError::TaskHost("the parent node went away during a build callback".to_string())
            })?;
            match packet_from_bytes(&bytes)? {
                Packet::TaskHostBuildResponse(response) if response.request_id() == request_id => {
                    return Ok(response);
                }
                Packet::NodeShutdown(_) => {
                    return Err(BuildError::TaskHost(
                        "the task host was shut down during a build callback".to_string(),
                    ));
                }
                other => warn!(
                    node = self.node,
                    packet = %other.packet_type(),
                    "unexpected packet while waiting for a build response"
                ),
            }
        }
    }

    fn call_targets(&mut self, _targets: &[String], _run_each_separately: bool) -> Result<CallTargetResult> {
        Err(BuildError::TaskHost(
            "calling targets is not supported from inside a task host".to_string(),
        ))
    }

    fn is_cancelled(&self) -> bool {
        false
    }

    fn project_file(&self) -> String {
        self.project_file.clone()
    }

    fn project_directory(&self) -> PathBuf {
        self.project_directory.clone()
    }
}

/// Parent-side stand-in for a task that runs in a host.
///
/// Parameters are collected locally and shipped with the configuration on
/// execute. While the task runs, the proxy services the host's log events
/// and build callbacks against the real engine.
#[derive(Debug)]
pub struct TaskHostProxy {
    manager: Arc<NodeManager>,
    record: Arc<RegisteredTaskRecord>,
    runtime: TaskHostRuntime,
    architecture: TaskHostArchitecture,
    project_file: String,
    project_directory: PathBuf,
    parameters: IndexMap<String, TaskParameterValue>,
    outputs: BTreeMap<String, TaskParameterValue>,
}

impl TaskHostProxy {
    pub fn new(
        manager: Arc<NodeManager>,
        record: Arc<RegisteredTaskRecord>,
        runtime: TaskHostRuntime,
        architecture: TaskHostArchitecture,
        project_file: String,
        project_directory: PathBuf,
    ) -> Self {
        Self {
            manager,
            record,
            runtime,
            architecture,
            project_file,
            project_directory,
            parameters: IndexMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    fn configuration(&self) -> TaskHostConfiguration {
        TaskHostConfiguration {
            task_name: self.record.task_name().to_string(),
            record: (*self.record).clone(),
            project_file: self.project_file.clone(),
            project_directory: self.project_directory.clone(),
            parameters: self.parameters.clone(),
            runtime: self.runtime,
            architecture: self.architecture,
        }
    }
}

impl Task for TaskHostProxy {
    fn set_parameter(&mut self, name: &str, value: TaskParameterValue) -> std::result::Result<(), String> {
        self.parameters.insert(name.to_string(), value);
        Ok(())
    }

    fn execute(&mut self, engine: &mut dyn BuildEngine) -> Result<bool> {
        if engine.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let node = self.manager.acquire(self.runtime, self.architecture)?;
        debug!(node = node.id(), task = %self.record.task_name(), "dispatching task to host");
        node.send(&Packet::TaskHostConfiguration(Box::new(self.configuration())))?;

        loop {
            match node.receive()? {
                Packet::LogMessage(event) => engine.log(event),
                Packet::TaskHostBuildRequest(request) => {
                    let request_id = request.request_id();
                    let multi_project = request.is_multi_project();
                    let response = match engine.build_project_files(request) {
                        Ok(response) => response.with_request_id(request_id),
                        Err(e) => {
                            warn!(node = node.id(), error = %e, "build callback from task host failed");
                            engine.log_error(None, &e.to_string());
                            if multi_project {
                                TaskHostBuildResponse::for_build_engine_result(request_id, false, None)
                            } else {
                                TaskHostBuildResponse::for_single_project(request_id, false, None)
                            }
                        }
                    };
                    node.send(&Packet::TaskHostBuildResponse(response))?;
                }
                Packet::TaskHostTaskComplete(complete) => {
                    trace!(node = node.id(), success = complete.success, "hosted task complete");
                    self.outputs = complete.outputs;
                    return match complete.error {
                        Some(error) => Err(BuildError::TaskHost(error)),
                        None => Ok(complete.success),
                    };
                }
                other => {
                    return Err(BuildError::TaskHost(format!(
                        "unexpected {} packet from task host {}",
                        other.packet_type(),
                        node.id()
                    )));
                }
            }
        }
    }

    fn get_output(&self, name: &str) -> Option<TaskParameterValue> {
        self.outputs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }
}
