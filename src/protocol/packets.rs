// src/protocol/packets.rs

//! Packets exchanged between the engine and its task hosts.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::events::BuildEvent;
use crate::protocol::task_host::{TaskHostBuildRequest, TaskHostBuildResponse};
use crate::registry::param_types::TaskParameterValue;
use crate::registry::{RegisteredTaskRecord, TaskRegistry};
use crate::request::{BuildRequest, ConfigCache};
use crate::types::{TaskHostArchitecture, TaskHostRuntime};

/// First byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    BuildRequest = 1,
    ConfigCache = 2,
    TaskRegistry = 3,
    TaskHostConfiguration = 4,
    TaskHostTaskComplete = 5,
    LogMessage = 6,
    TaskHostBuildRequest = 7,
    TaskHostBuildResponse = 8,
    NodeShutdown = 9,
}

impl TryFrom<u8> for PacketType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Ok(match value {
            1 => PacketType::BuildRequest,
            2 => PacketType::ConfigCache,
            3 => PacketType::TaskRegistry,
            4 => PacketType::TaskHostConfiguration,
            5 => PacketType::TaskHostTaskComplete,
            6 => PacketType::LogMessage,
            7 => PacketType::TaskHostBuildRequest,
            8 => PacketType::TaskHostBuildResponse,
            9 => PacketType::NodeShutdown,
            other => return Err(other),
        })
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything a task host needs to run one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHostConfiguration {
    pub task_name: String,
    pub record: RegisteredTaskRecord,
    pub project_file: String,
    pub project_directory: PathBuf,
    /// Bound input parameters, in binding order.
    pub parameters: IndexMap<String, TaskParameterValue>,
    pub runtime: TaskHostRuntime,
    pub architecture: TaskHostArchitecture,
}

/// Sent by a task host once its task finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHostTaskComplete {
    pub success: bool,
    /// Every output parameter the task set.
    pub outputs: BTreeMap<String, TaskParameterValue>,
    /// Set when the task could not be run or blew up.
    pub error: Option<String>,
}

impl TaskHostTaskComplete {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            outputs: BTreeMap::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeShutdownReason {
    Requested,
    BuildComplete,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeShutdown {
    pub reason: NodeShutdownReason,
}

/// Any frame that can cross a node boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    BuildRequest(BuildRequest),
    ConfigCache(ConfigCache),
    TaskRegistry(TaskRegistry),
    TaskHostConfiguration(Box<TaskHostConfiguration>),
    TaskHostTaskComplete(TaskHostTaskComplete),
    LogMessage(BuildEvent),
    TaskHostBuildRequest(TaskHostBuildRequest),
    TaskHostBuildResponse(TaskHostBuildResponse),
    NodeShutdown(NodeShutdown),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::BuildRequest(_) => PacketType::BuildRequest,
            Packet::ConfigCache(_) => PacketType::ConfigCache,
            Packet::TaskRegistry(_) => PacketType::TaskRegistry,
            Packet::TaskHostConfiguration(_) => PacketType::TaskHostConfiguration,
            Packet::TaskHostTaskComplete(_) => PacketType::TaskHostTaskComplete,
            Packet::LogMessage(_) => PacketType::LogMessage,
            Packet::TaskHostBuildRequest(_) => PacketType::TaskHostBuildRequest,
            Packet::TaskHostBuildResponse(_) => PacketType::TaskHostBuildResponse,
            Packet::NodeShutdown(_) => PacketType::NodeShutdown,
        }
    }
}
