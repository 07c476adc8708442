// src/protocol/mod.rs

//! Wire protocol between the engine and task hosts.

pub mod packets;
pub mod task_host;
pub mod translator;

pub use packets::{
    NodeShutdown, NodeShutdownReason, Packet, PacketType, TaskHostConfiguration,
    TaskHostTaskComplete,
};
pub use task_host::{
    BuildEngineVariant, GlobalProperties, ProjectInvocation, TargetOutputs, TaskHostBuildPayload,
    TaskHostBuildRequest, TaskHostBuildResponse,
};
pub use translator::{ReadTranslator, Translatable, WriteTranslator};
