// src/types.rs

//! Small shared enums used across the registry, node and protocol layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Runtime a task host must provide.
///
/// `Any` is the wildcard used by fuzzy task lookups; `Current` resolves to
/// whatever runtime this process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskHostRuntime {
    Clr2,
    Clr4,
    Net,
    Current,
    Any,
}

impl TaskHostRuntime {
    /// The runtime this engine itself runs on.
    pub const PROCESS: TaskHostRuntime = TaskHostRuntime::Net;

    /// Replace `Current` with the concrete process runtime.
    pub fn resolve(self) -> TaskHostRuntime {
        match self {
            TaskHostRuntime::Current => Self::PROCESS,
            other => other,
        }
    }

    pub fn is_any(self) -> bool {
        matches!(self, TaskHostRuntime::Any)
    }

    /// Fuzzy comparison: `Any` on either side matches everything.
    pub fn matches(self, other: TaskHostRuntime) -> bool {
        self.is_any() || other.is_any() || self.resolve() == other.resolve()
    }
}

impl fmt::Display for TaskHostRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskHostRuntime::Clr2 => "CLR2",
            TaskHostRuntime::Clr4 => "CLR4",
            TaskHostRuntime::Net => "NET",
            TaskHostRuntime::Current => "CurrentRuntime",
            TaskHostRuntime::Any => "*",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskHostRuntime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clr2" => Ok(TaskHostRuntime::Clr2),
            "clr4" => Ok(TaskHostRuntime::Clr4),
            "net" => Ok(TaskHostRuntime::Net),
            "currentruntime" | "current" => Ok(TaskHostRuntime::Current),
            "*" | "any" => Ok(TaskHostRuntime::Any),
            other => Err(format!(
                "invalid runtime: {other} (expected CLR2, CLR4, NET, CurrentRuntime or *)"
            )),
        }
    }
}

/// Processor architecture a task host must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskHostArchitecture {
    X86,
    X64,
    Arm64,
    Current,
    Any,
}

impl TaskHostArchitecture {
    /// Architecture of this process.
    pub fn process() -> TaskHostArchitecture {
        match std::env::consts::ARCH {
            "x86" => TaskHostArchitecture::X86,
            "aarch64" => TaskHostArchitecture::Arm64,
            _ => TaskHostArchitecture::X64,
        }
    }

    pub fn resolve(self) -> TaskHostArchitecture {
        match self {
            TaskHostArchitecture::Current => Self::process(),
            other => other,
        }
    }

    pub fn is_any(self) -> bool {
        matches!(self, TaskHostArchitecture::Any)
    }

    pub fn matches(self, other: TaskHostArchitecture) -> bool {
        self.is_any() || other.is_any() || self.resolve() == other.resolve()
    }
}

impl fmt::Display for TaskHostArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskHostArchitecture::X86 => "x86",
            TaskHostArchitecture::X64 => "x64",
            TaskHostArchitecture::Arm64 => "arm64",
            TaskHostArchitecture::Current => "CurrentArchitecture",
            TaskHostArchitecture::Any => "*",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskHostArchitecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "x86" => Ok(TaskHostArchitecture::X86),
            "x64" | "amd64" => Ok(TaskHostArchitecture::X64),
            "arm64" => Ok(TaskHostArchitecture::Arm64),
            "currentarchitecture" | "current" => Ok(TaskHostArchitecture::Current),
            "*" | "any" => Ok(TaskHostArchitecture::Any),
            other => Err(format!(
                "invalid architecture: {other} (expected x86, x64, arm64, CurrentArchitecture or *)"
            )),
        }
    }
}

/// Importance of a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MessageImportance {
    High,
    #[default]
    Normal,
    Low,
}

impl FromStr for MessageImportance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(MessageImportance::High),
            "normal" | "" => Ok(MessageImportance::Normal),
            "low" => Ok(MessageImportance::Low),
            other => Err(format!("invalid importance: {other} (expected high, normal or low)")),
        }
    }
}

/// Parse an MSBuild-style boolean attribute value.
///
/// Accepts `true/false`, `on/off`, `yes/no` and their negations with `!`.
pub fn parse_bool(value: &str) -> Option<bool> {
    let trimmed = value.trim();
    if let Some(rest) = trimmed.strip_prefix('!') {
        return parse_bool(rest).map(|b| !b);
    }
    match trimmed.to_lowercase().as_str() {
        "true" | "on" | "yes" => Some(true),
        "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
