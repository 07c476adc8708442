// src/registry/identity.rs

//! Task identity: name plus the factory parameters (runtime, architecture)
//! that distinguish registrations sharing a name.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{TaskHostArchitecture, TaskHostRuntime};

pub const RUNTIME_PARAMETER: &str = "MSBuildRuntime";
pub const ARCHITECTURE_PARAMETER: &str = "MSBuildArchitecture";

/// Factory identity parameters.
///
/// Keys compare case-insensitively (`MSBuildRuntime` and `msbuildruntime`
/// are the same key); values are stored as written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskFactoryParameters {
    entries: BTreeMap<String, String>,
}

impl TaskFactoryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.insert(RUNTIME_PARAMETER, runtime);
        self
    }

    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.insert(ARCHITECTURE_PARAMETER, architecture);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(canonical_key(key), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&canonical_key(key)).map(|s| s.as_str())
    }

    pub fn runtime(&self) -> Option<&str> {
        self.get(RUNTIME_PARAMETER)
    }

    pub fn architecture(&self) -> Option<&str> {
        self.get(ARCHITECTURE_PARAMETER)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Lower-cased copy used as a cache key.
    pub fn normalized(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.trim().to_lowercase()))
            .collect()
    }

    /// Same keys, values equal ignoring case.
    pub fn matches_exactly(&self, other: &TaskFactoryParameters) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(k, v)| {
                other
                    .entries
                    .get(k)
                    .is_some_and(|o| o.trim().eq_ignore_ascii_case(v.trim()))
            })
    }

    /// Runtime and architecture compatible, treating absent values and `*`
    /// as wildcards on either side.
    pub fn matches_fuzzy(&self, other: &TaskFactoryParameters) -> bool {
        runtimes_match(self.runtime(), other.runtime())
            && architectures_match(self.architecture(), other.architecture())
    }

    pub fn parsed_runtime(&self) -> Option<TaskHostRuntime> {
        self.runtime().and_then(|r| r.parse().ok())
    }

    pub fn parsed_architecture(&self) -> Option<TaskHostArchitecture> {
        self.architecture().and_then(|a| a.parse().ok())
    }
}

impl fmt::Display for TaskFactoryParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

fn canonical_key(key: &str) -> String {
    if key.eq_ignore_ascii_case(RUNTIME_PARAMETER) {
        RUNTIME_PARAMETER.to_string()
    } else if key.eq_ignore_ascii_case(ARCHITECTURE_PARAMETER) {
        ARCHITECTURE_PARAMETER.to_string()
    } else {
        key.to_string()
    }
}

fn runtimes_match(a: Option<&str>, b: Option<&str>) -> bool {
    let parse = |v: Option<&str>| -> Option<TaskHostRuntime> {
        match v.map(str::trim) {
            None | Some("") => Some(TaskHostRuntime::Any),
            Some(s) => s.parse().ok(),
        }
    };
    match (parse(a), parse(b)) {
        (Some(x), Some(y)) => x.matches(y),
        // Unparsable values only match themselves.
        _ => a.zip(b).is_some_and(|(x, y)| x.eq_ignore_ascii_case(y)),
    }
}

fn architectures_match(a: Option<&str>, b: Option<&str>) -> bool {
    let parse = |v: Option<&str>| -> Option<TaskHostArchitecture> {
        match v.map(str::trim) {
            None | Some("") => Some(TaskHostArchitecture::Any),
            Some(s) => s.parse().ok(),
        }
    };
    match (parse(a), parse(b)) {
        (Some(x), Some(y)) => x.matches(y),
        _ => a.zip(b).is_some_and(|(x, y)| x.eq_ignore_ascii_case(y)),
    }
}

/// Name plus identity parameters of a registered task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisteredTaskIdentity {
    pub name: String,
    pub parameters: TaskFactoryParameters,
}

impl RegisteredTaskIdentity {
    pub fn new(name: impl Into<String>, parameters: TaskFactoryParameters) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// Case-insensitive on the name, exact on the parameters.
    pub fn is_same(&self, other: &RegisteredTaskIdentity) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.parameters.matches_exactly(&other.parameters)
    }

    /// Whether a requested short name (`MyTask`) refers to this possibly
    /// fully-qualified name (`Company.Tasks.MyTask`).
    pub fn name_matches(registered: &str, requested: &str) -> bool {
        if registered.eq_ignore_ascii_case(requested) {
            return true;
        }
        let Some(dot) = registered.len().checked_sub(requested.len() + 1) else {
            return false;
        };
        registered.as_bytes()[dot] == b'.'
            && registered
                .get(dot + 1..)
                .is_some_and(|tail| tail.eq_ignore_ascii_case(requested))
    }
}

/// Where a task's implementation comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssemblyLoadInfo {
    /// Neither name nor file was declared.
    Unspecified,
    Name(String),
    File(String),
}

impl AssemblyLoadInfo {
    /// Build from the (already expanded) name and file. Empty strings count
    /// as absent; when both are present the name wins.
    pub fn create(name: Option<String>, file: Option<String>) -> Self {
        let name = name.filter(|n| !n.trim().is_empty());
        let file = file.filter(|f| !f.trim().is_empty());
        match (name, file) {
            (Some(name), _) => AssemblyLoadInfo::Name(name),
            (None, Some(file)) => AssemblyLoadInfo::File(file),
            (None, None) => AssemblyLoadInfo::Unspecified,
        }
    }

    pub fn assembly_name(&self) -> Option<&str> {
        match self {
            AssemblyLoadInfo::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn assembly_file(&self) -> Option<&str> {
        match self {
            AssemblyLoadInfo::File(f) => Some(f),
            _ => None,
        }
    }

    /// Library name this info resolves to: the name itself, or the file
    /// stem of an assembly file.
    pub fn library_name(&self) -> Option<String> {
        match self {
            AssemblyLoadInfo::Name(n) => Some(n.split(',').next().unwrap_or(n).trim().to_string()),
            AssemblyLoadInfo::File(f) => {
                let file_name = f.rsplit(['/', '\\']).next().unwrap_or(f);
                let stem = file_name
                    .strip_suffix(".dll")
                    .or_else(|| file_name.strip_suffix(".DLL"))
                    .unwrap_or(file_name);
                Some(stem.to_string())
            }
            AssemblyLoadInfo::Unspecified => None,
        }
    }
}

impl fmt::Display for AssemblyLoadInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyLoadInfo::Unspecified => f.write_str("<unspecified>"),
            AssemblyLoadInfo::Name(n) => write!(f, "{n}"),
            AssemblyLoadInfo::File(p) => write!(f, "{p}"),
        }
    }
}
