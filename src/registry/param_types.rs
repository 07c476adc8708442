// src/registry/param_types.rs

//! Task parameter types and the verifier that decides which declared types
//! are acceptable for task inputs and outputs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::evaluation::TaskItem;
use crate::types::parse_bool;

/// Scalar kinds a task parameter can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    String,
    Bool,
    Char,
    Byte,
    SByte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    Decimal,
    DateTime,
    TaskItem,
}

impl ScalarKind {
    fn type_name(self) -> &'static str {
        match self {
            ScalarKind::String => "System.String",
            ScalarKind::Bool => "System.Boolean",
            ScalarKind::Char => "System.Char",
            ScalarKind::Byte => "System.Byte",
            ScalarKind::SByte => "System.SByte",
            ScalarKind::Int16 => "System.Int16",
            ScalarKind::UInt16 => "System.UInt16",
            ScalarKind::Int32 => "System.Int32",
            ScalarKind::UInt32 => "System.UInt32",
            ScalarKind::Int64 => "System.Int64",
            ScalarKind::UInt64 => "System.UInt64",
            ScalarKind::Single => "System.Single",
            ScalarKind::Double => "System.Double",
            ScalarKind::Decimal => "System.Decimal",
            ScalarKind::DateTime => "System.DateTime",
            ScalarKind::TaskItem => "Microsoft.Build.Framework.ITaskItem",
        }
    }

    fn from_type_name(name: &str) -> Option<ScalarKind> {
        let lower = name.trim().to_ascii_lowercase();
        let kind = match lower.as_str() {
            "system.string" | "string" => ScalarKind::String,
            "system.boolean" | "bool" | "boolean" => ScalarKind::Bool,
            "system.char" | "char" => ScalarKind::Char,
            "system.byte" | "byte" => ScalarKind::Byte,
            "system.sbyte" | "sbyte" => ScalarKind::SByte,
            "system.int16" | "short" => ScalarKind::Int16,
            "system.uint16" | "ushort" => ScalarKind::UInt16,
            "system.int32" | "int" => ScalarKind::Int32,
            "system.uint32" | "uint" => ScalarKind::UInt32,
            "system.int64" | "long" => ScalarKind::Int64,
            "system.uint64" | "ulong" => ScalarKind::UInt64,
            "system.single" | "float" => ScalarKind::Single,
            "system.double" | "double" => ScalarKind::Double,
            "system.decimal" | "decimal" => ScalarKind::Decimal,
            "system.datetime" => ScalarKind::DateTime,
            "microsoft.build.framework.itaskitem" | "itaskitem" => ScalarKind::TaskItem,
            _ => return None,
        };
        Some(kind)
    }
}

/// Types that name real classes but can never be task parameters.
const DISALLOWED_TYPES: &[&str] = &[
    "system.object",
    "system.collections.arraylist",
    "system.collections.hashtable",
    "system.collections.ilist",
    "system.collections.idictionary",
    "system.intptr",
    "system.uintptr",
    "system.uri",
    "system.type",
    "system.version",
    "microsoft.build.framework.itaskitem2",
    "microsoft.build.utilities.taskitem",
];

/// A declared parameter type: a scalar kind, optionally as an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskParameterType {
    pub kind: ScalarKind,
    pub is_array: bool,
}

impl TaskParameterType {
    pub const STRING: TaskParameterType = TaskParameterType::scalar(ScalarKind::String);
    pub const BOOL: TaskParameterType = TaskParameterType::scalar(ScalarKind::Bool);
    pub const INT32: TaskParameterType = TaskParameterType::scalar(ScalarKind::Int32);
    pub const ITEM: TaskParameterType = TaskParameterType::scalar(ScalarKind::TaskItem);
    pub const ITEMS: TaskParameterType = TaskParameterType::array(ScalarKind::TaskItem);
    pub const STRINGS: TaskParameterType = TaskParameterType::array(ScalarKind::String);

    pub const fn scalar(kind: ScalarKind) -> Self {
        Self {
            kind,
            is_array: false,
        }
    }

    pub const fn array(kind: ScalarKind) -> Self {
        Self {
            kind,
            is_array: true,
        }
    }

    /// Convert expanded items into a value of this type.
    ///
    /// Scalars take the single item (an empty list yields `None`, i.e. the
    /// parameter is not set). Conversion failures name the offending value.
    pub fn convert(&self, items: Vec<TaskItem>) -> Result<Option<TaskParameterValue>, String> {
        if self.is_array {
            if self.kind == ScalarKind::TaskItem {
                return Ok(Some(TaskParameterValue::Items(items)));
            }
            let mut values = Vec::with_capacity(items.len());
            for item in items.iter() {
                values.push(convert_scalar(self.kind, &item.item_spec)?);
            }
            return Ok(Some(TaskParameterValue::Array(values)));
        }
        match items.len() {
            0 => Ok(None),
            1 => {
                let Some(item) = items.into_iter().next() else {
                    return Ok(None);
                };
                if self.kind == ScalarKind::TaskItem {
                    Ok(Some(TaskParameterValue::Item(item)))
                } else {
                    convert_scalar(self.kind, &item.item_spec)
                        .map(|v| Some(TaskParameterValue::Scalar(v)))
                }
            }
            _ => {
                if self.kind == ScalarKind::String {
                    let joined: Vec<String> = items.into_iter().map(|i| i.item_spec).collect();
                    Ok(Some(TaskParameterValue::Scalar(ScalarValue::String(
                        joined.join(";"),
                    ))))
                } else {
                    Err(format!(
                        "{} values were supplied where a single {} was expected",
                        items.len(),
                        self
                    ))
                }
            }
        }
    }
}

impl fmt::Display for TaskParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array {
            write!(f, "{}[]", self.kind.type_name())
        } else {
            f.write_str(self.kind.type_name())
        }
    }
}

fn convert_scalar(kind: ScalarKind, raw: &str) -> Result<ScalarValue, String> {
    let value = raw.trim();
    let bad = || format!("\"{raw}\" is not a valid {}", kind.type_name());
    let parsed = match kind {
        ScalarKind::String | ScalarKind::TaskItem => ScalarValue::String(raw.to_string()),
        ScalarKind::Bool => ScalarValue::Bool(parse_bool(value).ok_or_else(bad)?),
        ScalarKind::Char => {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => ScalarValue::Char(c),
                _ => return Err(bad()),
            }
        }
        ScalarKind::Byte => ScalarValue::UInt(value.parse::<u8>().map_err(|_| bad())? as u64),
        ScalarKind::UInt16 => ScalarValue::UInt(value.parse::<u16>().map_err(|_| bad())? as u64),
        ScalarKind::UInt32 => ScalarValue::UInt(value.parse::<u32>().map_err(|_| bad())? as u64),
        ScalarKind::UInt64 => ScalarValue::UInt(value.parse::<u64>().map_err(|_| bad())?),
        ScalarKind::SByte => ScalarValue::Int(value.parse::<i8>().map_err(|_| bad())? as i64),
        ScalarKind::Int16 => ScalarValue::Int(value.parse::<i16>().map_err(|_| bad())? as i64),
        ScalarKind::Int32 => ScalarValue::Int(value.parse::<i32>().map_err(|_| bad())? as i64),
        ScalarKind::Int64 => ScalarValue::Int(value.parse::<i64>().map_err(|_| bad())?),
        ScalarKind::Single | ScalarKind::Double | ScalarKind::Decimal => {
            ScalarValue::Float(value.parse::<f64>().map_err(|_| bad())?)
        }
        ScalarKind::DateTime => {
            if value.is_empty() || !value.chars().any(|c| c.is_ascii_digit()) {
                return Err(bad());
            }
            ScalarValue::String(value.to_string())
        }
    };
    Ok(parsed)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    String(String),
    Bool(bool),
    Char(char),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::String(s) => f.write_str(s),
            ScalarValue::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            ScalarValue::Char(c) => write!(f, "{c}"),
            ScalarValue::Int(i) => write!(f, "{i}"),
            ScalarValue::UInt(u) => write!(f, "{u}"),
            ScalarValue::Float(x) => write!(f, "{x}"),
        }
    }
}

/// Value bound to a task parameter, or read back from a task output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskParameterValue {
    Scalar(ScalarValue),
    Array(Vec<ScalarValue>),
    Item(TaskItem),
    Items(Vec<TaskItem>),
}

impl TaskParameterValue {
    pub fn string(value: impl Into<String>) -> Self {
        TaskParameterValue::Scalar(ScalarValue::String(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        TaskParameterValue::Scalar(ScalarValue::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        TaskParameterValue::Scalar(ScalarValue::Int(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TaskParameterValue::Scalar(ScalarValue::String(s)) => Some(s),
            TaskParameterValue::Item(item) => Some(&item.item_spec),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TaskParameterValue::Scalar(ScalarValue::Bool(b)) => Some(*b),
            TaskParameterValue::Scalar(ScalarValue::String(s)) => parse_bool(s),
            _ => None,
        }
    }

    /// Flatten into items, the form outputs are bound with.
    pub fn into_items(self) -> Vec<TaskItem> {
        match self {
            TaskParameterValue::Scalar(v) => {
                let spec = v.to_string();
                if spec.is_empty() {
                    Vec::new()
                } else {
                    vec![TaskItem::new(spec)]
                }
            }
            TaskParameterValue::Array(values) => values
                .into_iter()
                .map(|v| TaskItem::new(v.to_string()))
                .collect(),
            TaskParameterValue::Item(item) => vec![item],
            TaskParameterValue::Items(items) => items,
        }
    }

    /// Flatten into strings, the form list parameters are read with.
    pub fn into_strings(self) -> Vec<String> {
        self.into_items().into_iter().map(|i| i.item_spec).collect()
    }
}

/// Outcome of checking a declared parameter type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterTypeCheck {
    Valid(TaskParameterType),
    /// A real type that cannot be used as a task parameter.
    Unsupported,
    /// A type name that does not resolve at all.
    Unrecognized,
}

/// Resolve a declared type name such as `System.Int32[]`.
pub fn check_parameter_type(type_name: &str) -> ParameterTypeCheck {
    let trimmed = type_name.trim();
    let (element, is_array) = match trimmed.strip_suffix("[]") {
        Some(element) => (element, true),
        None => (trimmed, false),
    };
    if let Some(kind) = ScalarKind::from_type_name(element) {
        return ParameterTypeCheck::Valid(TaskParameterType { kind, is_array });
    }
    let lower = element.to_ascii_lowercase();
    if DISALLOWED_TYPES.contains(&lower.as_str()) {
        ParameterTypeCheck::Unsupported
    } else {
        ParameterTypeCheck::Unrecognized
    }
}

/// Whether a declared type may be used for an input parameter.
pub fn is_valid_input_parameter(type_name: &str) -> bool {
    matches!(check_parameter_type(type_name), ParameterTypeCheck::Valid(_))
}

/// Whether a declared type may be used for an output parameter. Same set as
/// inputs minus `System.Char[]`.
pub fn is_valid_output_parameter(type_name: &str) -> bool {
    match check_parameter_type(type_name) {
        ParameterTypeCheck::Valid(t) => !(t.is_array && t.kind == ScalarKind::Char),
        _ => false,
    }
}
