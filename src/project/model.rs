// src/project/model.rs

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A project file as read from TOML.
///
/// ```toml
/// [project]
/// default_targets = ["Build"]
///
/// [[property_group]]
/// [[property_group.property]]
/// name = "Configuration"
/// value = "Debug"
///
/// [[item_group]]
/// [[item_group.item]]
/// type = "Compile"
/// include = "main.rs;lib.rs"
///
/// [[using_task]]
/// task_name = "CustomTask"
/// assembly_file = "tasks/custom.dll"
///
/// [target.Build]
/// depends_on_targets = "Restore"
/// [[target.Build.steps]]
/// kind = "task"
/// name = "Message"
/// parameters = { Text = "Building $(Configuration)" }
/// ```
///
/// Property groups are evaluated before `[[choose]]` blocks, and item groups
/// before the item parts of `[[choose]]` blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectDefinition {
    #[serde(default)]
    pub project: ProjectSection,

    #[serde(default)]
    pub property_group: Vec<PropertyGroupDefinition>,

    #[serde(default)]
    pub item_group: Vec<ItemGroupDefinition>,

    #[serde(default)]
    pub choose: Vec<ChooseDefinition>,

    #[serde(default)]
    pub using_task: Vec<UsingTaskDefinition>,

    /// Targets in declaration order, keyed by name.
    #[serde(default)]
    pub target: IndexMap<String, TargetDefinition>,
}

/// `[project]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
    /// Targets built when a request names none. Defaults to the first target.
    #[serde(default)]
    pub default_targets: Vec<String>,

    /// Targets built before anything else, on every request.
    #[serde(default)]
    pub initial_targets: Vec<String>,

    #[serde(default)]
    pub tools_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyGroupDefinition {
    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub property: Vec<PropertyDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyDefinition {
    pub name: String,

    #[serde(default, deserialize_with = "text::string")]
    pub value: String,

    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemGroupDefinition {
    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub item: Vec<ItemDefinition>,
}

/// One item element. Exactly one of `include` and `remove` is an add or a
/// remove; neither (inside a target) is a metadata modification of every
/// item of the type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemDefinition {
    #[serde(rename = "type")]
    pub item_type: String,

    #[serde(default)]
    pub include: Option<String>,

    #[serde(default)]
    pub exclude: Option<String>,

    #[serde(default)]
    pub remove: Option<String>,

    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default, deserialize_with = "text::option")]
    pub keep_duplicates: Option<String>,

    #[serde(default)]
    pub keep_metadata: Option<String>,

    #[serde(default)]
    pub remove_metadata: Option<String>,

    #[serde(default)]
    pub match_on_metadata: Option<String>,

    #[serde(default)]
    pub match_on_metadata_options: Option<String>,

    #[serde(default)]
    pub metadata: Vec<MetadataDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataDefinition {
    pub name: String,

    #[serde(default, deserialize_with = "text::string")]
    pub value: String,

    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChooseDefinition {
    #[serde(default)]
    pub when: Vec<WhenDefinition>,

    #[serde(default)]
    pub otherwise: Option<ChooseBranch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhenDefinition {
    pub condition: String,

    #[serde(flatten)]
    pub branch: ChooseBranch,
}

/// Body of a `when` or `otherwise` clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChooseBranch {
    #[serde(default)]
    pub property_group: Vec<PropertyGroupDefinition>,

    #[serde(default)]
    pub item_group: Vec<ItemGroupDefinition>,

    #[serde(default)]
    pub choose: Vec<ChooseDefinition>,
}

/// `[[using_task]]` declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsingTaskDefinition {
    pub task_name: String,

    #[serde(default)]
    pub assembly_name: Option<String>,

    #[serde(default)]
    pub assembly_file: Option<String>,

    #[serde(default)]
    pub task_factory: Option<String>,

    #[serde(default)]
    pub runtime: Option<String>,

    #[serde(default)]
    pub architecture: Option<String>,

    #[serde(default)]
    pub condition: Option<String>,

    /// Inline parameters, in declaration order.
    #[serde(default)]
    pub parameter_group: Option<IndexMap<String, ParameterDefinition>>,

    #[serde(default)]
    pub task: Option<TaskBodyDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterDefinition {
    #[serde(default, rename = "type")]
    pub parameter_type: Option<String>,

    #[serde(default, deserialize_with = "text::option")]
    pub output: Option<String>,

    #[serde(default, deserialize_with = "text::option")]
    pub required: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskBodyDefinition {
    #[serde(default, deserialize_with = "text::option")]
    pub evaluate: Option<String>,

    #[serde(default)]
    pub contents: String,
}

/// `[target.<Name>]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetDefinition {
    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub depends_on_targets: Option<String>,

    #[serde(default)]
    pub before_targets: Option<String>,

    #[serde(default)]
    pub after_targets: Option<String>,

    #[serde(default)]
    pub inputs: Option<String>,

    #[serde(default)]
    pub outputs: Option<String>,

    /// When present, replaces `outputs` as what callers see.
    #[serde(default)]
    pub returns: Option<String>,

    #[serde(default, deserialize_with = "text::option")]
    pub keep_duplicate_outputs: Option<String>,

    #[serde(default)]
    pub steps: Vec<TargetStep>,
}

/// Child of a target, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetStep {
    Task(TaskInvocation),
    PropertyGroup(PropertyGroupDefinition),
    ItemGroup(ItemGroupDefinition),
    Choose(ChooseDefinition),
    OnError(OnErrorDefinition),
}

impl TargetStep {
    pub fn kind(&self) -> &'static str {
        match self {
            TargetStep::Task(_) => "task",
            TargetStep::PropertyGroup(_) => "property_group",
            TargetStep::ItemGroup(_) => "item_group",
            TargetStep::Choose(_) => "choose",
            TargetStep::OnError(_) => "on_error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskInvocation {
    pub name: String,

    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default, deserialize_with = "text::option")]
    pub continue_on_error: Option<String>,

    /// Requested task host runtime (`MSBuildRuntime`).
    #[serde(default)]
    pub runtime: Option<String>,

    /// Requested task host architecture (`MSBuildArchitecture`).
    #[serde(default)]
    pub architecture: Option<String>,

    #[serde(default, deserialize_with = "text::map")]
    pub parameters: IndexMap<String, String>,

    #[serde(default)]
    pub output: Vec<TaskOutputDefinition>,
}

/// Binds a task output parameter to an item type or a property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskOutputDefinition {
    pub task_parameter: String,

    #[serde(default)]
    pub item_name: Option<String>,

    #[serde(default)]
    pub property_name: Option<String>,

    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OnErrorDefinition {
    pub execute_targets: String,

    #[serde(default)]
    pub condition: Option<String>,
}

/// Attribute values are strings, but project authors may write TOML
/// booleans and numbers for them.
mod text {
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(String),
    }

    impl From<Scalar> for String {
        fn from(value: Scalar) -> Self {
            match value {
                Scalar::Bool(b) => b.to_string(),
                Scalar::Int(i) => i.to_string(),
                Scalar::Float(f) => f.to_string(),
                Scalar::Text(s) => s,
            }
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(Scalar::deserialize(d)?.into())
    }

    pub fn option<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<Scalar>::deserialize(d)?.map(String::from))
    }

    pub fn map<'de, D: Deserializer<'de>>(d: D) -> Result<IndexMap<String, String>, D::Error> {
        let raw = IndexMap::<String, Scalar>::deserialize(d)?;
        Ok(raw.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
