#![allow(dead_code)]

use indexmap::IndexMap;

use buildforge::project::model::{
    ItemDefinition, ItemGroupDefinition, MetadataDefinition, OnErrorDefinition, ProjectDefinition,
    PropertyDefinition, PropertyGroupDefinition, TargetDefinition, TargetStep, TaskInvocation,
    UsingTaskDefinition,
};

/// Builder for `ProjectDefinition` to simplify test setup.
#[derive(Debug, Default)]
pub struct ProjectBuilder {
    project: ProjectDefinition,
}

impl ProjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_targets(mut self, targets: &[&str]) -> Self {
        self.project.project.default_targets = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn initial_targets(mut self, targets: &[&str]) -> Self {
        self.project.project.initial_targets = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn property(mut self, name: &str, value: &str) -> Self {
        self.project.property_group.push(PropertyGroupDefinition {
            condition: None,
            property: vec![property(name, value)],
        });
        self
    }

    pub fn item(mut self, item: ItemDefinition) -> Self {
        self.project.item_group.push(ItemGroupDefinition {
            condition: None,
            item: vec![item],
        });
        self
    }

    pub fn using_task(mut self, using_task: UsingTaskDefinition) -> Self {
        self.project.using_task.push(using_task);
        self
    }

    pub fn target(mut self, name: &str, target: TargetDefinition) -> Self {
        self.project.target.insert(name.to_string(), target);
        self
    }

    pub fn build(self) -> ProjectDefinition {
        self.project
    }
}

/// Builder for `TargetDefinition`.
#[derive(Debug, Default)]
pub struct TargetDefBuilder {
    target: TargetDefinition,
}

impl TargetDefBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depends_on(mut self, targets: &str) -> Self {
        self.target.depends_on_targets = Some(targets.to_string());
        self
    }

    pub fn before(mut self, targets: &str) -> Self {
        self.target.before_targets = Some(targets.to_string());
        self
    }

    pub fn after(mut self, targets: &str) -> Self {
        self.target.after_targets = Some(targets.to_string());
        self
    }

    pub fn condition(mut self, condition: &str) -> Self {
        self.target.condition = Some(condition.to_string());
        self
    }

    pub fn inputs(mut self, inputs: &str) -> Self {
        self.target.inputs = Some(inputs.to_string());
        self
    }

    pub fn outputs(mut self, outputs: &str) -> Self {
        self.target.outputs = Some(outputs.to_string());
        self
    }

    pub fn returns(mut self, returns: &str) -> Self {
        self.target.returns = Some(returns.to_string());
        self
    }

    pub fn task(mut self, task: TaskInvocation) -> Self {
        self.target.steps.push(TargetStep::Task(task));
        self
    }

    pub fn message(self, text: &str) -> Self {
        self.task(TaskDefBuilder::new("Message").param("Text", text).build())
    }

    pub fn set_property(mut self, name: &str, value: &str) -> Self {
        self.target.steps.push(TargetStep::PropertyGroup(PropertyGroupDefinition {
            condition: None,
            property: vec![property(name, value)],
        }));
        self
    }

    pub fn add_item(mut self, item: ItemDefinition) -> Self {
        self.target.steps.push(TargetStep::ItemGroup(ItemGroupDefinition {
            condition: None,
            item: vec![item],
        }));
        self
    }

    pub fn on_error(mut self, targets: &str) -> Self {
        self.target.steps.push(TargetStep::OnError(OnErrorDefinition {
            execute_targets: targets.to_string(),
            condition: None,
        }));
        self
    }

    pub fn build(self) -> TargetDefinition {
        self.target
    }
}

/// Builder for `TaskInvocation`.
#[derive(Debug)]
pub struct TaskDefBuilder {
    task: TaskInvocation,
}

impl TaskDefBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            task: TaskInvocation {
                name: name.to_string(),
                parameters: IndexMap::new(),
                ..TaskInvocation::default()
            },
        }
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.task.parameters.insert(name.to_string(), value.to_string());
        self
    }

    pub fn condition(mut self, condition: &str) -> Self {
        self.task.condition = Some(condition.to_string());
        self
    }

    pub fn continue_on_error(mut self, value: &str) -> Self {
        self.task.continue_on_error = Some(value.to_string());
        self
    }

    pub fn build(self) -> TaskInvocation {
        self.task
    }
}

pub fn property(name: &str, value: &str) -> PropertyDefinition {
    PropertyDefinition {
        name: name.to_string(),
        value: value.to_string(),
        condition: None,
    }
}

/// `<Type Include="...">` with optional metadata pairs.
pub fn item(item_type: &str, include: &str, metadata: &[(&str, &str)]) -> ItemDefinition {
    ItemDefinition {
        item_type: item_type.to_string(),
        include: Some(include.to_string()),
        metadata: metadata
            .iter()
            .map(|(name, value)| MetadataDefinition {
                name: name.to_string(),
                value: value.to_string(),
                condition: None,
            })
            .collect(),
        ..ItemDefinition::default()
    }
}
