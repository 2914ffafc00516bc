//! Fluent builder for constructing and validating workflow definitions.

use std::time::Duration;

use apollo_core::{NodeId, WorkflowId};
use apollo_resilience::RetryPolicy;
use serde_json::Value;

use crate::connection::{BODY_LABEL, Connection, DEFAULT_LABEL, EXIT_LABEL};
use crate::definition::WorkflowDefinition;
use crate::error::ValidationErrors;
use crate::guard::Guard;
use crate::node::NodeDefinition;
use crate::validate::{ValidatedWorkflow, validate};

/// A builder that accumulates nodes, edges and configuration, then validates
/// and produces a [`WorkflowDefinition`].
///
/// Besides plain [`connect`](Self::connect), it offers helpers for the three
/// structured shapes: [`conditional_branch`](Self::conditional_branch),
/// [`parallel`](Self::parallel) and [`loop_over`](Self::loop_over).
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    definition: WorkflowDefinition,
}

impl WorkflowBuilder {
    /// Start building a workflow.
    #[must_use]
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        Self {
            definition: WorkflowDefinition::new(id, name),
        }
    }

    /// Set the workflow description.
    #[must_use]
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.definition.description = Some(desc.into());
        self
    }

    /// Add a workflow variable.
    #[must_use]
    pub fn variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.definition.variables.insert(key.into(), value.into());
        self
    }

    /// Enable or disable rollback on terminal failure.
    #[must_use]
    pub fn rollback_enabled(mut self, enabled: bool) -> Self {
        self.definition.rollback_enabled = enabled;
        self
    }

    /// Set the workflow-wide default retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.definition.config.retry_policy = Some(policy);
        self
    }

    /// Set the workflow-wide default per-attempt node timeout.
    #[must_use]
    pub fn node_timeout(mut self, timeout: Duration) -> Self {
        self.definition.config.node_timeout = Some(timeout);
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.definition.tags.push(tag.into());
        self
    }

    /// Add a node to the workflow.
    #[must_use]
    pub fn add_node(mut self, node: NodeDefinition) -> Self {
        self.definition.nodes.push(node);
        self
    }

    /// Add an unguarded connection between two nodes.
    #[must_use]
    pub fn connect(self, from: &NodeId, to: &NodeId) -> Self {
        self.add_connection(Connection::new(from.clone(), to.clone()))
    }

    /// Add a guarded connection.
    #[must_use]
    pub fn connect_guarded(self, from: &NodeId, to: &NodeId, guard: Guard) -> Self {
        self.add_connection(Connection::new(from.clone(), to.clone()).with_guard(guard))
    }

    /// Add a fully specified connection.
    #[must_use]
    pub fn add_connection(mut self, connection: Connection) -> Self {
        self.definition.connections.push(connection);
        self
    }

    /// Wire a branch: `condition → on_true` when `guard` holds, otherwise the
    /// `default` edge to `on_false`, if given.
    #[must_use]
    pub fn conditional_branch(
        self,
        condition: &NodeId,
        guard: Guard,
        on_true: &NodeId,
        on_false: Option<&NodeId>,
    ) -> Self {
        let builder = self.connect_guarded(condition, on_true, guard);
        match on_false {
            Some(target) => builder.add_connection(
                Connection::new(condition.clone(), target.clone()).with_label(DEFAULT_LABEL),
            ),
            None => builder,
        }
    }

    /// Wire a parallel region: `split → branch → merge` for every branch.
    ///
    /// Each branch here is a single node; longer branches can be wired with
    /// [`connect`](Self::connect) instead.
    #[must_use]
    pub fn parallel(self, split: &NodeId, branches: &[NodeId], merge: &NodeId) -> Self {
        branches.iter().fold(self, |builder, branch| {
            builder.connect(split, branch).connect(branch, merge)
        })
    }

    /// Wire a loop: `loop → body_entry` (labelled `body`), `body_exit → loop`,
    /// and `loop → exit` (labelled `exit`) if given.
    #[must_use]
    pub fn loop_over(
        self,
        loop_node: &NodeId,
        body_entry: &NodeId,
        body_exit: &NodeId,
        exit: Option<&NodeId>,
    ) -> Self {
        let builder = self
            .add_connection(
                Connection::new(loop_node.clone(), body_entry.clone()).with_label(BODY_LABEL),
            )
            .connect(body_exit, loop_node);
        match exit {
            Some(target) => builder.add_connection(
                Connection::new(loop_node.clone(), target.clone()).with_label(EXIT_LABEL),
            ),
            None => builder,
        }
    }

    /// Validate and return the definition.
    pub fn build(self) -> Result<WorkflowDefinition, ValidationErrors> {
        validate(&self.definition)?;
        Ok(self.definition)
    }

    /// Validate and return the executable form.
    pub fn build_validated(self) -> Result<ValidatedWorkflow, ValidationErrors> {
        ValidatedWorkflow::new(self.definition)
    }

    /// Return the definition without validating it.
    #[must_use]
    pub fn into_definition(self) -> WorkflowDefinition {
        self.definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn builder() -> WorkflowBuilder {
        WorkflowBuilder::new(WorkflowId::new("wf").unwrap(), "built")
            .add_node(NodeDefinition::trigger(id("start")))
    }

    #[test]
    fn conditional_branch_adds_guarded_and_default_edges() {
        let def = builder()
            .add_node(NodeDefinition::condition(id("check")))
            .add_node(NodeDefinition::task(id("yes"), "cap"))
            .add_node(NodeDefinition::task(id("no"), "cap"))
            .connect(&id("start"), &id("check"))
            .conditional_branch(
                &id("check"),
                Guard::equals("trigger.ok", true),
                &id("yes"),
                Some(&id("no")),
            )
            .build()
            .unwrap();

        assert_eq!(def.connections.len(), 3);
        assert_eq!(def.connections[1].guard, Some(Guard::equals("trigger.ok", true)));
        assert!(def.connections[2].has_label(DEFAULT_LABEL));
    }

    #[test]
    fn parallel_wires_every_branch_to_merge() {
        let def = builder()
            .add_node(NodeDefinition::parallel_split(id("split"), &id("join")))
            .add_node(NodeDefinition::task(id("a"), "cap"))
            .add_node(NodeDefinition::task(id("b"), "cap"))
            .add_node(NodeDefinition::merge(id("join")))
            .connect(&id("start"), &id("split"))
            .parallel(&id("split"), &[id("a"), id("b")], &id("join"))
            .build()
            .unwrap();

        let targets: Vec<&str> = def
            .connections
            .iter()
            .filter(|c| c.to_node == id("join"))
            .map(|c| c.from_node.as_str())
            .collect();
        assert_eq!(targets, vec!["a", "b"]);
    }

    #[test]
    fn loop_over_labels_body_and_exit() {
        let def = builder()
            .add_node(NodeDefinition::loop_node(id("poll"), Guard::exists("x"), 3))
            .add_node(NodeDefinition::task(id("work"), "cap"))
            .add_node(NodeDefinition::task(id("done"), "cap"))
            .connect(&id("start"), &id("poll"))
            .loop_over(&id("poll"), &id("work"), &id("work"), Some(&id("done")))
            .build()
            .unwrap();

        assert!(def.connections[1].has_label(BODY_LABEL));
        assert_eq!(def.connections[2].to_node, id("poll"));
        assert!(def.connections[3].has_label(EXIT_LABEL));
    }

    #[test]
    fn build_reports_validation_errors() {
        let errors = WorkflowBuilder::new(WorkflowId::new("wf").unwrap(), "no trigger")
            .add_node(NodeDefinition::task(id("a"), "cap"))
            .build()
            .unwrap_err();
        assert!(errors.any(|e| *e == ValidationError::MissingTrigger));
    }
}
