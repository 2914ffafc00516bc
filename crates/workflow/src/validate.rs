//! Comprehensive workflow validation that collects all errors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use apollo_core::{NodeId, WorkflowId};

use crate::behavior::NodeBehavior;
use crate::connection::{BODY_LABEL, Connection, EXIT_LABEL};
use crate::definition::WorkflowDefinition;
use crate::error::{ValidationError, ValidationErrors};
use crate::graph::DependencyGraph;
use crate::node::{NodeDefinition, NodeKind};

fn is_valid_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(|segment| !segment.trim().is_empty())
}

/// Validate a workflow definition comprehensively.
///
/// Collects every issue it can find so they can all be reported at once.
/// Pure: validating the same definition twice yields the same list.
#[must_use]
pub fn validate_workflow(definition: &WorkflowDefinition) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // 1. Check name
    if definition.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }

    // 2. Check node count
    if definition.nodes.is_empty() {
        errors.push(ValidationError::NoNodes);
        return errors; // Cannot check further without nodes
    }

    // 3. Check duplicate node IDs
    let mut by_id: HashMap<&NodeId, &NodeDefinition> = HashMap::new();
    for node in &definition.nodes {
        if by_id.insert(&node.id, node).is_some() {
            errors.push(ValidationError::DuplicateNodeId(node.id.clone()));
        }
    }

    // 4. Check connections reference valid nodes and detect self-loops
    let mut edges_ok = true;
    for conn in &definition.connections {
        for endpoint in [&conn.from_node, &conn.to_node] {
            if !by_id.contains_key(endpoint) {
                errors.push(ValidationError::UnknownNode(endpoint.clone()));
                edges_ok = false;
            }
        }
        if conn.is_self_loop() {
            errors.push(ValidationError::SelfLoop(conn.from_node.clone()));
            edges_ok = false;
        }
    }

    // 5. Exactly one trigger, never an edge target
    let triggers: Vec<&NodeDefinition> = definition.nodes_of_kind(NodeKind::Trigger).collect();
    match triggers.len() {
        0 => errors.push(ValidationError::MissingTrigger),
        1 => {}
        count => errors.push(ValidationError::MultipleTriggers { count }),
    }
    for trigger in &triggers {
        if definition.connections.iter().any(|c| c.to_node == trigger.id) {
            errors.push(ValidationError::TriggerHasIncomingEdges(trigger.id.clone()));
        }
    }

    // 6. Per-node settings
    let mut behaviors = HashMap::new();
    for node in &definition.nodes {
        check_node(node, &by_id, &mut errors);
        match NodeBehavior::from_node(node) {
            Ok(behavior) => {
                behaviors.insert(&node.id, behavior);
            }
            Err(message) => errors.push(ValidationError::InvalidConfig {
                node_id: node.id.clone(),
                message,
            }),
        }
    }

    // 7. Outgoing edges per kind
    for node in &definition.nodes {
        let outgoing: Vec<&Connection> = definition
            .connections
            .iter()
            .filter(|c| c.from_node == node.id)
            .collect();
        check_outgoing(node, &outgoing, &mut errors);
    }

    // 8. Error handlers are only reachable through handler references
    for node in definition.nodes_of_kind(NodeKind::ErrorHandler) {
        if definition.connections.iter().any(|c| c.to_node == node.id) {
            errors.push(ValidationError::HandlerReachable(node.id.clone()));
        }
    }

    // 9. Workflow-level retry policy
    if let Some(policy) = &definition.config.retry_policy
        && let Err(e) = policy.validate()
    {
        errors.push(ValidationError::InvalidRetryPolicy {
            node_id: None,
            message: e.to_string(),
        });
    }

    // 10. Graph structure
    if edges_ok {
        match DependencyGraph::from_definition(definition) {
            Ok(graph) => {
                check_split_pairing(&behaviors, &by_id, &graph, &mut errors);
                let loops: HashSet<&NodeId> = definition
                    .nodes_of_kind(NodeKind::Loop)
                    .map(|n| &n.id)
                    .collect();
                if let Some(node_id) = graph.find_cycle_outside(|id| loops.contains(id)) {
                    errors.push(ValidationError::CycleDetected(node_id));
                }
            }
            Err(e) => errors.push(e),
        }
    }

    errors
}

fn check_node(
    node: &NodeDefinition,
    by_id: &HashMap<&NodeId, &NodeDefinition>,
    errors: &mut Vec<ValidationError>,
) {
    if node.kind.requires_capability()
        && node
            .capability_name
            .as_deref()
            .is_none_or(|name| name.trim().is_empty())
    {
        errors.push(ValidationError::MissingCapability(node.id.clone()));
    }

    if node.retry_policy.is_some() || node.max_attempts.is_some() {
        let policy = node.effective_retry(&apollo_resilience::RetryPolicy::default());
        if let Err(e) = policy.validate() {
            errors.push(ValidationError::InvalidRetryPolicy {
                node_id: Some(node.id.clone()),
                message: e.to_string(),
            });
        }
    }

    let paths = node
        .input_mapping
        .values()
        .chain(node.output_mapping.keys());
    for path in paths {
        if !is_valid_path(path) {
            errors.push(ValidationError::InvalidPath {
                node_id: node.id.clone(),
                path: path.clone(),
            });
        }
    }

    for handler_id in [&node.error_handler_id, &node.rollback_handler_id]
        .into_iter()
        .flatten()
    {
        match by_id.get(handler_id) {
            None => errors.push(ValidationError::UnknownHandler {
                node_id: node.id.clone(),
                handler_id: handler_id.clone(),
            }),
            Some(handler) if handler.kind != NodeKind::ErrorHandler => {
                errors.push(ValidationError::HandlerWrongKind {
                    node_id: node.id.clone(),
                    handler_id: handler_id.clone(),
                });
            }
            Some(_) => {}
        }
    }
}

fn check_outgoing(
    node: &NodeDefinition,
    outgoing: &[&Connection],
    errors: &mut Vec<ValidationError>,
) {
    for conn in outgoing {
        if let Some(guard) = &conn.guard
            && !is_valid_path(&guard.field)
        {
            errors.push(ValidationError::InvalidPath {
                node_id: node.id.clone(),
                path: guard.field.clone(),
            });
        }
    }

    match node.kind {
        NodeKind::Condition | NodeKind::Switch => {
            if node.kind == NodeKind::Condition && outgoing.len() > 2 {
                errors.push(ValidationError::ConditionFanOut(node.id.clone()));
            }
            if outgoing.iter().filter(|c| c.is_default()).count() > 1 {
                errors.push(ValidationError::AmbiguousDefault(node.id.clone()));
            }
        }
        NodeKind::Loop => {
            let bodies = outgoing.iter().filter(|c| c.has_label(BODY_LABEL)).count();
            let exits = outgoing.iter().filter(|c| c.has_label(EXIT_LABEL)).count();
            if bodies != 1 {
                errors.push(ValidationError::LoopBody {
                    node_id: node.id.clone(),
                    found: bodies,
                });
            }
            if exits > 1 || bodies + exits != outgoing.len() {
                errors.push(ValidationError::LoopEdges(node.id.clone()));
            }
        }
        _ => {}
    }
}

fn check_split_pairing(
    behaviors: &HashMap<&NodeId, NodeBehavior>,
    by_id: &HashMap<&NodeId, &NodeDefinition>,
    graph: &DependencyGraph,
    errors: &mut Vec<ValidationError>,
) {
    let mut paired: HashSet<&NodeId> = HashSet::new();
    let mut splits: Vec<(&NodeId, &NodeId)> = behaviors
        .iter()
        .filter_map(|(split, behavior)| match behavior {
            NodeBehavior::ParallelSplit { merge } => Some((*split, merge)),
            _ => None,
        })
        .collect();
    splits.sort();

    for (split, merge) in splits {
        let is_merge = by_id
            .get(merge)
            .is_some_and(|node| node.kind == NodeKind::Merge);
        if !is_merge || !graph.reachable_from(split).contains(merge) {
            errors.push(ValidationError::InvalidMergeReference {
                split: split.clone(),
                merge: merge.clone(),
            });
            continue;
        }
        if !paired.insert(merge) {
            errors.push(ValidationError::MergePairedTwice(merge.clone()));
        }
    }
}

/// Validate a definition, reporting every problem at once.
///
/// Idempotent: validating an already-valid definition again is a no-op.
pub fn validate(definition: &WorkflowDefinition) -> Result<(), ValidationErrors> {
    match ValidationErrors::from_vec(validate_workflow(definition)) {
        Some(errors) => Err(errors),
        None => Ok(()),
    }
}

/// A definition that passed validation, together with its graph and the
/// typed behaviour of every node.
///
/// This is the only form the engine executes, so runs never re-validate.
#[derive(Debug, Clone)]
pub struct ValidatedWorkflow {
    definition: Arc<WorkflowDefinition>,
    graph: DependencyGraph,
    behaviors: HashMap<NodeId, NodeBehavior>,
    positions: HashMap<NodeId, usize>,
    trigger: NodeId,
}

impl ValidatedWorkflow {
    /// Validate `definition` and prepare it for execution.
    pub fn new(definition: WorkflowDefinition) -> Result<Self, ValidationErrors> {
        validate(&definition)?;

        let graph =
            DependencyGraph::from_definition(&definition).map_err(ValidationErrors::single)?;

        let mut behaviors = HashMap::with_capacity(definition.nodes.len());
        let mut positions = HashMap::with_capacity(definition.nodes.len());
        for (position, node) in definition.nodes.iter().enumerate() {
            let behavior = NodeBehavior::from_node(node).map_err(|message| {
                ValidationErrors::single(ValidationError::InvalidConfig {
                    node_id: node.id.clone(),
                    message,
                })
            })?;
            behaviors.insert(node.id.clone(), behavior);
            positions.insert(node.id.clone(), position);
        }

        let trigger = definition
            .trigger()
            .map(|n| n.id.clone())
            .ok_or_else(|| ValidationErrors::single(ValidationError::MissingTrigger))?;

        Ok(Self {
            definition: Arc::new(definition),
            graph,
            behaviors,
            positions,
            trigger,
        })
    }

    /// The underlying definition.
    #[must_use]
    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    /// Shared handle to the underlying definition.
    #[must_use]
    pub fn shared_definition(&self) -> Arc<WorkflowDefinition> {
        Arc::clone(&self.definition)
    }

    /// The workflow id.
    #[must_use]
    pub fn id(&self) -> &WorkflowId {
        &self.definition.id
    }

    /// The single trigger node.
    #[must_use]
    pub fn trigger_id(&self) -> &NodeId {
        &self.trigger
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&NodeDefinition> {
        self.positions
            .get(id)
            .map(|&position| &self.definition.nodes[position])
    }

    /// The parsed behaviour of a node.
    #[must_use]
    pub fn behavior(&self, id: &NodeId) -> Option<&NodeBehavior> {
        self.behaviors.get(id)
    }

    /// Outgoing edges of a node, in declaration order.
    #[must_use]
    pub fn outgoing(&self, id: &NodeId) -> Vec<&Connection> {
        self.graph.outgoing_connections(id)
    }

    /// The node graph.
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::Guard;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn make_definition(
        name: &str,
        nodes: Vec<NodeDefinition>,
        connections: Vec<Connection>,
    ) -> WorkflowDefinition {
        let mut def = WorkflowDefinition::new(WorkflowId::new("wf").unwrap(), name);
        def.nodes = nodes;
        def.connections = connections;
        def
    }

    fn edge(a: &str, b: &str) -> Connection {
        Connection::new(id(a), id(b))
    }

    fn linear() -> WorkflowDefinition {
        make_definition(
            "linear",
            vec![
                NodeDefinition::trigger(id("start")),
                NodeDefinition::task(id("a"), "cap"),
                NodeDefinition::task(id("b"), "cap"),
            ],
            vec![edge("start", "a"), edge("a", "b")],
        )
    }

    fn has(errors: &[ValidationError], expected: &ValidationError) -> bool {
        errors.iter().any(|e| e == expected)
    }

    #[test]
    fn valid_workflow_returns_empty() {
        let errors = validate_workflow(&linear());
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn validation_is_idempotent() {
        let def = linear();
        let before = def.clone();
        assert_eq!(validate(&def), Ok(()));
        assert_eq!(validate(&def), Ok(()));
        assert_eq!(def, before);
    }

    #[test]
    fn detects_empty_name_and_no_nodes() {
        let errors = validate_workflow(&make_definition("", vec![], vec![]));
        assert_eq!(errors, vec![ValidationError::EmptyName, ValidationError::NoNodes]);
    }

    #[rstest]
    #[case(0)]
    #[case(2)]
    #[case(3)]
    fn trigger_count_must_be_one(#[case] count: usize) {
        let mut nodes: Vec<NodeDefinition> = (0..count)
            .map(|i| NodeDefinition::trigger(id(&format!("t{i}"))))
            .collect();
        nodes.push(NodeDefinition::task(id("work"), "cap"));
        let errors = validate_workflow(&make_definition("x", nodes, vec![]));
        let expected = if count == 0 {
            ValidationError::MissingTrigger
        } else {
            ValidationError::MultipleTriggers { count }
        };
        assert!(has(&errors, &expected), "{errors:?}");
    }

    #[test]
    fn trigger_with_incoming_edge_is_rejected() {
        let mut def = linear();
        def.connections.push(edge("b", "start"));
        let errors = validate_workflow(&def);
        assert!(has(
            &errors,
            &ValidationError::TriggerHasIncomingEdges(id("start"))
        ));
    }

    #[test]
    fn detects_duplicates_unknown_nodes_and_self_loops() {
        let mut def = linear();
        def.nodes.push(NodeDefinition::task(id("a"), "cap"));
        def.connections.push(edge("a", "ghost"));
        def.connections.push(edge("b", "b"));
        let errors = validate_workflow(&def);
        assert!(has(&errors, &ValidationError::DuplicateNodeId(id("a"))));
        assert!(has(&errors, &ValidationError::UnknownNode(id("ghost"))));
        assert!(has(&errors, &ValidationError::SelfLoop(id("b"))));
    }

    #[test]
    fn task_without_capability_is_rejected() {
        let mut def = linear();
        def.nodes[1].capability_name = Some("  ".into());
        def.nodes[2].capability_name = None;
        let errors = validate_workflow(&def);
        assert!(has(&errors, &ValidationError::MissingCapability(id("a"))));
        assert!(has(&errors, &ValidationError::MissingCapability(id("b"))));
    }

    #[test]
    fn loop_without_bound_is_rejected() {
        let mut def = linear();
        def.nodes.push(
            NodeDefinition::new(id("l"), NodeKind::Loop)
                .with_config("guard", serde_json::json!(Guard::exists("x"))),
        );
        def.connections.push(edge("b", "l"));
        def.connections
            .push(Connection::new(id("l"), id("a")).with_label(BODY_LABEL));
        let errors = validate_workflow(&def);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::InvalidConfig { node_id, .. } if node_id == &id("l"))),
            "{errors:?}"
        );
    }

    #[test]
    fn loop_requires_body_edge() {
        let mut def = linear();
        def.nodes
            .push(NodeDefinition::loop_node(id("l"), Guard::exists("x"), 3));
        def.connections.push(edge("b", "l"));
        let errors = validate_workflow(&def);
        assert!(has(
            &errors,
            &ValidationError::LoopBody {
                node_id: id("l"),
                found: 0
            }
        ));
    }

    #[test]
    fn loop_back_edge_is_allowed_but_plain_cycle_is_not() {
        let def = make_definition(
            "loop",
            vec![
                NodeDefinition::trigger(id("start")),
                NodeDefinition::loop_node(id("l"), Guard::exists("x"), 3),
                NodeDefinition::task(id("body"), "cap"),
                NodeDefinition::task(id("after"), "cap"),
            ],
            vec![
                edge("start", "l"),
                edge("l", "body").with_label(BODY_LABEL),
                edge("body", "l"),
                edge("l", "after").with_label(EXIT_LABEL),
            ],
        );
        assert_eq!(validate_workflow(&def), vec![]);

        let cyclic = make_definition(
            "cycle",
            vec![
                NodeDefinition::trigger(id("start")),
                NodeDefinition::task(id("a"), "cap"),
                NodeDefinition::task(id("b"), "cap"),
            ],
            vec![edge("start", "a"), edge("a", "b"), edge("b", "a")],
        );
        let errors = validate_workflow(&cyclic);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::CycleDetected(_))),
            "{errors:?}"
        );
    }

    #[test]
    fn split_must_reference_reachable_merge() {
        let def = make_definition(
            "split",
            vec![
                NodeDefinition::trigger(id("start")),
                NodeDefinition::parallel_split(id("split"), &id("join")),
                NodeDefinition::task(id("a"), "cap"),
                NodeDefinition::task(id("join"), "cap"),
            ],
            vec![edge("start", "split"), edge("split", "a"), edge("a", "join")],
        );
        let errors = validate_workflow(&def);
        assert!(has(
            &errors,
            &ValidationError::InvalidMergeReference {
                split: id("split"),
                merge: id("join"),
            }
        ));
    }

    #[test]
    fn merge_cannot_pair_with_two_splits() {
        let def = make_definition(
            "split",
            vec![
                NodeDefinition::trigger(id("start")),
                NodeDefinition::parallel_split(id("s1"), &id("join")),
                NodeDefinition::parallel_split(id("s2"), &id("join")),
                NodeDefinition::merge(id("join")),
            ],
            vec![
                edge("start", "s1"),
                edge("start", "s2"),
                edge("s1", "join"),
                edge("s2", "join"),
            ],
        );
        let errors = validate_workflow(&def);
        assert!(has(&errors, &ValidationError::MergePairedTwice(id("join"))));
    }

    #[test]
    fn handler_references_are_checked() {
        let mut def = linear();
        def.nodes.push(NodeDefinition::error_handler(id("recover"), "cap"));
        def.nodes[1].error_handler_id = Some(id("missing"));
        def.nodes[2].rollback_handler_id = Some(id("a"));
        def.connections.push(edge("b", "recover"));
        let errors = validate_workflow(&def);
        assert!(has(
            &errors,
            &ValidationError::UnknownHandler {
                node_id: id("a"),
                handler_id: id("missing")
            }
        ));
        assert!(has(
            &errors,
            &ValidationError::HandlerWrongKind {
                node_id: id("b"),
                handler_id: id("a")
            }
        ));
        assert!(has(&errors, &ValidationError::HandlerReachable(id("recover"))));
    }

    #[test]
    fn branching_nodes_allow_one_default() {
        let def = make_definition(
            "branch",
            vec![
                NodeDefinition::trigger(id("start")),
                NodeDefinition::condition(id("check")),
                NodeDefinition::task(id("a"), "cap"),
                NodeDefinition::task(id("b"), "cap"),
                NodeDefinition::task(id("c"), "cap"),
            ],
            vec![
                edge("start", "check"),
                edge("check", "a"),
                edge("check", "b"),
                edge("check", "c").with_guard(Guard::exists("x")),
            ],
        );
        let errors = validate_workflow(&def);
        assert!(has(&errors, &ValidationError::ConditionFanOut(id("check"))));
        assert!(has(&errors, &ValidationError::AmbiguousDefault(id("check"))));
    }

    #[test]
    fn malformed_paths_are_rejected() {
        let mut def = linear();
        def.nodes[1] = def.nodes[1].clone().with_input("x", "trigger..x");
        def.nodes[2] = def.nodes[2].clone().with_output("", "field");
        let errors = validate_workflow(&def);
        assert!(has(
            &errors,
            &ValidationError::InvalidPath {
                node_id: id("a"),
                path: "trigger..x".into()
            }
        ));
        assert!(has(
            &errors,
            &ValidationError::InvalidPath {
                node_id: id("b"),
                path: String::new()
            }
        ));
    }

    #[test]
    fn invalid_retry_policy_is_reported() {
        let mut def = linear();
        def.nodes[1].max_attempts = Some(0);
        let errors = validate_workflow(&def);
        assert!(
            errors.iter().any(|e| matches!(
                e,
                ValidationError::InvalidRetryPolicy { node_id: Some(n), .. } if n == &id("a")
            )),
            "{errors:?}"
        );
    }

    #[test]
    fn validated_workflow_exposes_structure() {
        let validated = ValidatedWorkflow::new(linear()).unwrap();
        assert_eq!(validated.trigger_id(), &id("start"));
        assert_eq!(validated.outgoing(&id("a"))[0].to_node, id("b"));
        assert_eq!(validated.behavior(&id("a")), Some(&NodeBehavior::Task));
        assert_eq!(validated.node(&id("b")).map(|n| n.kind), Some(NodeKind::Task));
    }

    #[test]
    fn validated_workflow_rejects_invalid_definition() {
        let errors = ValidatedWorkflow::new(make_definition("", vec![], vec![])).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
