use std::collections::HashMap;
use std::sync::Arc;

use crate::model::NodeType;

use super::NodeHandler;

/// Registry of node handlers keyed by node type.
pub struct HandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    /// A registry with every built-in handler registered.
    pub fn new() -> Self {
        let mut registry = HandlerRegistry {
            handlers: HashMap::new(),
        };
        registry.register(NodeType::Start, Arc::new(super::control_flow::StartHandler));
        registry.register(NodeType::End, Arc::new(super::control_flow::EndHandler));
        registry.register(
            NodeType::Parallel,
            Arc::new(super::control_flow::ParallelHandler),
        );
        registry.register(NodeType::Join, Arc::new(super::control_flow::JoinMarker));
        registry.register(
            NodeType::Condition,
            Arc::new(super::condition::ConditionHandler),
        );
        registry.register(
            NodeType::Transform,
            Arc::new(super::transform::TransformHandler),
        );
        registry.register(NodeType::Delay, Arc::new(super::delay::DelayHandler));
        registry.register(
            NodeType::WebhookWait,
            Arc::new(super::webhook_wait::WebhookWaitHandler),
        );
        registry.register(
            NodeType::AgentSession,
            Arc::new(super::agent_session::AgentSessionHandler),
        );
        registry.register(
            NodeType::WorkTask,
            Arc::new(super::work_task::WorkTaskHandler),
        );
        registry
    }

    pub fn register(&mut self, node_type: NodeType, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type, handler);
    }

    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(&node_type).cloned()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
