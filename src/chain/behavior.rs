use std::fmt;

use uuid::Uuid;

use crate::conneg::MediaWriter;

use super::error::GraphError;
use super::node::{
    ActionCall, ActionShape, AuthenticationNode, BehaviorNode, NodeId, NodePosition, OutputNode,
};

#[derive(Debug, Clone)]
struct Slot {
    node: BehaviorNode,
    position: NodePosition,
}

/// An ordered sequence of behavior nodes serving one route.
///
/// Nodes run outer to inner: the first node wraps everything after it.
#[derive(Debug, Clone)]
pub struct BehaviorChain {
    id: Uuid,
    route: Option<String>,
    slots: Vec<Slot>,
    shape: ActionShape,
}

impl BehaviorChain {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            route: None,
            slots: Vec::new(),
            shape: ActionShape::Standard,
        }
    }

    /// Standard assembly for one action: optional authentication, the
    /// action, then its output node.
    pub fn for_action(action: ActionCall) -> Self {
        let mut chain = Self::new();
        chain.route = Some(action.route().to_string());
        if action.requires_auth() {
            chain.add_to_end(AuthenticationNode::new());
        }
        chain.add_to_end(action);
        chain.add_output();
        chain
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn set_route(&mut self, route: impl Into<String>) {
        self.route = Some(route.into());
    }

    pub fn shape(&self) -> ActionShape {
        self.shape
    }

    pub fn add_to_end(&mut self, node: impl Into<BehaviorNode>) -> NodeId {
        let node = node.into();
        if let BehaviorNode::Action(action) = &node {
            self.shape = action.shape();
        }
        let id = node.id();
        self.slots.push(Slot {
            node,
            position: NodePosition::Appended,
        });
        id
    }

    /// Append an output node matching the last action, unless the chain
    /// already has one. Returns the output node's id either way.
    pub fn add_output(&mut self) -> NodeId {
        if let Some(existing) = self.output() {
            return existing.id();
        }
        let output = match self.last_action() {
            Some(action) => OutputNode::for_action(action),
            None => OutputNode::new(vec![MediaWriter::Html]),
        };
        self.add_to_end(output)
    }

    /// Move a node to the head of the chain. Returns `false` when the node
    /// is not part of this chain.
    pub fn move_to_front(&mut self, id: NodeId) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let mut slot = self.slots.remove(index);
        slot.position = NodePosition::Reordered;
        self.slots.insert(0, slot);
        true
    }

    pub fn first(&self) -> Option<&BehaviorNode> {
        self.slots.first().map(|slot| &slot.node)
    }

    pub fn last(&self) -> Option<&BehaviorNode> {
        self.slots.last().map(|slot| &slot.node)
    }

    pub fn output(&self) -> Option<&OutputNode> {
        self.nodes().find_map(|node| match node {
            BehaviorNode::Output(output) => Some(output),
            _ => None,
        })
    }

    pub fn last_action(&self) -> Option<&ActionCall> {
        self.slots.iter().rev().find_map(|slot| match &slot.node {
            BehaviorNode::Action(action) => Some(action),
            _ => None,
        })
    }

    pub fn nodes(&self) -> impl DoubleEndedIterator<Item = &BehaviorNode> + ExactSizeIterator {
        self.slots.iter().map(|slot| &slot.node)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn position_of(&self, id: NodeId) -> NodePosition {
        self.slots
            .iter()
            .find(|slot| slot.node.id() == id)
            .map_or(NodePosition::Unpositioned, |slot| slot.position)
    }

    pub fn requires_authentication(&self) -> bool {
        self.nodes()
            .any(|node| matches!(node, BehaviorNode::Authentication(_)))
    }

    /// Freeze the chain. It must carry a route plus exactly one action and
    /// one output node.
    pub fn finalize(self) -> Result<FinalizedChain, GraphError> {
        let Some(route) = self.route else {
            return Err(GraphError::MissingRoute { chain: self.id });
        };
        let actions = self.slots.iter().filter(|slot| slot.node.is_action()).count();
        let outputs = self.slots.iter().filter(|slot| slot.node.is_output()).count();
        if actions != 1 || outputs != 1 {
            return Err(GraphError::Malformed { route });
        }

        Ok(FinalizedChain {
            id: self.id,
            route,
            shape: self.shape,
            nodes: self.slots.into_iter().map(|slot| slot.node).collect(),
        })
    }

    fn index_of(&self, id: NodeId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.node.id() == id)
    }
}

impl Default for BehaviorChain {
    fn default() -> Self {
        Self::new()
    }
}

/// A chain whose order can no longer change.
#[derive(Debug, Clone)]
pub struct FinalizedChain {
    id: Uuid,
    route: String,
    shape: ActionShape,
    nodes: Vec<BehaviorNode>,
}

impl FinalizedChain {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn shape(&self) -> ActionShape {
        self.shape
    }

    pub fn nodes(&self) -> &[BehaviorNode] {
        &self.nodes
    }

    pub fn position_of(&self, id: NodeId) -> NodePosition {
        if self.nodes.iter().any(|node| node.id() == id) {
            NodePosition::Finalized
        } else {
            NodePosition::Unpositioned
        }
    }

    pub fn action(&self) -> Option<&ActionCall> {
        self.nodes.iter().find_map(|node| match node {
            BehaviorNode::Action(action) => Some(action),
            _ => None,
        })
    }

    pub fn output(&self) -> Option<&OutputNode> {
        self.nodes.iter().find_map(|node| match node {
            BehaviorNode::Output(output) => Some(output),
            _ => None,
        })
    }

    pub fn requires_authentication(&self) -> bool {
        self.nodes
            .iter()
            .any(|node| matches!(node, BehaviorNode::Authentication(_)))
    }
}

impl fmt::Display for FinalizedChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.route, self.shape)?;
        for (index, node) in self.nodes.iter().enumerate() {
            let sep = if index == 0 { " " } else { " -> " };
            write!(f, "{sep}{node}")?;
        }
        Ok(())
    }
}
