//! Behavior chains
//!
//! Every route is served by a chain of behavior nodes assembled at startup:
//!
//! - **Nodes**: authentication, the action call, and the output writer
//! - **Policies**: reorder nodes before the graph is frozen
//! - **Route table**: finalized chains resolved by request path
//!
//! Chains are immutable once finalized and shared between requests.

mod behavior;
mod error;
mod graph;
mod invoke;
mod node;
mod policy;

pub use behavior::{BehaviorChain, FinalizedChain};
pub use error::{ActionError, ChainError, GraphError};
pub use graph::{BehaviorGraph, RouteMatch, RouteTable};
pub use invoke::{ActionHandler, HandlerRegistry, RequestContext, invoke, invoke_with};
pub use node::{
    ActionCall, ActionResult, ActionShape, AuthenticationNode, BehaviorNode, NodeId, NodePosition,
    OutputNode, ReturnKind,
};
pub use policy::{ChainPolicy, OutputBeforeAjaxContinuationPolicy};
