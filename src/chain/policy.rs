//! Chain ordering policies applied while the graph is assembled.

use tracing::debug;

use super::behavior::BehaviorChain;
use super::node::ActionShape;

/// A rule that may reorder nodes in a chain before it is finalized.
pub trait ChainPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn modify(&self, chain: &mut BehaviorChain);
}

/// Puts the output node in front of an AJAX-continuation action so that it
/// wraps the action and can turn action failures into failed continuations.
///
/// Only chains ending in `[action, output]` are touched; any other order is
/// taken to be intentional and left as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputBeforeAjaxContinuationPolicy;

impl ChainPolicy for OutputBeforeAjaxContinuationPolicy {
    fn name(&self) -> &'static str {
        "output-before-ajax-continuation"
    }

    fn modify(&self, chain: &mut BehaviorChain) {
        if chain.shape() != ActionShape::AjaxContinuation {
            return;
        }

        let output = {
            let mut tail = chain.nodes().rev();
            match (tail.next(), tail.next()) {
                (Some(last), Some(before_last))
                    if last.is_output() && before_last.is_action() =>
                {
                    last.id()
                }
                _ => return,
            }
        };

        if chain.move_to_front(output) {
            debug!(
                target = "trellis::chain::policy",
                route = chain.route().unwrap_or("<unrouted>"),
                policy = self.name(),
                "Moved output node in front of ajax continuation"
            );
        }
    }
}
