use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use super::behavior::{BehaviorChain, FinalizedChain};
use super::error::GraphError;
use super::node::ActionCall;
use super::policy::{ChainPolicy, OutputBeforeAjaxContinuationPolicy};

/// The full set of behavior chains of an application, plus the policies
/// that shape them before they are frozen into a [`RouteTable`].
pub struct BehaviorGraph {
    chains: Vec<BehaviorChain>,
    policies: Vec<Box<dyn ChainPolicy>>,
}

impl BehaviorGraph {
    /// Empty graph carrying the default policies.
    pub fn new() -> Self {
        Self {
            chains: Vec::new(),
            policies: vec![Box::new(OutputBeforeAjaxContinuationPolicy)],
        }
    }

    /// One chain per action, with every policy applied.
    pub fn build(actions: impl IntoIterator<Item = ActionCall>) -> Self {
        let mut graph = Self::new();
        for action in actions {
            graph.add_chain(BehaviorChain::for_action(action));
        }
        graph.apply_policies();
        graph
    }

    pub fn add_policy(&mut self, policy: impl ChainPolicy + 'static) {
        self.policies.push(Box::new(policy));
    }

    pub fn add_chain(&mut self, chain: BehaviorChain) {
        self.chains.push(chain);
    }

    pub fn apply_policies(&mut self) {
        for policy in &self.policies {
            for chain in &mut self.chains {
                policy.modify(chain);
            }
            debug!(
                target = "trellis::chain::graph",
                policy = policy.name(),
                chains = self.chains.len(),
                "Applied chain policy"
            );
        }
    }

    pub fn chains(&self) -> &[BehaviorChain] {
        &self.chains
    }

    /// Chain whose action calls `handler`.
    pub fn behavior_for(&self, handler: &str) -> Option<&BehaviorChain> {
        self.chains.iter().find(|chain| {
            chain
                .last_action()
                .is_some_and(|action| action.handler() == handler)
        })
    }

    pub fn finalize(self) -> Result<RouteTable, GraphError> {
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(self.chains.len());

        for chain in self.chains {
            let chain = chain.finalize()?;
            let pattern = RoutePattern::parse(chain.route())?;
            if !seen.insert(pattern.signature()) {
                return Err(GraphError::DuplicateRoute(chain.route().to_string()));
            }
            routes.push((pattern, Arc::new(chain)));
        }

        // Literal routes win over parameterised ones.
        routes.sort_by_key(|(pattern, _)| pattern.is_dynamic());

        info!(
            target = "trellis::chain::graph",
            routes = routes.len(),
            "Behavior graph finalized"
        );
        Ok(RouteTable { routes })
    }
}

impl Default for BehaviorGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

#[derive(Debug, Clone)]
struct RoutePattern {
    segments: Vec<Segment>,
}

impl RoutePattern {
    fn parse(route: &str) -> Result<Self, GraphError> {
        let invalid = |reason: &str| GraphError::InvalidRoute {
            route: route.to_string(),
            reason: reason.to_string(),
        };

        let Some(rest) = route.strip_prefix('/') else {
            return Err(invalid("routes must start with `/`"));
        };

        let pieces: Vec<&str> = rest.split('/').filter(|piece| !piece.is_empty()).collect();
        let mut segments = Vec::with_capacity(pieces.len());
        for (index, piece) in pieces.iter().enumerate() {
            let segment = if let Some(name) = piece.strip_prefix('*') {
                if index + 1 != pieces.len() {
                    return Err(invalid("catch-all must be the last segment"));
                }
                Segment::CatchAll(name.to_string())
            } else if let Some(name) = piece.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Segment::Param(name.to_string())
            } else {
                Segment::Literal((*piece).to_string())
            };
            if matches!(&segment, Segment::Param(name) | Segment::CatchAll(name) if name.is_empty()) {
                return Err(invalid("parameters need a name"));
            }
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    fn is_dynamic(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| !matches!(segment, Segment::Literal(_)))
    }

    /// Shape of the route with parameter names erased.
    fn signature(&self) -> String {
        let parts: Vec<&str> = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Param(_) => "{}",
                Segment::CatchAll(_) => "*",
            })
            .collect();
        format!("/{}", parts.join("/"))
    }

    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let pieces: Vec<&str> = path.split('/').filter(|piece| !piece.is_empty()).collect();
        let mut params = HashMap::new();

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::CatchAll(name) => {
                    let rest = pieces.get(index..).unwrap_or_default();
                    if rest.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), rest.join("/"));
                    return Some(params);
                }
                Segment::Literal(text) => {
                    if pieces.get(index) != Some(&text.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), (*pieces.get(index)?).to_string());
                }
            }
        }

        (pieces.len() == self.segments.len()).then_some(params)
    }
}

/// A resolved request target.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub chain: Arc<FinalizedChain>,
    pub params: HashMap<String, String>,
}

/// Finalized chains indexed by route.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(RoutePattern, Arc<FinalizedChain>)>,
}

impl RouteTable {
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        self.routes.iter().find_map(|(pattern, chain)| {
            pattern.matches(path).map(|params| RouteMatch {
                chain: Arc::clone(chain),
                params,
            })
        })
    }

    pub fn chains(&self) -> impl Iterator<Item = &Arc<FinalizedChain>> {
        self.routes.iter().map(|(_, chain)| chain)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
