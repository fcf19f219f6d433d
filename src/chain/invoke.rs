//! Running a finalized chain against a request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::ajax::AjaxContinuation;
use crate::cache::RecordedOutput;
use crate::conneg::MediaWriter;

use super::behavior::FinalizedChain;
use super::error::{ActionError, ChainError};
use super::node::{ActionResult, ActionShape, BehaviorNode};

const CACHE_CONTROL: &str = "cache-control";

/// The parts of a request visible to behavior nodes.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub path: String,
    pub query: String,
    pub accept: Option<String>,
    pub authenticated: bool,
    pub params: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

pub type ActionHandler =
    Arc<dyn Fn(&RequestContext) -> Result<ActionResult, ActionError> + Send + Sync>;

/// Handlers by the name actions refer to them with.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, ActionHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&RequestContext) -> Result<ActionResult, ActionError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<&ActionHandler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .finish()
    }
}

/// Negotiate a writer from the request's `Accept` header and run the chain.
pub fn invoke(
    chain: &FinalizedChain,
    handlers: &HandlerRegistry,
    request: &RequestContext,
) -> Result<RecordedOutput, ChainError> {
    let writer = chain
        .output()
        .and_then(|output| output.negotiate(request.accept.as_deref()))
        .ok_or(ChainError::NotAcceptable)?;
    invoke_with(chain, handlers, request, writer)
}

/// Run the chain with an already negotiated writer.
///
/// Each node wraps the nodes after it. An output node ahead of an AJAX
/// continuation action reports action failures as a failed continuation
/// instead of an error.
pub fn invoke_with(
    chain: &FinalizedChain,
    handlers: &HandlerRegistry,
    request: &RequestContext,
    writer: MediaWriter,
) -> Result<RecordedOutput, ChainError> {
    let mut invocation = Invocation {
        chain,
        handlers,
        request,
        writer,
        result: None,
        output: None,
    };
    invocation.run(0)?;
    invocation.output.ok_or(ChainError::NothingToWrite)
}

struct Invocation<'a> {
    chain: &'a FinalizedChain,
    handlers: &'a HandlerRegistry,
    request: &'a RequestContext,
    writer: MediaWriter,
    result: Option<ActionResult>,
    output: Option<RecordedOutput>,
}

impl Invocation<'_> {
    fn run(&mut self, index: usize) -> Result<(), ChainError> {
        let chain = self.chain;
        let Some(node) = chain.nodes().get(index) else {
            return Ok(());
        };

        match node {
            BehaviorNode::Authentication(_) => {
                if !self.request.authenticated {
                    return Err(ChainError::Unauthorized);
                }
                self.run(index + 1)
            }
            BehaviorNode::Action(action) => {
                let handler = self
                    .handlers
                    .get(action.handler())
                    .ok_or_else(|| ChainError::MissingHandler(action.handler().to_string()))?;
                let result = handler(self.request).map_err(|source| ChainError::Action {
                    handler: action.handler().to_string(),
                    source,
                })?;
                self.result = Some(result);
                self.run(index + 1)
            }
            BehaviorNode::Output(output) => {
                let framed_failure = match self.run(index + 1) {
                    Ok(()) => false,
                    Err(ChainError::Action { handler, source })
                        if chain.shape() == ActionShape::AjaxContinuation =>
                    {
                        warn!(
                            target = "trellis::chain::invoke",
                            route = chain.route(),
                            handler = %handler,
                            error = %source,
                            "Ajax continuation action failed"
                        );
                        self.result = Some(ActionResult::Continuation(AjaxContinuation::failure(
                            source.to_string(),
                        )));
                        true
                    }
                    Err(err) => return Err(err),
                };

                let result = self.result.take().ok_or(ChainError::NothingToWrite)?;
                let mut written = output.write(result, self.writer)?;
                if framed_failure {
                    // A failure may be transient; it must not outlive this request.
                    written.cacheable = false;
                    written.append_header(CACHE_CONTROL, "no-store");
                }
                self.output = Some(written);
                Ok(())
            }
        }
    }
}
