//! Behavior nodes: the steps a chain is assembled from.

use std::fmt;

use bytes::Bytes;
use serde_json::Value;
use uuid::Uuid;

use crate::ajax::AjaxContinuation;
use crate::cache::{ETAG, RecordedOutput, etag};
use crate::conneg::{self, MediaWriter};

use super::error::ChainError;

pub type NodeId = Uuid;

/// What an action hands back to its output node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Text,
    Json,
    AjaxContinuation,
    Asset,
}

/// Classification of a chain by the result of its action.
///
/// Computed when the action is appended to a chain; ordering policies match
/// on it instead of inspecting results at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionShape {
    #[default]
    Standard,
    AjaxContinuation,
}

impl From<ReturnKind> for ActionShape {
    fn from(kind: ReturnKind) -> Self {
        match kind {
            ReturnKind::AjaxContinuation => Self::AjaxContinuation,
            ReturnKind::Text | ReturnKind::Json | ReturnKind::Asset => Self::Standard,
        }
    }
}

impl fmt::Display for ActionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::AjaxContinuation => f.write_str("ajax-continuation"),
        }
    }
}

/// Where a node sits in its chain's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePosition {
    Unpositioned,
    Appended,
    Reordered,
    Finalized,
}

/// Value produced by an action handler.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Text(String),
    Json(Value),
    Continuation(AjaxContinuation),
    Asset { content_type: String, body: Bytes },
}

impl ActionResult {
    fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Json(_) => "json",
            Self::Continuation(_) => "ajax-continuation",
            Self::Asset { .. } => "asset",
        }
    }
}

/// A call into a registered handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCall {
    id: NodeId,
    handler: String,
    route: String,
    returns: ReturnKind,
    html_endpoint: bool,
    requires_auth: bool,
}

impl ActionCall {
    /// Handler names use `Controller::method`; the default route is derived
    /// from them (`Status::get_ping` routes to `/status/get_ping`).
    pub fn new(handler: impl Into<String>, returns: ReturnKind) -> Self {
        let handler = handler.into();
        let route = format!("/{}", handler.replace("::", "/").to_ascii_lowercase());
        Self {
            id: Uuid::new_v4(),
            handler,
            route,
            returns,
            html_endpoint: false,
            requires_auth: false,
        }
    }

    pub fn at(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    /// Prefer html output; structured results are then written in their
    /// display form.
    pub fn html_endpoint(mut self) -> Self {
        self.html_endpoint = true;
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn returns(&self) -> ReturnKind {
        self.returns
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    pub fn shape(&self) -> ActionShape {
        self.returns.into()
    }

    /// Writers for this action's output, in preference order.
    ///
    /// Text from an html endpoint (marked explicitly, or a method whose name
    /// ends in `html`) is written as html unless plain text is asked for.
    /// Json results of an explicitly marked endpoint default to html too.
    pub fn writers(&self) -> Vec<MediaWriter> {
        match self.returns {
            ReturnKind::Text if self.writes_html() => vec![MediaWriter::Html, MediaWriter::Text],
            ReturnKind::Text => vec![MediaWriter::Text],
            ReturnKind::Json if self.html_endpoint => vec![MediaWriter::Html, MediaWriter::Json],
            ReturnKind::Json | ReturnKind::AjaxContinuation => vec![MediaWriter::Json],
            ReturnKind::Asset => vec![MediaWriter::Raw],
        }
    }

    fn writes_html(&self) -> bool {
        let method = self
            .handler
            .rsplit("::")
            .next()
            .unwrap_or(self.handler.as_str());
        self.html_endpoint || method.to_ascii_lowercase().ends_with("html")
    }
}

/// Rejects anonymous requests.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationNode {
    id: NodeId,
}

impl AuthenticationNode {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl Default for AuthenticationNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes the action result with a negotiated media writer.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputNode {
    id: NodeId,
    writers: Vec<MediaWriter>,
}

impl OutputNode {
    pub fn new(writers: Vec<MediaWriter>) -> Self {
        Self {
            id: Uuid::new_v4(),
            writers,
        }
    }

    pub fn for_action(action: &ActionCall) -> Self {
        Self::new(action.writers())
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn writers(&self) -> &[MediaWriter] {
        &self.writers
    }

    pub fn negotiate(&self, accept: Option<&str>) -> Option<MediaWriter> {
        conneg::negotiate(&self.writers, accept)
    }

    /// Render `result` with `writer` and stamp an ETag on it.
    pub fn write(
        &self,
        result: ActionResult,
        writer: MediaWriter,
    ) -> Result<RecordedOutput, ChainError> {
        let mut output = match (writer, result) {
            (MediaWriter::Raw, ActionResult::Asset { content_type, body }) => {
                RecordedOutput::ok(&content_type, body)
            }
            (MediaWriter::Html, ActionResult::Text(text)) => {
                RecordedOutput::ok(conneg::TEXT_HTML, text)
            }
            (MediaWriter::Html, ActionResult::Json(value)) => {
                let text = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                RecordedOutput::ok(conneg::TEXT_HTML, text)
            }
            (MediaWriter::Text | MediaWriter::Raw, ActionResult::Text(text)) => {
                RecordedOutput::ok(conneg::TEXT_PLAIN, text)
            }
            (MediaWriter::Json, ActionResult::Text(text)) => {
                RecordedOutput::ok(conneg::APPLICATION_JSON, serde_json::to_vec(&text)?)
            }
            (MediaWriter::Json, ActionResult::Json(value)) => {
                RecordedOutput::ok(conneg::APPLICATION_JSON, serde_json::to_vec(&value)?)
            }
            (MediaWriter::Json, ActionResult::Continuation(continuation)) => {
                RecordedOutput::ok(
                    conneg::APPLICATION_JSON,
                    serde_json::to_vec(&continuation)?,
                )
            }
            (writer, result) => {
                return Err(ChainError::Unwritable {
                    writer,
                    result: result.kind(),
                });
            }
        };
        let tag = etag::compute(&output.body);
        output.append_header(ETAG, tag);
        Ok(output)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BehaviorNode {
    Authentication(AuthenticationNode),
    Action(ActionCall),
    Output(OutputNode),
}

impl BehaviorNode {
    pub fn id(&self) -> NodeId {
        match self {
            Self::Authentication(node) => node.id(),
            Self::Action(node) => node.id(),
            Self::Output(node) => node.id(),
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, Self::Output(_))
    }

    pub fn is_action(&self) -> bool {
        matches!(self, Self::Action(_))
    }
}

impl fmt::Display for BehaviorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication(_) => f.write_str("authenticate"),
            Self::Action(action) => write!(f, "action({})", action.handler()),
            Self::Output(output) => {
                let writers: Vec<String> = output.writers().iter().map(ToString::to_string).collect();
                write!(f, "output({})", writers.join("|"))
            }
        }
    }
}

impl From<ActionCall> for BehaviorNode {
    fn from(node: ActionCall) -> Self {
        Self::Action(node)
    }
}

impl From<OutputNode> for BehaviorNode {
    fn from(node: OutputNode) -> Self {
        Self::Output(node)
    }
}

impl From<AuthenticationNode> for BehaviorNode {
    fn from(node: AuthenticationNode) -> Self {
        Self::Authentication(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_route_derives_from_handler() {
        let action = ActionCall::new("Status::get_ping", ReturnKind::Text);
        assert_eq!(action.route(), "/status/get_ping");
        assert_eq!(action.at("/ping").route(), "/ping");
    }

    #[test]
    fn shape_follows_return_kind() {
        assert_eq!(
            ActionCall::new("Ajax::get_success", ReturnKind::AjaxContinuation).shape(),
            ActionShape::AjaxContinuation
        );
        assert_eq!(
            ActionCall::new("Strings::say_hello", ReturnKind::Text).shape(),
            ActionShape::Standard
        );
    }

    #[test]
    fn text_writers_follow_html_conventions() {
        let plain = ActionCall::new("Strings::say_hello", ReturnKind::Text);
        let named = ActionCall::new("Strings::say_hello_with_html", ReturnKind::Text);
        let marked = ActionCall::new("Strings::different_kind_of_name", ReturnKind::Text)
            .html_endpoint();

        assert_eq!(plain.writers(), vec![MediaWriter::Text]);
        assert_eq!(named.writers(), vec![MediaWriter::Html, MediaWriter::Text]);
        assert_eq!(marked.writers(), vec![MediaWriter::Html, MediaWriter::Text]);
    }

    #[test]
    fn marked_endpoint_writes_json_results_as_html_first() {
        let marked = ActionCall::new("Strings::as_html", ReturnKind::Json).html_endpoint();
        let unmarked = ActionCall::new("Strings::as_html", ReturnKind::Json);

        assert_eq!(marked.writers(), vec![MediaWriter::Html, MediaWriter::Json]);
        assert_eq!(unmarked.writers(), vec![MediaWriter::Json]);

        let node = OutputNode::for_action(&marked);
        let writer = node.negotiate(None).unwrap();
        let output = node
            .write(ActionResult::Json(serde_json::json!({ "name": "something" })), writer)
            .unwrap();
        assert_eq!(output.content_type(), Some(conneg::TEXT_HTML));
        assert_eq!(output.body, Bytes::from(r#"{"name":"something"}"#));

        let json = node
            .negotiate(Some("application/json"))
            .map(|writer| node.write(ActionResult::Json(Value::from(1)), writer).unwrap())
            .unwrap();
        assert_eq!(json.content_type(), Some(conneg::APPLICATION_JSON));
    }

    #[test]
    fn html_writer_uses_bare_strings() {
        let node = OutputNode::new(vec![MediaWriter::Html]);
        let output = node
            .write(ActionResult::Json(Value::from("<p>something</p>")), MediaWriter::Html)
            .unwrap();
        assert_eq!(output.body, Bytes::from("<p>something</p>"));
    }

    #[test]
    fn output_writes_text_and_stamps_etag() {
        let node = OutputNode::new(vec![MediaWriter::Text]);
        let output = node
            .write(ActionResult::Text("Hello.".to_string()), MediaWriter::Text)
            .unwrap();

        assert_eq!(output.content_type(), Some(conneg::TEXT_PLAIN));
        assert_eq!(output.body, Bytes::from("Hello."));
        assert_eq!(output.etag(), Some(etag::compute(b"Hello.").as_str()));
    }

    #[test]
    fn output_writes_continuations_as_json() {
        let node = OutputNode::new(vec![MediaWriter::Json]);
        let output = node
            .write(
                ActionResult::Continuation(AjaxContinuation::successful()),
                MediaWriter::Json,
            )
            .unwrap();

        let value: Value = serde_json::from_slice(&output.body).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(output.content_type(), Some(conneg::APPLICATION_JSON));
    }

    #[test]
    fn output_rejects_mismatched_writer() {
        let node = OutputNode::new(vec![MediaWriter::Html]);
        let err = node
            .write(
                ActionResult::Continuation(AjaxContinuation::successful()),
                MediaWriter::Html,
            )
            .unwrap_err();
        assert!(matches!(err, ChainError::Unwritable { .. }));
    }

    #[test]
    fn node_display_names_the_step() {
        let action = ActionCall::new("Ajax::get_success", ReturnKind::AjaxContinuation);
        let output = OutputNode::for_action(&action);
        assert_eq!(BehaviorNode::from(action).to_string(), "action(Ajax::get_success)");
        assert_eq!(BehaviorNode::from(output).to_string(), "output(json)");
    }
}
