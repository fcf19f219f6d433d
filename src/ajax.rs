//! AJAX continuation: the structured success/failure result returned to
//! asynchronous clients.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AjaxError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AjaxContinuation {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<AjaxError>,
    #[serde(default)]
    pub refresh: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigate_page: Option<String>,
}

impl AjaxContinuation {
    pub fn successful() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach a validation error; any error marks the continuation failed.
    pub fn with_error(mut self, field: Option<&str>, message: impl Into<String>) -> Self {
        self.errors.push(AjaxError {
            field: field.map(str::to_owned),
            message: message.into(),
        });
        self.success = false;
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
