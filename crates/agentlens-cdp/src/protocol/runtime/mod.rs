//! Runtime domain types.
//!
//! Remote evaluation, remote object handles, and execution context
//! lifecycle events.

use serde::{Deserialize, Serialize};

/// Unique execution context identifier.
pub type ExecutionContextId = i64;

/// Mirror of a JavaScript value held by the browser.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    /// Object type.
    #[serde(rename = "type")]
    pub object_type: String,
    /// Object subtype hint.
    pub subtype: Option<String>,
    /// Class name for object types.
    pub class_name: Option<String>,
    /// Value for by-value results.
    pub value: Option<serde_json::Value>,
    /// String representation.
    pub description: Option<String>,
    /// Handle for by-reference results.
    pub object_id: Option<String>,
}

/// Exception details for a failed evaluation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    /// Exception id.
    pub exception_id: i64,
    /// Exception text.
    pub text: String,
    /// Line of the throw site.
    pub line_number: i64,
    /// Column of the throw site.
    pub column_number: i64,
    /// Thrown object, when available.
    pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
    /// Best human-readable description of the thrown value.
    pub fn message(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| self.text.clone())
    }
}

/// Parameters for Runtime.evaluate.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    /// Expression to evaluate.
    pub expression: String,
    /// Exceptions are muted when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silent: Option<bool>,
    /// Execution context to evaluate in; the page's main world when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<ExecutionContextId>,
    /// Whether to return the value instead of a handle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
    /// Whether to await a returned promise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub await_promise: Option<bool>,
}

/// Result of Runtime.evaluate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    /// Evaluation result.
    pub result: RemoteObject,
    /// Present when the expression threw.
    pub exception_details: Option<ExceptionDetails>,
}

/// One argument to Runtime.callFunctionOn.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CallArgument {
    /// Plain JSON value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Remote object handle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

/// Parameters for Runtime.callFunctionOn.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionOnParams {
    /// Source of the function to call; `this` binds to the target object.
    pub function_declaration: String,
    /// Object to call the function on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// Call arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<CallArgument>>,
    /// Exceptions are muted when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silent: Option<bool>,
    /// Whether to return the value instead of a handle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
    /// Whether to await a returned promise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub await_promise: Option<bool>,
}

/// Result of Runtime.callFunctionOn.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionOnResult {
    /// Call result.
    pub result: RemoteObject,
    /// Present when the call threw.
    pub exception_details: Option<ExceptionDetails>,
}

/// Parameters for Runtime.releaseObject.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseObjectParams {
    /// Handle to release.
    pub object_id: String,
}

/// Description of an execution context.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextDescription {
    /// Context id.
    pub id: ExecutionContextId,
    /// Context origin.
    pub origin: String,
    /// Context name; isolated worlds carry the name they were created with.
    pub name: String,
    /// Frame association and world kind.
    pub aux_data: Option<ExecutionContextAuxData>,
}

/// Auxiliary data on an execution context.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextAuxData {
    /// Owning frame, when the context belongs to one.
    pub frame_id: Option<String>,
    /// Whether this is the frame's main world.
    pub is_default: Option<bool>,
}

/// Event: Runtime.executionContextCreated.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionContextCreatedEvent {
    /// The new context.
    pub context: ExecutionContextDescription,
}

/// Event: Runtime.executionContextDestroyed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextDestroyedEvent {
    /// Id of the destroyed context.
    pub execution_context_id: ExecutionContextId,
}
