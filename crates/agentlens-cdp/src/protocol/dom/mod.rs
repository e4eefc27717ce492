//! DOM domain types.
//!
//! Only the node-description commands the frame resolution path needs.

use serde::{Deserialize, Serialize};

/// Front-end DOM node identifier.
pub type NodeId = i32;

/// Backend DOM node identifier, stable without pushing nodes to the
/// front-end.
pub type BackendNodeId = i32;

/// A DOM node description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Front-end node id; 0 when the node was never pushed.
    pub node_id: NodeId,
    /// Backend node id.
    pub backend_node_id: BackendNodeId,
    /// Node type.
    pub node_type: i32,
    /// Node name, e.g. `"IFRAME"`.
    pub node_name: String,
    /// Content document for frame-owner elements, present when piercing.
    pub content_document: Option<Box<Node>>,
    /// Frame id for frame-owner elements and document nodes.
    pub frame_id: Option<String>,
}

/// Parameters for DOM.describeNode.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DescribeNodeParams {
    /// Front-end node id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Backend node id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<BackendNodeId>,
    /// Remote object id of a node wrapper.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// Depth of children to describe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<i32>,
    /// Whether to pierce iframe and shadow-root boundaries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pierce: Option<bool>,
}

/// Result of DOM.describeNode.
#[derive(Debug, Clone, Deserialize)]
pub struct DescribeNodeResult {
    /// The described node.
    pub node: Node,
}

/// Parameters for DOM.resolveNode.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResolveNodeParams {
    /// Front-end node id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Backend node id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<BackendNodeId>,
    /// Object group for the returned handle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,
    /// Execution context to resolve into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_context_id: Option<crate::protocol::runtime::ExecutionContextId>,
}

/// Result of DOM.resolveNode.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveNodeResult {
    /// JavaScript wrapper for the node.
    pub object: crate::protocol::runtime::RemoteObject,
}
