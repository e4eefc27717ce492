//! CDP wire message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An outgoing CDP command.
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    /// Message ID used to correlate the response.
    pub id: u64,
    /// Method name, e.g. `"Page.navigate"`.
    pub method: String,
    /// Method parameters, omitted when the command takes none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Target session for flat-mode commands; `None` addresses the browser.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// A response to a previously sent command.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponse {
    /// ID of the request this answers.
    pub id: u64,
    /// Result payload on success.
    pub result: Option<Value>,
    /// Error payload on failure.
    pub error: Option<CdpResponseError>,
    /// Session the response belongs to, if any.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Error payload inside a [`CdpResponse`].
#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponseError {
    /// Protocol error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional extra detail.
    pub data: Option<String>,
}

/// An event pushed by the browser.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    /// Event method name, e.g. `"Page.frameNavigated"`.
    pub method: String,
    /// Event parameters.
    pub params: Option<Value>,
    /// Session the event originated from, if any.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Any message arriving on the WebSocket: a response or an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CdpMessage {
    /// Response correlated to a pending request.
    Response(CdpResponse),
    /// Unsolicited event.
    Event(CdpEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_without_empty_fields() {
        let req = CdpRequest {
            id: 7,
            method: "Page.enable".to_string(),
            params: None,
            session_id: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"id": 7, "method": "Page.enable"}));
    }

    #[test]
    fn request_serializes_session_id_camel_case() {
        let req = CdpRequest {
            id: 1,
            method: "Runtime.enable".to_string(),
            params: Some(serde_json::json!({})),
            session_id: Some("SESSION".to_string()),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"sessionId\":\"SESSION\""));
    }

    #[test]
    fn message_decodes_response() {
        let msg: CdpMessage =
            serde_json::from_str(r#"{"id":3,"result":{"frameId":"F"}}"#).unwrap();
        match msg {
            CdpMessage::Response(resp) => {
                assert_eq!(resp.id, 3);
                assert!(resp.error.is_none());
            }
            CdpMessage::Event(_) => panic!("expected response"),
        }
    }

    #[test]
    fn message_decodes_event() {
        let msg: CdpMessage = serde_json::from_str(
            r#"{"method":"Page.frameDetached","params":{"frameId":"F"},"sessionId":"S"}"#,
        )
        .unwrap();
        match msg {
            CdpMessage::Event(evt) => {
                assert_eq!(evt.method, "Page.frameDetached");
                assert_eq!(evt.session_id.as_deref(), Some("S"));
            }
            CdpMessage::Response(_) => panic!("expected event"),
        }
    }

    #[test]
    fn message_decodes_protocol_error() {
        let msg: CdpMessage = serde_json::from_str(
            r#"{"id":9,"error":{"code":-32000,"message":"No frame with given id found"}}"#,
        )
        .unwrap();
        match msg {
            CdpMessage::Response(resp) => {
                let err = resp.error.unwrap();
                assert_eq!(err.code, -32000);
                assert!(err.message.contains("No frame"));
            }
            CdpMessage::Event(_) => panic!("expected response"),
        }
    }
}
