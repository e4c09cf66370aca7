//! JSON-RPC 2.0 endpoint protocol types

use super::endpoint::ResultReason;
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-RPC 2.0 protocol version
pub const JSONRPC_VERSION: &str = "2.0";

/// Present the credential
pub const METHOD_AUTHENTICATE: &str = "avatar.authenticate";
/// Send the offer and avatar selection, receive the answer
pub const METHOD_START: &str = "avatar.start";
/// Speak one utterance
pub const METHOD_SPEAK: &str = "avatar.speak";
/// End the session
pub const METHOD_CLOSE: &str = "avatar.close";

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// Protocol version (must be "2.0")
    pub jsonrpc: String,

    /// Method name to invoke
    pub method: String,

    /// Method parameters
    pub params: serde_json::Value,

    /// Request ID for matching with response (optional for notifications)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response (success)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    /// Protocol version (must be "2.0")
    pub jsonrpc: String,

    /// Result data
    pub result: serde_json::Value,

    /// Request ID this response corresponds to
    pub id: serde_json::Value,
}

/// JSON-RPC 2.0 error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    /// Protocol version (must be "2.0")
    pub jsonrpc: String,

    /// Error details
    pub error: ErrorObject,

    /// Request ID this error corresponds to
    pub id: serde_json::Value,
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    /// Error code
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    /// Invalid JSON was received
    pub const PARSE_ERROR: i32 = -32700;

    /// The method does not exist / is not available
    pub const METHOD_NOT_FOUND: i32 = -32601;

    /// Invalid method parameter(s)
    pub const INVALID_PARAMS: i32 = -32602;

    /// Internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Credential rejected
    pub const UNAUTHORIZED: i32 = -32001;

    /// Invalid SDP offer
    pub const OFFER_INVALID: i32 = -32002;
}

/// Anything the endpoint may send
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum IncomingMessage {
    /// Error reply to a request
    Error(JsonRpcError),
    /// Success reply to a request
    Response(JsonRpcResponse),
    /// Unsolicited notification
    Notification(JsonRpcRequest),
}

impl IncomingMessage {
    /// Parse from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to deserialize endpoint message: {}", e))
        })
    }
}

/// Parameters for `avatar.authenticate`
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticateParams {
    /// Subscription key
    pub key: String,
    /// Service region
    pub region: String,
}

impl fmt::Debug for AuthenticateParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticateParams")
            .field("key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Parameters for `avatar.start`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartParams {
    /// Local SDP offer, codec preference applied
    pub sdp: String,
    /// Character selector
    pub character: String,
    /// Style selector
    pub style: String,
    /// Voice selector
    pub voice: String,
    /// Preferred video encoding
    pub video_codec: String,
    /// Background color
    pub background_color: String,
}

/// Result of `avatar.start`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartResult {
    /// Endpoint-assigned session id
    #[serde(default)]
    pub session_id: String,
    /// Outcome
    pub reason: ResultReason,
    /// Failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    /// SDP answer, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,
}

/// Parameters for `avatar.speak`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeakParams {
    /// Utterance markup
    pub ssml: String,
}

/// Result of `avatar.speak`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeakResult {
    /// Outcome
    pub reason: ResultReason,
    /// Failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request
    pub fn new(method: String, params: serde_json::Value, id: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method,
            params,
            id,
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to serialize JSON-RPC request: {}", e))
        })
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!(
                "Failed to deserialize JSON-RPC request: {}",
                e
            ))
        })
    }
}

impl JsonRpcResponse {
    /// Create a new JSON-RPC response
    pub fn new(result: serde_json::Value, id: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
            id,
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!(
                "Failed to serialize JSON-RPC response: {}",
                e
            ))
        })
    }
}

impl JsonRpcError {
    /// Create a new JSON-RPC error
    pub fn new(code: i32, message: String, id: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            error: ErrorObject {
                code,
                message,
                data: None,
            },
            id,
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to serialize JSON-RPC error: {}", e))
        })
    }
}
