use thiserror::Error;

/// Main error type for logseq-mcp
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The Logseq API server could not be reached (refused, timed out)
    #[error("Logseq API unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },

    /// The Logseq API answered with a non-success HTTP status
    #[error("Logseq API returned HTTP {}{}", .status, protocol_hint(*.status))]
    Protocol { status: u16, body: String },

    /// The Logseq application rejected the call (error field in the body)
    #[error("Logseq API error: {0}")]
    Remote(String),

    /// Requested page does not exist
    #[error("Page not found: {0}")]
    PageNotFound(String),

    /// Requested block does not exist
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Payload decoded as JSON but did not have the expected shape
    #[error("Unexpected response shape: {0}")]
    Decode(String),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File system / socket I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),
}

fn protocol_hint(status: u16) -> &'static str {
    match status {
        401 | 403 => " (check the authorization token configured in Logseq's API server settings)",
        _ => "",
    }
}

impl BridgeError {
    /// True for the "requested entity is absent" family.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::PageNotFound(_) | BridgeError::BlockNotFound(_))
    }
}

/// Convenient Result type using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
