use std::error::Error;
use std::fmt;

/// Failures the gateway core can report.
///
/// The set is closed on purpose: the HTTP boundary matches on it
/// exhaustively, so a new variant forces every caller to decide how it maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayError {
    /// Subscribe refused by the membership collaborator. No state changed.
    AuthorizationDenied,
    /// Outbound queue overflowed on a non-droppable event.
    SlowConsumer,
    /// Client sent a frame the gateway could not understand.
    MalformedFrame,
    /// No heartbeat arrived within the deadline.
    HeartbeatTimeout,
    /// Read or write on the underlying socket failed.
    TransportError,
}

impl GatewayError {
    /// Stable machine readable code, also used in wire error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::AuthorizationDenied => "AUTHORIZATION_DENIED",
            GatewayError::SlowConsumer => "SLOW_CONSUMER",
            GatewayError::MalformedFrame => "MALFORMED_FRAME",
            GatewayError::HeartbeatTimeout => "HEARTBEAT_TIMEOUT",
            GatewayError::TransportError => "TRANSPORT_ERROR",
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            GatewayError::AuthorizationDenied => "not authorized for this room",
            GatewayError::SlowConsumer => "outbound queue overflowed on a non-droppable event",
            GatewayError::MalformedFrame => "malformed client frame",
            GatewayError::HeartbeatTimeout => "no heartbeat within the deadline",
            GatewayError::TransportError => "socket read or write failed",
        };
        f.write_str(message)
    }
}

impl Error for GatewayError {}
