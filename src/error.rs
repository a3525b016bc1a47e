use std::fmt;
use thiserror::Error;

/// Timing budget that expired.
///
/// The ISO 15765-2 names are used for the protocol timers; `Send` and `Receive` are the overall
/// timeouts passed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Own frame transmission was not confirmed in time.
    NAs,
    /// No flow control frame arrived in time.
    NBs,
    /// No consecutive frame arrived in time.
    NCr,
    /// Overall `send_message` timeout.
    Send,
    /// Overall `receive_message` timeout.
    Receive,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::NAs => write!(f, "N_As"),
            TimeoutKind::NBs => write!(f, "N_Bs"),
            TimeoutKind::NCr => write!(f, "N_Cr"),
            TimeoutKind::Send => write!(f, "send"),
            TimeoutKind::Receive => write!(f, "receive"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    // Setup errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Frame level errors
    #[error("Frame format error: {0}")]
    FrameFormat(String),

    // Exchange level errors
    #[error("Sequencing error: expected sequence number {expected}, received {received}")]
    Sequencing { expected: u8, received: u8 },

    #[error("Flow control error: {0}")]
    FlowControl(String),

    #[error("Timeout ({0})")]
    Timeout(TimeoutKind),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // Collaborator errors
    #[error("Bus error: {0}")]
    Bus(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport interface is not open")]
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, TransportError>;
