// Protocol layers
pub mod physical; // Bus collaborator trait, CAN and CANFD length rules
pub mod transport; // ISO-TP addressing, framing and sessions

// Re-exports for convenience
pub use physical::{can, canfd};
pub use transport::isotp;

// Common types and traits
pub mod error;
pub mod types;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
