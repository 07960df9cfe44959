//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every subscribed server stops accepting
//!
//! Signals (signals.rs):
//!     SIGINT or trigger() → graceful shutdown → drain deadline → exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
