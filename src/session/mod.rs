//! Scanner session lifecycle.
//!
//! [`ScannerSession`] owns the connection to the data source manager and
//! walks it through the protocol states tracked by [`SessionState`].

pub mod manager;
pub mod state;

pub use manager::{CapabilityQuery, ScanSettings, ScannerSession, SourceSelector};
pub use state::{SessionState, StateFlags};
