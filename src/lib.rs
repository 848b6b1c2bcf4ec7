//! Scanner session driver for the TWAIN data source manager protocol.
//!
//! The library drives an image-acquisition device through the manager's
//! handshake sequence (manager open, source open, capability negotiation,
//! enable, transfer, teardown), marshals capability values to and from
//! their fixed wire layouts, bridges a host message pump to the open
//! source, and saves transferred pages as image files.
//!
//! - [`protocol`]: protocol vocabulary (triplets, codes, identity records).
//! - [`marshal`]: wire types and capability containers.
//! - [`binding`]: the manager dispatch boundary, native and simulated.
//! - [`session`]: the session state machine.
//! - [`bridge`]: host message pump integration.
//! - [`output`]: image file output.
//!
//! # Example
//!
//! ```
//! use twain_scan::binding::SimulatedDsm;
//! use twain_scan::config::ScanConfig;
//! use twain_scan::protocol::HostMessage;
//! use twain_scan::{BridgeSignal, ScannerSession};
//!
//! let dsm = SimulatedDsm::new(["Flatbed"]);
//! let mut session = ScannerSession::from_config(Box::new(dsm), &ScanConfig::default(), 0);
//! session.open_manager()?;
//! session.scan()?;
//! let signal = session.process_message(&HostMessage::default())?;
//! assert_eq!(signal, BridgeSignal::ReadyToTransfer);
//! let pages = session.drain_transfers()?;
//! assert_eq!(pages.len(), 1);
//! # Ok::<(), twain_scan::TwainError>(())
//! ```

pub mod binding;
pub mod bridge;
pub mod config;
pub mod error;
pub mod marshal;
pub mod output;
pub mod protocol;
pub mod session;

pub use binding::{DsmEntry, NativeBitmap, SimulatedDsm};
pub use bridge::{BridgeSignal, FilterOutcome, MessageFilter, MessagePump};
pub use config::ScanConfig;
pub use error::{TwainError, TwainResult};
pub use output::ImageWriter;
pub use session::{ScannerSession, SessionState, StateFlags};
