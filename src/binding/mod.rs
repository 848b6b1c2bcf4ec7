//! Dispatch boundary to the data source manager.
//!
//! Everything the session sends to the manager goes through one call,
//! [`DsmEntry::entry`], keyed by a [`Triplet`]. Two implementations exist:
//!
//! - [`native`]: the real manager library, loaded at runtime (Windows,
//!   `twain_hardware` feature).
//! - [`SimulatedDsm`]: an in-process manager with scripted sources, used by
//!   the tests and by the CLI's `--simulate` mode.
//!
//! Payloads are typed records; encoding to the packed native layout happens
//! inside the native binding only.

pub mod native;
pub mod simulated;

pub use simulated::SimulatedDsm;

use crate::error::{TwainError, TwainResult};
use crate::protocol::{
    EventRecord, Identity, ImageInfo, PendingXfers, ProtocolFlavor, ReturnCode, Status, Triplet,
    UserInterface,
};
use std::fmt;
use std::sync::Arc;

/// Capability exchange record. For a set, `kind` and `data` carry the
/// encoded container; for a get, the binding fills them in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityPayload {
    /// Capability id.
    pub cap: u16,
    /// Container kind code.
    pub kind: u16,
    /// Encoded container.
    pub data: Vec<u8>,
}

impl CapabilityPayload {
    /// Request record for a get-style query.
    pub fn query(cap: u16) -> Self {
        Self {
            cap,
            kind: 0xffff,
            data: Vec::new(),
        }
    }
}

/// Payload of one dispatch.
#[derive(Debug)]
pub enum Payload<'a> {
    /// Host window handle.
    Parent(&'a mut usize),
    /// Source identity.
    Identity(&'a mut Identity),
    /// Status record.
    Status(&'a mut Status),
    /// Enable and disable arguments.
    UserInterface(&'a mut UserInterface),
    /// Event record.
    Event(&'a mut EventRecord),
    /// Capability record.
    Capability(&'a mut CapabilityPayload),
    /// Image metadata.
    ImageInfo(&'a mut ImageInfo),
    /// Receives the native bitmap handle.
    NativeXfer(&'a mut usize),
    /// Pending transfer count.
    PendingXfers(&'a mut PendingXfers),
}

/// Access to native memory handles returned by a transfer.
pub trait HandleMemory: Send + Sync {
    /// Copy out the bytes behind `handle`.
    fn read(&self, handle: usize) -> TwainResult<Vec<u8>>;

    /// Release `handle`. Called exactly once per handle.
    fn release(&self, handle: usize);
}

/// The single dispatch function of a data source manager.
pub trait DsmEntry {
    /// Protocol flavor of the loaded manager.
    fn flavor(&self) -> ProtocolFlavor;

    /// Dispatch one triplet. `dest` is `None` for calls addressed to the
    /// manager itself.
    fn entry(
        &mut self,
        origin: &mut Identity,
        dest: Option<&Identity>,
        triplet: Triplet,
        payload: Payload<'_>,
    ) -> ReturnCode;

    /// Memory used for native bitmap handles.
    fn memory(&self) -> Arc<dyn HandleMemory>;
}

impl<T: DsmEntry + ?Sized> DsmEntry for Box<T> {
    fn flavor(&self) -> ProtocolFlavor {
        (**self).flavor()
    }

    fn entry(
        &mut self,
        origin: &mut Identity,
        dest: Option<&Identity>,
        triplet: Triplet,
        payload: Payload<'_>,
    ) -> ReturnCode {
        (**self).entry(origin, dest, triplet, payload)
    }

    fn memory(&self) -> Arc<dyn HandleMemory> {
        (**self).memory()
    }
}

/// One transferred page: a native DIB handle plus the image metadata read
/// before its transfer.
///
/// The bitmap owns its handle and releases it on drop.
pub struct NativeBitmap {
    handle: usize,
    info: ImageInfo,
    memory: Arc<dyn HandleMemory>,
}

impl NativeBitmap {
    /// Take ownership of `handle`.
    pub fn new(handle: usize, info: ImageInfo, memory: Arc<dyn HandleMemory>) -> Self {
        Self {
            handle,
            info,
            memory,
        }
    }

    /// Raw native handle.
    pub fn handle(&self) -> usize {
        self.handle
    }

    /// Metadata read before the transfer.
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    /// Copy of the packed DIB: info header, palette, pixels.
    pub fn bytes(&self) -> TwainResult<Vec<u8>> {
        if self.handle == 0 {
            return Err(TwainError::InvalidBitmap("null handle".to_string()));
        }
        self.memory.read(self.handle)
    }
}

impl fmt::Debug for NativeBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBitmap")
            .field("handle", &format_args!("{:#x}", self.handle))
            .field("width", &self.info.width)
            .field("length", &self.info.length)
            .finish()
    }
}

impl Drop for NativeBitmap {
    fn drop(&mut self) {
        if self.handle != 0 {
            self.memory.release(self.handle);
        }
    }
}
