//! Binding to the installed data source manager.
//!
//! Available on Windows with the `twain_hardware` feature. Records are
//! converted to the packed native layout for the duration of one call;
//! capability containers live in movable global memory that is allocated and
//! released inside the same call.

use super::DsmEntry;
use crate::error::{TwainError, TwainResult};

/// Load the installed manager, preferring the extended library when allowed.
#[cfg(all(windows, feature = "twain_hardware"))]
pub fn open(prefer_extended: bool) -> TwainResult<Box<dyn DsmEntry>> {
    let library = twain_sys::dsm::DsmLibrary::load(prefer_extended)
        .map_err(TwainError::BindingUnavailable)?;
    tracing::info!(extended = library.is_extended(), "data source manager loaded");
    Ok(Box::new(imp::NativeDsm::new(library)))
}

/// Fails: the manager library exists only on Windows.
#[cfg(all(not(windows), feature = "twain_hardware"))]
pub fn open(_prefer_extended: bool) -> TwainResult<Box<dyn DsmEntry>> {
    Err(TwainError::BindingUnavailable(
        "the data source manager is only available on Windows".to_string(),
    ))
}

/// Fails: built without the `twain_hardware` feature.
#[cfg(not(feature = "twain_hardware"))]
pub fn open(_prefer_extended: bool) -> TwainResult<Box<dyn DsmEntry>> {
    Err(TwainError::FeatureNotEnabled("twain_hardware".to_string()))
}

#[cfg(all(windows, feature = "twain_hardware"))]
#[allow(unsafe_code)]
mod imp {
    use crate::binding::{DsmEntry, HandleMemory, Payload};
    use crate::error::{TwainError, TwainResult};
    use crate::marshal::{from_wire, to_wire, Fix32, Value, WireType, WireValue};
    use crate::protocol::{
        EventRecord, Identity, ImageInfo, Message, ProtocolFlavor, ReturnCode, Triplet,
        Version,
    };
    use std::ffi::c_void;
    use std::ptr;
    use std::sync::Arc;
    use twain_sys::*;

    /// Global-memory access through the Win32 heap calls.
    pub struct GlobalMemory;

    impl HandleMemory for GlobalMemory {
        fn read(&self, handle: usize) -> TwainResult<Vec<u8>> {
            read_global(handle as TW_HANDLE)
        }

        fn release(&self, handle: usize) {
            // SAFETY: the handle came from the manager and is released once.
            unsafe { memory::free(handle as TW_HANDLE) };
        }
    }

    fn read_global(handle: TW_HANDLE) -> TwainResult<Vec<u8>> {
        // SAFETY: the handle is a live global-memory block; the locked
        // pointer is valid for `size` bytes until unlock.
        unsafe {
            let size = memory::size(handle);
            let data = memory::lock(handle) as *const u8;
            if data.is_null() {
                return Err(TwainError::InvalidBitmap("cannot lock handle".to_string()));
            }
            let bytes = std::slice::from_raw_parts(data, size).to_vec();
            memory::unlock(handle);
            Ok(bytes)
        }
    }

    pub struct NativeDsm {
        library: twain_sys::dsm::DsmLibrary,
        /// Host message buffer the event record points at, reused per event.
        winmsg: Box<WINMSG>,
        memory: Arc<GlobalMemory>,
    }

    impl NativeDsm {
        pub fn new(library: twain_sys::dsm::DsmLibrary) -> Self {
            Self {
                library,
                winmsg: Box::default(),
                memory: Arc::new(GlobalMemory),
            }
        }

        fn call(
            &self,
            origin: &mut TW_IDENTITY,
            dest: Option<&mut TW_IDENTITY>,
            triplet: Triplet,
            data: TW_MEMREF,
        ) -> ReturnCode {
            let dest = dest.map_or(ptr::null_mut(), |d| d as *mut TW_IDENTITY);
            let entry = self.library.entry();
            // SAFETY: both identities and `data` outlive the call and have the
            // layout the triplet requires.
            let rc = unsafe {
                entry(
                    origin,
                    dest,
                    triplet.group.raw(),
                    triplet.dat.raw(),
                    triplet.msg.raw(),
                    data,
                )
            };
            ReturnCode::from_raw(rc)
        }
    }

    impl DsmEntry for NativeDsm {
        fn flavor(&self) -> ProtocolFlavor {
            if self.library.is_extended() {
                ProtocolFlavor::Extended
            } else {
                ProtocolFlavor::Legacy
            }
        }

        fn entry(
            &mut self,
            origin: &mut Identity,
            dest: Option<&Identity>,
            triplet: Triplet,
            payload: Payload<'_>,
        ) -> ReturnCode {
            let mut raw_origin = to_native_identity(origin);
            let mut raw_dest = dest.map(to_native_identity);

            let rc = match payload {
                Payload::Parent(hwnd) => {
                    let mut handle = *hwnd as TW_HANDLE;
                    self.call(
                        &mut raw_origin,
                        raw_dest.as_mut(),
                        triplet,
                        &mut handle as *mut TW_HANDLE as TW_MEMREF,
                    )
                }
                Payload::Identity(identity) => {
                    let mut raw = to_native_identity(identity);
                    let rc = self.call(
                        &mut raw_origin,
                        raw_dest.as_mut(),
                        triplet,
                        &mut raw as *mut TW_IDENTITY as TW_MEMREF,
                    );
                    *identity = from_native_identity(&raw);
                    rc
                }
                Payload::Status(status) => {
                    let mut raw = TW_STATUS::default();
                    let rc = self.call(
                        &mut raw_origin,
                        raw_dest.as_mut(),
                        triplet,
                        &mut raw as *mut TW_STATUS as TW_MEMREF,
                    );
                    status.condition_code = raw.ConditionCode;
                    rc
                }
                Payload::UserInterface(ui) => {
                    let mut raw = TW_USERINTERFACE {
                        ShowUI: u16::from(ui.show_ui),
                        ModalUI: u16::from(ui.modal_ui),
                        hParent: ui.parent as TW_HANDLE,
                    };
                    self.call(
                        &mut raw_origin,
                        raw_dest.as_mut(),
                        triplet,
                        &mut raw as *mut TW_USERINTERFACE as TW_MEMREF,
                    )
                }
                Payload::Event(event) => {
                    self.process_event(&mut raw_origin, raw_dest.as_mut(), triplet, event)
                }
                Payload::Capability(record) => {
                    let container = if record.data.is_empty() {
                        ptr::null_mut()
                    } else {
                        match write_global(&record.data) {
                            Some(handle) => handle,
                            None => return ReturnCode::Failure,
                        }
                    };
                    let mut raw = TW_CAPABILITY {
                        Cap: record.cap,
                        ConType: record.kind,
                        hContainer: container,
                    };
                    let rc = self.call(
                        &mut raw_origin,
                        raw_dest.as_mut(),
                        triplet,
                        &mut raw as *mut TW_CAPABILITY as TW_MEMREF,
                    );
                    let returned = raw.hContainer;
                    if rc.is_success() && !returned.is_null() && container.is_null() {
                        record.kind = raw.ConType;
                        record.data = read_global(returned).unwrap_or_default();
                    }
                    // SAFETY: each container handle is released exactly once.
                    unsafe {
                        if !returned.is_null() && returned != container {
                            memory::free(returned);
                        }
                        if !container.is_null() {
                            memory::free(container);
                        }
                    }
                    rc
                }
                Payload::ImageInfo(info) => {
                    let mut raw = TW_IMAGEINFO::default();
                    let rc = self.call(
                        &mut raw_origin,
                        raw_dest.as_mut(),
                        triplet,
                        &mut raw as *mut TW_IMAGEINFO as TW_MEMREF,
                    );
                    *info = from_native_image_info(&raw);
                    rc
                }
                Payload::NativeXfer(handle) => {
                    let mut raw: TW_HANDLE = ptr::null_mut();
                    let rc = self.call(
                        &mut raw_origin,
                        raw_dest.as_mut(),
                        triplet,
                        &mut raw as *mut TW_HANDLE as TW_MEMREF,
                    );
                    *handle = raw as usize;
                    rc
                }
                Payload::PendingXfers(pending) => {
                    let mut raw = TW_PENDINGXFERS::default();
                    let rc = self.call(
                        &mut raw_origin,
                        raw_dest.as_mut(),
                        triplet,
                        &mut raw as *mut TW_PENDINGXFERS as TW_MEMREF,
                    );
                    pending.count = raw.Count;
                    rc
                }
            };

            origin.id = raw_origin.Id;
            rc
        }

        fn memory(&self) -> Arc<dyn HandleMemory> {
            self.memory.clone()
        }
    }

    impl NativeDsm {
        fn process_event(
            &mut self,
            origin: &mut TW_IDENTITY,
            dest: Option<&mut TW_IDENTITY>,
            triplet: Triplet,
            event: &mut EventRecord,
        ) -> ReturnCode {
            *self.winmsg = WINMSG {
                hwnd: event.message.hwnd as *mut c_void,
                message: event.message.message,
                wParam: event.message.wparam,
                lParam: event.message.lparam,
                ..WINMSG::default()
            };
            let mut raw = TW_EVENT {
                pEvent: &mut *self.winmsg as *mut WINMSG as TW_MEMREF,
                TWMessage: event.outcome.raw(),
            };
            let rc = self.call(origin, dest, triplet, &mut raw as *mut TW_EVENT as TW_MEMREF);
            event.outcome = Message::from_raw(raw.TWMessage);
            rc
        }
    }

    fn write_global(bytes: &[u8]) -> Option<TW_HANDLE> {
        // SAFETY: the block is allocated with `bytes.len()` bytes and locked
        // only for the copy.
        unsafe {
            let handle = memory::alloc(bytes.len());
            if handle.is_null() {
                return None;
            }
            let data = memory::lock(handle) as *mut u8;
            if data.is_null() {
                memory::free(handle);
                return None;
            }
            ptr::copy_nonoverlapping(bytes.as_ptr(), data, bytes.len());
            memory::unlock(handle);
            Some(handle)
        }
    }

    fn to_str32(text: &str) -> TW_STR32 {
        let mut out = [0u8; 34];
        let wire = to_wire(WireType::Str32, &Value::Str(text.to_string()));
        if let Ok(WireValue::Str(_, bytes)) = wire {
            out.copy_from_slice(&bytes[..34]);
        }
        out
    }

    fn from_str32(raw: &TW_STR32) -> String {
        match from_wire(WireType::Str32, &WireValue::Str(WireType::Str32, raw.to_vec())) {
            Ok(Value::Str(text)) => text,
            _ => String::new(),
        }
    }

    fn to_native_identity(identity: &Identity) -> TW_IDENTITY {
        TW_IDENTITY {
            Id: identity.id,
            Version: TW_VERSION {
                MajorNum: identity.version.major,
                MinorNum: identity.version.minor,
                Language: identity.version.language,
                Country: identity.version.country,
                Info: to_str32(&identity.version.info),
            },
            ProtocolMajor: identity.protocol_major,
            ProtocolMinor: identity.protocol_minor,
            SupportedGroups: identity.supported_groups,
            Manufacturer: to_str32(&identity.manufacturer),
            ProductFamily: to_str32(&identity.product_family),
            ProductName: to_str32(&identity.product_name),
        }
    }

    fn from_native_identity(raw: &TW_IDENTITY) -> Identity {
        let version = raw.Version;
        let (manufacturer, family, name) = (raw.Manufacturer, raw.ProductFamily, raw.ProductName);
        Identity {
            id: raw.Id,
            version: Version {
                major: version.MajorNum,
                minor: version.MinorNum,
                language: version.Language,
                country: version.Country,
                info: from_str32(&{ version.Info }),
            },
            protocol_major: raw.ProtocolMajor,
            protocol_minor: raw.ProtocolMinor,
            supported_groups: raw.SupportedGroups,
            manufacturer: from_str32(&manufacturer),
            product_family: from_str32(&family),
            product_name: from_str32(&name),
        }
    }

    fn fix32(raw: TW_FIX32) -> f32 {
        Fix32 {
            whole: raw.Whole,
            frac: raw.Frac,
        }
        .to_f32()
    }

    fn from_native_image_info(raw: &TW_IMAGEINFO) -> ImageInfo {
        ImageInfo {
            x_resolution: fix32(raw.XResolution),
            y_resolution: fix32(raw.YResolution),
            width: raw.ImageWidth,
            length: raw.ImageLength,
            samples_per_pixel: raw.SamplesPerPixel,
            bits_per_sample: raw.BitsPerSample,
            bits_per_pixel: raw.BitsPerPixel,
            planar: raw.Planar != 0,
            pixel_type: raw.PixelType,
            compression: raw.Compression,
        }
    }
}
