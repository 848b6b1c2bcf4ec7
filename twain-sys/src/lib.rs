//! Raw FFI records and constants for the TWAIN data source manager.
//!
//! Every record mirrors the C header layout: little-endian fields packed on
//! two-byte boundaries. Nothing in this crate interprets the data; higher
//! layers wrap these records in typed values.
//!
//! With the `twain-dsm` feature on Windows, [`dsm`] loads the manager library
//! at runtime and [`memory`] exposes the movable global-memory calls used for
//! capability containers and transferred bitmaps.

#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals)]

use std::ffi::c_void;

pub type TW_UINT16 = u16;
pub type TW_UINT32 = u32;
pub type TW_INT16 = i16;
pub type TW_INT32 = i32;
pub type TW_BOOL = u16;
pub type TW_HANDLE = *mut c_void;
pub type TW_MEMREF = *mut c_void;

/// Fixed 32-byte string plus terminator and pad byte.
pub type TW_STR32 = [u8; 34];

// ============================================================================
// Return codes (TWRC_*)
// ============================================================================

pub const TWRC_SUCCESS: TW_UINT16 = 0;
pub const TWRC_FAILURE: TW_UINT16 = 1;
pub const TWRC_CHECKSTATUS: TW_UINT16 = 2;
pub const TWRC_CANCEL: TW_UINT16 = 3;
pub const TWRC_DSEVENT: TW_UINT16 = 4;
pub const TWRC_NOTDSEVENT: TW_UINT16 = 5;
pub const TWRC_XFERDONE: TW_UINT16 = 6;
pub const TWRC_ENDOFLIST: TW_UINT16 = 7;
pub const TWRC_INFONOTSUPPORTED: TW_UINT16 = 8;
pub const TWRC_DATANOTAVAILABLE: TW_UINT16 = 9;
pub const TWRC_BUSY: TW_UINT16 = 10;
pub const TWRC_SCANNERLOCKED: TW_UINT16 = 11;

// ============================================================================
// Data groups (DG_*)
// ============================================================================

pub const DG_CONTROL: TW_UINT32 = 0x0001;
pub const DG_IMAGE: TW_UINT32 = 0x0002;
pub const DG_AUDIO: TW_UINT32 = 0x0004;
pub const DF_DSM2: TW_UINT32 = 0x1000_0000;
pub const DF_APP2: TW_UINT32 = 0x2000_0000;
pub const DF_DS2: TW_UINT32 = 0x4000_0000;

// ============================================================================
// Argument types (DAT_*)
// ============================================================================

pub const DAT_CAPABILITY: TW_UINT16 = 0x0001;
pub const DAT_EVENT: TW_UINT16 = 0x0002;
pub const DAT_IDENTITY: TW_UINT16 = 0x0003;
pub const DAT_PARENT: TW_UINT16 = 0x0004;
pub const DAT_PENDINGXFERS: TW_UINT16 = 0x0005;
pub const DAT_STATUS: TW_UINT16 = 0x0008;
pub const DAT_USERINTERFACE: TW_UINT16 = 0x0009;
pub const DAT_IMAGEINFO: TW_UINT16 = 0x0101;
pub const DAT_IMAGENATIVEXFER: TW_UINT16 = 0x0104;

// ============================================================================
// Messages (MSG_*)
// ============================================================================

pub const MSG_NULL: TW_UINT16 = 0x0000;
pub const MSG_GET: TW_UINT16 = 0x0001;
pub const MSG_GETCURRENT: TW_UINT16 = 0x0002;
pub const MSG_GETDEFAULT: TW_UINT16 = 0x0003;
pub const MSG_GETFIRST: TW_UINT16 = 0x0004;
pub const MSG_GETNEXT: TW_UINT16 = 0x0005;
pub const MSG_SET: TW_UINT16 = 0x0006;
pub const MSG_RESET: TW_UINT16 = 0x0007;
pub const MSG_XFERREADY: TW_UINT16 = 0x0101;
pub const MSG_CLOSEDSREQ: TW_UINT16 = 0x0102;
pub const MSG_CLOSEDSOK: TW_UINT16 = 0x0103;
pub const MSG_DEVICEEVENT: TW_UINT16 = 0x0104;
pub const MSG_OPENDSM: TW_UINT16 = 0x0301;
pub const MSG_CLOSEDSM: TW_UINT16 = 0x0302;
pub const MSG_OPENDS: TW_UINT16 = 0x0401;
pub const MSG_CLOSEDS: TW_UINT16 = 0x0402;
pub const MSG_DISABLEDS: TW_UINT16 = 0x0501;
pub const MSG_ENABLEDS: TW_UINT16 = 0x0502;
pub const MSG_PROCESSEVENT: TW_UINT16 = 0x0601;
pub const MSG_ENDXFER: TW_UINT16 = 0x0701;

// ============================================================================
// Container shapes (TWON_*) and item types (TWTY_*)
// ============================================================================

pub const TWON_ARRAY: TW_UINT16 = 3;
pub const TWON_ENUMERATION: TW_UINT16 = 4;
pub const TWON_ONEVALUE: TW_UINT16 = 5;
pub const TWON_RANGE: TW_UINT16 = 6;
pub const TWON_DONTCARE16: TW_UINT16 = 0xffff;

pub const TWTY_INT8: TW_UINT16 = 0x0000;
pub const TWTY_INT16: TW_UINT16 = 0x0001;
pub const TWTY_INT32: TW_UINT16 = 0x0002;
pub const TWTY_UINT8: TW_UINT16 = 0x0003;
pub const TWTY_UINT16: TW_UINT16 = 0x0004;
pub const TWTY_UINT32: TW_UINT16 = 0x0005;
pub const TWTY_BOOL: TW_UINT16 = 0x0006;
pub const TWTY_FIX32: TW_UINT16 = 0x0007;
pub const TWTY_FRAME: TW_UINT16 = 0x0008;
pub const TWTY_STR32: TW_UINT16 = 0x0009;
pub const TWTY_STR64: TW_UINT16 = 0x000a;
pub const TWTY_STR128: TW_UINT16 = 0x000b;
pub const TWTY_STR255: TW_UINT16 = 0x000c;
pub const TWTY_STR1024: TW_UINT16 = 0x000d;
pub const TWTY_UNI512: TW_UINT16 = 0x000e;
pub const TWTY_HANDLE: TW_UINT16 = 0x000f;

// ============================================================================
// Capabilities (CAP_*, ICAP_*)
// ============================================================================

pub const CAP_XFERCOUNT: TW_UINT16 = 0x0001;
pub const ICAP_COMPRESSION: TW_UINT16 = 0x0100;
pub const ICAP_PIXELTYPE: TW_UINT16 = 0x0101;
pub const CAP_AUTHOR: TW_UINT16 = 0x1000;
pub const CAP_CAPTION: TW_UINT16 = 0x1001;
pub const CAP_FEEDERENABLED: TW_UINT16 = 0x1002;
pub const CAP_SUPPORTEDCAPS: TW_UINT16 = 0x1005;
pub const CAP_INDICATORS: TW_UINT16 = 0x100b;
pub const CAP_UICONTROLLABLE: TW_UINT16 = 0x100e;
pub const CAP_DEVICEONLINE: TW_UINT16 = 0x100f;
pub const ICAP_BITDEPTH: TW_UINT16 = 0x112b;
pub const ICAP_XRESOLUTION: TW_UINT16 = 0x1118;
pub const ICAP_YRESOLUTION: TW_UINT16 = 0x1119;

pub const TWLG_ENGLISH_USA: TW_UINT16 = 13;
pub const TWCY_USA: TW_UINT16 = 1;

// ============================================================================
// Records
// ============================================================================

#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy, Default)]
pub struct TW_FIX32 {
    pub Whole: TW_INT16,
    pub Frac: TW_UINT16,
}

#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy, Default)]
pub struct TW_FRAME {
    pub Left: TW_FIX32,
    pub Top: TW_FIX32,
    pub Right: TW_FIX32,
    pub Bottom: TW_FIX32,
}

#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy)]
pub struct TW_VERSION {
    pub MajorNum: TW_UINT16,
    pub MinorNum: TW_UINT16,
    pub Language: TW_UINT16,
    pub Country: TW_UINT16,
    pub Info: TW_STR32,
}

#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy)]
pub struct TW_IDENTITY {
    pub Id: TW_UINT32,
    pub Version: TW_VERSION,
    pub ProtocolMajor: TW_UINT16,
    pub ProtocolMinor: TW_UINT16,
    pub SupportedGroups: TW_UINT32,
    pub Manufacturer: TW_STR32,
    pub ProductFamily: TW_STR32,
    pub ProductName: TW_STR32,
}

#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy, Default)]
pub struct TW_STATUS {
    pub ConditionCode: TW_UINT16,
    pub Reserved: TW_UINT16,
}

#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy)]
pub struct TW_USERINTERFACE {
    pub ShowUI: TW_BOOL,
    pub ModalUI: TW_BOOL,
    pub hParent: TW_HANDLE,
}

#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy)]
pub struct TW_EVENT {
    pub pEvent: TW_MEMREF,
    pub TWMessage: TW_UINT16,
}

#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy)]
pub struct TW_CAPABILITY {
    pub Cap: TW_UINT16,
    pub ConType: TW_UINT16,
    pub hContainer: TW_HANDLE,
}

#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy, Default)]
pub struct TW_IMAGEINFO {
    pub XResolution: TW_FIX32,
    pub YResolution: TW_FIX32,
    pub ImageWidth: TW_INT32,
    pub ImageLength: TW_INT32,
    pub SamplesPerPixel: TW_INT16,
    pub BitsPerSample: [TW_INT16; 8],
    pub BitsPerPixel: TW_INT16,
    pub Planar: TW_BOOL,
    pub PixelType: TW_INT16,
    pub Compression: TW_UINT16,
}

#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy, Default)]
pub struct TW_PENDINGXFERS {
    pub Count: TW_UINT16,
    pub EOJ: TW_UINT32,
}

/// Host window message as laid out by the Win32 `MSG` structure.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WINMSG {
    pub hwnd: *mut c_void,
    pub message: u32,
    pub wParam: usize,
    pub lParam: isize,
    pub time: u32,
    pub x: i32,
    pub y: i32,
}

impl Default for WINMSG {
    fn default() -> Self {
        Self {
            hwnd: std::ptr::null_mut(),
            message: 0,
            wParam: 0,
            lParam: 0,
            time: 0,
            x: 0,
            y: 0,
        }
    }
}

/// Signature of the exported `DSM_Entry` function.
pub type DSMENTRYPROC = unsafe extern "system" fn(
    pOrigin: *mut TW_IDENTITY,
    pDest: *mut TW_IDENTITY,
    DG: TW_UINT32,
    DAT: TW_UINT16,
    MSG: TW_UINT16,
    pData: TW_MEMREF,
) -> TW_UINT16;

#[cfg(all(windows, feature = "twain-dsm"))]
pub mod dsm;

#[cfg(all(windows, feature = "twain-dsm"))]
pub mod memory;

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_record_sizes_match_packed_layout() {
        assert_eq!(size_of::<TW_FIX32>(), 4);
        assert_eq!(size_of::<TW_FRAME>(), 16);
        assert_eq!(size_of::<TW_VERSION>(), 42);
        assert_eq!(size_of::<TW_IDENTITY>(), 156);
        assert_eq!(size_of::<TW_STATUS>(), 4);
        assert_eq!(size_of::<TW_PENDINGXFERS>(), 6);
        assert_eq!(size_of::<TW_IMAGEINFO>(), 42);
    }
}
