//! Numeric vocabulary of the protocol: dispatch triplets, return codes and
//! condition codes.

use std::fmt;

/// Data group of a dispatch triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataGroup {
    /// Session control operations.
    Control,
    /// Image description and transfer.
    Image,
}

impl DataGroup {
    /// Protocol value.
    pub fn raw(self) -> u32 {
        match self {
            DataGroup::Control => 0x0001,
            DataGroup::Image => 0x0002,
        }
    }
}

/// Argument type of a dispatch triplet, naming the payload record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataArgType {
    /// Capability container exchange.
    Capability,
    /// Event forwarding.
    Event,
    /// Source identities.
    Identity,
    /// Host window handle.
    Parent,
    /// Pending transfer count.
    PendingXfers,
    /// Condition code of the last failure.
    Status,
    /// Enable and disable arguments.
    UserInterface,
    /// Metadata of the next image.
    ImageInfo,
    /// Native bitmap transfer.
    ImageNativeXfer,
}

impl DataArgType {
    /// Protocol value.
    pub fn raw(self) -> u16 {
        match self {
            DataArgType::Capability => 0x0001,
            DataArgType::Event => 0x0002,
            DataArgType::Identity => 0x0003,
            DataArgType::Parent => 0x0004,
            DataArgType::PendingXfers => 0x0005,
            DataArgType::Status => 0x0008,
            DataArgType::UserInterface => 0x0009,
            DataArgType::ImageInfo => 0x0101,
            DataArgType::ImageNativeXfer => 0x0104,
        }
    }
}

/// Message of a dispatch triplet, also used for the sub-message a source
/// returns from event processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    /// No message.
    Null,
    /// Read everything.
    Get,
    /// Read the current value.
    GetCurrent,
    /// Read the default value.
    GetDefault,
    /// Start an enumeration.
    GetFirst,
    /// Continue an enumeration.
    GetNext,
    /// Write a value.
    Set,
    /// Restore the default, or discard pending transfers.
    Reset,
    /// Source has pages ready.
    XferReady,
    /// Source asks to be closed.
    CloseDsReq,
    /// Source confirms it may be closed.
    CloseDsOk,
    /// Source reports a device event.
    DeviceEvent,
    /// Open the manager.
    OpenDsm,
    /// Close the manager.
    CloseDsm,
    /// Open a source.
    OpenDs,
    /// Close a source.
    CloseDs,
    /// Disable the open source.
    DisableDs,
    /// Enable the open source.
    EnableDs,
    /// Offer a host message to the source.
    ProcessEvent,
    /// Finish one transfer unit.
    EndXfer,
    /// Any other value.
    Other(u16),
}

impl Message {
    /// Protocol value.
    pub fn raw(self) -> u16 {
        match self {
            Message::Null => 0x0000,
            Message::Get => 0x0001,
            Message::GetCurrent => 0x0002,
            Message::GetDefault => 0x0003,
            Message::GetFirst => 0x0004,
            Message::GetNext => 0x0005,
            Message::Set => 0x0006,
            Message::Reset => 0x0007,
            Message::XferReady => 0x0101,
            Message::CloseDsReq => 0x0102,
            Message::CloseDsOk => 0x0103,
            Message::DeviceEvent => 0x0104,
            Message::OpenDsm => 0x0301,
            Message::CloseDsm => 0x0302,
            Message::OpenDs => 0x0401,
            Message::CloseDs => 0x0402,
            Message::DisableDs => 0x0501,
            Message::EnableDs => 0x0502,
            Message::ProcessEvent => 0x0601,
            Message::EndXfer => 0x0701,
            Message::Other(raw) => raw,
        }
    }

    /// Message for a protocol value.
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0x0000 => Message::Null,
            0x0001 => Message::Get,
            0x0002 => Message::GetCurrent,
            0x0003 => Message::GetDefault,
            0x0004 => Message::GetFirst,
            0x0005 => Message::GetNext,
            0x0006 => Message::Set,
            0x0007 => Message::Reset,
            0x0101 => Message::XferReady,
            0x0102 => Message::CloseDsReq,
            0x0103 => Message::CloseDsOk,
            0x0104 => Message::DeviceEvent,
            0x0301 => Message::OpenDsm,
            0x0302 => Message::CloseDsm,
            0x0401 => Message::OpenDs,
            0x0402 => Message::CloseDs,
            0x0501 => Message::DisableDs,
            0x0502 => Message::EnableDs,
            0x0601 => Message::ProcessEvent,
            0x0701 => Message::EndXfer,
            other => Message::Other(other),
        }
    }
}

/// The (group, argument type, message) key every dispatch is made with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triplet {
    /// Data group.
    pub group: DataGroup,
    /// Argument type.
    pub dat: DataArgType,
    /// Message.
    pub msg: Message,
}

impl Triplet {
    /// Triplet from its parts.
    pub const fn new(group: DataGroup, dat: DataArgType, msg: Message) -> Self {
        Self { group, dat, msg }
    }

    /// Triplet in the control group.
    pub const fn control(dat: DataArgType, msg: Message) -> Self {
        Self::new(DataGroup::Control, dat, msg)
    }

    /// Triplet in the image group.
    pub const fn image(dat: DataArgType, msg: Message) -> Self {
        Self::new(DataGroup::Image, dat, msg)
    }
}

impl fmt::Display for Triplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}/{:?}", self.group, self.dat, self.msg)
    }
}

/// Result of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// Call succeeded.
    Success,
    /// Call failed; query the status for details.
    Failure,
    /// Partly succeeded; query the status.
    CheckStatus,
    /// Cancelled by the user or the source.
    Cancel,
    /// The message was a source event.
    DsEvent,
    /// The message was not a source event.
    NotDsEvent,
    /// Transfer unit complete.
    XferDone,
    /// Enumeration exhausted.
    EndOfList,
    /// Requested information not supported.
    InfoNotSupported,
    /// Requested data not available.
    DataNotAvailable,
    /// Source busy.
    Busy,
    /// Scanner locked by another application.
    ScannerLocked,
    /// Any other value.
    Other(u16),
}

impl ReturnCode {
    /// Return code for a protocol value.
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => ReturnCode::Success,
            1 => ReturnCode::Failure,
            2 => ReturnCode::CheckStatus,
            3 => ReturnCode::Cancel,
            4 => ReturnCode::DsEvent,
            5 => ReturnCode::NotDsEvent,
            6 => ReturnCode::XferDone,
            7 => ReturnCode::EndOfList,
            8 => ReturnCode::InfoNotSupported,
            9 => ReturnCode::DataNotAvailable,
            10 => ReturnCode::Busy,
            11 => ReturnCode::ScannerLocked,
            other => ReturnCode::Other(other),
        }
    }

    /// Protocol value.
    pub fn raw(self) -> u16 {
        match self {
            ReturnCode::Success => 0,
            ReturnCode::Failure => 1,
            ReturnCode::CheckStatus => 2,
            ReturnCode::Cancel => 3,
            ReturnCode::DsEvent => 4,
            ReturnCode::NotDsEvent => 5,
            ReturnCode::XferDone => 6,
            ReturnCode::EndOfList => 7,
            ReturnCode::InfoNotSupported => 8,
            ReturnCode::DataNotAvailable => 9,
            ReturnCode::Busy => 10,
            ReturnCode::ScannerLocked => 11,
            ReturnCode::Other(raw) => raw,
        }
    }

    /// Whether the call succeeded.
    pub fn is_success(self) -> bool {
        self == ReturnCode::Success
    }
}

/// Detailed status reported by the manager after a non-success result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionCode {
    /// No failure.
    Success,
    /// Failure with no specific cause.
    Bummer,
    /// Out of memory.
    LowMemory,
    /// No such source.
    NoDs,
    /// Source serves its maximum number of applications.
    MaxConnections,
    /// Source or manager already reported the error.
    OperationError,
    /// Unknown capability.
    BadCap,
    /// Unrecognized triplet.
    BadProtocol,
    /// Argument out of range.
    BadValue,
    /// Triplet out of sequence.
    SeqError,
    /// Unknown destination.
    BadDest,
    /// Capability not supported.
    CapUnsupported,
    /// Operation not supported by the capability.
    CapBadOperation,
    /// Capability depends on another capability.
    CapSeqError,
    /// File operation denied.
    Denied,
    /// File already exists.
    FileExists,
    /// File not found.
    FileNotFound,
    /// Directory not empty.
    NotEmpty,
    /// Feeder jammed.
    PaperJam,
    /// Feeder took several pages.
    PaperDoubleFeed,
    /// File could not be written.
    FileWriteError,
    /// Device went offline.
    CheckDeviceOnline,
    /// Device interlock open.
    InterlockError,
    /// Document corner damaged.
    DamagedCorner,
    /// Device could not focus.
    FocusError,
    /// Document too light.
    DocTooLight,
    /// Document too dark.
    DocTooDark,
    /// Feeder empty.
    NoMedia,
    /// Any other value.
    Unknown(u16),
}

impl ConditionCode {
    /// Condition code for a protocol value.
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => ConditionCode::Success,
            1 => ConditionCode::Bummer,
            2 => ConditionCode::LowMemory,
            3 => ConditionCode::NoDs,
            4 => ConditionCode::MaxConnections,
            5 => ConditionCode::OperationError,
            6 => ConditionCode::BadCap,
            9 => ConditionCode::BadProtocol,
            10 => ConditionCode::BadValue,
            11 => ConditionCode::SeqError,
            12 => ConditionCode::BadDest,
            13 => ConditionCode::CapUnsupported,
            14 => ConditionCode::CapBadOperation,
            15 => ConditionCode::CapSeqError,
            16 => ConditionCode::Denied,
            17 => ConditionCode::FileExists,
            18 => ConditionCode::FileNotFound,
            19 => ConditionCode::NotEmpty,
            20 => ConditionCode::PaperJam,
            21 => ConditionCode::PaperDoubleFeed,
            22 => ConditionCode::FileWriteError,
            23 => ConditionCode::CheckDeviceOnline,
            24 => ConditionCode::InterlockError,
            25 => ConditionCode::DamagedCorner,
            26 => ConditionCode::FocusError,
            27 => ConditionCode::DocTooLight,
            28 => ConditionCode::DocTooDark,
            29 => ConditionCode::NoMedia,
            other => ConditionCode::Unknown(other),
        }
    }

    /// Protocol value.
    pub fn raw(self) -> u16 {
        match self {
            ConditionCode::Success => 0,
            ConditionCode::Bummer => 1,
            ConditionCode::LowMemory => 2,
            ConditionCode::NoDs => 3,
            ConditionCode::MaxConnections => 4,
            ConditionCode::OperationError => 5,
            ConditionCode::BadCap => 6,
            ConditionCode::BadProtocol => 9,
            ConditionCode::BadValue => 10,
            ConditionCode::SeqError => 11,
            ConditionCode::BadDest => 12,
            ConditionCode::CapUnsupported => 13,
            ConditionCode::CapBadOperation => 14,
            ConditionCode::CapSeqError => 15,
            ConditionCode::Denied => 16,
            ConditionCode::FileExists => 17,
            ConditionCode::FileNotFound => 18,
            ConditionCode::NotEmpty => 19,
            ConditionCode::PaperJam => 20,
            ConditionCode::PaperDoubleFeed => 21,
            ConditionCode::FileWriteError => 22,
            ConditionCode::CheckDeviceOnline => 23,
            ConditionCode::InterlockError => 24,
            ConditionCode::DamagedCorner => 25,
            ConditionCode::FocusError => 26,
            ConditionCode::DocTooLight => 27,
            ConditionCode::DocTooDark => 28,
            ConditionCode::NoMedia => 29,
            ConditionCode::Unknown(raw) => raw,
        }
    }

    /// Human-readable failure description.
    pub fn description(self) -> &'static str {
        match self {
            ConditionCode::Success => "It worked!",
            ConditionCode::Bummer => "Failure due to unknown causes.",
            ConditionCode::LowMemory => "Not enough memory to perform operation.",
            ConditionCode::NoDs => "No Data Source.",
            ConditionCode::MaxConnections => "DS is connected to max possible applications.",
            ConditionCode::OperationError => "DS or DSM reported error, application shouldn't.",
            ConditionCode::BadCap => "Unknown capability.",
            ConditionCode::BadProtocol => "Unrecognized MSG DG DAT combination.",
            ConditionCode::BadValue => "Data parameter out of range.",
            ConditionCode::SeqError => "DG DAT MSG out of expected sequence.",
            ConditionCode::BadDest => "Unknown destination Application/Source in DSM_Entry.",
            ConditionCode::CapUnsupported => "Capability not supported by source.",
            ConditionCode::CapBadOperation => "Operation not supported by capability.",
            ConditionCode::CapSeqError => "Capability has dependancy on other capability.",
            ConditionCode::Denied => "File System operation is denied (file is protected).",
            ConditionCode::FileExists => "Operation failed because file already exists.",
            ConditionCode::FileNotFound => "File not found.",
            ConditionCode::NotEmpty => "Operation failed because directory is not empty.",
            ConditionCode::PaperJam => "The feeder is jammed.",
            ConditionCode::PaperDoubleFeed => "The feeder detected multiple pages.",
            ConditionCode::FileWriteError => {
                "Error writing the file (meant for things like disk full conditions)."
            }
            ConditionCode::CheckDeviceOnline => {
                "The device went offline prior to or during this operation."
            }
            ConditionCode::InterlockError => "The device interlock is open.",
            ConditionCode::DamagedCorner => "The document has a damaged corner.",
            ConditionCode::FocusError => "The device could not focus on the document.",
            ConditionCode::DocTooLight => "The document is too light to scan.",
            ConditionCode::DocTooDark => "The document is too dark to scan.",
            ConditionCode::NoMedia => "There is no media in the feeder.",
            ConditionCode::Unknown(_) => "Unknown error.",
        }
    }
}

impl fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Capability identifiers used by the session and the CLI.
pub mod cap {
    /// Pages to transfer.
    pub const XFER_COUNT: u16 = 0x0001;
    /// Transfer compression.
    pub const COMPRESSION: u16 = 0x0100;
    /// Color model.
    pub const PIXEL_TYPE: u16 = 0x0101;
    /// Author string.
    pub const AUTHOR: u16 = 0x1000;
    /// Caption string.
    pub const CAPTION: u16 = 0x1001;
    /// Document feeder in use.
    pub const FEEDER_ENABLED: u16 = 0x1002;
    /// Capabilities the source supports.
    pub const SUPPORTED_CAPS: u16 = 0x1005;
    /// Progress indicators shown.
    pub const INDICATORS: u16 = 0x100b;
    /// Source can run without its UI.
    pub const UI_CONTROLLABLE: u16 = 0x100e;
    /// Device is reachable.
    pub const DEVICE_ONLINE: u16 = 0x100f;
    /// Horizontal resolution.
    pub const X_RESOLUTION: u16 = 0x1118;
    /// Vertical resolution.
    pub const Y_RESOLUTION: u16 = 0x1119;
    /// Bits per sample.
    pub const BIT_DEPTH: u16 = 0x112b;

    /// Display name for a capability id.
    pub fn name(cap: u16) -> &'static str {
        match cap {
            XFER_COUNT => "CAP_XFERCOUNT",
            COMPRESSION => "ICAP_COMPRESSION",
            PIXEL_TYPE => "ICAP_PIXELTYPE",
            AUTHOR => "CAP_AUTHOR",
            CAPTION => "CAP_CAPTION",
            FEEDER_ENABLED => "CAP_FEEDERENABLED",
            SUPPORTED_CAPS => "CAP_SUPPORTEDCAPS",
            INDICATORS => "CAP_INDICATORS",
            UI_CONTROLLABLE => "CAP_UICONTROLLABLE",
            DEVICE_ONLINE => "CAP_DEVICEONLINE",
            X_RESOLUTION => "ICAP_XRESOLUTION",
            Y_RESOLUTION => "ICAP_YRESOLUTION",
            BIT_DEPTH => "ICAP_BITDEPTH",
            _ => "CAP_UNKNOWN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_descriptions() {
        assert_eq!(ConditionCode::from_raw(2).description(), "Not enough memory to perform operation.");
        assert_eq!(ConditionCode::from_raw(20), ConditionCode::PaperJam);
        assert_eq!(
            ConditionCode::from_raw(23).description(),
            "The device went offline prior to or during this operation."
        );
        assert_eq!(ConditionCode::from_raw(7).description(), "Unknown error.");
        assert_eq!(ConditionCode::from_raw(999).description(), "Unknown error.");
    }

    #[test]
    fn test_condition_codes_keep_raw_value() {
        for raw in 0..40u16 {
            assert_eq!(ConditionCode::from_raw(raw).raw(), raw);
        }
    }

    #[test]
    fn test_return_code_mapping() {
        assert!(ReturnCode::from_raw(0).is_success());
        assert_eq!(ReturnCode::from_raw(5), ReturnCode::NotDsEvent);
        assert_eq!(ReturnCode::from_raw(6), ReturnCode::XferDone);
        assert_eq!(ReturnCode::from_raw(42), ReturnCode::Other(42));
        assert_eq!(ReturnCode::EndOfList.raw(), 7);
    }

    #[test]
    fn test_message_mapping() {
        assert_eq!(Message::from_raw(0x0101), Message::XferReady);
        assert_eq!(Message::from_raw(0x0102), Message::CloseDsReq);
        assert_eq!(Message::ProcessEvent.raw(), 0x0601);
        assert_eq!(Message::from_raw(0x0999), Message::Other(0x0999));
    }

    #[test]
    fn test_triplet_display() {
        let t = Triplet::control(DataArgType::Parent, Message::OpenDsm);
        assert_eq!(t.to_string(), "Control/Parent/OpenDsm");
    }
}
