//! Protocol vocabulary shared by the binding, the session and the bridge.

pub mod codes;
pub mod identity;
pub mod records;

pub use codes::{cap, ConditionCode, DataArgType, DataGroup, Message, ReturnCode, Triplet};
pub use identity::{Identity, ProtocolFlavor, SupportedGroups, Version};
pub use records::{EventRecord, HostMessage, ImageInfo, PendingXfers, Status, UserInterface};

/// Language code for English (USA).
pub const LANGUAGE_ENGLISH_USA: u16 = 13;
/// Country code for the USA.
pub const COUNTRY_USA: u16 = 1;
