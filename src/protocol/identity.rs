//! Application and source identities.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Capability groups an identity declares support for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SupportedGroups: u32 {
        /// Control operations.
        const CONTROL = 0x0001;
        /// Image transfer.
        const IMAGE = 0x0002;
        /// Audio transfer.
        const AUDIO = 0x0004;
        /// Manager implements protocol 2.
        const DSM2 = 0x1000_0000;
        /// Application implements protocol 2.
        const APP2 = 0x2000_0000;
        /// Source implements protocol 2.
        const DS2 = 0x4000_0000;
    }
}

/// Which manager library a binding talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFlavor {
    /// `twain_32`, protocol 1.9.
    Legacy,
    /// `twaindsm`, protocol 2.3.
    Extended,
}

impl ProtocolFlavor {
    /// Protocol (major, minor) the application declares.
    pub fn protocol_version(self) -> (u16, u16) {
        match self {
            ProtocolFlavor::Legacy => (1, 9),
            ProtocolFlavor::Extended => (2, 3),
        }
    }

    /// Groups the application declares.
    pub fn supported_groups(self) -> SupportedGroups {
        match self {
            ProtocolFlavor::Legacy => SupportedGroups::CONTROL | SupportedGroups::IMAGE,
            ProtocolFlavor::Extended => {
                SupportedGroups::CONTROL | SupportedGroups::IMAGE | SupportedGroups::APP2
            }
        }
    }
}

/// Version block embedded in an identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Version {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
    /// Protocol language code.
    pub language: u16,
    /// Protocol country code.
    pub country: u16,
    /// Free-form version text.
    pub info: String,
}

/// Identity of an application or a source.
///
/// `id` is assigned by the manager; zero means unset. Two identities are
/// equal when their ids are equal.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    /// Manager-assigned id; 0 when unset.
    pub id: u32,
    /// Product version.
    pub version: Version,
    /// Protocol major version.
    pub protocol_major: u16,
    /// Protocol minor version.
    pub protocol_minor: u16,
    /// Raw [`SupportedGroups`] bits.
    pub supported_groups: u32,
    /// Manufacturer name.
    pub manufacturer: String,
    /// Product family name.
    pub product_family: String,
    /// Product name; unique among installed sources.
    pub product_name: String,
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Identity {}

impl Identity {
    /// Build an application identity for the given manager flavor.
    pub fn application(
        flavor: ProtocolFlavor,
        version: Version,
        manufacturer: impl Into<String>,
        product_family: impl Into<String>,
        product_name: impl Into<String>,
    ) -> Self {
        let (protocol_major, protocol_minor) = flavor.protocol_version();
        Self {
            id: 0,
            version,
            protocol_major,
            protocol_minor,
            supported_groups: flavor.supported_groups().bits(),
            manufacturer: manufacturer.into(),
            product_family: product_family.into(),
            product_name: product_name.into(),
        }
    }

    /// Identity with only a product name, used to describe a source.
    pub fn source(id: u32, product_name: impl Into<String>) -> Self {
        Self {
            id,
            product_name: product_name.into(),
            ..Self::default()
        }
    }

    /// Declared groups, unknown bits dropped.
    pub fn groups(&self) -> SupportedGroups {
        SupportedGroups::from_bits_truncate(self.supported_groups)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id {})", self.product_name, self.id)
    }
}
