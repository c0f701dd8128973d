//! Distribution capability flags.
//!
//! Exchanged in the name message and the challenge. The field is 64 bits
//! wide; peers refuse connections that lack the flags they require.

use std::fmt;

/// Distribution capability flags bitmap
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DistributionFlags(u64);

impl DistributionFlags {
    /// Node is to be published and part of the global namespace
    pub const PUBLISHED: u64 = 0x1;
    /// Atom cache is used
    pub const ATOM_CACHE: u64 = 0x2;
    /// Extended (3 x 32 bits) references
    pub const EXTENDED_REFERENCES: u64 = 0x4;
    /// Distributed monitoring
    pub const DIST_MONITOR: u64 = 0x8;
    /// Separate tag for funs
    pub const FUN_TAGS: u64 = 0x10;
    /// Named process monitoring
    pub const DIST_MONITOR_NAME: u64 = 0x20;
    /// Hidden atom cache
    pub const HIDDEN_ATOM_CACHE: u64 = 0x40;
    /// New fun tags
    pub const NEW_FUN_TAGS: u64 = 0x80;
    /// Extended pids and ports
    pub const EXTENDED_PIDS_PORTS: u64 = 0x100;
    /// Export pointer tag
    pub const EXPORT_PTR_TAG: u64 = 0x200;
    /// Bit binaries
    pub const BIT_BINARIES: u64 = 0x400;
    /// New float format
    pub const NEW_FLOATS: u64 = 0x800;
    /// Unicode I/O
    pub const UNICODE_IO: u64 = 0x1000;
    /// Atom cache in distribution header
    pub const DIST_HDR_ATOM_CACHE: u64 = 0x2000;
    /// Small atom tags
    pub const SMALL_ATOM_TAGS: u64 = 0x4000;
    /// UTF-8 atoms
    pub const UTF8_ATOMS: u64 = 0x1_0000;
    /// Map tag
    pub const MAP_TAG: u64 = 0x2_0000;
    /// Big (32-bit) creation
    pub const BIG_CREATION: u64 = 0x4_0000;
    /// Send sender
    pub const SEND_SENDER: u64 = 0x8_0000;
    /// Big sequence trace labels
    pub const BIG_SEQTRACE_LABELS: u64 = 0x10_0000;
    /// Exit payload
    pub const EXIT_PAYLOAD: u64 = 0x40_0000;
    /// Fragmented messages
    pub const FRAGMENTS: u64 = 0x80_0000;
    /// Current handshake version (64-bit flags, creation in the name message)
    pub const HANDSHAKE_23: u64 = 0x100_0000;
    /// Unlink with identifiers and acknowledgements
    pub const UNLINK_ID: u64 = 0x200_0000;
    /// Flag field extended to 64 bits
    pub const FLAGS_EXTENDED: u64 = 0x800_0000;
    /// Spawn request
    pub const SPAWN: u64 = 1 << 32;
    /// Dynamic node name
    pub const NAME_ME: u64 = 1 << 33;
    /// Version 4 node container types
    pub const V4_NC: u64 = 1 << 34;
    /// Process aliases
    pub const ALIAS: u64 = 1 << 35;

    /// Flags this client advertises by default.
    ///
    /// Omitting any of these breaks interoperability with current peers.
    pub const CLIENT_DEFAULT: u64 = Self::EXTENDED_REFERENCES
        | Self::EXTENDED_PIDS_PORTS
        | Self::NEW_FUN_TAGS
        | Self::UTF8_ATOMS
        | Self::UNLINK_ID
        | Self::HANDSHAKE_23
        | Self::BIG_CREATION
        | Self::MAP_TAG
        | Self::NEW_FLOATS
        | Self::BIT_BINARIES
        | Self::EXPORT_PTR_TAG
        | Self::FUN_TAGS
        | Self::FLAGS_EXTENDED;

    /// Create empty flags
    #[must_use]
    pub fn new() -> Self {
        Self(0)
    }

    /// Flags from a raw bitmap
    #[must_use]
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Default client capability set
    #[must_use]
    pub fn client_default() -> Self {
        Self(Self::CLIENT_DEFAULT)
    }

    /// Add a flag
    #[must_use]
    pub fn with(mut self, flag: u64) -> Self {
        self.0 |= flag;
        self
    }

    /// Remove a flag
    #[must_use]
    pub fn without(mut self, flag: u64) -> Self {
        self.0 &= !flag;
        self
    }

    /// Check if every bit of `flag` is set
    #[must_use]
    pub fn contains(&self, flag: u64) -> bool {
        self.0 & flag == flag
    }

    /// Get raw bitmap
    #[must_use]
    pub fn bits(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for DistributionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DistributionFlags({:#x})", self.0)
    }
}
