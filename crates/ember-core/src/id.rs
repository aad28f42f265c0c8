//! Stable identifiers handed out by append-only counters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Ids below this value are reserved for the built-in channel catalogue.
const RESERVED_CHANNEL_IDS: u32 = 64;

/// Bit marking an id as store-local scratch space.
const SCRATCH_BIT: u32 = 0x8000_0000;

/// Global counter for registered (permanent) channel kinds
static NEXT_CHANNEL_ID: AtomicU32 = AtomicU32::new(RESERVED_CHANNEL_IDS);

/// Global counter for controller instances
static NEXT_CONTROLLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a channel kind within a particle store.
///
/// Permanent kinds (position, life, ...) share one process-wide numbering that only
/// ever grows. Scratch ids are allocated per store from a separate namespace, so they
/// can never collide with a permanent id registered later.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u32);

impl ChannelId {
    /// Id of a built-in channel kind. `index` must be below the reserved range.
    pub const fn builtin(index: u32) -> Self {
        assert!(index < RESERVED_CHANNEL_IDS);
        Self(index)
    }

    /// Register a new permanent channel kind and return its id. Ids are never reused.
    pub fn register() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Scratch id local to one store. `local` is the store's running counter.
    pub const fn scratch(local: u32) -> Self {
        Self(SCRATCH_BIT | local)
    }

    /// Create a ChannelId from a raw value (for deserialization/testing)
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw u32 value
    pub const fn raw(&self) -> u32 {
        self.0
    }

    pub const fn is_scratch(&self) -> bool {
        self.0 & SCRATCH_BIT != 0
    }

    /// True when this permanent id was handed out by the built-in catalogue or `register()`.
    pub fn is_known(&self) -> bool {
        !self.is_scratch() && self.0 < NEXT_CHANNEL_ID.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_scratch() {
            write!(f, "ChannelId(scratch {})", self.0 & !SCRATCH_BIT)
        } else {
            write!(f, "ChannelId({})", self.0)
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_scratch() {
            write!(f, "scratch#{}", self.0 & !SCRATCH_BIT)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Unique identity of one particle controller instance.
///
/// Copies of a controller get a fresh id, which lets pools and tests tell
/// instances apart.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ControllerId(u64);

impl ControllerId {
    /// Create a new unique ControllerId
    pub fn new() -> Self {
        Self(NEXT_CONTROLLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ControllerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControllerId({})", self.0)
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
