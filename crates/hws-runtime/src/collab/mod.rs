//! External capability providers consumed by the script.
//!
//! Hardware access, lighting devices and power profiles live outside the
//! supervision core. This module defines the narrow interfaces the core and
//! the script bindings talk to, plus the few implementations that need no
//! hardware: the directory snapshot, the file-backed state store and the
//! "nothing configured" stand-ins the binary falls back to.
//!
//! Every mutating call on these interfaces must run on the primary thread.
//! Bindings schedule them through the [`MainQueue`](crate::queue::MainQueue);
//! the interfaces themselves do not enforce it.

mod device;
mod directory;
mod error;
mod power;
mod state;

pub use device::{
    Color, DeviceClient, DeviceConnector, DeviceInfo, DeviceMode, Direction, Endpoint,
    ModeFlags, ModeRequest, UnavailableConnector,
};
pub use directory::{
    Control, Directory, DirectorySnapshot, Element, Sensor, SharedDirectory, SnapshotBuilder,
};
pub use error::CollabError;
pub use power::{NoPowerProfiles, PowerProfile, PowerProfiles};
pub use state::{FileStateStore, MemoryStateStore, StateStore};
