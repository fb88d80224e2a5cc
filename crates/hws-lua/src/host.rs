//! Collaborators a script can reach through the `hw` table.

use hws_bus::EventBus;
use hws_runtime::collab::{
    DeviceConnector, Directory, MemoryStateStore, NoPowerProfiles, PowerProfiles, SharedDirectory,
    StateStore, UnavailableConnector,
};
use std::fmt;
use std::sync::Arc;

/// Shared handles to every external capability provider.
///
/// Cloning is cheap; every field is an `Arc`.
#[derive(Clone)]
pub struct HostServices {
    pub directory: Arc<dyn Directory>,
    pub devices: Arc<dyn DeviceConnector>,
    pub power: Arc<dyn PowerProfiles>,
    pub state: Arc<dyn StateStore>,
    pub bus: Arc<EventBus>,
}

impl HostServices {
    /// Services with nothing attached: empty directory, no device backend,
    /// no power profiles, in-memory state and a bus without a transport.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            directory: Arc::new(SharedDirectory::default()),
            devices: Arc::new(UnavailableConnector),
            power: Arc::new(NoPowerProfiles),
            state: Arc::new(MemoryStateStore::new()),
            bus: Arc::new(EventBus::new()),
        }
    }

    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = directory;
        self
    }

    #[must_use]
    pub fn with_devices(mut self, devices: Arc<dyn DeviceConnector>) -> Self {
        self.devices = devices;
        self
    }

    #[must_use]
    pub fn with_power(mut self, power: Arc<dyn PowerProfiles>) -> Self {
        self.power = power;
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: Arc<dyn StateStore>) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }
}

impl Default for HostServices {
    fn default() -> Self {
        Self::detached()
    }
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices")
            .field("elements", &self.directory.snapshot().len())
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}
