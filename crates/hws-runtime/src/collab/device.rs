//! Lighting/device client interface.
//!
//! A [`DeviceConnector`] opens a session against a lighting controller
//! endpoint and returns a [`DeviceClient`]. Connecting and every mutating call
//! run on the primary thread; enumeration results are copied into plain data
//! ([`DeviceInfo`]) before they cross over to the script thread.

use super::CollabError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Network location of a device controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Effect direction for modes that support one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    None,
    Left,
    Right,
    Up,
    Down,
    Horizontal,
    Vertical,
}

impl FromStr for Direction {
    type Err = CollabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "horizontal" => Ok(Self::Horizontal),
            "vertical" => Ok(Self::Vertical),
            other => Err(CollabError::rejected(format!(
                "\"{other}\" cannot be converted to direction"
            ))),
        }
    }
}

/// Capability flags of a device mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeFlags {
    pub has_speed: bool,
    pub has_direction_lr: bool,
    pub has_direction_ud: bool,
    pub has_direction_hv: bool,
    pub has_brightness: bool,
    pub has_per_led_color: bool,
    pub has_mode_specific_color: bool,
    pub has_random_color: bool,
}

impl ModeFlags {
    /// Returns `true` if any direction flag is set.
    #[must_use]
    pub fn has_direction(&self) -> bool {
        self.has_direction_lr || self.has_direction_ud || self.has_direction_hv
    }
}

/// One lighting mode offered by a device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMode {
    /// Index within the device's mode list.
    pub id: u32,
    pub name: String,
    pub flags: ModeFlags,
    pub speed_min: u32,
    pub speed_max: u32,
}

/// Enumerated device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// Index within the controller's device list.
    pub id: u32,
    pub name: String,
    pub kind: String,
    pub vendor: String,
    pub description: String,
    pub version: String,
    pub serial: String,
    pub location: String,
    pub modes: Vec<DeviceMode>,
    /// Number of individually colorable LEDs.
    pub led_count: usize,
}

/// Parameters of a mode switch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModeRequest {
    pub mode_id: u32,
    pub speed: Option<u32>,
    pub direction: Option<Direction>,
    pub colors: Option<Vec<Color>>,
}

/// Connected lighting controller.
pub trait DeviceClient: Send + Sync {
    /// Enumerates attached devices.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError`] on transport failures.
    fn devices(&self) -> Result<Vec<DeviceInfo>, CollabError>;

    /// Puts the device into direct (custom) color mode.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError`] on transport failures.
    fn set_custom_mode(&self, device: u32) -> Result<(), CollabError>;

    /// Sets per-LED colors.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError`] on transport failures.
    fn set_colors(&self, device: u32, colors: &[Color]) -> Result<(), CollabError>;

    /// Switches the device to a predefined mode.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError`] on transport failures.
    fn set_mode(&self, device: u32, request: &ModeRequest) -> Result<(), CollabError>;

    /// Returns `true` while the session is open.
    fn is_connected(&self) -> bool;

    /// Closes the session. Further calls fail with [`CollabError::Unavailable`].
    fn disconnect(&self);
}

/// Opens device client sessions.
pub trait DeviceConnector: Send + Sync {
    /// Connects to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError`] if the controller cannot be reached.
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn DeviceClient>, CollabError>;
}

/// Connector used when no lighting backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableConnector;

impl DeviceConnector for UnavailableConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn DeviceClient>, CollabError> {
        Err(CollabError::unavailable(format!(
            "device client for {endpoint} (no backend configured)"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parses_known_names() {
        assert_eq!("left".parse::<Direction>().unwrap(), Direction::Left);
        assert_eq!("vertical".parse::<Direction>().unwrap(), Direction::Vertical);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn direction_flag_union() {
        let flags = ModeFlags {
            has_direction_ud: true,
            ..ModeFlags::default()
        };
        assert!(flags.has_direction());
        assert!(!ModeFlags::default().has_direction());
    }

    #[test]
    fn unavailable_connector_reports_endpoint() {
        let err = match UnavailableConnector.connect(&Endpoint::new("127.0.0.1", 6742)) {
            Ok(_) => panic!("connector should not connect"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("127.0.0.1:6742"));
        assert!(err.is_transient());
    }
}
