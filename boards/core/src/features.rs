//! Feature traits for board capabilities.
//!
//! Boards opt-in to features by implementing these traits and returning
//! `Some(self)` from the corresponding `as_*()` method in the Board trait.

use crate::{KeyColorMap, PinTable};

/// Errors that can occur during board operations
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// No candidate product exposed a usable control and led interface pair
    #[error("device not found")]
    DeviceNotFound,

    /// A report exchange failed during initialization
    #[error("handshake failed on report {report:#04x}: {source}")]
    Handshake {
        report: u8,
        #[source]
        source: Box<BoardError>,
    },

    /// The device never reported ready within the configured limit
    #[error("device not ready after {polls} status polls")]
    ReadyTimeout { polls: u32 },

    /// The control channel is single-use and was already consumed
    #[error("control channel already released")]
    ControlReleased,

    /// Frames were sent before the device was switched to host-driven lighting
    #[error("host lighting not enabled")]
    HostLightingDisabled,

    /// Fewer bytes than requested were written for a led chunk
    #[error("short write on led chunk {chunk}: {written} of {expected} bytes")]
    Transmission {
        chunk: usize,
        written: usize,
        expected: usize,
    },

    /// No input event device matched the board
    #[error("input device not found")]
    InputNotFound,

    /// Reading from the input event device failed, usually a disconnect
    #[error("input device lost: {0}")]
    InputLost(#[source] std::io::Error),

    /// Request for a report id outside the known table
    #[error("no such report id {0:#04x}")]
    UnknownReport(u8),

    /// HID communication error
    #[error("hid error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BoardError>;

/// On-device animation capability. The device runs the effect on its own after setup.
pub trait HasHardwareEffect {
    /// Start the wave animation. Speed is clamped to 1..=11.
    fn set_wave(&mut self, speed: u8) -> Result<()>;
}

/// Host-driven per-key lighting capability
pub trait HasPerKeyLighting {
    /// Switch the device to host-driven lighting. Must succeed before any frame is sent.
    fn enable_host_lighting(&mut self) -> Result<()>;

    /// Encode and transmit one frame. Pinned keys override the map, missing map means all off.
    fn send_frame(&mut self, map: Option<&KeyColorMap>, pins: &PinTable) -> Result<()>;
}
