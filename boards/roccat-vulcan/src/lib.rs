//! High level abstraction for driving ROCCAT Vulcan per-key lighting

use tracing::{debug, info};
use vulcan_rgb_core::{
    Board, BoardError, BoardInfo, ControlChannel, HasHardwareEffect, HasPerKeyLighting,
    KeyColorMap, LedChannel, PinTable, Result,
};

pub mod abi;
pub mod frame;
pub mod handshake;
pub mod input;
pub mod keymap;
pub mod locate;

use abi::Mode;
use handshake::ReadyWait;
use locate::{Channels, Locator, Strategy};

pub mod consts {
    pub const VULCAN_VENDOR_ID: u16 = 0x1e7d;
    /// Vulcan 100/120 AIMO variants, in discovery order
    pub const VULCAN_PRODUCT_IDS: &[u16] = &[0x3098, 0x307a];
    pub const VULCAN_CONTROL_INTERFACE: i32 = 1;
    pub const VULCAN_LED_INTERFACE: i32 = 3;
}

/// Static board info for detection
pub static INFO: BoardInfo = BoardInfo {
    name: "ROCCAT Vulcan",
    cli_name: "roccat-vulcan",
    vendor_id: consts::VULCAN_VENDOR_ID,
    product_ids: consts::VULCAN_PRODUCT_IDS,
    control_interface: consts::VULCAN_CONTROL_INTERFACE,
    led_interface: consts::VULCAN_LED_INTERFACE,
};

/// High level abstraction for managing a ROCCAT Vulcan keyboard
pub struct RoccatVulcan {
    /// Consumed by the first handshake
    control: Option<Box<dyn ControlChannel>>,
    led: Box<dyn LedChannel>,
    ready: ReadyWait,
    host_lighting: bool,
    product_id: u16,
    description: String,
}

impl RoccatVulcan {
    /// Find and open the device using the given discovery strategy
    pub fn open(strategy: Strategy) -> Result<Self> {
        Self::open_with(strategy.locator().as_ref())
    }

    pub fn open_with(locator: &dyn Locator) -> Result<Self> {
        let channels = locator.locate(&INFO)?;
        Ok(Self::from_channels(channels))
    }

    pub fn from_channels(channels: Channels) -> Self {
        Self {
            control: Some(channels.control),
            led: channels.led,
            ready: ReadyWait::default(),
            host_lighting: false,
            product_id: channels.product_id,
            description: channels.description,
        }
    }

    /// Override the ready-wait polling policy used by the handshake
    pub fn with_ready_wait(mut self, ready: ReadyWait) -> Self {
        self.ready = ready;
        self
    }

    /// Run the initialization sequence for a mode.
    ///
    /// The control channel is released afterwards whatever the outcome, so this
    /// can run once per opened device.
    pub fn handshake(&mut self, mode: Mode) -> Result<()> {
        let mut control = self.control.take().ok_or(BoardError::ControlReleased)?;
        let res = handshake::run(control.as_mut(), mode, &self.ready);
        drop(control);
        debug!("control channel released");

        res?;
        self.host_lighting = mode == Mode::Host;
        info!(
            "{} ({:04x}) initialized in {mode:?}",
            self.description, self.product_id
        );
        Ok(())
    }

    pub fn is_ready_for_frames(&self) -> bool {
        self.host_lighting
    }
}

impl Board for RoccatVulcan {
    fn info(&self) -> &'static BoardInfo {
        &INFO
    }

    fn product_id(&self) -> Option<u16> {
        Some(self.product_id)
    }

    fn as_hardware_effect(&mut self) -> Option<&mut dyn HasHardwareEffect> {
        Some(self)
    }

    fn as_per_key_lighting(&mut self) -> Option<&mut dyn HasPerKeyLighting> {
        Some(self)
    }
}

impl HasHardwareEffect for RoccatVulcan {
    fn set_wave(&mut self, speed: u8) -> Result<()> {
        self.handshake(Mode::wave(speed))
    }
}

impl HasPerKeyLighting for RoccatVulcan {
    fn enable_host_lighting(&mut self) -> Result<()> {
        self.handshake(Mode::Host)
    }

    fn send_frame(&mut self, map: Option<&KeyColorMap>, pins: &PinTable) -> Result<()> {
        if !self.host_lighting {
            return Err(BoardError::HostLightingDisabled);
        }
        frame::send(self.led.as_mut(), map, pins)
    }
}
