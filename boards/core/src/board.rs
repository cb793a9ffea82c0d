//! Core Board trait and related types.

use crate::features::{HasHardwareEffect, HasPerKeyLighting};

/// Static information about a board type for detection and CLI
#[derive(Debug, Clone, Copy)]
pub struct BoardInfo {
    pub name: &'static str,
    pub cli_name: &'static str,
    pub vendor_id: u16,
    /// Candidate product ids, tried in order during discovery
    pub product_ids: &'static [u16],
    /// USB interface number carrying the feature report channel
    pub control_interface: i32,
    /// USB interface number carrying the led output reports
    pub led_interface: i32,
}

impl BoardInfo {
    /// Check a vendor/product pair against this board
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_ids.contains(&product_id)
    }
}

/// Core board trait - object-safe for `dyn Board`
///
/// Boards should provide a static `INFO` constant and `open()` method separately.
pub trait Board {
    /// Get board info (instance method for object safety)
    fn info(&self) -> &'static BoardInfo;

    /// Product id of the opened device, when it is one of several candidates
    fn product_id(&self) -> Option<u16> {
        None
    }

    /// Feature opt-in methods - override to return `Some(self)` if feature is supported
    fn as_hardware_effect(&mut self) -> Option<&mut dyn HasHardwareEffect> {
        None
    }
    fn as_per_key_lighting(&mut self) -> Option<&mut dyn HasPerKeyLighting> {
        None
    }
}
