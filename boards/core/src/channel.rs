//! Report channels between the protocol engine and the transport.
//!
//! Boards talk to the device exclusively through these traits so that the
//! discovery strategy decides what backs each channel (an enumerated hidapi
//! handle, a raw hidraw node, or an in-memory mock in tests).

use hidapi::HidDevice;

use crate::Result;

/// Bidirectional feature report channel
pub trait ControlChannel {
    /// Read a feature report. `buf[0]` must hold the report id. Returns the bytes read.
    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Send a feature report whose first byte is the report id. Returns the bytes accepted.
    fn send_feature_report(&mut self, buf: &[u8]) -> Result<usize>;

    /// Product description, used to verify the device identity after opening
    fn product_string(&mut self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Host to device output report channel
pub trait LedChannel {
    /// Write one output report. Returns the bytes written.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
}

impl ControlChannel for HidDevice {
    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(HidDevice::get_feature_report(self, buf)?)
    }

    fn send_feature_report(&mut self, buf: &[u8]) -> Result<usize> {
        // hidapi reports success without a length, anything short is an error
        HidDevice::send_feature_report(self, buf)?;
        Ok(buf.len())
    }

    fn product_string(&mut self) -> Result<Option<String>> {
        Ok(self.get_product_string()?)
    }
}

impl LedChannel for HidDevice {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(HidDevice::write(self, buf)?)
    }
}
