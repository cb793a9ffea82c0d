//! Per-key color frame encoding and chunked transmission.
//!
//! The device addresses keys in 12 bands of 12 keys. Each band is planar:
//! 12 red bytes, then 12 green, then 12 blue.

use tracing::trace;
use vulcan_rgb_core::{BoardError, KeyColorMap, LedChannel, LogicalKey, PinTable, Result};

/// Size of the device native color buffer
pub const NATIVE_LEN: usize = 444;
/// Size of one output report, including the report id byte
pub const REPORT_LEN: usize = 65;
/// Reports per frame
pub const CHUNKS: usize = 7;

/// Command prefix of the first report, followed by the first 60 native bytes
const HEADER: [u8; 5] = [0x00, 0xa1, 0x01, 0x01, 0xb4];
const BAND: usize = 12;

/// Native buffer offset of the red channel for a key. Green follows at +12, blue at +24.
pub const fn native_offset(key: LogicalKey) -> usize {
    let k = key.index();
    (k / BAND) * BAND * 3 + k % BAND
}

/// Encode a frame into the native layout
pub fn encode(map: Option<&KeyColorMap>, pins: &PinTable) -> [u8; NATIVE_LEN] {
    let mut native = [0u8; NATIVE_LEN];
    for key in LogicalKey::all() {
        let [r, g, b] = pins.resolve(key, map).clamped();
        let offset = native_offset(key);
        native[offset] = r;
        native[offset + BAND] = g;
        native[offset + BAND * 2] = b;
    }
    native
}

/// Split a native buffer into output reports.
///
/// Report `i > 0` carries the native window starting at `i * 64 - 4`, so consecutive
/// windows overlap by four bytes. The device reassembles them that way.
pub fn chunks(native: &[u8; NATIVE_LEN]) -> [[u8; REPORT_LEN]; CHUNKS] {
    let mut reports = [[0u8; REPORT_LEN]; CHUNKS];
    let payload = REPORT_LEN - 1;

    let first = &mut reports[0];
    first[..HEADER.len()].copy_from_slice(&HEADER);
    let head = REPORT_LEN - HEADER.len();
    first[HEADER.len()..].copy_from_slice(&native[..head]);

    for (i, report) in reports.iter_mut().enumerate().skip(1) {
        let start = i * payload - (payload - head);
        report[1..].copy_from_slice(&native[start..start + payload]);
    }
    reports
}

/// Encode and stream one frame. The first short write aborts the rest.
pub fn send(led: &mut dyn LedChannel, map: Option<&KeyColorMap>, pins: &PinTable) -> Result<()> {
    let native = encode(map, pins);
    for (chunk, report) in chunks(&native).iter().enumerate() {
        let written = led.write(report)?;
        if written != REPORT_LEN {
            return Err(BoardError::Transmission {
                chunk,
                written,
                expected: REPORT_LEN,
            });
        }
    }
    trace!("frame sent");
    Ok(())
}
