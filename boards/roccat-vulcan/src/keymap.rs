//! Translation from input event key codes to logical keys.

use evdev::Key;
use vulcan_rgb_core::LogicalKey;

/// Highest input event code covered by the table
pub const MAX_CODE: u16 = 254;

/// Table entry for codes without a key on this board
const UNMAPPED: u8 = 0xff;

/// Input event code (index) to logical key number
#[rustfmt::skip]
static CODE_TO_KEY: [u8; MAX_CODE as usize + 1] = [
    0xff, 0x00, 0x06, 0x0c, 0x12, 0x18, 0x1d, 0x21, 0x31, 0x36, 0x3c, 0x42, 0x48, 0x4f, 0x57, 0x02,
    0x07, 0x0d, 0x13, 0x19, 0x1e, 0x22, 0x32, 0x37, 0x3d, 0x43, 0x49, 0x50, 0x58, 0x05, 0x08, 0x0e,
    0x14, 0x1a, 0x1f, 0x23, 0x33, 0x38, 0x3e, 0x44, 0x4a, 0x01, 0x04, 0x60, 0x0f, 0x15, 0x1b, 0x20,
    0x24, 0x34, 0x39, 0x3f, 0x45, 0x4b, 0x52, 0x7c, 0x10, 0x25, 0x03, 0x0b, 0x11, 0x17, 0x1c, 0x30,
    0x35, 0x3b, 0x41, 0x4e, 0x54, 0x71, 0x67, 0x72, 0x78, 0x7d, 0x81, 0x73, 0x79, 0x7e, 0x82, 0x74,
    0x7a, 0x7f, 0x75, 0x80, 0xff, 0xff, 0x09, 0x55, 0x56, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x83, 0x59, 0x77, 0x63, 0x46, 0xff, 0x68, 0x6a, 0x6d, 0x66, 0x6f, 0x69, 0x6b, 0x6e, 0x64, 0x65,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x6c, 0xff, 0xff, 0xff, 0xff, 0xff, 0x0a, 0xff, 0x53,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

/// Look up the logical key for an input event code.
///
/// Codes above [`MAX_CODE`] are rejected before touching the table.
pub fn lookup(code: u16) -> Option<LogicalKey> {
    if code > MAX_CODE {
        return None;
    }
    match CODE_TO_KEY[code as usize] {
        UNMAPPED => None,
        key => LogicalKey::new(key),
    }
}

/// Resolve a key given by its evdev name or raw code.
///
/// Names are `KEY_*` constants, matched case-insensitively with the prefix
/// optional, so `KEY_ESC`, `key_esc` and `esc` are the same key.
pub fn parse_code(name: &str) -> Option<u16> {
    let name = name.trim();
    if let Ok(code) = name.parse::<u16>() {
        return Some(code);
    }
    let upper = name.to_ascii_uppercase();
    let full = if upper.starts_with("KEY_") {
        upper
    } else {
        format!("KEY_{upper}")
    };
    full.parse::<Key>().ok().map(Key::code)
}

/// evdev name of a key code, for log output
pub fn name(code: u16) -> String {
    format!("{:?}", Key::new(code))
}
