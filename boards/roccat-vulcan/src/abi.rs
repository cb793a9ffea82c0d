//! Feature report payloads for the control interface.
//!
//! Each SET report is an immutable template plus a patch list for the bytes
//! that depend on the requested [`Mode`]. Report names follow what the
//! payloads carry (the key tables list HID usages, the lighting table is the
//! effect configuration block). Byte 1 of every sized template is its length.

use std::borrow::Cow;

use vulcan_rgb_core::{BoardError, Result};

/// Slowest hardware wave speed
pub const MIN_WAVE_SPEED: u8 = 1;
/// Fastest hardware wave speed
pub const MAX_WAVE_SPEED: u8 = 11;
/// Speed used when none (or zero) is requested
pub const DEFAULT_WAVE_SPEED: u8 = 6;

/// Lighting mode requested during initialization
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// On-device wave animation
    Wave { speed: u8 },
    /// Host streams per-key frames over the led interface
    Host,
}

impl Mode {
    /// Wave mode with the speed clamped to the supported range
    pub fn wave(speed: u8) -> Self {
        Self::Wave {
            speed: speed.clamp(MIN_WAVE_SPEED, MAX_WAVE_SPEED),
        }
    }
}

/// Report identifiers understood by the control interface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReportId {
    /// Ready status, polled after every SET
    Status = 0x04,
    Profile = 0x05,
    Keymap = 0x06,
    FunctionKeys = 0x07,
    NavigationKeys = 0x09,
    KeyConfig = 0x0a,
    MacroKeys = 0x0b,
    /// Effect configuration block, wave speed lives here
    Lighting = 0x0d,
    /// Firmware info, read once before initialization
    Info = 0x0f,
    /// Selects hardware effect or host-driven lighting
    LightingMode = 0x13,
    Begin = 0x15,
}

impl TryFrom<u8> for ReportId {
    type Error = BoardError;

    fn try_from(id: u8) -> Result<Self> {
        Ok(match id {
            0x04 => Self::Status,
            0x05 => Self::Profile,
            0x06 => Self::Keymap,
            0x07 => Self::FunctionKeys,
            0x09 => Self::NavigationKeys,
            0x0a => Self::KeyConfig,
            0x0b => Self::MacroKeys,
            0x0d => Self::Lighting,
            0x0f => Self::Info,
            0x13 => Self::LightingMode,
            0x15 => Self::Begin,
            other => return Err(BoardError::UnknownReport(other)),
        })
    }
}

impl ReportId {
    /// Length of the buffer for reading this report, if it is readable
    pub const fn get_len(self) -> Option<usize> {
        match self {
            Self::Status => Some(4),
            Self::Info => Some(8),
            _ => None,
        }
    }

    /// Fixed template for writing this report, if it is writable
    fn template(self) -> Option<&'static [u8]> {
        let template: &'static [u8] = match self {
            Self::Begin => &REPORT_15,
            Self::Profile => &REPORT_05,
            Self::FunctionKeys => &REPORT_07,
            Self::KeyConfig => &REPORT_0A,
            Self::MacroKeys => &REPORT_0B,
            Self::Keymap => &REPORT_06,
            Self::NavigationKeys => &REPORT_09,
            Self::Lighting => &REPORT_0D,
            Self::LightingMode => &REPORT_13,
            Self::Status | Self::Info => return None,
        };
        Some(template)
    }

    /// Mode dependent bytes applied on top of the template
    fn patches(self, mode: Mode) -> &'static [Patch] {
        match (self, mode) {
            (Self::Lighting, Mode::Wave { .. }) => LIGHTING_WAVE,
            (Self::LightingMode, Mode::Wave { .. }) => LIGHTING_MODE_WAVE,
            _ => &[],
        }
    }
}

/// Source of a patched byte
#[derive(Clone, Copy, Debug)]
enum PatchValue {
    Fixed(u8),
    Speed,
    SpeedPlus(u8),
}

#[derive(Clone, Copy, Debug)]
struct Patch {
    offset: usize,
    value: PatchValue,
}

// byte 5 == 01 slow, 06 medium, 0b fast
// byte 441 == 1e slow, 23 medium, 28 fast
const LIGHTING_WAVE: &[Patch] = &[
    Patch::new(4, PatchValue::Fixed(0x0a)),
    Patch::new(5, PatchValue::Speed),
    Patch::new(441, PatchValue::SpeedPlus(29)),
];

const LIGHTING_MODE_WAVE: &[Patch] = &[Patch::new(2, PatchValue::Fixed(0x00))];

impl Patch {
    const fn new(offset: usize, value: PatchValue) -> Self {
        Self { offset, value }
    }

    fn resolve(&self, mode: Mode) -> u8 {
        let speed = match mode {
            Mode::Wave { speed } => speed.clamp(MIN_WAVE_SPEED, MAX_WAVE_SPEED),
            Mode::Host => DEFAULT_WAVE_SPEED,
        };
        match self.value {
            PatchValue::Fixed(v) => v,
            PatchValue::Speed => speed,
            PatchValue::SpeedPlus(offset) => speed + offset,
        }
    }
}

/// Build the SET payload for a report in the given mode
pub fn set_payload(id: ReportId, mode: Mode) -> Result<Cow<'static, [u8]>> {
    let template = id.template().ok_or(BoardError::UnknownReport(id as u8))?;
    let patches = id.patches(mode);
    if patches.is_empty() {
        return Ok(Cow::Borrowed(template));
    }
    let mut buf = template.to_vec();
    for patch in patches {
        buf[patch.offset] = patch.resolve(mode);
    }
    Ok(Cow::Owned(buf))
}

/// Build a zeroed GET buffer for a report, with the report id in place
pub fn get_buffer(id: ReportId) -> Result<Vec<u8>> {
    let len = id.get_len().ok_or(BoardError::UnknownReport(id as u8))?;
    let mut buf = vec![0u8; len];
    buf[0] = id as u8;
    Ok(buf)
}

#[rustfmt::skip]
static REPORT_15: [u8; 3] = [
    0x15, 0x00, 0x01,
];

#[rustfmt::skip]
static REPORT_05: [u8; 4] = [
    0x05, 0x04, 0x00, 0x04,
];

#[rustfmt::skip]
static REPORT_07: [u8; 95] = [
    0x07, 0x5f, 0x00, 0x3a, 0x00, 0x00, 0x3b, 0x00, 0x00, 0x3c, 0x00, 0x00,
    0x3d, 0x00, 0x00, 0x3e, 0x00, 0x00, 0x3f, 0x00, 0x00, 0x40, 0x00, 0x00,
    0x41, 0x00, 0x00, 0x42, 0x00, 0x00, 0x43, 0x00, 0x00, 0x44, 0x00, 0x00,
    0x45, 0x00, 0x00, 0x46, 0x00, 0x00, 0x47, 0x00, 0x00, 0x48, 0x00, 0x00,
    0xb3, 0x00, 0x00, 0xb4, 0x00, 0x00, 0xb5, 0x00, 0x00, 0xb6, 0x00, 0x00,
    0xc2, 0x00, 0x00, 0xc3, 0x00, 0x00, 0xc0, 0x00, 0x00, 0xc1, 0x00, 0x00,
    0xce, 0x00, 0x00, 0xcf, 0x00, 0x00, 0xcc, 0x00, 0x00, 0xcd, 0x00, 0x00,
    0x46, 0x00, 0x00, 0xfc, 0x00, 0x00, 0x48, 0x00, 0x00, 0xcd, 0x0e,
];

#[rustfmt::skip]
static REPORT_0A: [u8; 8] = [
    0x0a, 0x08, 0x00, 0xff, 0xf1, 0x00, 0x02, 0x02,
];

#[rustfmt::skip]
static REPORT_0B: [u8; 65] = [
    0x0b, 0x41, 0x00, 0x1e, 0x00, 0x00, 0x1f, 0x00, 0x00, 0x20, 0x00, 0x00,
    0x21, 0x00, 0x00, 0x22, 0x00, 0x00, 0x14, 0x00, 0x00, 0x1a, 0x00, 0x00,
    0x08, 0x00, 0x00, 0x15, 0x00, 0x00, 0x17, 0x00, 0x00, 0x04, 0x00, 0x00,
    0x16, 0x00, 0x00, 0x07, 0x00, 0x00, 0x09, 0x00, 0x00, 0x0a, 0x00, 0x00,
    0x1d, 0x00, 0x00, 0x1b, 0x00, 0x00, 0x06, 0x00, 0x00, 0x19, 0x00, 0x00,
    0x05, 0x00, 0x00, 0xde, 0x01,
];

#[rustfmt::skip]
static REPORT_06: [u8; 133] = [
    0x06, 0x85, 0x00, 0x3a, 0x29, 0x35, 0x1e, 0x2b, 0x39, 0xe1, 0xe0, 0x3b,
    0x1f, 0x14, 0x1a, 0x04, 0x64, 0x00, 0x00, 0x3d, 0x3c, 0x20, 0x21, 0x08,
    0x16, 0x1d, 0xe2, 0x3e, 0x23, 0x22, 0x15, 0x07, 0x1b, 0x06, 0x8b, 0x3f,
    0x24, 0x00, 0x17, 0x0a, 0x09, 0x19, 0x91, 0x40, 0x41, 0x00, 0x1c, 0x18,
    0x0b, 0x05, 0x2c, 0x42, 0x26, 0x25, 0x0c, 0x0d, 0x0e, 0x10, 0x11, 0x43,
    0x2a, 0x27, 0x2d, 0x12, 0x0f, 0x36, 0x8a, 0x44, 0x45, 0x89, 0x2e, 0x13,
    0x33, 0x37, 0x90, 0x46, 0x49, 0x4c, 0x2f, 0x30, 0x34, 0x38, 0x88, 0x47,
    0x4a, 0x4d, 0x31, 0x32, 0x00, 0x87, 0xe6, 0x48, 0x4b, 0x4e, 0x28, 0x52,
    0x50, 0xe5, 0xe7, 0xd2, 0x53, 0x5f, 0x5c, 0x59, 0x51, 0x00, 0xf1, 0xd1,
    0x54, 0x60, 0x5d, 0x5a, 0x4f, 0x8e, 0x65, 0xd0, 0x55, 0x61, 0x5e, 0x5b,
    0x62, 0xa4, 0xe4, 0xfc, 0x56, 0x57, 0x85, 0x58, 0x63, 0x00, 0x00, 0xc2,
    0x24,
];

#[rustfmt::skip]
static REPORT_09: [u8; 43] = [
    0x09, 0x2b, 0x00, 0x49, 0x00, 0x00, 0x4a, 0x00, 0x00, 0x4b, 0x00, 0x00,
    0x4c, 0x00, 0x00, 0x4d, 0x00, 0x00, 0x4e, 0x00, 0x00, 0xa4, 0x00, 0x00,
    0x8e, 0x00, 0x00, 0xd0, 0x00, 0x00, 0xd1, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x00, 0x00, 0x00, 0xcd, 0x04,
];

#[rustfmt::skip]
static REPORT_0D: [u8; 443] = [
    0x0d, 0xbb, 0x01, 0x00, 0x06, 0x0b, 0x05, 0x45, 0x83, 0xca, 0xca, 0xca,
    0xca, 0xca, 0xca, 0xce, 0xce, 0xd2, 0xce, 0xce, 0xd2, 0x19, 0x19, 0x19,
    0x19, 0x19, 0x19, 0x23, 0x23, 0x2d, 0x23, 0x23, 0x2d, 0xe0, 0xe0, 0xe0,
    0xe0, 0xe0, 0xe0, 0xe3, 0xe3, 0xe6, 0xe3, 0xe3, 0xe6, 0xd2, 0xd2, 0xd5,
    0xd2, 0xd2, 0xd5, 0xd5, 0xd5, 0xd9, 0xd5, 0x00, 0xd9, 0x2d, 0x2d, 0x36,
    0x2d, 0x2d, 0x36, 0x36, 0x36, 0x40, 0x36, 0x00, 0x40, 0xe6, 0xe6, 0xe9,
    0xe6, 0xe6, 0xe9, 0xe9, 0xe9, 0xec, 0xe9, 0x00, 0xec, 0xd9, 0xd9, 0xdd,
    0xd9, 0xdd, 0xdd, 0xe0, 0xe0, 0xdd, 0xe0, 0xe4, 0xe4, 0x40, 0x40, 0x4a,
    0x40, 0x4a, 0x4a, 0x53, 0x53, 0x4a, 0x53, 0x5d, 0x5d, 0xec, 0xec, 0xef,
    0xec, 0xef, 0xef, 0xf2, 0xf2, 0xef, 0xf2, 0xf5, 0xf5, 0xe4, 0xe4, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x5d, 0x5d, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf5, 0xf5, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xe4, 0xe4, 0xe8,
    0xe8, 0xe8, 0xe8, 0xe8, 0xeb, 0xeb, 0xeb, 0x00, 0xeb, 0x5d, 0x5d, 0x67,
    0x67, 0x67, 0x67, 0x67, 0x70, 0x70, 0x70, 0x00, 0x70, 0xf5, 0xf5, 0xf8,
    0xf8, 0xf8, 0xf8, 0xf8, 0xfb, 0xfb, 0xfb, 0x00, 0xfb, 0xeb, 0xef, 0xef,
    0xef, 0x00, 0xef, 0xf0, 0xf0, 0xed, 0xf0, 0xf0, 0x00, 0x70, 0x7a, 0x7a,
    0x7a, 0x00, 0x7a, 0x7a, 0x7a, 0x6f, 0x7a, 0x7a, 0x00, 0xfb, 0xfd, 0xfd,
    0xfd, 0x00, 0xfd, 0xf8, 0xf8, 0xea, 0xf8, 0xf8, 0x00, 0xed, 0xed, 0xea,
    0xed, 0xed, 0x00, 0xed, 0xea, 0xea, 0xf6, 0xe7, 0xea, 0x6f, 0x6f, 0x65,
    0x6f, 0x6f, 0x00, 0x6f, 0x65, 0x65, 0x66, 0x5a, 0x65, 0xea, 0xea, 0xdc,
    0xea, 0xea, 0x00, 0xea, 0xdc, 0xdc, 0x00, 0xce, 0xdc, 0xea, 0xe7, 0xe5,
    0xe7, 0xe5, 0xe5, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x65, 0x5a, 0x50,
    0x5a, 0x50, 0x50, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xdc, 0xce, 0xc0,
    0xce, 0xc0, 0xc0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xe7, 0x00, 0x00,
    0xe2, 0xe2, 0xe2, 0xe2, 0xdf, 0xdf, 0xdf, 0xdf, 0xdf, 0x5a, 0x00, 0x00,
    0x45, 0x45, 0x45, 0x45, 0x3b, 0x3b, 0x3b, 0x3b, 0x3b, 0xce, 0x00, 0x00,
    0xb2, 0xb2, 0xb2, 0xb2, 0xa4, 0xa4, 0xa4, 0xa4, 0xa4, 0xdc, 0xdc, 0xdc,
    0xdc, 0x00, 0xda, 0xda, 0xda, 0xda, 0xda, 0x00, 0xd7, 0x30, 0x30, 0x30,
    0x30, 0x00, 0x26, 0x26, 0x26, 0x26, 0x26, 0x00, 0x1c, 0x96, 0x96, 0x96,
    0x96, 0x00, 0x88, 0x88, 0x88, 0x88, 0x88, 0x00, 0x7a, 0xd7, 0xd7, 0xd7,
    0x00, 0xd4, 0xd4, 0xd4, 0xd4, 0xd4, 0xd1, 0xd1, 0xd1, 0x1c, 0x1c, 0x1c,
    0x00, 0x11, 0x11, 0x11, 0x11, 0x11, 0x06, 0x06, 0x06, 0x7a, 0x7a, 0x7a,
    0x00, 0x6c, 0x6c, 0x6c, 0x6c, 0x6c, 0x5e, 0x5e, 0x5e, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x24, 0xcf,
];

#[rustfmt::skip]
static REPORT_13: [u8; 8] = [
    0x13, 0x08, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
];

#[cfg(test)]
mod tests {
    use super::*;

    const SET_REPORTS: [ReportId; 9] = [
        ReportId::Begin,
        ReportId::Profile,
        ReportId::FunctionKeys,
        ReportId::KeyConfig,
        ReportId::MacroKeys,
        ReportId::Keymap,
        ReportId::NavigationKeys,
        ReportId::Lighting,
        ReportId::LightingMode,
    ];

    #[test]
    fn templates_start_with_report_id() {
        for id in SET_REPORTS {
            for mode in [Mode::Host, Mode::wave(6)] {
                let payload = set_payload(id, mode).unwrap();
                assert_eq!(payload[0], id as u8);
            }
        }
    }

    #[test]
    fn templates_carry_their_length() {
        for id in SET_REPORTS {
            let payload = set_payload(id, Mode::Host).unwrap();
            match id {
                ReportId::Begin => assert_eq!(payload.len(), 3),
                ReportId::Lighting => {
                    assert_eq!(u16::from_le_bytes([payload[1], payload[2]]) as usize, 443);
                    assert_eq!(payload.len(), 443);
                },
                _ => assert_eq!(payload[1] as usize, payload.len(), "report {id:?}"),
            }
        }
    }

    #[test]
    fn wave_speed_patch() {
        let payload = set_payload(ReportId::Lighting, Mode::wave(11)).unwrap();
        assert_eq!(payload[4], 0x0a);
        assert_eq!(payload[5], 11);
        assert_eq!(payload[441], 40);
        assert_eq!(payload[442], 0xcf);

        let payload = set_payload(ReportId::Lighting, Mode::wave(1)).unwrap();
        assert_eq!((payload[5], payload[441]), (0x01, 0x1e));
        let payload = set_payload(ReportId::Lighting, Mode::wave(6)).unwrap();
        assert_eq!((payload[5], payload[441]), (0x06, 0x23));
    }

    #[test]
    fn wave_speed_is_clamped() {
        let low = set_payload(ReportId::Lighting, Mode::Wave { speed: 0 }).unwrap();
        assert_eq!((low[5], low[441]), (1, 30));
        let high = set_payload(ReportId::Lighting, Mode::Wave { speed: 200 }).unwrap();
        assert_eq!((high[5], high[441]), (11, 40));
        assert_eq!(Mode::wave(0), Mode::Wave { speed: 1 });
        assert_eq!(Mode::wave(12), Mode::Wave { speed: 11 });
    }

    #[test]
    fn host_lighting_uses_template() {
        let payload = set_payload(ReportId::Lighting, Mode::Host).unwrap();
        assert!(matches!(payload, Cow::Borrowed(_)));
        assert_eq!((payload[4], payload[5], payload[441]), (0x06, 0x0b, 0x24));

        let wave = set_payload(ReportId::Lighting, Mode::wave(6)).unwrap();
        let differing: Vec<usize> = (0..443).filter(|&i| payload[i] != wave[i]).collect();
        assert_eq!(differing, vec![4, 5, 441]);
    }

    #[test]
    fn lighting_mode_variants() {
        assert_eq!(set_payload(ReportId::LightingMode, Mode::Host).unwrap()[2], 0x01);
        assert_eq!(set_payload(ReportId::LightingMode, Mode::wave(3)).unwrap()[2], 0x00);
    }

    #[test]
    fn unknown_reports() {
        assert!(matches!(ReportId::try_from(0x42), Err(BoardError::UnknownReport(0x42))));
        assert_eq!(ReportId::try_from(0x0d).unwrap(), ReportId::Lighting);
        assert!(matches!(
            set_payload(ReportId::Status, Mode::Host),
            Err(BoardError::UnknownReport(0x04))
        ));
        assert!(matches!(get_buffer(ReportId::Lighting), Err(BoardError::UnknownReport(0x0d))));
        assert_eq!(get_buffer(ReportId::Info).unwrap(), vec![0x0f, 0, 0, 0, 0, 0, 0, 0]);
    }
}
