//! Control interface initialization sequence.
//!
//! The device expects a fixed, serial exchange: one info read, then nine
//! feature reports, each acknowledged by polling the status report until the
//! device signals ready. The sequence stops at the first failure.

use std::thread;
use std::time::Duration;

use tracing::debug;
use vulcan_rgb_core::{BoardError, ControlChannel, Result};

use crate::abi::{self, Mode, ReportId};

/// SET reports in the order the device expects them
pub const SEQUENCE: [ReportId; 9] = [
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

/// Status byte value meaning the device accepted the last report
const READY: u8 = 0x01;

/// Ready-wait polling policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadyWait {
    /// Sleep before each status poll
    pub interval: Duration,
    /// Give up after this many polls. `None` waits forever.
    pub max_polls: Option<u32>,
}

impl Default for ReadyWait {
    fn default() -> Self {
        Self {
            // 150ms should suffice on the first poll
            interval: Duration::from_millis(150),
            max_polls: None,
        }
    }
}

impl ReadyWait {
    /// Bound the wait by a total timeout, rounded up to whole polls
    pub fn with_timeout(interval: Duration, timeout: Duration) -> Self {
        let per_poll = interval.as_millis().max(1);
        let polls = timeout.as_millis().div_ceil(per_poll).max(1);
        Self {
            interval,
            max_polls: Some(polls.min(u32::MAX as u128) as u32),
        }
    }
}

/// Run the full initialization sequence for the given mode
pub fn run(ctrl: &mut dyn ControlChannel, mode: Mode, wait: &ReadyWait) -> Result<()> {
    debug!("starting handshake in {mode:?}");
    read_report(ctrl, ReportId::Info)?;
    for id in SEQUENCE {
        write_report(ctrl, id, mode)?;
        wait_ready(ctrl, wait).map_err(|e| at_report(id, e))?;
    }
    debug!("handshake complete");
    Ok(())
}

/// Read a report, returning the bytes the device filled in
pub fn read_report(ctrl: &mut dyn ControlChannel, id: ReportId) -> Result<Vec<u8>> {
    let mut buf = abi::get_buffer(id)?;
    let len = ctrl
        .get_feature_report(&mut buf)
        .map_err(|e| at_report(id, e))?;
    if len == 0 {
        return Err(at_report(id, empty_read()));
    }
    buf.truncate(len);
    debug!("get {:#04x}: {}", id as u8, hex(&buf));
    Ok(buf)
}

/// Send one SET report. Anything short of the full payload fails the exchange.
pub fn write_report(ctrl: &mut dyn ControlChannel, id: ReportId, mode: Mode) -> Result<()> {
    let payload = abi::set_payload(id, mode)?;
    debug!("set {:#04x}: {}", id as u8, hex(&payload));
    let sent = ctrl
        .send_feature_report(&payload)
        .map_err(|e| at_report(id, e))?;
    if sent != payload.len() {
        return Err(at_report(
            id,
            std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("sent {sent} of {} bytes", payload.len()),
            )
            .into(),
        ));
    }
    Ok(())
}

/// Block until the status report signals ready.
///
/// A failed status read ends the wait immediately; a not-ready status keeps polling.
pub fn wait_ready(ctrl: &mut dyn ControlChannel, wait: &ReadyWait) -> Result<()> {
    let mut polls = 0;
    loop {
        if wait.max_polls.is_some_and(|max| polls >= max) {
            return Err(BoardError::ReadyTimeout { polls });
        }
        thread::sleep(wait.interval);
        polls += 1;

        let mut buf = abi::get_buffer(ReportId::Status)?;
        let len = ctrl.get_feature_report(&mut buf)?;
        if len == 0 {
            return Err(empty_read());
        }
        debug!("status: {}", hex(&buf[..len]));
        if len > 1 && buf[1] == READY {
            return Ok(());
        }
    }
}

/// Attribute channel failures to the report being exchanged
fn at_report(id: ReportId, e: BoardError) -> BoardError {
    match e {
        BoardError::Hid(_) | BoardError::Io(_) => BoardError::Handshake {
            report: id as u8,
            source: Box::new(e),
        },
        other => other,
    }
}

fn empty_read() -> BoardError {
    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "empty feature report").into()
}

pub(crate) fn hex(buf: &[u8]) -> String {
    buf.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Op {
        Get(u8),
        Set(Vec<u8>),
    }

    /// Scripted control channel. Status polls pop from `status`, ready when empty.
    #[derive(Default)]
    pub struct MockControl {
        pub ops: Vec<Op>,
        pub status: VecDeque<u8>,
        pub fail_get: Option<u8>,
        pub fail_set: Option<u8>,
        pub short_set: Option<u8>,
    }

    impl MockControl {
        pub fn sets(&self) -> Vec<u8> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Set(buf) => Some(buf[0]),
                    Op::Get(_) => None,
                })
                .collect()
        }

        pub fn payload(&self, id: ReportId) -> Option<&[u8]> {
            self.ops.iter().find_map(|op| match op {
                Op::Set(buf) if buf[0] == id as u8 => Some(buf.as_slice()),
                _ => None,
            })
        }
    }

    impl ControlChannel for MockControl {
        fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.ops.push(Op::Get(buf[0]));
            if self.fail_get == Some(buf[0]) {
                return Err(std::io::Error::other("gone").into());
            }
            if buf[0] == ReportId::Status as u8 {
                buf[1] = self.status.pop_front().unwrap_or(READY);
            }
            Ok(buf.len())
        }

        fn send_feature_report(&mut self, buf: &[u8]) -> Result<usize> {
            self.ops.push(Op::Set(buf.to_vec()));
            if self.fail_set == Some(buf[0]) {
                return Err(std::io::Error::other("gone").into());
            }
            if self.short_set == Some(buf[0]) {
                return Ok(buf.len() - 1);
            }
            Ok(buf.len())
        }
    }

    fn fast() -> ReadyWait {
        ReadyWait {
            interval: Duration::ZERO,
            max_polls: None,
        }
    }

    #[test]
    fn full_sequence_order() {
        let mut ctrl = MockControl::default();
        run(&mut ctrl, Mode::Host, &fast()).unwrap();

        let status = ReportId::Status as u8;
        let mut expected = vec![Op::Get(ReportId::Info as u8)];
        for id in SEQUENCE {
            expected.push(Op::Set(abi::set_payload(id, Mode::Host).unwrap().to_vec()));
            expected.push(Op::Get(status));
        }
        assert_eq!(ctrl.ops, expected);
        assert_eq!(
            ctrl.sets(),
            vec![0x15, 0x05, 0x07, 0x0a, 0x0b, 0x06, 0x09, 0x0d, 0x13]
        );
    }

    #[test]
    fn wave_mode_payloads() {
        let mut ctrl = MockControl::default();
        run(&mut ctrl, Mode::wave(11), &fast()).unwrap();
        let lighting = ctrl.payload(ReportId::Lighting).unwrap();
        assert_eq!(lighting.len(), 443);
        assert_eq!(lighting[5], 11);
        assert_eq!(lighting[441], 40);
        assert_eq!(ctrl.payload(ReportId::LightingMode).unwrap()[2], 0x00);
    }

    #[test]
    fn polls_until_ready() {
        let mut ctrl = MockControl {
            status: VecDeque::from([0x00, 0x02, 0x00]),
            ..Default::default()
        };
        wait_ready(&mut ctrl, &fast()).unwrap();
        assert_eq!(ctrl.ops.len(), 4);
        assert!(ctrl.status.is_empty());
    }

    #[test]
    fn ready_timeout_is_distinct() {
        let mut ctrl = MockControl {
            status: VecDeque::from([0x00; 8]),
            ..Default::default()
        };
        let wait = ReadyWait {
            interval: Duration::ZERO,
            max_polls: Some(3),
        };
        let err = run(&mut ctrl, Mode::Host, &wait).unwrap_err();
        assert!(matches!(err, BoardError::ReadyTimeout { polls: 3 }));
        // info, first set, three polls, nothing after
        assert_eq!(ctrl.ops.len(), 5);
    }

    #[test]
    fn failed_status_read_aborts() {
        let mut ctrl = MockControl {
            status: VecDeque::from([0x00, 0x00]),
            fail_get: Some(ReportId::Status as u8),
            ..Default::default()
        };
        let err = run(&mut ctrl, Mode::Host, &fast()).unwrap_err();
        assert!(matches!(err, BoardError::Handshake { report: 0x15, .. }));
        assert_eq!(ctrl.sets(), vec![0x15]);
    }

    #[test]
    fn failed_set_short_circuits() {
        let mut ctrl = MockControl {
            fail_set: Some(ReportId::MacroKeys as u8),
            ..Default::default()
        };
        let err = run(&mut ctrl, Mode::Host, &fast()).unwrap_err();
        assert!(matches!(err, BoardError::Handshake { report: 0x0b, .. }));
        assert_eq!(ctrl.sets(), vec![0x15, 0x05, 0x07, 0x0a, 0x0b]);
        let macro_keys = abi::set_payload(ReportId::MacroKeys, Mode::Host).unwrap();
        assert_eq!(ctrl.ops.last(), Some(&Op::Set(macro_keys.to_vec())));
    }

    #[test]
    fn short_set_fails() {
        let mut ctrl = MockControl {
            short_set: Some(ReportId::Lighting as u8),
            ..Default::default()
        };
        let err = run(&mut ctrl, Mode::Host, &fast()).unwrap_err();
        assert!(matches!(err, BoardError::Handshake { report: 0x0d, .. }));
        assert_eq!(*ctrl.sets().last().unwrap(), 0x0d);
    }

    #[test]
    fn failed_info_read_runs_nothing() {
        let mut ctrl = MockControl {
            fail_get: Some(ReportId::Info as u8),
            ..Default::default()
        };
        let err = run(&mut ctrl, Mode::Host, &fast()).unwrap_err();
        assert!(matches!(err, BoardError::Handshake { report: 0x0f, .. }));
        assert_eq!(ctrl.ops, vec![Op::Get(0x0f)]);
    }

    #[test]
    fn timeout_rounds_up_to_polls() {
        let wait = ReadyWait::with_timeout(Duration::from_millis(150), Duration::from_secs(1));
        assert_eq!(wait.max_polls, Some(7));
        let wait = ReadyWait::with_timeout(Duration::from_millis(150), Duration::ZERO);
        assert_eq!(wait.max_polls, Some(1));
        assert_eq!(ReadyWait::default().max_polls, None);
    }

    #[test]
    fn hex_dump() {
        assert_eq!(hex(&[0x04, 0x01, 0xff]), "04 01 ff");
    }
}
