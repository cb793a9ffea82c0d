//! Colors relayed from another program through a named pipe.
//!
//! Every line sets one key, `KEY_A:255,0,0`, or every key, `all:0,0,64`. A
//! leading `rgb:` is accepted and ignored. Keys start off and keep their last
//! color until told otherwise. Pins do not apply here.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::str::FromStr;

use roccat_vulcan::keymap;
use tracing::{debug, info, warn};
use vulcan_rgb_core::{
    BoardError, BoardInfo, HasPerKeyLighting, KeyColor, KeyColorMap, LogicalKey, PinTable,
};

use crate::daemon::Driver;

/// One parsed pipe line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeCommand {
    Key(LogicalKey, KeyColor),
    All(KeyColor),
}

impl FromStr for PipeCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("rgb:").unwrap_or(s);
        let (target, color) = s
            .split_once(':')
            .ok_or_else(|| format!("expected KEY:r,g,b but got '{s}'"))?;
        let color = color.parse()?;
        if target.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All(color));
        }
        let code = keymap::parse_code(target).ok_or_else(|| format!("unknown key '{target}'"))?;
        let key = keymap::lookup(code)
            .ok_or_else(|| format!("no key for '{target}' on this board"))?;
        Ok(Self::Key(key, color))
    }
}

impl PipeCommand {
    /// Apply to the map, returns whether anything changed
    pub fn apply(self, map: &mut KeyColorMap) -> bool {
        match self {
            PipeCommand::Key(key, color) => {
                let changed = map[key] != color;
                map[key] = color;
                changed
            },
            PipeCommand::All(color) => {
                let changed = map.iter().any(|(_, c)| c != color);
                map.fill(color);
                changed
            },
        }
    }
}

/// Splits whatever a non-blocking reader has available into complete lines
pub struct LineReader<R> {
    inner: R,
    partial: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            partial: Vec::new(),
        }
    }

    /// Read until the reader would block or has no writer, and return every
    /// complete line. A trailing partial line waits for the next call.
    pub fn read_lines(&mut self) -> io::Result<Vec<String>> {
        let mut buf = [0u8; 512];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.partial.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let mut lines = Vec::new();
        while let Some(end) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }
}

/// Open a named pipe for non-blocking reads, creating it when missing
pub fn open_fifo(path: &Path) -> io::Result<File> {
    if !path.exists() {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
        if unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) } < 0 {
            return Err(io::Error::last_os_error());
        }
        info!("created pipe {}", path.display());
    }
    // Without O_NONBLOCK the open would wait for a writer
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

/// Drives the keyboard from pipe commands
pub struct Piped<R> {
    lines: LineReader<R>,
    map: KeyColorMap,
    pins: PinTable,
    dirty: bool,
}

impl Piped<File> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = open_fifo(path)?;
        info!("reading commands from {}", path.display());
        Ok(Self::new(file))
    }
}

impl<R: Read> Piped<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: LineReader::new(reader),
            map: KeyColorMap::default(),
            pins: PinTable::default(),
            dirty: true,
        }
    }
}

impl<R: Read> Driver for Piped<R> {
    fn connected(
        &mut self,
        info: &'static BoardInfo,
        _product_id: Option<u16>,
    ) -> Result<(), BoardError> {
        info!("connected to {}", info.name);
        self.dirty = true;
        Ok(())
    }

    fn tick(&mut self, lighting: &mut dyn HasPerKeyLighting) -> Result<bool, BoardError> {
        for line in self.lines.read_lines().map_err(BoardError::InputLost)? {
            match line.parse::<PipeCommand>() {
                Ok(cmd) => {
                    debug!("pipe: {line}");
                    self.dirty |= cmd.apply(&mut self.map);
                },
                Err(e) => warn!("ignoring pipe command: {e}"),
            }
        }
        if !self.dirty {
            return Ok(false);
        }
        lighting.send_frame(Some(&self.map), &self.pins)?;
        self.dirty = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::daemon::tests::Frames;

    /// Hands out one scripted chunk per read, then reports it would block
    struct Chunks(VecDeque<&'static [u8]>);

    impl Read for Chunks {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                },
                None => Err(ErrorKind::WouldBlock.into()),
            }
        }
    }

    fn key(code: u16) -> LogicalKey {
        keymap::lookup(code).unwrap()
    }

    #[test]
    fn parse_commands() {
        assert_eq!(
            "KEY_ESC:255,0,0".parse::<PipeCommand>(),
            Ok(PipeCommand::Key(key(1), KeyColor::new(255, 0, 0)))
        );
        assert_eq!(
            "rgb:key_a:1,2,3".parse::<PipeCommand>(),
            Ok(PipeCommand::Key(key(30), KeyColor::new(1, 2, 3)))
        );
        assert_eq!(
            "ALL:0,0,64".parse::<PipeCommand>(),
            Ok(PipeCommand::All(KeyColor::new(0, 0, 64)))
        );
        assert!("KEY_ESC".parse::<PipeCommand>().is_err());
        assert!("KEY_NOPE:1,2,3".parse::<PipeCommand>().is_err());
        assert!("all:1,2".parse::<PipeCommand>().is_err());
        // KEY_RESERVED has no led
        assert!("KEY_RESERVED:1,2,3".parse::<PipeCommand>().is_err());
    }

    #[test]
    fn lines_split_across_reads() {
        let mut reader = LineReader::new(Chunks(VecDeque::from([
            &b"KEY_A:1,2,3\nall:"[..],
            &b"4,5,6\n\nKEY_B"[..],
        ])));
        assert_eq!(reader.read_lines().unwrap(), ["KEY_A:1,2,3", "all:4,5,6"]);
        assert!(reader.read_lines().unwrap().is_empty());
    }

    #[test]
    fn repaints_on_change_only() {
        let mut piped = Piped::new(Chunks(VecDeque::from([
            &b"all:0,0,64\n"[..],
            &b"KEY_ESC:255,0,0\nbogus\n"[..],
            &b"KEY_ESC:255,0,0\n"[..],
        ])));
        let mut frames = Frames::default();

        // first tick paints the initial map plus the first line
        assert!(piped.tick(&mut frames).unwrap());
        assert!(frames.sent[0].0.iter().all(|(_, c)| c == KeyColor::new(0, 0, 64)));

        assert!(piped.tick(&mut frames).unwrap());
        assert_eq!(frames.sent[1].0[key(1)], KeyColor::new(255, 0, 0));
        assert_eq!(frames.sent[1].0[key(30)], KeyColor::new(0, 0, 64));

        // same color again, nothing to send
        assert!(!piped.tick(&mut frames).unwrap());
        assert_eq!(frames.sent.len(), 2);
        assert!(frames.sent.iter().all(|(_, pins)| pins.is_empty()));

        // a reconnect repaints the last state
        piped.connected(&roccat_vulcan::INFO, Some(0x307a)).unwrap();
        assert!(piped.tick(&mut frames).unwrap());
        assert_eq!(frames.sent[2].0, piped.map);
    }

    #[test]
    fn read_error_is_input_lost() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("gone"))
            }
        }
        let err = Piped::new(Broken).tick(&mut Frames::default()).unwrap_err();
        assert!(matches!(err, BoardError::InputLost(_)));
    }

    #[test]
    fn fifo_is_created() {
        let dir = std::env::temp_dir().join(format!("vulcan-rgb-pipe-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("commands");

        let mut piped = Piped::open(&path).unwrap();
        assert!(std::os::unix::fs::FileTypeExt::is_fifo(
            &std::fs::metadata(&path).unwrap().file_type()
        ));
        // no writer yet, nothing to read but the initial frame
        assert!(piped.tick(&mut Frames::default()).unwrap());

        std::fs::remove_file(&path).unwrap();
        let _ = std::fs::remove_dir(&dir);
    }
}
