//! Keyboard event translation into the logical key space.

use std::fs;
use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use evdev::{Device, EventType};
use tracing::{debug, trace};
use vulcan_rgb_core::{BoardError, LogicalKey, Result, NUM_KEYS};

use crate::keymap;

/// Slots per bucket in one poll cycle. Anything beyond is dropped.
pub const BUCKET_CAPACITY: usize = 10;
const EMPTY: u8 = 0xff;

/// Expected `capabilities/led` bitmask of the keyboard event node
const LED_CAPABILITIES: &str = "1f";

const RELEASED: i32 = 0;
const PRESSED: i32 = 1;
const REPEATED: i32 = 2;

/// One (type, code, value) triple from the kernel input subsystem
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub const fn key(code: u16, value: i32) -> Self {
        Self {
            kind: EventType::KEY.0,
            code,
            value,
        }
    }
}

/// Non-blocking source of pending input events
pub trait EventSource {
    /// Append every pending event to `out` and return without waiting
    fn drain(&mut self, out: &mut Vec<RawEvent>) -> std::io::Result<()>;
}

/// Fixed capacity list of logical keys, padded with `0xff`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bucket {
    slots: [u8; BUCKET_CAPACITY],
    len: usize,
}

impl Default for Bucket {
    fn default() -> Self {
        Self {
            slots: [EMPTY; BUCKET_CAPACITY],
            len: 0,
        }
    }
}

impl Bucket {
    fn clear(&mut self) {
        *self = Self::default();
    }

    /// Returns false once full
    fn push(&mut self, key: LogicalKey) -> bool {
        if self.len == BUCKET_CAPACITY {
            return false;
        }
        self.slots[self.len] = key.index() as u8;
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw slots, unused entries hold `0xff`
    pub fn slots(&self) -> &[u8; BUCKET_CAPACITY] {
        &self.slots
    }

    pub fn keys(&self) -> impl Iterator<Item = LogicalKey> + '_ {
        self.slots[..self.len].iter().filter_map(|k| LogicalKey::new(*k))
    }
}

/// Events accepted in the current poll cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyBuckets {
    pub released: Bucket,
    pub pressed: Bucket,
    pub repeated: Bucket,
}

/// Tracks held keys across polls and buckets each cycle's changes
pub struct KeyEventTranslator {
    active: [bool; NUM_KEYS],
    buckets: KeyBuckets,
    pending: Vec<RawEvent>,
}

impl Default for KeyEventTranslator {
    fn default() -> Self {
        Self {
            active: [false; NUM_KEYS],
            buckets: KeyBuckets::default(),
            pending: Vec::new(),
        }
    }
}

impl KeyEventTranslator {
    /// Drain the source and return the number of accepted changes.
    ///
    /// Buckets are reset on every call, held keys persist.
    pub fn poll(&mut self, source: &mut dyn EventSource) -> Result<usize> {
        self.buckets = KeyBuckets::default();
        self.pending.clear();
        source
            .drain(&mut self.pending)
            .map_err(BoardError::InputLost)?;

        let mut changes = 0;
        for i in 0..self.pending.len() {
            let event = self.pending[i];
            if self.apply(event) {
                changes += 1;
            }
        }
        if changes > 0 {
            trace!("{changes} key changes");
        }
        Ok(changes)
    }

    fn apply(&mut self, event: RawEvent) -> bool {
        if event.kind != EventType::KEY.0 {
            return false;
        }
        let Some(key) = keymap::lookup(event.code) else {
            return false;
        };
        debug!(
            "key {}({:#04x}) value {} -> logical {}",
            keymap::name(event.code),
            event.code,
            event.value,
            key.index()
        );
        match event.value {
            RELEASED => {
                self.active[key.index()] = false;
                self.buckets.released.push(key)
            }
            PRESSED => {
                self.active[key.index()] = true;
                self.buckets.pressed.push(key)
            }
            REPEATED => self.buckets.repeated.push(key),
            _ => false,
        }
    }

    pub fn is_active(&self, key: LogicalKey) -> bool {
        self.active[key.index()]
    }

    pub fn active(&self) -> &[bool; NUM_KEYS] {
        &self.active
    }

    pub fn buckets(&self) -> &KeyBuckets {
        &self.buckets
    }

    /// Forget held keys, used after the input device is reopened
    pub fn reset(&mut self) {
        self.active = [false; NUM_KEYS];
        self.buckets.released.clear();
        self.buckets.pressed.clear();
        self.buckets.repeated.clear();
    }
}

/// Kernel event device opened non-blocking
pub struct EvdevSource {
    device: Device,
    path: PathBuf,
}

impl EvdevSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let device = Device::open(&path)?;
        set_nonblocking(&device)?;
        debug!("reading key events from {}", path.display());
        Ok(Self { device, path })
    }

    /// Locate and open the keyboard event node for a vendor and candidate products
    pub fn find(vendor_id: u16, product_ids: &[u16]) -> Result<Self> {
        let path = find_event_device(Path::new("/sys/class/input"), vendor_id, product_ids)?;
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSource for EvdevSource {
    fn drain(&mut self, out: &mut Vec<RawEvent>) -> std::io::Result<()> {
        loop {
            match self.device.fetch_events() {
                Ok(events) => {
                    let before = out.len();
                    out.extend(events.map(|ev| RawEvent {
                        kind: ev.event_type().0,
                        code: ev.code(),
                        value: ev.value(),
                    }));
                    if out.len() == before {
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

fn set_nonblocking(device: &Device) -> std::io::Result<()> {
    let fd = device.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Scan `<root>/event*` for the keyboard node of the given device.
///
/// A node matches when its id attributes name the vendor and one of the products
/// and its led capabilities equal the keyboard's bitmask. Products are tried in order.
pub fn find_event_device(root: &Path, vendor_id: u16, product_ids: &[u16]) -> Result<PathBuf> {
    let mut nodes: Vec<_> = fs::read_dir(root)
        .map_err(|_| BoardError::InputNotFound)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("event"))
        .collect();
    nodes.sort();

    let read = |node: &str, attr: &str| -> Option<String> {
        fs::read_to_string(root.join(node).join("device").join(attr))
            .ok()
            .map(|s| s.trim().to_string())
    };
    let vendor = format!("{vendor_id:04x}");

    for product_id in product_ids {
        let product = format!("{product_id:04x}");
        for node in &nodes {
            if read(node, "id/vendor").as_deref() != Some(vendor.as_str())
                || read(node, "id/product").as_deref() != Some(product.as_str())
                || read(node, "capabilities/led").as_deref() != Some(LED_CAPABILITIES)
            {
                continue;
            }
            let path = Path::new("/dev/input").join(node);
            debug!("matched input node {}", path.display());
            return Ok(path);
        }
    }
    Err(BoardError::InputNotFound)
}
