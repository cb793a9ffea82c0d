//! Device discovery.
//!
//! The keyboard exposes several USB interfaces. One carries feature reports
//! (control), another takes led output reports. Both must be opened for a
//! candidate product to count as found. Candidate products are tried in order
//! and the first complete match wins.

use std::ffi::CString;
use std::fmt::Display;
use std::fs::{self, File};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use hidapi::HidApi;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vulcan_rgb_core::{BoardError, BoardInfo, ControlChannel, LedChannel, Result};

/// Process wide hidapi handle, refreshed on every scan
static API: Mutex<Option<HidApi>> = Mutex::new(None);

/// Opened channel pair for one physical keyboard
pub struct Channels {
    pub control: Box<dyn ControlChannel>,
    pub led: Box<dyn LedChannel>,
    pub product_id: u16,
    pub description: String,
}

/// Discovery capability, one implementation per strategy
pub trait Locator {
    fn locate(&self, info: &BoardInfo) -> Result<Channels>;
}

/// How to reach the control interface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Both interfaces through hidapi enumeration
    #[default]
    HidApi,
    /// Control interface through a raw hidraw node, leds through hidapi
    Hidraw,
}

impl Strategy {
    pub fn locator(self) -> Box<dyn Locator> {
        match self {
            Strategy::HidApi => Box::new(HidApiLocator),
            Strategy::Hidraw => Box::new(HidrawLocator::default()),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hidapi" => Ok(Self::HidApi),
            "hidraw" => Ok(Self::Hidraw),
            _ => Err(format!("unknown strategy '{s}', expected hidapi or hidraw")),
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Strategy::HidApi => "hidapi",
            Strategy::Hidraw => "hidraw",
        })
    }
}

/// One enumerated interface of a vendor device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interface<P> {
    pub product_id: u16,
    pub number: i32,
    pub path: P,
}

/// Walk the candidate products in order and open the first complete pair.
///
/// A product missing either interface, or whose `open` fails, is skipped.
pub fn first_match<C, L, T>(
    info: &BoardInfo,
    controls: &[Interface<C>],
    leds: &[Interface<L>],
    mut open: impl FnMut(&Interface<C>, &Interface<L>) -> Result<T>,
) -> Result<T> {
    for &product_id in info.product_ids {
        let ctrl = controls
            .iter()
            .find(|i| i.product_id == product_id && i.number == info.control_interface);
        let led = leds
            .iter()
            .find(|i| i.product_id == product_id && i.number == info.led_interface);
        let (Some(ctrl), Some(led)) = (ctrl, led) else {
            debug!(
                "{:04x}:{product_id:04x}: no matching interface pair",
                info.vendor_id
            );
            continue;
        };
        match open(ctrl, led) {
            Ok(found) => return Ok(found),
            Err(e) => debug!("{:04x}:{product_id:04x}: {e}", info.vendor_id),
        }
    }
    Err(BoardError::DeviceNotFound)
}

/// Read the product string, failing the candidate when it is unreadable
fn verify(control: &mut dyn ControlChannel) -> Result<String> {
    control.product_string()?.ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "no product string").into()
    })
}

/// Enumerate the vendor's interfaces through hidapi
fn hidapi_interfaces(api: &HidApi, vendor_id: u16) -> Vec<Interface<CString>> {
    api.device_list()
        .filter(|d| d.vendor_id() == vendor_id)
        .map(|d| Interface {
            product_id: d.product_id(),
            number: d.interface_number(),
            path: d.path().to_owned(),
        })
        .collect()
}

fn with_api<T>(f: impl FnOnce(&HidApi) -> Result<T>) -> Result<T> {
    let mut guard = API.lock().unwrap_or_else(PoisonError::into_inner);
    let api = match guard.take() {
        Some(mut api) => {
            api.refresh_devices()?;
            api
        },
        None => HidApi::new()?,
    };
    f(guard.insert(api))
}

/// Opens both interfaces through hidapi
pub struct HidApiLocator;

impl Locator for HidApiLocator {
    fn locate(&self, info: &BoardInfo) -> Result<Channels> {
        with_api(|api| {
            let found = hidapi_interfaces(api, info.vendor_id);
            first_match(info, &found, &found, |ctrl, led| {
                let mut control = api.open_path(&ctrl.path)?;
                let led_device = api.open_path(&led.path)?;
                let description = verify(&mut control)?;
                info!(
                    "found {description} ({:04x}:{:04x}), control {:?}, led {:?}",
                    info.vendor_id, ctrl.product_id, ctrl.path, led.path
                );
                Ok(Channels {
                    control: Box::new(control),
                    led: Box::new(led_device),
                    product_id: ctrl.product_id,
                    description,
                })
            })
        })
    }
}

/// A hidraw node as seen through sysfs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HidrawNode {
    pub dev: PathBuf,
    pub name: Option<String>,
}

/// Resolves the control interface by scanning hidraw attributes in sysfs
pub struct HidrawLocator {
    pub sysfs_root: PathBuf,
}

impl Default for HidrawLocator {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/hidraw"),
        }
    }
}

impl Locator for HidrawLocator {
    fn locate(&self, info: &BoardInfo) -> Result<Channels> {
        let controls = scan_hidraw(&self.sysfs_root, info.vendor_id);
        if controls.is_empty() {
            return Err(BoardError::DeviceNotFound);
        }
        with_api(|api| {
            let leds = hidapi_interfaces(api, info.vendor_id);
            first_match(info, &controls, &leds, |ctrl, led| {
                let mut control = HidrawControl::open(&ctrl.path.dev, ctrl.path.name.clone())?;
                let led_device = api.open_path(&led.path)?;
                let description = verify(&mut control)?;
                info!(
                    "found {description} ({:04x}:{:04x}), control {}, led {:?}",
                    info.vendor_id,
                    ctrl.product_id,
                    ctrl.path.dev.display(),
                    led.path
                );
                Ok(Channels {
                    control: Box::new(control),
                    led: Box::new(led_device),
                    product_id: ctrl.product_id,
                    description,
                })
            })
        })
    }
}

/// List hidraw nodes of a vendor under `root` (normally `/sys/class/hidraw`).
///
/// Vendor and product come from `HID_ID` in the device uevent, the interface
/// number from `bInterfaceNumber` of the parent usb interface.
pub fn scan_hidraw(root: &Path, vendor_id: u16) -> Vec<Interface<HidrawNode>> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut nodes: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let node = entry.file_name().to_string_lossy().into_owned();
            let device = entry.path().join("device");
            let uevent = fs::read_to_string(device.join("uevent")).ok()?;
            let (vendor, product_id) = parse_hid_id(&uevent)?;
            if vendor != vendor_id {
                return None;
            }
            let number = interface_number(&device)?;
            Some(Interface {
                product_id,
                number,
                path: HidrawNode {
                    dev: Path::new("/dev").join(&node),
                    name: uevent_value(&uevent, "HID_NAME").map(str::to_string),
                },
            })
        })
        .collect();
    nodes.sort_by(|a, b| a.path.dev.cmp(&b.path.dev));
    nodes
}

fn uevent_value<'a>(uevent: &'a str, key: &str) -> Option<&'a str> {
    uevent.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        (k == key).then_some(v.trim())
    })
}

/// Parse `HID_ID=bbbb:vvvvvvvv:pppppppp` into vendor and product
fn parse_hid_id(uevent: &str) -> Option<(u16, u16)> {
    let mut parts = uevent_value(uevent, "HID_ID")?.split(':');
    let _bus = parts.next()?;
    let vendor = u32::from_str_radix(parts.next()?, 16).ok()?;
    let product = u32::from_str_radix(parts.next()?, 16).ok()?;
    Some((u16::try_from(vendor).ok()?, u16::try_from(product).ok()?))
}

fn interface_number(hid_device: &Path) -> Option<i32> {
    let usb_interface = fs::canonicalize(hid_device).ok()?.parent()?.to_path_buf();
    let raw = fs::read_to_string(usb_interface.join("bInterfaceNumber")).ok()?;
    i32::from_str_radix(raw.trim(), 16).ok()
}

// linux/hidraw.h:
// HIDIOCSFEATURE(len) _IOC(_IOC_WRITE|_IOC_READ, 'H', 0x06, len)
// HIDIOCGFEATURE(len) _IOC(_IOC_WRITE|_IOC_READ, 'H', 0x07, len)
const HIDRAW_MAGIC: u8 = b'H';

const fn hidraw_ioc(nr: u32, len: usize) -> libc::c_ulong {
    let dir: u32 = 3;
    let size = (len as u32) & 0x3fff;
    ((dir << 30) | (size << 16) | ((HIDRAW_MAGIC as u32) << 8) | nr) as libc::c_ulong
}

pub const fn hidiocsfeature(len: usize) -> libc::c_ulong {
    hidraw_ioc(0x06, len)
}

pub const fn hidiocgfeature(len: usize) -> libc::c_ulong {
    hidraw_ioc(0x07, len)
}

/// Feature report access through hidraw ioctls
pub struct HidrawControl {
    file: File,
    name: Option<String>,
}

impl HidrawControl {
    pub fn open(path: &Path, name: Option<String>) -> Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        Ok(Self { file, name })
    }
}

impl ControlChannel for HidrawControl {
    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize> {
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                hidiocgfeature(buf.len()),
                buf.as_mut_ptr(),
            )
        };
        if rc < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(rc as usize)
    }

    fn send_feature_report(&mut self, buf: &[u8]) -> Result<usize> {
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                hidiocsfeature(buf.len()),
                buf.as_ptr(),
            )
        };
        if rc < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(rc as usize)
    }

    fn product_string(&mut self) -> Result<Option<String>> {
        Ok(self.name.clone())
    }
}
