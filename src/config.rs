//! Configuration file handling

use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use roccat_vulcan::handshake::ReadyWait;
use roccat_vulcan::keymap;
use roccat_vulcan::locate::Strategy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vulcan_rgb_core::{KeyColor, PinTable};

use crate::render::Palette;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub handshake: HandshakeConfig,
    pub refresh: RefreshConfig,
    pub lighting: LightingConfig,
}

impl Config {
    /// Get the config file path for this platform
    pub fn path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "vulcan-rgb").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load config from file, or create default if it doesn't exist
    pub fn load_or_create() -> Result<Self, Box<dyn Error>> {
        let path = Self::path().ok_or("could not determine config directory")?;

        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_with_header()?;
            info!("created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Save config with header comments for new files
    pub fn save_with_header(&self) -> Result<(), Box<dyn Error>> {
        let path = Self::path().ok_or("could not determine config directory")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let header = r#"# vulcan-rgb configuration file
#
# Colors are signed r,g,b triples. Components are clamped to 0..=255 when sent.
# Pin keys are evdev KEY_* names (`key = "KEY_ESC"`) or raw input event codes.

"#;
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, format!("{header}{contents}"))?;
        Ok(())
    }
}

/// Physical key layout, only used to sanity check pins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Iso,
    Ansi,
}

impl Layout {
    /// Whether a key code exists on this layout
    pub fn has_code(self, code: u16) -> bool {
        // KEY_102ND sits between left shift and Z on iso boards only
        !(self == Layout::Ansi && code == 86)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub layout: Layout,
    /// Control interface discovery strategy, `hidapi` or `hidraw`
    pub strategy: Strategy,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            layout: Layout::Iso,
            strategy: Strategy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Delay before each device status poll
    #[serde(with = "humantime_serde")]
    pub ready_interval: Duration,
    /// Give up waiting for the device after this long. Unset waits forever.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub ready_timeout: Option<Duration>,
    /// Give up after this many status polls, takes precedence over the timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_polls: Option<u32>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        let wait = ReadyWait::default();
        Self {
            ready_interval: wait.interval,
            ready_timeout: None,
            max_polls: wait.max_polls,
        }
    }
}

impl HandshakeConfig {
    pub fn ready_wait(&self) -> ReadyWait {
        match (self.max_polls, self.ready_timeout) {
            (Some(max_polls), _) => ReadyWait {
                interval: self.ready_interval,
                // zero would time out before the first poll
                max_polls: Some(max_polls.max(1)),
            },
            (None, Some(timeout)) => ReadyWait::with_timeout(self.ready_interval, timeout),
            (None, None) => ReadyWait {
                interval: self.ready_interval,
                max_polls: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Input poll and frame interval
    #[serde(with = "humantime_serde")]
    pub frame: Duration,
    /// Keyboard reconnection retry interval
    #[serde(with = "humantime_serde")]
    pub retry: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            frame: Duration::from_millis(16),
            retry: Duration::from_secs(5),
        }
    }
}

/// Key named in a pin, either `"KEY_ESC"` or `1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PinKey {
    Code(u16),
    Name(String),
}

impl PinKey {
    fn code(&self) -> Option<u16> {
        match self {
            PinKey::Code(code) => Some(*code),
            PinKey::Name(name) => keymap::parse_code(name),
        }
    }
}

impl Display for PinKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PinKey::Code(code) => write!(f, "{code}"),
            PinKey::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinConfig {
    pub key: PinKey,
    pub color: [i16; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Color of idle keys
    pub base: [i16; 3],
    /// Color of held keys
    pub active: [i16; 3],
    /// Keys with a fixed color
    pub pins: Vec<PinConfig>,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            base: [0x0000, 0x0000, 0x0077],
            active: [0x08ff, 0x0000, -0x00ff],
            pins: Vec::new(),
        }
    }
}

impl LightingConfig {
    pub fn palette(&self) -> Palette {
        Palette {
            base: KeyColor::from(self.base),
            active: KeyColor::from(self.active),
        }
    }

    /// Build the pin table, skipping keys the board does not have
    pub fn pin_table(&self, layout: Layout) -> PinTable {
        let mut pins = PinTable::default();
        for pin in &self.pins {
            let key = pin
                .key
                .code()
                .filter(|&code| layout.has_code(code))
                .and_then(keymap::lookup);
            match key {
                Some(key) => pins.pin(key, KeyColor::from(pin.color)),
                None => warn!("ignoring pin for key {}, no such key", pin.key),
            }
        }
        pins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [handshake]
            ready_timeout = "2s"

            [lighting]
            pins = [
                { key = "KEY_ESC", color = [255, 0, 0] },
                { key = 84, color = [1, 1, 1] },
                { key = "KEY_BOGUS", color = [2, 2, 2] },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(config.general.strategy, Strategy::HidApi);
        assert_eq!(config.refresh.retry, Duration::from_secs(5));
        assert_eq!(config.handshake.ready_interval, Duration::from_millis(150));
        assert_eq!(config.handshake.ready_wait().max_polls, Some(14));
        assert_eq!(config.lighting.base, [0, 0, 0x77]);

        let pins = config.lighting.pin_table(Layout::Iso);
        let esc = keymap::lookup(1).unwrap();
        assert_eq!(pins.get(esc), Some(KeyColor::new(255, 0, 0)));
        // code 84 is unmapped and KEY_BOGUS unknown, so only escape ends up pinned
        let mut expected = PinTable::default();
        expected.pin(esc, KeyColor::new(255, 0, 0));
        assert_eq!(pins, expected);
    }

    #[test]
    fn default_serializes() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(!text.contains("ready_timeout"));
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.handshake.ready_wait(), ReadyWait::default());
        assert_eq!(back.general.layout, Layout::Iso);
    }

    #[test]
    fn ansi_skips_iso_key() {
        let lighting = LightingConfig {
            pins: vec![PinConfig {
                key: PinKey::Name("KEY_102ND".into()),
                color: [9, 9, 9],
            }],
            ..Default::default()
        };
        assert!(lighting.pin_table(Layout::Ansi).is_empty());
        assert!(!lighting.pin_table(Layout::Iso).is_empty());
    }

    #[test]
    fn max_polls_wins() {
        let handshake = HandshakeConfig {
            ready_interval: Duration::from_millis(10),
            ready_timeout: Some(Duration::from_secs(60)),
            max_polls: Some(3),
        };
        assert_eq!(handshake.ready_wait().max_polls, Some(3));
    }

    #[test]
    fn zero_max_polls_still_polls_once() {
        let handshake = HandshakeConfig {
            ready_interval: Duration::from_millis(10),
            ready_timeout: None,
            max_polls: Some(0),
        };
        assert_eq!(handshake.ready_wait().max_polls, Some(1));
    }

    #[test]
    fn strategy_checked_on_load() {
        let config: Config = toml::from_str("[general]\nstrategy = \"hidraw\"").unwrap();
        assert_eq!(config.general.strategy, Strategy::Hidraw);
        assert!(toml::from_str::<Config>("[general]\nstrategy = \"usb\"").is_err());
    }
}
