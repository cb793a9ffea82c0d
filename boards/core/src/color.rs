//! Logical key space and per-key color types.

use std::fmt::Display;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// Number of logical keys addressable on a board
pub const NUM_KEYS: usize = 144;

/// Position of a physical key in the board's fixed layout, always below [`NUM_KEYS`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalKey(u8);

impl LogicalKey {
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < NUM_KEYS {
            Some(Self(index))
        } else {
            None
        }
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterate over every key in layout order
    pub fn all() -> impl Iterator<Item = Self> {
        (0..NUM_KEYS as u8).map(Self)
    }
}

/// Signed color triple. Only 0..=255 per channel is visible, the rest is clamped on encode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct KeyColor {
    pub r: i16,
    pub g: i16,
    pub b: i16,
}

impl KeyColor {
    pub const OFF: Self = Self::new(0, 0, 0);

    pub const fn new(r: i16, g: i16, b: i16) -> Self {
        Self { r, g, b }
    }

    /// Clamp each channel into the device range
    pub fn clamped(self) -> [u8; 3] {
        [self.r, self.g, self.b].map(|c| c.clamp(0, 255) as u8)
    }
}

impl From<[i16; 3]> for KeyColor {
    fn from([r, g, b]: [i16; 3]) -> Self {
        Self { r, g, b }
    }
}

impl Display for KeyColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

impl FromStr for KeyColor {
    type Err = String;

    /// Parse `r,g,b` with signed 16 bit components
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [r, g, b] = parts[..] else {
            return Err(format!("expected r,g,b but got '{s}'"));
        };
        let parse = |c: &str| {
            c.parse::<i16>()
                .map_err(|e| format!("invalid color component '{c}': {e}"))
        };
        Ok(Self::new(parse(r)?, parse(g)?, parse(b)?))
    }
}

/// One color per logical key, rendered by the effect layer each frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyColorMap([KeyColor; NUM_KEYS]);

impl Default for KeyColorMap {
    fn default() -> Self {
        Self::filled(KeyColor::OFF)
    }
}

impl KeyColorMap {
    pub fn filled(color: KeyColor) -> Self {
        Self([color; NUM_KEYS])
    }

    pub fn fill(&mut self, color: KeyColor) {
        self.0 = [color; NUM_KEYS];
    }

    pub fn iter(&self) -> impl Iterator<Item = (LogicalKey, KeyColor)> + '_ {
        LogicalKey::all().zip(self.0.iter().copied())
    }
}

impl Index<LogicalKey> for KeyColorMap {
    type Output = KeyColor;

    fn index(&self, key: LogicalKey) -> &KeyColor {
        &self.0[key.index()]
    }
}

impl IndexMut<LogicalKey> for KeyColorMap {
    fn index_mut(&mut self, key: LogicalKey) -> &mut KeyColor {
        &mut self.0[key.index()]
    }
}

/// Fixed per-key colors that override whatever the effect layer renders
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinTable([Option<KeyColor>; NUM_KEYS]);

impl Default for PinTable {
    fn default() -> Self {
        Self([None; NUM_KEYS])
    }
}

impl PinTable {
    pub fn pin(&mut self, key: LogicalKey, color: KeyColor) {
        self.0[key.index()] = Some(color);
    }

    pub fn get(&self, key: LogicalKey) -> Option<KeyColor> {
        self.0[key.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    /// Color a key ends up with: pin, else the map entry, else off
    pub fn resolve(&self, key: LogicalKey, map: Option<&KeyColorMap>) -> KeyColor {
        self.get(key)
            .or_else(|| map.map(|m| m[key]))
            .unwrap_or(KeyColor::OFF)
    }
}
