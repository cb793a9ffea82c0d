//! Core traits and types for vulcan-rgb board abstraction.
//!
//! This crate provides:
//! - Feature traits (`HasHardwareEffect`, `HasPerKeyLighting`) that boards can implement
//! - The `Board` trait with `as_*()` methods for feature discovery
//! - Report channel traits (`ControlChannel`, `LedChannel`) and their hidapi implementations
//! - Common types like `BoardInfo`, `KeyColor`, `KeyColorMap`, `PinTable`

mod board;
mod channel;
mod color;
mod features;

pub use board::{Board, BoardInfo};
pub use channel::{ControlChannel, LedChannel};
pub use color::{KeyColor, KeyColorMap, LogicalKey, PinTable, NUM_KEYS};
pub use features::{BoardError, HasHardwareEffect, HasPerKeyLighting, Result};
