//! Board detection and selection logic.

use std::str::FromStr;

use bpaf::Bpaf;
use roccat_vulcan::handshake::ReadyWait;
use roccat_vulcan::locate::Strategy;
use roccat_vulcan::{RoccatVulcan, INFO as ROCCAT_VULCAN_INFO};
use tracing::debug;
use vulcan_rgb_core::{Board, BoardError};

/// Supported board types
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Bpaf)]
#[bpaf(fallback(BoardKind::Auto), group_help("Board selection:"))]
pub enum BoardKind {
    /// Auto-detect connected board (default)
    #[default]
    Auto,
    /// ROCCAT Vulcan 100/120 AIMO
    RoccatVulcan,
}

impl FromStr for BoardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "roccat-vulcan" => Ok(Self::RoccatVulcan),
            _ => Err(format!("unknown board: {s}. Available: auto, roccat-vulcan")),
        }
    }
}

impl std::fmt::Display for BoardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::RoccatVulcan => write!(f, "{}", ROCCAT_VULCAN_INFO.cli_name),
        }
    }
}

impl BoardKind {
    /// Open the specified board, or auto-detect if Auto
    pub fn as_board(
        &self,
        strategy: Strategy,
        ready: ReadyWait,
    ) -> Result<Box<dyn Board>, BoardError> {
        match self {
            BoardKind::Auto => {
                // Try every known board in turn
                match RoccatVulcan::open(strategy) {
                    Ok(board) => return Ok(Box::new(board.with_ready_wait(ready))),
                    Err(BoardError::DeviceNotFound) => {
                        debug!("{} not found", ROCCAT_VULCAN_INFO.name)
                    },
                    Err(e) => return Err(e),
                }
                // Add more boards here as they're implemented
                Err(BoardError::DeviceNotFound)
            },
            BoardKind::RoccatVulcan => {
                Ok(Box::new(RoccatVulcan::open(strategy)?.with_ready_wait(ready)))
            },
        }
    }
}
