//! Reactive lighting: idle keys show the base color, held keys the active color.

use roccat_vulcan::input::KeyEventTranslator;
use vulcan_rgb_core::{KeyColor, KeyColorMap, LogicalKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub base: KeyColor,
    pub active: KeyColor,
}

/// Paint the frame for the current held key state
pub fn render(palette: &Palette, input: &KeyEventTranslator, map: &mut KeyColorMap) {
    for key in LogicalKey::all() {
        map[key] = if input.is_active(key) {
            palette.active
        } else {
            palette.base
        };
    }
}
