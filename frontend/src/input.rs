use std::collections::HashMap;

use sdl2::keyboard::Scancode;

/// Maps SDL scancodes to input-state bit indices.
pub struct KeyMap {
    map: HashMap<Scancode, u8>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    /// Bind a scancode to an input-state bit index.
    pub fn bind(&mut self, scancode: Scancode, bit: u8) {
        self.map.insert(scancode, bit);
    }

    /// Look up the input-state bit index for a scancode.
    pub fn get(&self, scancode: Scancode) -> Option<u8> {
        self.map.get(&scancode).copied()
    }
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::new()
    }
}

/// The fixed set of input-state bits the frontend exposes to the guest at
/// `emulator::INPUT_STATE_ADDR`, with their default scancode.
const DEFAULT_BINDINGS: &[(&str, u8, Scancode)] = &[
    ("up", 0, Scancode::Up),
    ("down", 1, Scancode::Down),
    ("left", 2, Scancode::Left),
    ("right", 3, Scancode::Right),
    ("a", 4, Scancode::Z),
    ("b", 5, Scancode::X),
    ("start", 6, Scancode::Return),
    ("select", 7, Scancode::RShift),
];

/// Builds a key map from the fixed default bindings, overridden per-name by
/// any matching entry in `overrides` (parsed with `Scancode::from_name`).
pub fn default_key_map(overrides: &HashMap<String, String>) -> KeyMap {
    let mut km = KeyMap::new();
    for &(name, bit, default_sc) in DEFAULT_BINDINGS {
        let scancode = overrides
            .get(name)
            .and_then(|s| Scancode::from_name(s))
            .unwrap_or(default_sc);
        km.bind(scancode, bit);
    }
    km
}
