//! Input abstraction polled by scripts

use std::cell::RefCell;
use std::collections::BTreeSet;

/// Anything that can answer "is this key held down right now?".
pub trait InputSource {
    fn is_key_pressed(&self, key: &str) -> bool;
}

/// Keyboard state keyed by key name ("Esc", "Space", "W", ...).
///
/// Interior mutability lets the native frame code update the state while the
/// script bridge holds a shared reference to it.
#[derive(Debug, Default)]
pub struct Keyboard {
    pressed: RefCell<BTreeSet<String>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, key: impl Into<String>) {
        self.pressed.borrow_mut().insert(key.into());
    }

    pub fn release(&self, key: &str) {
        self.pressed.borrow_mut().remove(key);
    }

    pub fn release_all(&self) {
        self.pressed.borrow_mut().clear();
    }
}

impl InputSource for Keyboard {
    fn is_key_pressed(&self, key: &str) -> bool {
        self.pressed.borrow().contains(key)
    }
}
