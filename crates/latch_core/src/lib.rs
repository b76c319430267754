//! Latch Engine Core
//!
//! Contains the native side of the scripting bridge:
//! - Entity store with generation-checked handles
//! - Scene with its derived set of script types
//! - Component blocks exposed to scripts

pub mod ecs;

pub use glam;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
