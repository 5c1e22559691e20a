// lmbridge Configuration System
// Layered configuration management

pub mod layered;
pub mod loader;
pub mod types;

pub use layered::{ConfigLayer, ConfigLayerSource, LayeredConfig};
pub use loader::{ConfigLoader, parse_overrides};
pub use types::*;
