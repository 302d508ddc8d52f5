//! Composition: the wiring table and the composition root.

pub mod root;
pub mod wiring;

pub use root::{App, CompositionRoot, Dependencies, REQUIRED_EDGES};
pub use wiring::{Edge, WiringTable};
