//! AR spatial anchors and their tracking state

mod registry;

pub use registry::{AnchorRegistry, AnchorSettings};
