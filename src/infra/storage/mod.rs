//! File storage adapters and upload inspection.

pub mod local;
pub mod sniff;

pub use local::LocalFileStorage;
pub use sniff::{ImageKind, sniff_image};
