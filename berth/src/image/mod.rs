//! Image references and the process-wide existence cache.

mod cache;
mod name;

pub use cache::ImageExistsCache;
pub use name::{ImageName, ImageTag};
