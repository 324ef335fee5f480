//! Installed map library: descriptor normalization, caching and indexing

pub mod cache;
pub mod descriptor;
pub mod index;

pub use cache::MetadataCache;
pub use index::{delete_entry, list_library, load_cover_image, LibrarySnapshot, SortKey};
