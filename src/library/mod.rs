pub mod normalize;
pub mod store;
pub mod track;

pub use normalize::TrackNormalizer;
pub use store::LibraryStore;
pub use track::{Track, TrackType};
