pub mod embed;

pub use embed::{HttpEmbedder, LocalEmbedder};
