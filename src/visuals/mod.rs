//! Visual retrieval: search queries, verified downloads and fallback chains.
//!
//! # Flow
//!
//! 1. [`QueryDeriver`] turns segment text into exactly N search queries.
//! 2. [`ImageCollector`] walks each query's [`FallbackStrategy`] list.
//! 3. [`AssetFetcher`] searches, downloads and verifies individual images.

mod fallback;
mod fetch;
mod query;
mod search;

pub use fallback::{fallback_plan, FallbackStrategy, ImageCollector};
pub use fetch::{
    content_hash, verify_image, AssetFetcher, Downloader, FetchedImage, HttpDownloader, ImageMetadata,
    VerifiedImage,
};
pub use query::{fallback_query, topic_keyword, OpenAIQueryGenerator, QueryDeriver, QueryGenerator};
pub use search::{ImageHit, ImageSearch, SerpApiSearch};

#[cfg(test)]
pub(crate) use fetch::tests as test_support;
