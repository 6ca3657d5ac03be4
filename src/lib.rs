// Changefeed - unified recent changes across versioned content kinds

pub mod config;
pub mod error;
pub mod feed;
pub mod geometry;
pub mod history;
pub mod maps;
pub mod pages;
pub mod storage;

pub use config::FeedConfig;
pub use error::FeedError;
