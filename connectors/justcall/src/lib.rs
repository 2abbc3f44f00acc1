pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod normalize;
pub mod strategy;
pub mod sync;

pub use error::FetchError;
pub use export::to_csv;
pub use models::{Credentials, DateRange, FetchOutcome, FetchRequest, TranscriptRecord};
pub use strategy::{ConnectionStrategy, StrategySelector};
pub use sync::TranscriptFetcher;
