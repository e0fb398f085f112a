//! Listing Scout - scrapes property listings from Jiji Ghana, normalizes
//! them, and publishes the cleaned batches to an API or object storage.

pub mod cleaner;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod publisher;
pub mod retry;
pub mod scrapers;
pub mod storage;
pub mod trigger;

pub use config::Config;
pub use error::{PipelineError, Result};
