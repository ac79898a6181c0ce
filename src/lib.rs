pub mod assets;
pub mod browser;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod parsers;
pub mod pipeline;
pub mod ranking;
pub mod scrapers;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::{ScrapeError, ScrapeResult};
pub use pipeline::{execute, Pipeline, RunReport};
