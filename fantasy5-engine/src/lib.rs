pub mod adjacency;
pub mod backtest;
pub mod config;
pub mod contact;
pub mod filters;
pub mod generator;
pub mod range;

pub use fantasy5_history::{Error, Result};
