pub mod error;
pub mod history;
pub mod models;

pub use error::{Error, Result};
pub use history::{DrawHistory, FrequencyTable, Window, WindowSpec};
pub use models::{Draw, GameConfig};
