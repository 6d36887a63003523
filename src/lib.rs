pub mod cli;
pub mod error;
pub mod models;
pub mod parsers;
pub mod services;
pub mod utils;

pub use cli::{Cli, Commands};
pub use models::{Config, OutputFormat};
