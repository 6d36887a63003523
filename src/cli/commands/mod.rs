mod config;
mod delete;
mod index;
mod search;
mod status;

pub use config::ConfigCommand;
pub use delete::DeleteArgs;
pub use index::IndexArgs;
pub use search::SearchArgs;

pub use config::handle_config;
pub use delete::handle_delete;
pub use index::handle_index;
pub use search::handle_search;
pub use status::handle_status;
