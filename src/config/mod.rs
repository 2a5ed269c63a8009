pub mod cli;
pub mod env;
mod loader;

pub use cli::Cli;
pub use env::{AppConfig, ConfigError, DirectoryConfig, RedditCredentials};
pub use loader::{load_config, profile_prefix};
