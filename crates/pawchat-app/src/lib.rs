//! Pawchat Application Library
//!
//! Wires the messaging core into a demo chat CLI.

// Re-export workspace crates
pub use pawchat_logging as logging;
pub use pawchat_media as media;
pub use pawchat_session as session;
pub use pawchat_store as store;
pub use pawchat_types as types;

// Local modules
pub mod cli;
pub mod repl;

pub use cli::Cli;
pub use repl::run_repl;
