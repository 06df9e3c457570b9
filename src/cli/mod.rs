pub mod commands;

pub use commands::{handle_offline_commands, handle_subcommands};
