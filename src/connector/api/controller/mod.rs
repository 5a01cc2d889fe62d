pub mod chat_controller;

pub use chat_controller::{format_history, format_message, parse_command, ChatController, ReplCommand};
