#![forbid(unsafe_code)]

pub mod chapter;
pub mod cli;
pub mod command;
pub mod context;
pub mod error;
pub mod formats;
pub mod generate;
pub mod logging;
pub mod ollama;
pub mod openai;
pub mod outline;
pub mod page;
pub mod project;
pub mod prompt;
pub mod status;
pub mod store;
