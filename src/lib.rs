// Library crate for the binary and the integration tests.

pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod report;
pub mod settings;
pub mod suite;
