//! Shared helpers for the library and the command-line front end

pub mod providers;

pub use providers::{ExecutionProviderManager, ProviderInfo};
