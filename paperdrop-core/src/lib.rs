//! paperdrop core library — configuration, allow-list, domain types, errors.
//!
//! - [`config`] — environment-driven [`Config`]
//! - [`allowlist`] — extension glob filter
//! - [`types`] — messages passed between pipeline stages
//! - [`error`] — [`ConfigError`]

pub mod allowlist;
pub mod config;
pub mod error;
pub mod types;

pub use allowlist::AllowList;
pub use config::Config;
pub use error::ConfigError;
pub use types::{CandidatePath, FileState, StablePath};
