#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ledger;
pub mod operator;
pub mod pipeline;
pub mod policy;
pub mod signing;
pub mod state;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::{AttestorError, Result};
