//! Correlated request client, endpoints, configuration and CLI.
//!
//! This crate provides [`EngineClient`] and the `synthlink` command-line
//! interface built on it.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
mod connection;
pub mod endpoint;
pub mod error;
mod pending;

pub use cli::Cli;
pub use client::{ClientOptions, CloseReason, ConnectionState, EngineClient, ReplyFuture};
pub use config::ClientConfig;
pub use endpoint::Endpoint;
pub use error::{ClientError, ClientResult};
