//! # codecollab
//!
//! The core of a collaborative code editor: projects gated by admin-approved
//! membership, reviewed change requests, branch/commit history and a
//! WebSocket relay that keeps every open editor in a project in step.
//! Usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! codecollab = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use codecollab::config::RelayConfig;
//! use codecollab::server::{AppState, create_router};
//! use codecollab::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/codecollab.db").unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), RelayConfig::default()));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `codecollab` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod diff;
pub mod error;
pub mod exec;
pub mod relay;
pub mod server;
pub mod service;
pub mod store;
pub mod types;
