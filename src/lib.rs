//! Clean Architecture Backend Boilerplate
//!
//! Backend building blocks organised in layers, with every external
//! dependency behind a trait so it can be replaced in tests.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   API Layer                  │
//! │      Health, readiness and metrics routes    │
//! ├─────────────────────────────────────────────┤
//! │               Application Layer              │
//! │   Services, shared state, periodic jobs      │
//! ├─────────────────────────────────────────────┤
//! │                 Domain Layer                 │
//! │  Traits, models, filters, manifests, errors  │
//! ├─────────────────────────────────────────────┤
//! │             Infrastructure Layer             │
//! │  PostgreSQL, Telegram, logging, metrics      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Settings for each backing service live in [`config`] and are read from
//! prefixed environment variables.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use clean_architecture_boilerplate::api::create_router;
//! use clean_architecture_boilerplate::app::AppState;
//! use clean_architecture_boilerplate::config;
//! use clean_architecture_boilerplate::infra::{LogNotifier, PoolConfig, PostgresClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     config::load_dotenv();
//!     let db = PostgresClient::connect(config::postgres_settings()?, PoolConfig::default()).await?;
//!
//!     let state = Arc::new(AppState::new(Arc::new(db), Arc::new(LogNotifier)));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, create_router(state)).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod infra;

// Test utilities are available in tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
