//! Concrete database client implementations.
//!
//! This module contains the PostgreSQL adapter implementing the
//! `DatabaseClient` trait and the generic `Repository` over models.

pub mod postgres;
pub mod repository;

pub use postgres::{PoolConfig, PostgresClient, Session};
pub use repository::PostgresRepository;
