//! SQL generation, write-behind flushing, and `PostgreSQL` access for
//! `RavenVault`.
//!
//! # Architecture
//!
//! ```text
//! Gameplay mutations
//!     |
//!     +-- EntityStore (in memory, change sets)
//!             |
//!             +-- change listener --> WriteBehind (arms a flush)
//!                                         |
//!                                         +-- SavePipeline (plan, batch, acknowledge)
//!                                                 |
//!                                                 +-- query (SQL text)
//!                                                 +-- SqlConnector --> PostgreSQL
//! ```
//!
//! # Modules
//!
//! - [`query`] -- Pure SQL text generation and value formatting
//! - [`executor`] -- [`SqlConnector`] abstraction, live and dry-run
//! - [`pipeline`] -- Batch planning and execution with compare-and-clear
//! - [`write_behind`] -- The scheduled, serialized flush loop
//! - [`postgres`] -- `PostgreSQL` connection pool and migrations
//! - [`error`] -- Shared error types

pub mod error;
pub mod executor;
pub mod pipeline;
pub mod postgres;
pub mod query;
pub mod write_behind;

// Re-export primary types for convenience.
pub use error::DbError;
pub use executor::{DryRunConnector, PostgresConnector, SqlConnection, SqlConnector};
pub use pipeline::{Batch, FlushReport, SavePipeline, StalledBatch};
pub use postgres::{PostgresConfig, PostgresPool};
pub use query::{Statement, Target};
pub use write_behind::WriteBehind;
