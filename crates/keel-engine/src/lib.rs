//! Log-ingest and transaction-sequencing engine for the Keel database.
//!
//! The engine turns the linear shared log into two live artifacts: a
//! fan-out of [`IntentionQueue`]s delivering intentions in position order,
//! and a [`PrimaryAfterImageMatcher`] pairing every committed tree with the
//! first after-image following its intention. [`EntryService`] owns the two
//! reader loops feeding both; [`Database`] and [`Transaction`] sit on top.

pub mod cache;
pub mod config;
pub mod db;
pub mod entry;
pub mod error;
pub mod matcher;
pub mod queue;
pub mod service;
pub mod txn;

pub use cache::{CacheEntry, EntryCache};
pub use config::EntryServiceConfig;
pub use db::Database;
pub use entry::{AfterImage, Intention};
pub use error::{EngineError, EngineResult};
pub use matcher::{MatchedPair, PrimaryAfterImageMatcher};
pub use queue::IntentionQueue;
pub use service::EntryService;
pub use txn::Transaction;
