//! Shared-log boundary for the Keel database core: the three-operation
//! [`SharedLog`] capability the core consumes, the transient/permanent
//! [`LogError`] split it relies on, and an [`InMemoryLog`] backend with
//! hole injection so reader-loop retry behavior can be exercised.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{LogError, LogResult};
pub use memory::InMemoryLog;
pub use traits::SharedLog;
