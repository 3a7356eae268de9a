//! Key/value synchronization engine for kvdesk.
//!
//! Pushes a user's edits of a key/value tree back to a Consul server
//! without clobbering changes other clients made in the meantime.
//!
//! ## Components
//!
//! - **Diff**: per-key delta between the snapshot the user loaded and the
//!   snapshot they edited
//! - **Conflict**: classifies each delta entry against a fresh read of the
//!   live tree
//! - **Apply**: issues one conditional write per safe entry, concurrently,
//!   and reports a per-key outcome
//! - **Store**: the conditional-write store abstraction, with a Consul HTTP
//!   implementation and an in-memory one
//!
//! ## Save Process
//!
//! 1. **Diff**: compute the delta; an empty delta ends the run
//! 2. **Read**: fetch the live tree once, before any write
//! 3. **Classify**: `Safe`, `Stale`, `DeletedUpstream` or `AlreadySatisfied`
//! 4. **Apply**: conditional writes for `Safe` entries only
//! 5. **Report**: one outcome per delta entry, ordered by path
//!
//! # Example
//!
//! ```
//! use kvdesk_sync::{diff, SyncConfig, SyncEngine};
//! use kvdesk_sync::store::MemoryConnector;
//! use kvdesk_types::TreeSnapshot;
//! use std::sync::Arc;
//!
//! let initial = TreeSnapshot::from_values([("app/name", "demo")]).unwrap();
//! let edited = TreeSnapshot::from_values([("app/name", "prod")]).unwrap();
//! assert_eq!(diff(&initial, &edited).len(), 1);
//!
//! let engine = SyncEngine::new(Arc::new(MemoryConnector::new()), SyncConfig::default());
//! assert_eq!(engine.config().max_concurrent_writes, 8);
//! ```

pub mod apply;
pub mod conflict;
pub mod diff;
mod engine;
mod error;
pub mod outcome;
pub mod store;

pub use apply::ApplyCoordinator;
pub use conflict::{Classification, ClassifiedDelta, ClassifiedEntry, classify};
pub use diff::{Change, Delta, DeltaEntry, DeltaSummary, diff};
pub use engine::{SyncConfig, SyncEngine};
pub use error::{Result, SyncError};
pub use outcome::{ApplyOutcome, OutcomeCounts, OutcomeStatus, SyncResult};
pub use store::{KvStore, StoreConnector, WriteStatus};
