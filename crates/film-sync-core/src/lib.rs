//! Film catalogue synchronization pipeline.
//!
//! - [`codec`]: film change events on the wire, flat or enveloped
//! - [`reconcile`]: idempotent insert-or-update against one store
//! - [`service`]: persist-then-publish write path of the catalogue side
//! - [`consumer`]: pull/decode/reconcile loop of a downstream side
//!
//! ```text
//! client -> CatalogueService -> films table
//!                  |
//!                  +--publish--> event log --ConsumerLoop--> film table
//!
//! film table change feed --> event log --ConsumerLoop--> films table
//! ```

pub mod codec;
pub mod consumer;
mod error;
pub mod reconcile;
pub mod service;

pub use codec::FilmEvent;
pub use consumer::{ConsumerLoop, FilmEventHandler};
pub use error::{SyncError, SyncResult};
pub use reconcile::{IdentityPolicy, Reconciled, Reconciler};
pub use service::CatalogueService;
