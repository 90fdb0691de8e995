//! Client for an out-of-process media scanner service
//!
//! This library lets an application follow the scanner's progress through
//! begin/end listener callbacks and query the scanned media catalog, without
//! knowing how the scanner stores its state.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod listener;
pub mod models;
pub mod provider;
pub mod selection;
pub mod subscription;
pub mod tracker;

pub use client::{ClientHandle, ClientSlot, MediaScannerClient};
pub use config::{ClientConfig, NotifyPolicy};
pub use context::{ContentObserver, ObserverId, ProviderContext, RowSet};
pub use error::{ClientError, ClientErrorKind};
pub use listener::{ListenerRegistry, ScanEvent, ScanListener};
pub use models::{MediaRecord, MediaTypeCode, MediaTypeFlag, ScanState};
pub use provider::{Signal, SqliteProvider};
pub use selection::Selection;
pub use subscription::ChangeSubscription;
pub use tracker::{EdgeDetector, ScanStateTracker};
