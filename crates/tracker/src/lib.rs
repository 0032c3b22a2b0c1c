//! # Tracenav Tracker
//!
//! Incremental change tracking and index-rebuild orchestration.
//!
//! ## Pipeline
//!
//! ```text
//! editing hooks
//!     │  record_changed_file / record_events   (microsecond path)
//!     ▼
//! ChangeCollector (coalescing buffers)
//!     │  quiet-period flush (swap-then-iterate)
//!     ▼
//! worker queues ──> BatchWorkers ──> DiscoveryIndex updates
//!
//! buffer overflow ──> RebuildController ──> full rebuild of every index
//! ```
//!
//! Hook-path entries never block and never fail; everything heavier runs on
//! background tasks that absorb, log, and report their errors. The worst
//! case a user ever sees is briefly stale navigation data.
//!
//! ## Example
//!
//! ```no_run
//! use tracenav_model::SourceChangeEvent;
//! use tracenav_tracker::{TraceNav, TrackerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Providers come from the host, one set per entity kind.
//!     let nav = TraceNav::new(Vec::new(), Vec::new(), TrackerConfig::default());
//!     nav.start()?;
//!
//!     nav.record_changed_file("src/main/java/OrderService.java");
//!     nav.record_event(SourceChangeEvent::deleted("src/main/java/Legacy.java"));
//!
//!     let locations = nav.locations(["checkout-span"]);
//!     println!("{}: {locations:?}", nav.status());
//!
//!     nav.dispose().await;
//!     Ok(())
//! }
//! ```

mod collector;
mod config;
mod error;
mod rebuild;
mod scheduler;
mod service;
mod worker;

pub use collector::{Admission, ChangeCollector};
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use service::TraceNav;
