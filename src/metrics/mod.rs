//! Observability for the eviction engine.
//!
//! Recording, snapshotting, and export are kept separate so production
//! monitoring and tests consume the same counters without coupling to the
//! engine internals:
//!
//! - [`recorder`]: counters and latency trackers written by the engine;
//! - [`snapshot`]: point-in-time copies handed to consumers;
//! - [`exporter`]: Prometheus text rendering of a snapshot.

pub mod exporter;
pub mod recorder;
pub mod snapshot;

pub use exporter::PrometheusTextExporter;
pub use recorder::{EvictionMetrics, LatencyTracker};
pub use snapshot::{EvictionMetricsSnapshot, LatencySnapshot};
