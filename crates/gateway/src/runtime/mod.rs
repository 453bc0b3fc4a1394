//! Call-time runtime: orchestrator event loop, intervention observer,
//! VUI metrics, and the I/O handler family.

pub mod io;
pub mod metrics;
pub mod observer;
pub mod orchestrator;

pub use io::{FillerType, IoHandler};
pub use metrics::VuiMetrics;
pub use observer::{InterventionObserver, Observed};
pub use orchestrator::Orchestrator;
