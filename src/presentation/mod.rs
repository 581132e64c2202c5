//! Per-host status messages
//!
//! - [`render`]: pure `(host, status, window) -> Embed`
//! - [`sink`]: the [`SurfaceSink`] seam (Discord in production)
//! - [`reconciler`]: keeps exactly one message per host up to date

pub mod reconciler;
pub mod render;
pub mod sink;

pub use reconciler::{Reconciler, UpdateOutcome};
pub use render::render;
pub use sink::{SinkError, SurfaceSink, UnitId};
