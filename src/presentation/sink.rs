use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::discord::Embed;

/// Identifier of one status message on the external surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The surface cannot be reached right now; retry later
    #[error("surface unavailable: {0}")]
    Unavailable(String),

    /// The referenced unit no longer exists
    #[error("unit {0} no longer exists")]
    HandleInvalid(UnitId),
}

/// Where per-host status units are published
#[async_trait]
pub trait SurfaceSink: Send + Sync {
    async fn create_unit(&self, hostname: &str, content: &Embed) -> Result<UnitId, SinkError>;

    async fn edit_unit(&self, hostname: &str, unit: UnitId, content: &Embed)
    -> Result<(), SinkError>;

    /// A unit created for `hostname` by an earlier run, if it still exists
    async fn lookup_existing_unit(&self, hostname: &str) -> Result<Option<UnitId>, SinkError>;
}
