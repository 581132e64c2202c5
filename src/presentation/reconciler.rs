//! Create-once, edit-thereafter status messages
//!
//! Each host moves through a small state machine:
//!
//! ```text
//!            update: lookup_existing_unit, else create_unit
//! NoSurface ─────────────────────────────────────────────────▶ SurfaceBound
//!     ▲                                                            │
//!     └────────────────── edit_unit fails with HandleInvalid ─────┘
//! ```
//!
//! A bound surface is only ever edited, and only when the rendered content
//! changed. `Unavailable` leaves the state untouched so the next cycle
//! retries. A host stays in `NoSurface` until a create has returned a unit,
//! so a create that failed or never finished is followed by another lookup
//! rather than a blind second create.
//!
//! Updates for one host never overlap. An update arriving while another is
//! in flight is parked, replacing any older parked one, and applied by
//! whichever caller holds the surface when it finishes.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::render::render;
use super::sink::{SinkError, SurfaceSink, UnitId};
use crate::config::Host;
use crate::discord::Embed;
use crate::status::HostStatus;
use crate::storage::{BucketGranularity, DISPLAY_BUCKETS, SampleStore, WindowEntry, fill_window};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SurfaceState {
    #[default]
    NoSurface,
    SurfaceBound { unit: UnitId, content_hash: u64 },
}

/// One parked update
struct Request {
    host: Host,
    status: HostStatus,
    now: DateTime<Utc>,
}

#[derive(Default)]
struct Surface {
    state: Mutex<SurfaceState>,
    latest: StdMutex<Option<Request>>,
}

impl Surface {
    fn park(&self, request: Request) {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(request);
    }

    fn take(&self) -> Option<Request> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    fn has_parked(&self) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// What an update did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Created(UnitId),
    /// Bound to a unit left behind by an earlier run
    Rebound(UnitId),
    Edited(UnitId),
    /// The old unit was gone and a new one was created
    Recreated(UnitId),
    Unchanged,
    /// Another update for the same host was in flight; it applies this one
    /// (or a newer one) when done
    Queued,
}

pub struct Reconciler {
    sink: Arc<dyn SurfaceSink>,
    store: Arc<dyn SampleStore>,
    granularity: BucketGranularity,
    surfaces: StdMutex<HashMap<String, Arc<Surface>>>,
}

pub fn content_hash(embed: &Embed) -> u64 {
    let mut hasher = DefaultHasher::new();
    // serde_json output is stable for a given embed
    serde_json::to_string(embed)
        .unwrap_or_default()
        .hash(&mut hasher);
    hasher.finish()
}

impl Reconciler {
    pub fn new(
        sink: Arc<dyn SurfaceSink>,
        store: Arc<dyn SampleStore>,
        granularity: BucketGranularity,
    ) -> Self {
        Self {
            sink,
            store,
            granularity,
            surfaces: StdMutex::new(HashMap::new()),
        }
    }

    fn surface(&self, hostname: &str) -> Arc<Surface> {
        let mut surfaces = self.surfaces.lock().unwrap_or_else(|e| e.into_inner());
        surfaces.entry(hostname.to_string()).or_default().clone()
    }

    /// The unit currently bound to `hostname`, if any
    pub async fn bound_unit(&self, hostname: &str) -> Option<UnitId> {
        match *self.surface(hostname).state.lock().await {
            SurfaceState::SurfaceBound { unit, .. } => Some(unit),
            SurfaceState::NoSurface => None,
        }
    }

    async fn window(&self, hostname: &str, now: DateTime<Utc>) -> Vec<WindowEntry> {
        match self.store.window(hostname, DISPLAY_BUCKETS, now).await {
            Ok(window) => window,
            Err(e) => {
                warn!("cannot read uptime history of {hostname}: {e}");
                fill_window(&self.granularity.window_buckets(DISPLAY_BUCKETS, now), &[])
            }
        }
    }

    /// Bring the status unit of `host` in line with `status`
    #[instrument(skip_all, fields(host = %host.name))]
    pub async fn update(
        &self,
        host: &Host,
        status: &HostStatus,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome, SinkError> {
        let surface = self.surface(&host.name);
        surface.park(Request {
            host: host.clone(),
            status: status.clone(),
            now,
        });

        let mut outcome = UpdateOutcome::Queued;
        loop {
            let Ok(mut state) = surface.state.try_lock() else {
                debug!("update in flight, parked the latest content");
                return Ok(outcome);
            };
            while let Some(request) = surface.take() {
                outcome = self.apply(&mut state, &request).await?;
            }
            drop(state);

            // parked after the drain but before the unlock
            if !surface.has_parked() {
                return Ok(outcome);
            }
        }
    }

    async fn apply(
        &self,
        state: &mut SurfaceState,
        request: &Request,
    ) -> Result<UpdateOutcome, SinkError> {
        let hostname = request.host.name.as_str();
        let window = self.window(hostname, request.now).await;
        let embed = render(&request.host, &request.status, &window);
        let hash = content_hash(&embed);

        match *state {
            SurfaceState::SurfaceBound { content_hash, .. } if content_hash == hash => {
                Ok(UpdateOutcome::Unchanged)
            }
            SurfaceState::SurfaceBound { unit, .. } => {
                self.edit_or_recreate(state, hostname, unit, &embed, hash)
                    .await
            }
            SurfaceState::NoSurface => match self.sink.lookup_existing_unit(hostname).await? {
                Some(unit) => {
                    info!("rebinding to existing unit {unit}");
                    let outcome = self
                        .edit_or_recreate(state, hostname, unit, &embed, hash)
                        .await?;
                    Ok(match outcome {
                        UpdateOutcome::Edited(unit) => UpdateOutcome::Rebound(unit),
                        other => other,
                    })
                }
                None => self
                    .create(state, hostname, &embed, hash)
                    .await
                    .map(UpdateOutcome::Created),
            },
        }
    }

    async fn create(
        &self,
        state: &mut SurfaceState,
        hostname: &str,
        embed: &Embed,
        hash: u64,
    ) -> Result<UnitId, SinkError> {
        let unit = self.sink.create_unit(hostname, embed).await?;
        *state = SurfaceState::SurfaceBound {
            unit,
            content_hash: hash,
        };
        Ok(unit)
    }

    async fn edit_or_recreate(
        &self,
        state: &mut SurfaceState,
        hostname: &str,
        unit: UnitId,
        embed: &Embed,
        hash: u64,
    ) -> Result<UpdateOutcome, SinkError> {
        match self.sink.edit_unit(hostname, unit, embed).await {
            Ok(()) => {
                *state = SurfaceState::SurfaceBound {
                    unit,
                    content_hash: hash,
                };
                Ok(UpdateOutcome::Edited(unit))
            }
            Err(SinkError::HandleInvalid(_)) => {
                warn!("unit {unit} disappeared, creating a new one");
                *state = SurfaceState::NoSurface;
                self.create(state, hostname, embed, hash)
                    .await
                    .map(UpdateOutcome::Recreated)
            }
            Err(e) => {
                // keep the binding, only the content is stale
                if let SurfaceState::NoSurface = state {
                    *state = SurfaceState::SurfaceBound {
                        unit,
                        content_hash: 0,
                    };
                }
                Err(e)
            }
        }
    }
}
