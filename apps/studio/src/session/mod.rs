//! Per-user sessions: the uploaded image, the editable business context, the
//! one-slot output store, and the in-flight flag shown while a run is active.
//!
//! Sessions never share state. The registry only maps ids to sessions.

pub mod handlers;
pub mod render;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::caption::UploadedImage;
use crate::errors::AppError;
use crate::pipeline::Pipeline;
use crate::post::BusinessContext;
use crate::session::store::SessionStore;

#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// The currently uploaded image; replaced on every upload.
    pub image: Option<UploadedImage>,
    pub context: BusinessContext,
    pub store: SessionStore,
    /// True while a pipeline run for this session is in flight.
    pub processing: bool,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            image: None,
            context: BusinessContext::default(),
            store: SessionStore::new(),
            processing: false,
        }
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

/// Sessions untouched for this long are dropped by the idle sweep.
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(60 * 60);
/// How often the idle sweep runs.
pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct RegistryEntry {
    session: SharedSession,
    last_seen: Instant,
}

/// Live sessions by id. Dropping a session drops its store.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, RegistryEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> SharedSession {
        let session = Session::new();
        let id = session.id;
        let shared = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(
            id,
            RegistryEntry {
                session: shared.clone(),
                last_seen: Instant::now(),
            },
        );
        info!("Session {id} started");
        shared
    }

    /// Looks up a session and marks it as seen.
    pub async fn get(&self, id: Uuid) -> Result<SharedSession, AppError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;
        entry.last_seen = Instant::now();
        Ok(entry.session.clone())
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), AppError> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| info!("Session {id} ended"))
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops every session not seen for `ttl`. A session that is locked or
    /// has a run in flight is kept. Returns how many were dropped.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            if now.duration_since(entry.last_seen) < ttl {
                return true;
            }
            match entry.session.try_lock() {
                Ok(session) if !session.processing => {
                    info!("Session {id} expired after {}s idle", ttl.as_secs());
                    false
                }
                _ => true,
            }
        });
        before - sessions.len()
    }
}

/// Periodically evicts idle sessions for as long as the registry is alive.
pub fn spawn_idle_sweep(registry: Arc<SessionRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = registry.evict_idle(SESSION_IDLE_TTL).await;
            if evicted > 0 {
                debug!("Idle sweep evicted {evicted} session(s)");
            }
        }
    })
}

/// Runs the pipeline for the session's current image and context.
///
/// The session lock is released while the pipeline runs so renders keep
/// working and report `processing`. The run is detached onto its own task:
/// once triggered it completes even if the caller goes away. The store is
/// written only when every stage succeeded.
pub async fn run_generation(session: SharedSession, pipeline: Arc<Pipeline>) -> Result<(), AppError> {
    let (id, image, context) = {
        let mut guard = session.lock().await;
        if guard.processing {
            return Err(AppError::Conflict(
                "A generation is already running for this session".to_string(),
            ));
        }
        let image = guard.image.clone().ok_or_else(|| {
            AppError::Validation("Upload an image before generating".to_string())
        })?;
        guard.processing = true;
        (guard.id, image, guard.context.clone())
    };

    let task_session = session.clone();
    let task = tokio::spawn(async move {
        let outcome = pipeline.run(&image, &context).await;
        let mut guard = task_session.lock().await;
        guard.processing = false;
        let record = outcome?;
        info!(
            "Session {} recorded output for image {}",
            guard.id, record.image_fingerprint
        );
        guard.store.record(record);
        Ok::<(), AppError>(())
    });

    match task.await {
        Ok(result) => result,
        Err(e) => {
            warn!("Pipeline task for session {id} did not complete: {e}");
            session.lock().await.processing = false;
            Err(AppError::Internal(anyhow::anyhow!("pipeline task failed: {e}")))
        }
    }
}
