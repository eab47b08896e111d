use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::detection::DetectionPipeline;
use crate::facade::ProcessingFacade;
use crate::session::SessionSnapshot;
use crate::error::RestoreError;
use crate::source::SourceAdapter;

pub type SharedFacade = Arc<Mutex<ProcessingFacade>>;

/// Independent facades keyed by session identity
///
/// Only the detection pipeline is shared; every session owns its own source,
/// batch and cursor. Holding a facade's lock serialises requests within that
/// session without touching any other.
pub struct SessionRegistry {
    pipeline: Arc<DetectionPipeline>,
    sessions: RwLock<HashMap<Uuid, SharedFacade>>,
}

impl SessionRegistry {
    pub fn new(pipeline: Arc<DetectionPipeline>) -> Self {
        Self {
            pipeline,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start an empty session
    pub fn create(&self) -> (Uuid, SharedFacade) {
        let facade = ProcessingFacade::new(Arc::clone(&self.pipeline));
        self.insert(facade)
    }

    /// Start a session from a persisted snapshot
    pub fn restore(
        &self,
        snapshot: SessionSnapshot,
        source: impl Into<SourceAdapter>,
    ) -> Result<(Uuid, SharedFacade), RestoreError> {
        let facade = ProcessingFacade::restore(Arc::clone(&self.pipeline), snapshot, source)?;
        Ok(self.insert(facade))
    }

    pub fn get(&self, id: &Uuid) -> Option<SharedFacade> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &Uuid) -> Option<SharedFacade> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id);
        if removed.is_some() {
            debug!(session = %id, "Session removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, facade: ProcessingFacade) -> (Uuid, SharedFacade) {
        let id = Uuid::new_v4();
        let shared = Arc::new(Mutex::new(facade));
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, Arc::clone(&shared));
        debug!(session = %id, "Session created");
        (id, shared)
    }
}
