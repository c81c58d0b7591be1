//! Session state for one video.
//!
//! A session is either waiting for a video or holds the frozen evidence store
//! built for it. All state changes go through [`Session::transition`].

use crate::config::Settings;
use crate::embedding;
use crate::error::{GlimtError, Result};
use crate::evidence::{
    EvidenceStore, IndexedVideo, MemoryEvidenceStore, QueryEncoder, SqliteEvidenceStore,
};
use crate::retriever::QueryRetriever;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Where a session currently is.
#[derive(Clone, Default)]
pub enum SessionState {
    /// No store has been built, or it was discarded.
    #[default]
    Uninitialized,
    /// A store is available for querying.
    Ready {
        video: IndexedVideo,
        store: Arc<dyn EvidenceStore>,
    },
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Uninitialized => f.write_str("Uninitialized"),
            SessionState::Ready { video, .. } => f
                .debug_struct("Ready")
                .field("video_id", &video.video_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Something that happened to the session.
pub enum SessionEvent {
    /// Ingestion finished and produced a store.
    Built {
        video: IndexedVideo,
        store: Arc<dyn EvidenceStore>,
    },
    /// The user asked for a different video.
    NewVideoSubmitted,
    /// All local data was removed.
    CleanedUp,
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Built { video, .. } => f
                .debug_struct("Built")
                .field("video_id", &video.video_id)
                .finish_non_exhaustive(),
            SessionEvent::NewVideoSubmitted => f.write_str("NewVideoSubmitted"),
            SessionEvent::CleanedUp => f.write_str("CleanedUp"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    state: SessionState,
}

impl Session {
    /// A session with no video.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload the session persisted under the configured data directory.
    pub fn restore(settings: &Settings) -> Result<Self> {
        let encoder = QueryEncoder::new(
            embedding::text_embedder(settings)?,
            embedding::image_embedder(settings)?,
        );
        Self::restore_from(&settings.evidence_db_path(), encoder)
    }

    /// Reload the session stored at `path`. A missing database yields an
    /// uninitialized session.
    ///
    /// Records are loaded into memory so the session keeps a frozen snapshot
    /// even if the database is rebuilt later.
    pub fn restore_from(path: &Path, encoder: QueryEncoder) -> Result<Self> {
        let mut session = Self::new();

        if let Some(persisted) = SqliteEvidenceStore::open(path, encoder.clone())? {
            let video = persisted.indexed_video().clone();
            let records = persisted.load_records()?;
            debug!("Restored {} records for video {}", records.len(), video.video_id);

            let store = MemoryEvidenceStore::new(&video.video_id, records, encoder);
            session.transition(SessionEvent::Built {
                video,
                store: Arc::new(store),
            });
        }

        Ok(session)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready { .. })
    }

    /// Apply an event. Every event is valid in every state.
    pub fn transition(&mut self, event: SessionEvent) {
        let next = match event {
            SessionEvent::Built { video, store } => {
                info!("Session ready for video {}", video.video_id);
                SessionState::Ready { video, store }
            }
            SessionEvent::NewVideoSubmitted => {
                debug!("New video submitted, discarding session");
                SessionState::Uninitialized
            }
            SessionEvent::CleanedUp => {
                debug!("Local data removed, discarding session");
                SessionState::Uninitialized
            }
        };
        self.state = next;
    }

    /// The store for the current video.
    pub fn store(&self) -> Result<Arc<dyn EvidenceStore>> {
        match &self.state {
            SessionState::Ready { store, .. } => Ok(store.clone()),
            SessionState::Uninitialized => Err(GlimtError::NotReady),
        }
    }

    /// A retriever over the current store.
    pub fn retriever(&self, text_k: usize, image_k: usize) -> Result<QueryRetriever> {
        QueryRetriever::new(self.store()?, text_k, image_k)
    }

    pub fn video(&self) -> Option<&IndexedVideo> {
        match &self.state {
            SessionState::Ready { video, .. } => Some(video),
            SessionState::Uninitialized => None,
        }
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video().map(|v| v.video_id.as_str())
    }
}
