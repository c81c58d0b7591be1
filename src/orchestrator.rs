//! Pipeline orchestrator for Glimt.
//!
//! Coordinates ingestion (resolve, extract frames, fetch captions, index,
//! persist) and question answering over the current session.

use crate::config::{Prompts, Settings};
use crate::error::Result;
use crate::evidence::{
    EvidenceStore, IndexedVideo, MemoryEvidenceStore, Modality, SqliteEvidenceStore,
};
use crate::extract::{
    caption_file_path, extract_captions_or_empty, extract_frames, prune_frame_dirs,
    write_caption_file,
};
use crate::index::IndexBuilder;
use crate::retriever::RetrievalResult;
use crate::session::{Session, SessionEvent};
use crate::synthesis::{Answer, AnswerSynthesizer, OpenAISynthesizer};
use crate::video_source::{resolve_input, VideoMetadata};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Receives ingestion progress as a message and a percentage.
pub type ProgressFn = Arc<dyn Fn(&str, u8) + Send + Sync>;

/// The main orchestrator for the Glimt pipeline.
pub struct Orchestrator {
    settings: Settings,
    builder: IndexBuilder,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    progress: Option<ProgressFn>,
}

impl Orchestrator {
    /// Create an orchestrator from configuration.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let builder = IndexBuilder::from_settings(&settings)?;
        let synthesizer =
            Arc::new(OpenAISynthesizer::new(&settings.synthesis)?.with_prompts(prompts));

        Ok(Self::with_components(settings, builder, synthesizer))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        builder: IndexBuilder,
        synthesizer: Arc<dyn AnswerSynthesizer>,
    ) -> Self {
        Self {
            settings,
            builder,
            synthesizer,
            progress: None,
        }
    }

    /// Report ingestion progress to `progress`.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Replace or remove the progress callback.
    pub fn set_progress(&mut self, progress: Option<ProgressFn>) {
        self.progress = progress;
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn report(&self, message: &str, percent: u8) {
        info!("{}", message);
        if let Some(progress) = &self.progress {
            progress(message, percent);
        }
    }

    /// Ingest a video and persist its evidence store.
    ///
    /// The previous store on disk is discarded before any extraction starts,
    /// so a failed ingestion leaves no index behind. Frames are sampled into a
    /// fresh directory per build; the previous build's frames stay in place
    /// until [`Orchestrator::retire_stale_frames`] is called after the caller
    /// has applied [`ProcessResult::session_event`] to its session.
    #[instrument(skip(self), fields(input = %input))]
    pub async fn process_video(&self, input: &str) -> Result<ProcessResult> {
        let (source, video_id) = resolve_input(input)?;

        if SqliteEvidenceStore::remove(&self.settings.evidence_db_path())? {
            info!("Discarded the previous evidence index");
        }

        self.report("Fetching video info...", 10);
        let metadata = source.fetch_video(&video_id).await?;
        self.report(
            &format!("Video info fetched - Duration: {}", metadata.format_duration()),
            25,
        );

        let build_dir = self
            .settings
            .frames_dir()
            .join(format!("{}-{}", metadata.id, Uuid::new_v4().simple()));

        match self.ingest(metadata, &build_dir).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if build_dir.exists() {
                    if let Err(remove_err) = std::fs::remove_dir_all(&build_dir) {
                        warn!("Failed to remove {:?}: {}", build_dir, remove_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn ingest(&self, metadata: VideoMetadata, build_dir: &Path) -> Result<ProcessResult> {
        self.report("Extracting frames from video stream...", 30);
        let frames = extract_frames(&metadata.stream_url, build_dir, &self.settings.frames).await?;
        self.report(&format!("Extracted {} frames", frames.len()), 50);

        self.report("Extracting video captions...", 60);
        let captions = extract_captions_or_empty(
            &metadata,
            &self.settings.temp_dir(),
            &self.settings.captions.languages,
        )
        .await;
        let caption_path = caption_file_path(&self.settings.captions_dir(), &metadata.id);
        write_caption_file(&caption_path, &captions)?;
        self.report(&format!("Captions saved to: {}", caption_path.display()), 70);

        self.report("Creating multimodal index...", 80);
        let records = self.builder.build(&metadata.id, &frames, &captions).await?;

        let count = |modality: Modality| {
            records
                .iter()
                .filter(|r| r.modality() == Some(modality))
                .count()
        };

        let video = IndexedVideo {
            video_id: metadata.id.clone(),
            title: metadata.title.clone(),
            source_url: metadata.source_url.clone(),
            frame_count: count(Modality::Image),
            text_count: count(Modality::Text),
            duration_seconds: metadata.duration_seconds,
            indexed_at: Utc::now(),
        };

        SqliteEvidenceStore::create(
            &self.settings.evidence_db_path(),
            video.clone(),
            &records,
            self.builder.encoder(),
        )?;
        self.report("Index creation complete", 90);

        let store = MemoryEvidenceStore::new(&metadata.id, records, self.builder.encoder());
        self.report("Video processed successfully!", 100);

        Ok(ProcessResult {
            metadata,
            video,
            captions_found: captions.len(),
            frames_dir: build_dir.to_path_buf(),
            store: Arc::new(store),
        })
    }

    /// Delete every frame directory except the one serving `current`.
    ///
    /// Call only once no query against an older store can still be running.
    pub fn retire_stale_frames(&self, current: &ProcessResult) -> Result<usize> {
        let removed = prune_frame_dirs(&self.settings.frames_dir(), Some(&current.frames_dir))?;
        if removed > 0 {
            info!("Removed {} frames from earlier builds", removed);
        }
        Ok(removed)
    }

    /// Retrieve evidence for `query` from the session's store.
    pub async fn search(
        &self,
        session: &Session,
        query: &str,
        text_k: usize,
        image_k: usize,
    ) -> Result<RetrievalResult> {
        let retriever = session.retriever(text_k, image_k)?;
        retriever
            .retrieve_with_timeout(query, self.retrieval_timeout())
            .await
    }

    /// Answer `query` with the configured K values.
    pub async fn ask(&self, session: &Session, query: &str) -> Result<QueryOutcome> {
        let retrieval = &self.settings.retrieval;
        self.ask_with(session, query, retrieval.text_k, retrieval.image_k)
            .await
    }

    /// Answer `query` with explicit K values.
    #[instrument(skip(self, session))]
    pub async fn ask_with(
        &self,
        session: &Session,
        query: &str,
        text_k: usize,
        image_k: usize,
    ) -> Result<QueryOutcome> {
        let retrieval = self.search(session, query, text_k, image_k).await?;
        let answer = self
            .synthesizer
            .synthesize(&retrieval.images, &retrieval.texts, query)
            .await?;

        Ok(QueryOutcome { retrieval, answer })
    }

    /// Remove frames, caption files and the persisted store, and reset the
    /// session.
    #[instrument(skip(self, session))]
    pub fn cleanup(&self, session: &mut Session) -> Result<CleanupReport> {
        let frames_removed = prune_frame_dirs(&self.settings.frames_dir(), None)?;

        let captions_dir = self.settings.captions_dir();
        let mut caption_files_removed = 0;
        if captions_dir.exists() {
            for entry in std::fs::read_dir(&captions_dir)? {
                let path = entry?.path();
                let is_caption_file = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("captions_") && n.ends_with(".txt"));
                if is_caption_file {
                    std::fs::remove_file(&path)?;
                    caption_files_removed += 1;
                }
            }
        }

        let store_removed = SqliteEvidenceStore::remove(&self.settings.evidence_db_path())?;

        let temp_dir = self.settings.temp_dir();
        if temp_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&temp_dir) {
                warn!("Failed to remove temp directory {:?}: {}", temp_dir, e);
            }
        }

        session.transition(SessionEvent::CleanedUp);

        let report = CleanupReport {
            frames_removed,
            caption_files_removed,
            store_removed,
        };
        info!(?report, "Cleanup completed");
        Ok(report)
    }

    fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.retrieval.timeout_seconds.max(1))
    }
}

/// Result of ingesting a video.
pub struct ProcessResult {
    pub metadata: VideoMetadata,
    pub video: IndexedVideo,
    /// Caption spans found before windowing.
    pub captions_found: usize,
    /// Directory holding this build's frames.
    pub frames_dir: PathBuf,
    pub store: Arc<dyn EvidenceStore>,
}

impl ProcessResult {
    /// The session event announcing the new store.
    pub fn session_event(&self) -> SessionEvent {
        SessionEvent::Built {
            video: self.video.clone(),
            store: self.store.clone(),
        }
    }
}

/// Retrieved evidence together with the synthesized answer.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub retrieval: RetrievalResult,
    pub answer: Answer,
}

/// What a cleanup removed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub frames_removed: usize,
    pub caption_files_removed: usize,
    pub store_removed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GlimtError;
    use crate::embedding::testing::{FixedEmbedder, FixedImageEmbedder};
    use crate::evidence::{EvidenceItem, ImageEvidence, TextEvidence};
    use async_trait::async_trait;
    use std::path::PathBuf;

    /// Echoes how much evidence it was given.
    struct EchoSynthesizer;

    #[async_trait]
    impl AnswerSynthesizer for EchoSynthesizer {
        async fn synthesize(&self, images: &[PathBuf], texts: &[String], query: &str) -> Result<Answer> {
            Ok(Answer {
                text: format!("{}: {} frames, {} passages", query, images.len(), texts.len()),
                image_count: images.len(),
                text_count: texts.len(),
            })
        }
    }

    fn orchestrator(data_dir: &std::path::Path) -> Orchestrator {
        let mut settings = Settings::default();
        settings.general.data_dir = data_dir.to_string_lossy().to_string();
        settings.general.temp_dir = data_dir.join("tmp").to_string_lossy().to_string();

        let builder = IndexBuilder::new(
            Arc::new(FixedEmbedder::new(vec![1.0, 0.0])),
            Arc::new(FixedImageEmbedder::new(vec![1.0, 0.0])),
        );
        Orchestrator::with_components(settings, builder, Arc::new(EchoSynthesizer))
    }

    fn ready_session() -> Session {
        let items = vec![
            EvidenceItem::Image(ImageEvidence {
                file_path: PathBuf::from("frame0000.png"),
                embedding: vec![1.0, 0.0],
                source_timestamp: Some(0.0),
            }),
            EvidenceItem::Text(TextEvidence {
                text: "a caption".to_string(),
                embedding: vec![1.0, 0.0],
                start: 0.0,
                end: 3.0,
            }),
        ];
        let encoder = crate::evidence::QueryEncoder::new(
            Arc::new(FixedEmbedder::new(vec![1.0, 0.0])),
            Arc::new(FixedImageEmbedder::new(vec![1.0, 0.0])),
        );

        let mut session = Session::new();
        session.transition(SessionEvent::Built {
            video: IndexedVideo {
                video_id: "vid".to_string(),
                title: "Video".to_string(),
                source_url: "https://youtu.be/vid".to_string(),
                frame_count: 1,
                text_count: 1,
                duration_seconds: None,
                indexed_at: Utc::now(),
            },
            store: Arc::new(MemoryEvidenceStore::from_items("vid", &items, encoder)),
        });
        session
    }

    #[tokio::test]
    async fn test_ask_requires_ready_session() {
        let dir = tempfile::tempdir().unwrap();
        let result = orchestrator(dir.path()).ask(&Session::new(), "hello").await;
        assert!(matches!(result, Err(GlimtError::NotReady)));
    }

    #[tokio::test]
    async fn test_ask_passes_evidence_to_synthesizer() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = orchestrator(dir.path())
            .ask(&ready_session(), "what happens")
            .await
            .unwrap();

        assert_eq!(outcome.retrieval.images, vec![PathBuf::from("frame0000.png")]);
        assert_eq!(outcome.retrieval.texts, vec!["a caption"]);
        assert_eq!(outcome.answer.text, "what happens: 1 frames, 1 passages");
    }

    #[tokio::test]
    async fn test_ask_rejects_empty_query() {
        let dir = tempfile::tempdir().unwrap();
        let result = orchestrator(dir.path()).ask(&ready_session(), "  ").await;
        assert!(matches!(result, Err(GlimtError::EmptyQuery)));
    }

    #[tokio::test]
    async fn test_process_rejects_unknown_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = orchestrator(dir.path()).process_video("not a video").await;
        assert!(matches!(result, Err(GlimtError::InvalidInput(_))));
    }

    fn persist_previous_video(settings: &Settings) -> PathBuf {
        let frames = settings.frames_dir().join("old-build");
        std::fs::create_dir_all(&frames).unwrap();
        let frame = frames.join("frame0000.png");
        std::fs::write(&frame, b"png").unwrap();

        let item = EvidenceItem::Image(ImageEvidence {
            file_path: frame,
            embedding: vec![1.0, 0.0],
            source_timestamp: Some(0.0),
        });
        let records = vec![crate::evidence::EvidenceRecord::from_item(0, "old", &item)];
        let encoder = crate::evidence::QueryEncoder::new(
            Arc::new(FixedEmbedder::new(vec![1.0, 0.0])),
            Arc::new(FixedImageEmbedder::new(vec![1.0, 0.0])),
        );
        SqliteEvidenceStore::create(
            &settings.evidence_db_path(),
            IndexedVideo {
                video_id: "old".to_string(),
                title: "Old".to_string(),
                source_url: "https://youtu.be/old".to_string(),
                frame_count: 1,
                text_count: 0,
                duration_seconds: None,
                indexed_at: Utc::now(),
            },
            &records,
            encoder,
        )
        .unwrap();
        frames
    }

    #[tokio::test]
    async fn test_failed_ingest_leaves_no_stale_index() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let settings = orchestrator.settings().clone();
        let old_frames = persist_previous_video(&settings);

        // Not a decodable video, so frame sampling fails.
        let input = dir.path().join("broken.mp4");
        std::fs::write(&input, b"not a video").unwrap();

        let result = orchestrator.process_video(input.to_str().unwrap()).await;
        assert!(result.is_err());

        let encoder = orchestrator.builder.encoder();
        let restored = Session::restore_from(&settings.evidence_db_path(), encoder).unwrap();
        assert!(!restored.is_ready());
        assert!(matches!(restored.retriever(5, 5), Err(GlimtError::NotReady)));

        // The failed build's directory is gone; earlier frames are untouched.
        assert_eq!(
            crate::extract::frame_dirs(&settings.frames_dir()).unwrap(),
            vec![old_frames.clone()]
        );
        assert!(old_frames.join("frame0000.png").exists());
    }

    #[tokio::test]
    async fn test_invalid_input_keeps_existing_index() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let settings = orchestrator.settings().clone();
        persist_previous_video(&settings);

        assert!(orchestrator.process_video("not a video").await.is_err());
        assert!(settings.evidence_db_path().exists());
    }

    #[test]
    fn test_cleanup_removes_local_data() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let settings = orchestrator.settings().clone();

        std::fs::create_dir_all(settings.frames_dir().join("vid-1")).unwrap();
        std::fs::write(settings.frames_dir().join("vid-1").join("frame0000.png"), b"x").unwrap();
        write_caption_file(&caption_file_path(&settings.captions_dir(), "vid"), &[]).unwrap();
        std::fs::write(settings.evidence_db_path(), b"").unwrap();

        let mut session = ready_session();
        let report = orchestrator.cleanup(&mut session).unwrap();

        assert_eq!(report.frames_removed, 1);
        assert!(!settings.frames_dir().join("vid-1").exists());
        assert_eq!(report.caption_files_removed, 1);
        assert!(report.store_removed);
        assert!(!session.is_ready());

        let again = orchestrator.cleanup(&mut session).unwrap();
        assert_eq!(again.frames_removed, 0);
        assert!(!again.store_removed);
    }
}
