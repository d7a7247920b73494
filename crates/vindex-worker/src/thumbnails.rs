//! Thumbnail extraction task.
//!
//! Driven by the union of artifact timestamps: one JPEG per distinct
//! `span_start_ms` across all envelopes of a video, written to
//! `{root}/{video_id}/{ms}.jpg`. Idempotent by construction: timestamps
//! whose file already exists are skipped, so a re-run over a warm
//! filesystem is a no-op.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use vindex_models::Video;
use vindex_store::ArtifactStore;

use crate::error::{WorkerError, WorkerResult};

/// Width thumbnails are scaled down to.
pub const THUMBNAIL_MAX_WIDTH: u32 = 320;

/// Extracts a single frame from a video file. The pixel work lives behind
/// this seam; the task logic only diffs timestamps against the filesystem.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract_frame(
        &self,
        video_path: &Path,
        timestamp_ms: i64,
        output_path: &Path,
        max_width: u32,
    ) -> WorkerResult<()>;
}

/// Frame extraction via the `ffmpeg` binary.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameExtractor;

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract_frame(
        &self,
        video_path: &Path,
        timestamp_ms: i64,
        output_path: &Path,
        max_width: u32,
    ) -> WorkerResult<()> {
        let seek = format!("{}.{:03}", timestamp_ms / 1000, timestamp_ms % 1000);
        let filter = format!("scale='min({max_width},iw)':-2");

        let status = tokio::process::Command::new("ffmpeg")
            .arg("-v")
            .arg("error")
            .arg("-ss")
            .arg(&seek)
            .arg("-i")
            .arg(video_path)
            .arg("-frames:v")
            .arg("1")
            .arg("-vf")
            .arg(&filter)
            .arg("-y")
            .arg(output_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(WorkerError::job_failed(format!(
                "ffmpeg exited with {status} for {}",
                output_path.display()
            )));
        }
        Ok(())
    }
}

/// Outcome of one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThumbnailStats {
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
}

/// Extracts thumbnails for every artifact timestamp of a video.
pub struct ThumbnailExtractor {
    artifacts: ArtifactStore,
    extractor: Arc<dyn FrameExtractor>,
    root: PathBuf,
}

impl ThumbnailExtractor {
    pub fn new(
        artifacts: ArtifactStore,
        extractor: Arc<dyn FrameExtractor>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            artifacts,
            extractor,
            root: root.into(),
        }
    }

    /// Run one extraction pass for a video.
    pub async fn run(&self, video: &Video) -> WorkerResult<ThumbnailStats> {
        let envelopes = self
            .artifacts
            .get_by_asset(&video.video_id, None, None, None, None)
            .await?;

        let timestamps: BTreeSet<i64> =
            envelopes.iter().map(|e| e.span_start_ms).collect();

        let dir = self.root.join(video.video_id.as_str());
        tokio::fs::create_dir_all(&dir).await?;

        let mut stats = ThumbnailStats {
            total: timestamps.len(),
            ..Default::default()
        };

        for ts in timestamps {
            let output = dir.join(format!("{ts}.jpg"));
            if tokio::fs::try_exists(&output).await? {
                stats.skipped += 1;
                continue;
            }

            match self
                .extractor
                .extract_frame(
                    Path::new(&video.file_path),
                    ts,
                    &output,
                    THUMBNAIL_MAX_WIDTH,
                )
                .await
            {
                Ok(()) => stats.generated += 1,
                Err(e) => {
                    warn!(
                        video_id = %video.video_id,
                        timestamp_ms = ts,
                        "Frame extraction failed: {e}"
                    );
                    stats.failed += 1;
                }
            }
        }

        info!(
            video_id = %video.video_id,
            generated = stats.generated,
            skipped = stats.skipped,
            failed = stats.failed,
            total = stats.total,
            "Thumbnail pass finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vindex_models::{
        ArtifactEnvelope, ArtifactId, ArtifactKind, ModelProfile, RunId, VideoId,
    };
    use vindex_store::{Database, VideoRepository};

    async fn setup() -> (ArtifactStore, VideoRepository) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        (ArtifactStore::new(db.clone()), VideoRepository::new(db))
    }

    fn scene_envelope(asset: &VideoId, id: &str, start: i64, end: i64) -> ArtifactEnvelope {
        ArtifactEnvelope::new(
            ArtifactId::from(id),
            asset.clone(),
            ArtifactKind::Scene,
            1,
            start,
            end,
            serde_json::json!({"scene_index": 0}),
            "ml-service",
            "1.0.0",
            ModelProfile::Balanced,
            "cfg",
            "input",
            RunId::from("r1"),
        )
        .unwrap()
    }

    fn writing_extractor() -> MockFrameExtractor {
        let mut mock = MockFrameExtractor::new();
        mock.expect_extract_frame()
            .returning(|_, _, output, _| {
                std::fs::write(output, b"jpeg").unwrap();
                Ok(())
            });
        mock
    }

    #[tokio::test]
    async fn second_run_skips_everything() {
        let (artifacts, videos) = setup().await;
        let video = Video::discovered("/videos/a.mp4");
        videos.create(&video).await.unwrap();

        artifacts
            .batch_create(&[
                scene_envelope(&video.video_id, "s1", 0, 1000),
                scene_envelope(&video.video_id, "s2", 1000, 2000),
                // duplicate start timestamp collapses into one thumbnail
                scene_envelope(&video.video_id, "s3", 1000, 3000),
            ])
            .await
            .unwrap();

        let root = tempfile::tempdir().unwrap();
        let extractor = ThumbnailExtractor::new(
            artifacts.clone(),
            Arc::new(writing_extractor()),
            root.path(),
        );

        let first = extractor.run(&video).await.unwrap();
        assert_eq!(
            first,
            ThumbnailStats {
                generated: 2,
                skipped: 0,
                failed: 0,
                total: 2
            }
        );

        let second = extractor.run(&video).await.unwrap();
        assert_eq!(
            second,
            ThumbnailStats {
                generated: 0,
                skipped: 2,
                failed: 0,
                total: 2
            }
        );

        // files land under {root}/{video_id}/{ms}.jpg
        let dir = root.path().join(video.video_id.as_str());
        assert!(dir.join("0.jpg").exists());
        assert!(dir.join("1000.jpg").exists());
    }

    #[tokio::test]
    async fn per_timestamp_failures_do_not_fail_the_pass() {
        let (artifacts, videos) = setup().await;
        let video = Video::discovered("/videos/a.mp4");
        videos.create(&video).await.unwrap();

        artifacts
            .batch_create(&[
                scene_envelope(&video.video_id, "s1", 0, 1000),
                scene_envelope(&video.video_id, "s2", 1000, 2000),
            ])
            .await
            .unwrap();

        let mut mock = MockFrameExtractor::new();
        mock.expect_extract_frame()
            .returning(|_, ts, output, _| {
                if ts == 0 {
                    Err(WorkerError::job_failed("decode error"))
                } else {
                    std::fs::write(output, b"jpeg").unwrap();
                    Ok(())
                }
            });

        let root = tempfile::tempdir().unwrap();
        let extractor =
            ThumbnailExtractor::new(artifacts.clone(), Arc::new(mock), root.path());

        let stats = extractor.run(&video).await.unwrap();
        assert_eq!(stats.generated, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total, 2);
    }

    #[tokio::test]
    async fn empty_artifact_set_is_a_noop() {
        let (artifacts, videos) = setup().await;
        let video = Video::discovered("/videos/a.mp4");
        videos.create(&video).await.unwrap();

        let root = tempfile::tempdir().unwrap();
        let extractor = ThumbnailExtractor::new(
            artifacts.clone(),
            Arc::new(MockFrameExtractor::new()),
            root.path(),
        );

        let stats = extractor.run(&video).await.unwrap();
        assert_eq!(stats, ThumbnailStats::default());
    }
}
