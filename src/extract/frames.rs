//! Frame sampling with ffmpeg.

use super::run_tool;
use crate::config::FrameSettings;
use crate::error::{GlimtError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// One sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Image file.
    pub path: PathBuf,
    /// Position in the sampling sequence.
    pub index: usize,
    /// Approximate position in the video, in seconds.
    pub timestamp: f64,
}

/// The frames sampled from one video, in file-name order.
#[derive(Debug, Clone)]
pub struct FrameSet {
    pub dir: PathBuf,
    pub frames: Vec<Frame>,
    pub interval: f64,
}

impl FrameSet {
    /// Collect the `frameNNNN.*` files already present in `dir`.
    pub fn scan(dir: &Path, interval: f64) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| is_frame_file(path))
            .collect();

        paths.sort();

        let frames = paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| Frame {
                path,
                index,
                timestamp: index as f64 * interval,
            })
            .collect();

        Ok(Self {
            dir: dir.to_path_buf(),
            frames,
            interval,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Whether `path` looks like a sampled frame (`frame0000.png`, ...).
fn is_frame_file(path: &Path) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    let has_image_ext = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("png") | Some("jpg") | Some("jpeg") | Some("webp")
    );

    has_image_ext
        && stem
            .strip_prefix("frame")
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Delete previously sampled frames from `dir`. Returns how many were removed.
pub fn clear_frames(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if is_frame_file(&path) {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Subdirectories of `root`, one per indexed build, sorted by name.
pub fn frame_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Delete every build directory under `root` except `keep`, plus loose frame
/// files directly in `root`. Returns how many frames were removed.
pub fn prune_frame_dirs(root: &Path, keep: Option<&Path>) -> Result<usize> {
    let mut removed = clear_frames(root)?;

    for dir in frame_dirs(root)? {
        if keep.is_some_and(|keep| keep == dir) {
            continue;
        }
        removed += clear_frames(&dir)?;
        std::fs::remove_dir_all(&dir)?;
        debug!("Removed frame directory {:?}", dir);
    }

    Ok(removed)
}

/// Sample one frame every `settings.interval_seconds` from `input` into
/// `output_dir`. Existing frames in the directory are replaced.
#[instrument(skip(settings))]
pub async fn extract_frames(input: &str, output_dir: &Path, settings: &FrameSettings) -> Result<FrameSet> {
    std::fs::create_dir_all(output_dir)?;
    clear_frames(output_dir)?;

    info!("Extracting frames every {}s", settings.interval_seconds);

    let pattern = output_dir.join(format!("frame%04d.{}", settings.image_format));
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input.to_string(),
        "-vf".into(),
        format!("fps=1/{}", settings.interval_seconds),
        "-start_number".into(),
        "0".into(),
    ];
    if settings.max_frames > 0 {
        args.push("-frames:v".into());
        args.push(settings.max_frames.to_string());
    }
    args.push("-y".into());
    args.push(pattern.to_string_lossy().to_string());

    run_tool("ffmpeg", &args).await?;

    let frames = FrameSet::scan(output_dir, settings.interval_seconds)?;
    if frames.is_empty() {
        return Err(GlimtError::Extraction(format!(
            "ffmpeg produced no frames for {}",
            input
        )));
    }

    info!("Extracted {} frames", frames.len());
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_frame_file() {
        assert!(is_frame_file(Path::new("/tmp/frame0000.png")));
        assert!(is_frame_file(Path::new("frame0123.jpg")));
        assert!(!is_frame_file(Path::new("frame.png")));
        assert!(!is_frame_file(Path::new("frame00a1.png")));
        assert!(!is_frame_file(Path::new("captions_abc.txt")));
    }

    #[test]
    fn test_scan_orders_frames_and_assigns_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame0002.png", "frame0000.png", "frame0001.png", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let set = FrameSet::scan(dir.path(), 5.0).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.frames[0].path, dir.path().join("frame0000.png"));
        assert_eq!(set.frames[2].path, dir.path().join("frame0002.png"));
        assert_eq!(set.frames[2].timestamp, 10.0);
    }

    #[test]
    fn test_clear_frames_keeps_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame0000.png"), b"x").unwrap();
        std::fs::write(dir.path().join("captions_abc.txt"), b"x").unwrap();

        assert_eq!(clear_frames(dir.path()).unwrap(), 1);
        assert!(dir.path().join("captions_abc.txt").exists());
        assert_eq!(clear_frames(&dir.path().join("missing")).unwrap(), 0);
    }

    #[test]
    fn test_prune_frame_dirs_keeps_current_build() {
        let root = tempfile::tempdir().unwrap();
        let old = root.path().join("old-1");
        let current = root.path().join("new-2");
        for dir in [&old, &current] {
            std::fs::create_dir_all(dir).unwrap();
            std::fs::write(dir.join("frame0000.png"), b"x").unwrap();
            std::fs::write(dir.join("frame0001.png"), b"x").unwrap();
        }
        std::fs::write(root.path().join("frame0000.png"), b"x").unwrap();

        assert_eq!(frame_dirs(root.path()).unwrap(), vec![current.clone(), old.clone()]);
        assert_eq!(prune_frame_dirs(root.path(), Some(&current)).unwrap(), 3);
        assert!(!old.exists());
        assert!(current.join("frame0001.png").exists());

        assert_eq!(prune_frame_dirs(root.path(), None).unwrap(), 2);
        assert!(frame_dirs(root.path()).unwrap().is_empty());
        assert_eq!(prune_frame_dirs(&root.path().join("missing"), None).unwrap(), 0);
    }
}
