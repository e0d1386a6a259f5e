//! Media source identity: what clip is loaded and how it is stored.

use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Container extensions handled by the video backend
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "m4v", "mkv", "webm", "avi", "mxf", "mpg", "mpeg", "ts", "wmv", "flv",
];

/// Storage kind of a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    ImageSequence,
}

/// Currently loaded clip.
///
/// Owned by the timeline model. Decoders receive it only while opening and
/// keep their own handles, so the source outlives every decode operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaSource {
    id: Uuid,
    path: PathBuf,
    kind: MediaKind,
}

impl MediaSource {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            kind,
        }
    }

    /// Pick the kind from the path: known video container extensions are
    /// videos, everything else (frame files, globs, printf patterns,
    /// directories) is treated as an image sequence.
    pub fn detect(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = if is_video_path(&path) {
            MediaKind::Video
        } else {
            MediaKind::ImageSequence
        };
        Self::new(path, kind)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// File name for log lines
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}
