//! Image sequence backend.
//!
//! Discovers numbered frame files and serves them through both decode
//! capabilities. Sequences carry no container metadata, so their duration
//! always comes from the probe (`frame_count / fps`).
//!
//! Accepted inputs:
//! - glob: `render/shot.*.png`
//! - printf: `render/shot.%04d.png`
//! - any frame of the sequence: `render/shot.0001.png`
//! - a directory (largest numbered group wins)
//! - a single un-numbered image (one-frame clip)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, trace};
use regex::Regex;

use super::error::DecodeError;
use super::frame::{DecodedFrame, Frame};
use super::media::MediaSource;
use super::time::{FrameRate, TimeMs};
use super::traits::{ProbeInfo, RandomAccessSampler, SamplePoint, SequentialDecoder, StreamMetadata};

/// Image extensions recognised during directory discovery
const IMAGE_EXTENSIONS: &[&str] = &["exr", "png", "jpg", "jpeg", "tif", "tiff", "tga", "hdr", "bmp"];

/// Ordered frame files of one sequence.
///
/// Index `i` maps to frame number `first + i`; missing numbers are kept as
/// holes so timing stays uniform.
#[derive(Debug, Clone)]
pub struct SequenceFiles {
    frames: Vec<Option<PathBuf>>,
    first: usize,
    pattern: String,
}

impl SequenceFiles {
    /// Discover the sequence a path refers to
    pub fn discover(path: &Path) -> Result<Self, DecodeError> {
        let as_str = path.to_string_lossy().to_string();

        if as_str.contains('*') {
            return Self::from_glob(&as_str);
        }
        if as_str.contains('%') {
            let re = printf_regex()?;
            let glob_pattern = re.replace_all(&as_str, "*").to_string();
            return Self::from_glob(&glob_pattern);
        }
        if path.is_dir() {
            return Self::from_dir(path);
        }
        if !path.exists() {
            return Err(DecodeError::Open {
                path: path.to_path_buf(),
                reason: "file not found".into(),
            });
        }

        match split_sequence_path(path) {
            Some((prefix, _number, ext, _padding)) => Self::from_glob(&format!("{}*.{}", prefix, ext)),
            None => {
                info!("Single frame: {}", path.display());
                Ok(Self {
                    frames: vec![Some(path.to_path_buf())],
                    first: 0,
                    pattern: as_str,
                })
            }
        }
    }

    fn from_glob(pattern: &str) -> Result<Self, DecodeError> {
        let paths = glob_paths(pattern)?;
        if paths.is_empty() {
            return Err(DecodeError::Open {
                path: PathBuf::from(pattern),
                reason: "no files match pattern".into(),
            });
        }
        Self::from_paths(pattern, paths)
    }

    fn from_dir(dir: &Path) -> Result<Self, DecodeError> {
        let entries = std::fs::read_dir(dir)?;
        let mut groups: HashMap<(String, String), Vec<PathBuf>> = HashMap::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if !is_image {
                continue;
            }
            if let Some((prefix, _, ext, _)) = split_sequence_path(&path) {
                groups.entry((prefix, ext)).or_default().push(path);
            }
        }

        // Largest group is the main sequence
        let ((prefix, ext), paths) = groups
            .into_iter()
            .max_by_key(|(_, v)| v.len())
            .ok_or_else(|| DecodeError::Open {
                path: dir.to_path_buf(),
                reason: "no numbered image files in directory".into(),
            })?;
        Self::from_paths(&format!("{}*.{}", prefix, ext), paths)
    }

    fn from_paths(pattern: &str, paths: Vec<PathBuf>) -> Result<Self, DecodeError> {
        let mut by_number: HashMap<usize, PathBuf> = HashMap::new();
        for path in paths {
            if let Some((_, number, _, _)) = split_sequence_path(&path) {
                by_number.insert(number, path);
            }
        }

        let first = by_number.keys().copied().min();
        let last = by_number.keys().copied().max();
        let (Some(first), Some(last)) = (first, last) else {
            return Err(DecodeError::Open {
                path: PathBuf::from(pattern),
                reason: "no frame numbers found".into(),
            });
        };

        let frames: Vec<Option<PathBuf>> = (first..=last).map(|n| by_number.remove(&n)).collect();
        let holes = frames.iter().filter(|f| f.is_none()).count();
        info!(
            "Sequence: {} ({} frames, {}-{}, {} missing)",
            pattern,
            frames.len(),
            first,
            last,
            holes
        );

        Ok(Self {
            frames,
            first,
            pattern: pattern.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// First frame number on disk
    pub fn first_number(&self) -> usize {
        self.first
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// File for frame index (None for holes and out-of-range indices)
    pub fn path(&self, index: usize) -> Option<&Path> {
        self.frames.get(index).and_then(|p| p.as_deref())
    }

    fn load(&self, index: usize) -> Result<Option<Frame>, DecodeError> {
        let Some(path) = self.path(index) else {
            return Ok(None);
        };
        trace!("Loading sequence frame {} from {}", index, path.display());
        let img = image::open(path)
            .map_err(|e| DecodeError::Stream(format!("{}: {}", path.display(), e)))?;
        Ok(Some(Frame::from_image(img)))
    }
}

fn discover_logged(source: &MediaSource) -> Result<Arc<SequenceFiles>, DecodeError> {
    let files = SequenceFiles::discover(source.path())?;
    debug!(
        "Sequence {}: {} frames from #{}",
        files.pattern(),
        files.len(),
        files.first_number()
    );
    Ok(Arc::new(files))
}

fn printf_regex() -> Result<Regex, DecodeError> {
    Regex::new(r"%0?(\d*)d").map_err(|e| DecodeError::Unsupported(format!("pattern regex: {}", e)))
}

/// Expand a glob pattern into a sorted list of paths
fn glob_paths(pattern: &str) -> Result<Vec<PathBuf>, DecodeError> {
    let entries = glob::glob(pattern)
        .map_err(|e| DecodeError::Unsupported(format!("glob error for pattern {}: {}", pattern, e)))?;
    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => return Err(DecodeError::Stream(format!("glob entry error: {}", e))),
        }
    }
    paths.sort();
    Ok(paths)
}

/// Split a frame filename into (prefix, number, ext, padding)
///
/// Example: "/path/seq.0001.exr" -> ("/path/seq.", 1, "exr", 4)
fn split_sequence_path(path: &Path) -> Option<(String, usize, String, usize)> {
    let ext = path.extension()?.to_str()?.to_string();
    let stem = path.file_stem()?.to_str()?;

    let digit_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, ch)| ch.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;

    let number_str = &stem[digit_start..];
    let number = number_str.parse::<usize>().ok()?;

    let mut prefix = String::new();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        prefix.push_str(&parent.to_string_lossy());
        if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
            prefix.push(std::path::MAIN_SEPARATOR);
        }
    }
    prefix.push_str(&stem[..digit_start]);

    Some((prefix, number, ext, number_str.len()))
}

// ============================================================================
// Decode capabilities
// ============================================================================

/// Sequential playback over a sequence at a nominal rate.
///
/// Holes repeat the last good frame (no black flash).
pub struct SequenceDecoder {
    files: Arc<SequenceFiles>,
    rate: FrameRate,
    cursor: usize,
    last_good: Option<Frame>,
}

impl SequenceDecoder {
    pub fn new(files: Arc<SequenceFiles>, rate: FrameRate) -> Self {
        Self {
            files,
            rate,
            cursor: 0,
            last_good: None,
        }
    }

    pub fn open(source: &MediaSource, rate: FrameRate) -> Result<Self, DecodeError> {
        Ok(Self::new(discover_logged(source)?, rate))
    }
}

impl SequentialDecoder for SequenceDecoder {
    fn metadata(&self) -> StreamMetadata {
        // Plain files: no container duration or rate to report
        StreamMetadata::default()
    }

    fn seek(&mut self, target_ms: TimeMs) -> Result<TimeMs, DecodeError> {
        // Clamp to the last frame: a target at the clip length still lands on a picture
        let index = self.rate.ms_to_frame(target_ms) as usize;
        self.cursor = index.min(self.files.len().saturating_sub(1));
        self.last_good = None;
        debug!("Sequence seek {} ms -> frame {}", target_ms, self.cursor);
        Ok(self.rate.frame_to_ms(self.cursor as u64))
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError> {
        if self.cursor >= self.files.len() {
            return Ok(None);
        }
        let index = self.cursor;
        self.cursor += 1;

        let frame = match self.files.load(index)? {
            Some(frame) => {
                self.last_good = Some(frame.clone());
                frame
            }
            None => match &self.last_good {
                Some(frame) => frame.clone(),
                // Hole at the very start: nothing to repeat yet
                None => Frame::placeholder(1, 1),
            },
        };
        Ok(Some(DecodedFrame::new(self.rate.frame_to_ms(index as u64), frame)))
    }
}

/// Random access over a sequence: every frame is a file, so access is exact.
pub struct SequenceSampler {
    files: Arc<SequenceFiles>,
    rate: FrameRate,
}

impl SequenceSampler {
    pub fn new(files: Arc<SequenceFiles>, rate: FrameRate) -> Self {
        Self { files, rate }
    }

    pub fn open(source: &MediaSource, rate: FrameRate) -> Result<Self, DecodeError> {
        Ok(Self::new(discover_logged(source)?, rate))
    }
}

impl RandomAccessSampler for SequenceSampler {
    fn probe(&mut self) -> Result<ProbeInfo, DecodeError> {
        Ok(ProbeInfo {
            frame_count: Some(self.files.len() as u64),
            fps: Some(self.rate.as_f64()),
        })
    }

    fn sample_near(&mut self, at: SamplePoint) -> Result<Option<Frame>, DecodeError> {
        let index = match at {
            SamplePoint::Frame(i) => i as usize,
            SamplePoint::Time(ms) => self.rate.ms_to_frame(ms) as usize,
        };
        self.files.load(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_sequence(dir: &Path, name: &str, numbers: &[usize]) {
        for &n in numbers {
            let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([n as u8, 0, 0, 255]));
            img.save(dir.join(format!("{}.{:04}.png", name, n))).unwrap();
        }
    }

    #[test]
    fn test_split_sequence_path() {
        let (prefix, number, ext, padding) =
            split_sequence_path(Path::new("/tmp/seq.0012.exr")).unwrap();
        assert_eq!(prefix, format!("/tmp{}seq.", std::path::MAIN_SEPARATOR));
        assert_eq!(number, 12);
        assert_eq!(ext, "exr");
        assert_eq!(padding, 4);
        assert!(split_sequence_path(Path::new("/tmp/poster.png")).is_none());
    }

    #[test]
    fn test_discover_from_frame_file() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), "shot", &[1, 2, 3, 5]);

        let files = SequenceFiles::discover(&dir.path().join("shot.0002.png")).unwrap();
        assert_eq!(files.len(), 5);
        assert_eq!(files.first_number(), 1);
        assert!(files.path(3).is_none()); // frame 4 missing
        assert!(files.path(4).is_some());
    }

    #[test]
    fn test_discover_printf_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), "plate", &[10, 11, 12]);
        write_sequence(dir.path(), "other", &[1]);

        let printf = dir.path().join("plate.%04d.png");
        assert_eq!(SequenceFiles::discover(&printf).unwrap().len(), 3);

        let from_dir = SequenceFiles::discover(dir.path()).unwrap();
        assert_eq!(from_dir.len(), 3);
        assert_eq!(from_dir.first_number(), 10);
    }

    #[test]
    fn test_decoder_repeats_last_good_frame_over_holes() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), "shot", &[1, 3]);
        let files = Arc::new(SequenceFiles::discover(&dir.path().join("shot.0001.png")).unwrap());
        let rate = FrameRate::new(25, 1).unwrap();
        let mut dec = SequenceDecoder::new(Arc::clone(&files), rate);

        let f0 = dec.next_frame().unwrap().unwrap();
        let f1 = dec.next_frame().unwrap().unwrap();
        let f2 = dec.next_frame().unwrap().unwrap();
        assert_eq!((f0.pts_ms, f1.pts_ms, f2.pts_ms), (0, 40, 80));
        assert!(f1.frame.same_buffer(&f0.frame));
        assert!(dec.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_decoder_seek_lands_at_or_before_target() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), "shot", &[1, 2, 3, 4, 5]);
        let files = Arc::new(SequenceFiles::discover(&dir.path().join("shot.0001.png")).unwrap());
        let mut dec = SequenceDecoder::new(files, FrameRate::new(25, 1).unwrap());

        assert_eq!(dec.seek(130).unwrap(), 120);
        assert_eq!(dec.next_frame().unwrap().unwrap().pts_ms, 120);

        // Clip length (5 frames at 25 fps) lands on the last frame
        assert_eq!(dec.seek(200).unwrap(), 160);
        assert_eq!(dec.next_frame().unwrap().unwrap().pts_ms, 160);
        assert!(dec.next_frame().unwrap().is_none());
        assert_eq!(dec.seek(10_000).unwrap(), 160);
    }

    #[test]
    fn test_sampler_probe_and_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), "shot", &[1, 2, 3]);
        let files = Arc::new(SequenceFiles::discover(&dir.path().join("shot.0001.png")).unwrap());
        let mut sampler = SequenceSampler::new(files, FrameRate::new(24, 1).unwrap());

        let probe = sampler.probe().unwrap();
        assert_eq!(probe.frame_count, Some(3));
        assert_eq!(probe.fps, Some(24.0));
        assert!(sampler.sample_near(SamplePoint::Frame(2)).unwrap().is_some());
        assert!(sampler.sample_near(SamplePoint::Frame(99)).unwrap().is_none());
        assert!(sampler.sample_near(SamplePoint::Time(84)).unwrap().is_some());
    }
}
