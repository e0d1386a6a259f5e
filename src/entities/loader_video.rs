//! FFmpeg video backend (cargo feature `ffmpeg`).
//!
//! One [`VideoStream`] per handle: the precise decoder and the scrub sampler
//! each open the file independently, so they never share a demuxer cursor.
//!
//! - [`FfmpegDecoder`]: backward keyframe seek, then sequential decode.
//!   The playback clock decodes forward from the keyframe to the target.
//! - [`FfmpegSampler`]: backward keyframe seek and returns the first decoded
//!   frame. Fast and approximate (keyframe-aligned), which is what scrubbing wants.

use log::{debug, trace, warn};
use playa_ffmpeg as ffmpeg;
use std::path::Path;
use std::sync::Once;

use super::error::DecodeError;
use super::frame::{DecodedFrame, Frame};
use super::time::{FrameRate, TimeMs};
use super::traits::{ProbeInfo, RandomAccessSampler, SamplePoint, SequentialDecoder, StreamMetadata};

static FFMPEG_INIT: Once = Once::new();

fn init_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg::init() {
            warn!("FFmpeg init failed: {}", e);
        }
        unsafe {
            // Silence FFmpeg's own stderr output; errors surface through DecodeError
            ffmpeg::ffi::av_log_set_level(ffmpeg::ffi::AV_LOG_QUIET);
        }
    });
}

fn open_err(path: &Path, e: impl std::fmt::Display) -> DecodeError {
    DecodeError::Open {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Container metadata read without decoding frames
#[derive(Debug, Clone, Copy)]
pub struct VideoMetadata {
    pub duration_secs: Option<f64>,
    pub fps: Option<f64>,
    pub frame_count: Option<u64>,
    pub width: u32,
    pub height: u32,
}

/// Software scaler handle.
struct Scaler(ffmpeg::software::scaling::Context);

// SAFETY: the SwsContext is owned by exactly one VideoStream and only used
// from whichever thread currently owns that stream.
unsafe impl Send for Scaler {}

/// Demuxer + decoder + RGBA scaler for the best video stream of a file
struct VideoStream {
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: Scaler,
    stream_idx: usize,
    time_base: (i64, i64),
    start_ts: i64,
    metadata: VideoMetadata,
    eof_sent: bool,
}

impl VideoStream {
    fn open(path: &Path) -> Result<Self, DecodeError> {
        init_ffmpeg();

        let ictx = ffmpeg::format::input(path).map_err(|e| open_err(path, e))?;
        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| open_err(path, "no video stream found"))?;
        let stream_idx = stream.index();

        let tb = stream.time_base();
        let time_base = (tb.numerator() as i64, tb.denominator() as i64);
        let start_ts = match stream.start_time() {
            ts if ts == ffmpeg::ffi::AV_NOPTS_VALUE => 0,
            ts => ts,
        };

        // Stream duration first, container duration as second opinion
        let stream_duration = stream.duration();
        let duration_secs = if stream_duration > 0 && time_base.1 > 0 {
            Some(stream_duration as f64 * time_base.0 as f64 / time_base.1 as f64)
        } else if ictx.duration() > 0 {
            Some(ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64)
        } else {
            None
        };

        let rate = stream.avg_frame_rate();
        let fps = if rate.numerator() > 0 && rate.denominator() > 0 {
            Some(rate.numerator() as f64 / rate.denominator() as f64)
        } else {
            None
        };
        let frame_count = match stream.frames() {
            n if n > 0 => Some(n as u64),
            _ => None,
        };

        let mut decoder_ctx = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| open_err(path, format!("decoder context: {}", e)))?;

        // Multi-threaded frame decoding
        unsafe {
            (*decoder_ctx.as_mut_ptr()).thread_type = ffmpeg::ffi::FF_THREAD_FRAME;
            (*decoder_ctx.as_mut_ptr()).thread_count = 0;
        }

        let decoder = decoder_ctx
            .decoder()
            .video()
            .map_err(|e| open_err(path, format!("video decoder: {}", e)))?;

        let (width, height) = (decoder.width(), decoder.height());
        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg::format::Pixel::RGBA,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| open_err(path, format!("scaler: {}", e)))?;

        debug!(
            "Opened video {}: {}x{}, duration={:?}s, fps={:?}, frames={:?}",
            path.display(),
            width,
            height,
            duration_secs,
            fps,
            frame_count
        );

        Ok(Self {
            ictx,
            decoder,
            scaler: Scaler(scaler),
            stream_idx,
            time_base,
            start_ts,
            metadata: VideoMetadata {
                duration_secs,
                fps,
                frame_count,
                width,
                height,
            },
            eof_sent: false,
        })
    }

    fn ts_to_ms(&self, ts: i64) -> TimeMs {
        let (num, den) = self.time_base;
        if den == 0 {
            return 0;
        }
        let rel = (ts - self.start_ts).max(0) as i128;
        (rel * num as i128 * 1000 / den as i128) as TimeMs
    }

    fn ms_to_ts(&self, ms: TimeMs) -> i64 {
        let (num, den) = self.time_base;
        if num == 0 {
            return self.start_ts;
        }
        self.start_ts + (ms.max(0) as i128 * den as i128 / (num as i128 * 1000)) as i64
    }

    /// Backward seek: lands on the keyframe at or before `ms`
    fn seek_ms(&mut self, ms: TimeMs) -> Result<(), DecodeError> {
        let ts = self.ms_to_ts(ms);
        let ret = unsafe {
            ffmpeg::ffi::av_seek_frame(
                self.ictx.as_mut_ptr(),
                self.stream_idx as i32,
                ts,
                ffmpeg::ffi::AVSEEK_FLAG_BACKWARD,
            )
        };
        if ret < 0 {
            return Err(DecodeError::Seek {
                target_ms: ms,
                reason: format!("av_seek_frame returned {}", ret),
            });
        }
        self.decoder.flush();
        self.eof_sent = false;
        Ok(())
    }

    /// Next decoded frame in presentation order, converted to RGBA
    fn read_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError> {
        let mut decoded = ffmpeg::util::frame::video::Video::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let ts = decoded.timestamp().or(decoded.pts()).unwrap_or(self.start_ts);
                    let frame = self.to_rgba(&decoded)?;
                    return Ok(Some(DecodedFrame::new(self.ts_to_ms(ts), frame)));
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(_) => {} // needs more input
            }

            if self.eof_sent {
                return Ok(None);
            }

            let next = self.ictx.packets().next();
            match next {
                Some((stream, packet)) => {
                    if stream.index() == self.stream_idx {
                        self.decoder
                            .send_packet(&packet)
                            .map_err(|e| DecodeError::Stream(format!("send packet: {}", e)))?;
                    }
                }
                None => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| DecodeError::Stream(format!("send eof: {}", e)))?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn to_rgba(&mut self, decoded: &ffmpeg::util::frame::video::Video) -> Result<Frame, DecodeError> {
        let mut rgba = ffmpeg::util::frame::video::Video::empty();
        self.scaler
            .0
            .run(decoded, &mut rgba)
            .map_err(|e| DecodeError::Stream(format!("scale frame: {}", e)))?;

        let (width, height) = (rgba.width() as usize, rgba.height() as usize);
        let stride = rgba.stride(0);
        let data = rgba.data(0);
        let row_bytes = width * 4;
        let mut output = vec![0u8; row_bytes * height];
        for y in 0..height {
            let src = y * stride;
            let dst = y * row_bytes;
            output[dst..dst + row_bytes].copy_from_slice(&data[src..src + row_bytes]);
        }
        Frame::from_rgba(width, height, output)
    }
}

/// Precise sequential decoder over a video file
pub struct FfmpegDecoder {
    stream: VideoStream,
}

impl FfmpegDecoder {
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        Ok(Self {
            stream: VideoStream::open(path)?,
        })
    }
}

impl SequentialDecoder for FfmpegDecoder {
    fn metadata(&self) -> StreamMetadata {
        let md = &self.stream.metadata;
        StreamMetadata {
            duration_secs: md.duration_secs,
            frame_rate: md.fps.and_then(FrameRate::from_fps),
            width: md.width,
            height: md.height,
        }
    }

    fn seek(&mut self, target_ms: TimeMs) -> Result<TimeMs, DecodeError> {
        self.stream.seek_ms(target_ms)?;
        // Exact keyframe position is only known once a frame decodes
        Ok(target_ms)
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError> {
        self.stream.read_frame()
    }
}

/// Keyframe-grabbing sampler over its own handle to a video file
pub struct FfmpegSampler {
    stream: VideoStream,
}

impl FfmpegSampler {
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        Ok(Self {
            stream: VideoStream::open(path)?,
        })
    }

    fn frame_to_ms(&self, index: u64) -> Option<TimeMs> {
        let rate = self.stream.metadata.fps.and_then(FrameRate::from_fps)?;
        Some(rate.frame_to_ms(index))
    }
}

impl RandomAccessSampler for FfmpegSampler {
    fn probe(&mut self) -> Result<ProbeInfo, DecodeError> {
        let md = self.stream.metadata;
        let frame_count = md.frame_count.or_else(|| match (md.duration_secs, md.fps) {
            (Some(d), Some(fps)) => Some((d * fps) as u64),
            _ => None,
        });
        Ok(ProbeInfo {
            frame_count,
            fps: md.fps,
        })
    }

    fn sample_near(&mut self, at: SamplePoint) -> Result<Option<Frame>, DecodeError> {
        let ms = match at {
            SamplePoint::Frame(i) => {
                if let Some(count) = self.stream.metadata.frame_count
                    && i >= count
                {
                    return Ok(None);
                }
                match self.frame_to_ms(i) {
                    Some(ms) => ms,
                    None => return Ok(None),
                }
            }
            SamplePoint::Time(ms) => ms,
        };

        trace!("Sampling keyframe near {} ms", ms);
        self.stream.seek_ms(ms)?;
        Ok(self.stream.read_frame()?.map(|f| f.frame))
    }
}
