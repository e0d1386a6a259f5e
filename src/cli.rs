use clap::Parser;
use std::path::PathBuf;

#[cfg(feature = "ffmpeg")]
const VIDEO_BACKEND: &str = "playa-ffmpeg 8.0 (static)";
#[cfg(not(feature = "ffmpeg"))]
const VIDEO_BACKEND: &str = "disabled (build with --features ffmpeg)";

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Images: image 0.25\n",
    "Video:  ", VIDEO_BACKEND, "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless timeline engine driver: opens a clip, runs a scripted
/// sequence of commands and prints the resulting event stream
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Video file, image sequence frame, glob (`shot.*.png`) or printf pattern (`shot.%04d.png`)
    #[arg(value_name = "FILE")]
    pub file_path: PathBuf,

    /// Start playback after opening
    #[arg(short = 'a', long = "autoplay")]
    pub autoplay: bool,

    /// How long to play before running the remaining commands (wall-clock ms)
    #[arg(long = "play-ms", value_name = "N", default_value_t = 1000)]
    pub play_ms: u64,

    /// Playback rate multiplier (0.1 - 16)
    #[arg(short = 'r', long = "rate", value_name = "X")]
    pub rate: Option<f64>,

    /// Commit a seek to this position (ms)
    #[arg(short = 's', long = "seek", value_name = "MS")]
    pub seek: Option<i64>,

    /// Step by N frames (negative = backward)
    #[arg(long = "step", value_name = "N", allow_hyphen_values = true)]
    pub step: Option<i32>,

    /// Simulate a position drag from FROM to TO ms with STEPS moves
    #[arg(long = "scrub", value_names = ["FROM", "TO", "STEPS"], num_args = 3)]
    pub scrub: Option<Vec<i64>>,

    /// Print events as JSON lines
    #[arg(short = 'j', long = "json")]
    pub json: bool,

    /// Enable debug logging to file (default: scrubline.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Write the effective engine config to the config dir and exit
    #[arg(long = "write-config")]
    pub write_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "scrubline", "shot.%04d.png", "-a", "--play-ms", "250", "--seek", "1200", "--step", "-2", "--scrub",
            "0", "5000", "10", "-vv", "--json",
        ])
        .unwrap();
        assert_eq!(args.file_path, PathBuf::from("shot.%04d.png"));
        assert!(args.autoplay);
        assert_eq!(args.play_ms, 250);
        assert_eq!(args.seek, Some(1200));
        assert_eq!(args.step, Some(-2));
        assert_eq!(args.scrub, Some(vec![0, 5000, 10]));
        assert_eq!(args.verbosity, 2);
        assert!(args.json);
        assert!(args.log_file.is_none());
    }

    #[test]
    fn test_log_flag_without_value() {
        let args = Args::try_parse_from(["scrubline", "clip.mp4", "--log"]).unwrap();
        assert_eq!(args.log_file, Some(None));
    }

    #[test]
    fn test_file_required() {
        assert!(Args::try_parse_from(["scrubline"]).is_err());
    }
}
