//! # chessreel - chess game replay videos
//!
//! `chessreel` renders a chess game (PGN) into a sequence of board images
//! and encodes them with ffmpeg into one mp4 whose playback spans a
//! configured duration.
//!
//! ## Features
//!
//! - Parse a PGN and replay it into one board position per half-move
//! - Render positions to PNG frames with configurable board colors and size
//! - Reuse a complete frame set from a previous run, regenerate a stale one
//! - Derive the frame rate that maps the game length onto the target duration
//! - Encode through the system ffmpeg, with progress reporting throughout
//!
//! ## Example
//!
//! ```no_run
//! use chessreel::ReelGenerator;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let generator = ReelGenerator::new();
//! let game = generator.load_game(Path::new("game.pgn"))?;
//! let renderer = generator.board_painter(720)?;
//! generator.generate_with_progress(
//!     &renderer,
//!     &game.positions,
//!     Path::new("game_frames"),
//!     Path::new("game.mp4"),
//!     30.0,
//!     false,
//!     |progress| println!("{}", progress.message),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress Reporting
//!
//! The pipeline reports each phase through a callback:
//!
//! ```no_run
//! use chessreel::{Progress, ProgressPhase};
//!
//! fn show(progress: Progress) {
//!     match progress.phase {
//!         ProgressPhase::RenderingFrames => {
//!             println!("Rendering: {}/{} ({:.1}%)",
//!                 progress.completed, progress.total, progress.percentage);
//!         }
//!         ProgressPhase::ReusingFrames => println!("Reusing cached frames..."),
//!         ProgressPhase::EncodingVideo => {
//!             println!("Encoding: {}/{}", progress.completed, progress.total);
//!         }
//!         ProgressPhase::Complete => println!("Done!"),
//!     }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub mod board;
pub mod encode;
pub mod frames;
pub mod game;

pub use board::{parse_hex_color, BoardPainter, BoardTheme, RenderBoard};
pub use encode::{
    is_ffmpeg_on_path, playback_rate, start_encode, EncodeEvent, EncodeJob, EncodeSettings,
};
pub use frames::{clear_frames, frame_path, inspect_storage, render_frames, StorageState, Throttle};
pub use game::{parse_game, BoardPosition, GameSummary, ParsedGame};

/// Everything that can end a run, by failure class. Stale frame sets are not
/// errors; they silently trigger regeneration.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("game file not found: {}", .0.display())]
    GameFileMissing(PathBuf),

    #[error("invalid PGN: {0}")]
    InvalidPgn(String),

    #[error("game has no positions to render")]
    EmptyGame,

    #[error("playback duration must be a positive number of seconds, got {0}")]
    InvalidDuration(f64),

    #[error("rendering move {ply} failed: {message}")]
    Render { ply: usize, message: String },

    #[error("video encoding failed: {0}")]
    Encode(String),
}

/// Represents the current phase of a reel generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Rendering board positions into PNG frames
    RenderingFrames,
    /// A complete frame set from a previous run is being reused
    ReusingFrames,
    /// ffmpeg is consuming the frame set
    EncodingVideo,
    /// The video was written successfully
    Complete,
}

/// Progress information for a generation run, suitable for driving a
/// progress bar or any other UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    /// Current phase of the run
    pub phase: ProgressPhase,
    /// Items completed in the current phase
    pub completed: usize,
    /// Total items in the current phase (0 if unknown)
    pub total: usize,
    /// Percentage complete (0.0 to 100.0)
    pub percentage: f64,
    /// Human-readable message describing current status
    pub message: String,
}

impl Progress {
    pub fn rendering_frames(completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            phase: ProgressPhase::RenderingFrames,
            completed,
            total,
            percentage,
            message: format!("Rendering frame {} of {}", completed, total),
        }
    }

    pub fn reusing_frames(total: usize) -> Self {
        Self {
            phase: ProgressPhase::ReusingFrames,
            completed: total,
            total,
            percentage: 100.0,
            message: format!("Found {} cached frames, skipping rendering", total),
        }
    }

    pub fn encoding(completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            phase: ProgressPhase::EncodingVideo,
            completed,
            total,
            percentage,
            message: format!("Encoding, {:.0}% done", percentage),
        }
    }

    pub fn complete(total: usize) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: total,
            total,
            percentage: 100.0,
            message: format!("Video generated from {} frames", total),
        }
    }
}

/// One named bundle of run settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Preset {
    pub duration_secs: f64,
    pub board_size: u32,
}

fn default_light() -> String {
    "#F0D9B5".to_string()
}
fn default_dark() -> String {
    "#B58863".to_string()
}
fn default_white_pieces() -> String {
    "#FAFAFA".to_string()
}
fn default_black_pieces() -> String {
    "#1C1C1C".to_string()
}

/// Board appearance, as written in the config file.
#[derive(Debug, Deserialize, Clone)]
pub struct BoardStyle {
    #[serde(default = "default_light")]
    pub light: String,
    #[serde(default = "default_dark")]
    pub dark: String,
    #[serde(default = "default_white_pieces")]
    pub white_pieces: String,
    #[serde(default = "default_black_pieces")]
    pub black_pieces: String,
    /// Optional TTF/OTF with the Unicode chess glyphs; the built-in
    /// letterforms are used when unset.
    #[serde(default)]
    pub piece_font: Option<PathBuf>,
}

impl Default for BoardStyle {
    fn default() -> Self {
        Self {
            light: default_light(),
            dark: default_dark(),
            white_pieces: default_white_pieces(),
            black_pieces: default_black_pieces(),
            piece_font: None,
        }
    }
}

/// Application configuration with presets and board appearance
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub presets: HashMap<String, Preset>,
    pub default_preset: String,
    #[serde(default)]
    pub board: BoardStyle,
}

impl Default for AppConfig {
    fn default() -> Self {
        let default_json = r##"{
            "presets": {
                "default": {"duration_secs": 30.0,  "board_size": 720},
                "short":   {"duration_secs": 10.0,  "board_size": 480},
                "long":    {"duration_secs": 120.0, "board_size": 1080}
            },
            "default_preset": "default",
            "board": {
                "light": "#F0D9B5",
                "dark": "#B58863",
                "white_pieces": "#FAFAFA",
                "black_pieces": "#1C1C1C"
            }
        }"##;
        serde_json::from_str(default_json).unwrap()
    }
}

impl AppConfig {
    fn validate(&self) -> Result<()> {
        if !self.presets.contains_key(&self.default_preset) {
            anyhow::bail!("default preset '{}' is not defined", self.default_preset);
        }
        for (name, preset) in &self.presets {
            if !preset.duration_secs.is_finite() || preset.duration_secs <= 0.0 {
                return Err(ReelError::InvalidDuration(preset.duration_secs))
                    .with_context(|| format!("preset '{}'", name));
            }
            if preset.board_size < 64 || preset.board_size % 8 != 0 {
                anyhow::bail!(
                    "preset '{}': board size must be at least 64 and divisible by 8, got {}",
                    name,
                    preset.board_size
                );
            }
        }
        BoardTheme::from_style(&self.board).context("board colors")?;
        Ok(())
    }
}

/// Main entry point: holds the configuration and sequences the pipeline
/// from PGN text to encoded video.
pub struct ReelGenerator {
    config: AppConfig,
}

impl ReelGenerator {
    /// Create a generator with the built-in default configuration.
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    /// Create a generator with custom configuration.
    pub fn with_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Load configuration from a JSON file.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&text).context("parsing config json")?;
        Self::with_config(config)
    }

    /// Get the current configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Read and parse the game record. The file must exist and hold a
    /// playable PGN; either failure is fatal for the run.
    pub fn load_game(&self, path: &Path) -> Result<ParsedGame> {
        if !path.is_file() {
            return Err(ReelError::GameFileMissing(path.to_path_buf()).into());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        parse_game(&text)
    }

    /// Build the board renderer for the configured style at `board_size`
    /// pixels.
    pub fn board_painter(&self, board_size: u32) -> Result<BoardPainter> {
        let theme = BoardTheme::from_style(&self.config.board)?;
        let painter = BoardPainter::new(board_size, theme)?;
        match &self.config.board.piece_font {
            Some(font) => painter.with_piece_font(font),
            None => Ok(painter),
        }
    }

    /// Make the frame set match the game: reuse a complete existing set, or
    /// discard whatever is there and render every position from scratch.
    /// `fresh` forces regeneration even when the cached set looks complete.
    ///
    /// Returns the frame paths in play order. Running this twice with an
    /// unchanged game leaves the renderer untouched on the second run.
    pub fn prepare_frames<R, F>(
        &self,
        renderer: &R,
        positions: &[BoardPosition],
        frames_dir: &Path,
        fresh: bool,
        mut progress: F,
    ) -> Result<Vec<PathBuf>>
    where
        R: RenderBoard + ?Sized,
        F: FnMut(Progress),
    {
        if positions.is_empty() {
            return Err(ReelError::EmptyGame.into());
        }

        if !fresh {
            if let StorageState::Reuse(cached) = inspect_storage(frames_dir, positions.len()) {
                progress(Progress::reusing_frames(cached.len()));
                return Ok(cached);
            }
        }

        clear_frames(frames_dir)?;
        render_frames(
            renderer,
            positions,
            frames_dir,
            &Throttle::default(),
            |done, total| progress(Progress::rendering_frames(done, total)),
        )
    }

    /// Run the whole pipeline: frames (cached or freshly rendered), playback
    /// rate, then the ffmpeg encode, forwarding every progress update to the
    /// callback until the encoder reports its terminal state.
    pub fn generate_with_progress<R, F>(
        &self,
        renderer: &R,
        positions: &[BoardPosition],
        frames_dir: &Path,
        out_path: &Path,
        duration_secs: f64,
        fresh: bool,
        mut progress: F,
    ) -> Result<()>
    where
        R: RenderBoard + ?Sized,
        F: FnMut(Progress),
    {
        let frames = self.prepare_frames(renderer, positions, frames_dir, fresh, &mut progress)?;
        let fps = playback_rate(frames.len(), duration_secs)?;

        let settings = EncodeSettings {
            frames_dir: frames_dir.to_path_buf(),
            out_path: out_path.to_path_buf(),
            fps,
        };
        let job = start_encode(&settings)?;

        let total = frames.len();
        for event in job.events().iter() {
            match event {
                EncodeEvent::Started { .. } => progress(Progress::encoding(0, total)),
                EncodeEvent::Progress { frames_done } => {
                    progress(Progress::encoding((frames_done as usize).min(total), total));
                }
                EncodeEvent::Finished => progress(Progress::complete(total)),
                // The terminal failure is surfaced through wait() below.
                EncodeEvent::Failed { .. } => {}
            }
        }

        job.wait()
    }
}

impl Default for ReelGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::game::{parse_game, BoardPosition};
    use super::RenderBoard;
    use anyhow::Result;
    use std::cell::RefCell;
    use std::fmt::Write as _;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

    /// Unique scratch directory, removed on drop.
    pub struct TempDir {
        path: PathBuf,
    }

    impl TempDir {
        pub fn new(label: &str) -> Self {
            let stamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();
            let seq = NEXT_DIR.fetch_add(1, Ordering::SeqCst);
            let path = std::env::temp_dir().join(format!(
                "chessreel_{}_{}_{}_{}",
                label,
                std::process::id(),
                stamp,
                seq
            ));
            fs::create_dir_all(&path).unwrap();
            Self { path }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    /// Renderer fake that records the ply of every invocation and writes a
    /// placeholder file where the real PNG would go.
    #[derive(Default)]
    pub struct CountingRenderer {
        calls: RefCell<Vec<usize>>,
    }

    impl CountingRenderer {
        pub fn rendered_plies(&self) -> Vec<usize> {
            self.calls.borrow().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl RenderBoard for CountingRenderer {
        fn render(&self, position: &BoardPosition, out: &Path) -> Result<()> {
            self.calls.borrow_mut().push(position.ply);
            fs::write(out, b"frame")?;
            Ok(())
        }
    }

    /// A legal position sequence of arbitrary length: both sides shuffle
    /// their kingside knights out and back.
    pub fn sample_positions(n: usize) -> Vec<BoardPosition> {
        let cycle = ["Nf3", "Nf6", "Ng1", "Ng8"];
        let mut text = String::from("[Event \"Sample\"]\n\n");
        for i in 0..n {
            if i % 2 == 0 {
                let _ = write!(text, "{}. ", i / 2 + 1);
            }
            text.push_str(cycle[i % 4]);
            text.push(' ');
        }
        let positions = parse_game(&text).unwrap().positions;
        assert_eq!(positions.len(), n);
        positions
    }
}
