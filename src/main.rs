use anyhow::{anyhow, Context, Result};
use chessreel::{
    is_ffmpeg_on_path, playback_rate, AppConfig, Progress, ProgressPhase, ReelGenerator,
};
use clap::Parser;
use dialoguer::{FuzzySelect, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use walkdir::WalkDir;

fn load_config() -> Result<AppConfig> {
    // Look for chessreel.json in app support, current dir fallback, then built-in default
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(mut d) = dirs::data_dir() {
        d.push("chessreel");
        d.push("chessreel.json");
        tried.push(d);
    }
    tried.push(PathBuf::from("chessreel.json"));

    for p in &tried {
        if p.exists() {
            let text =
                fs::read_to_string(p).with_context(|| format!("reading config {}", p.display()))?;
            let cfg: AppConfig = serde_json::from_str(&text).context("parsing config json")?;
            return Ok(cfg);
        }
    }

    // Built-in defaults
    Ok(AppConfig::default())
}

#[derive(Parser, Debug)]
#[command(version, about = "Turn a PGN chess game into an mp4 replay video.")]
struct Args {
    /// Input PGN game file
    input: Option<PathBuf>,

    /// Output video file (defaults to <game>.mp4)
    out: Option<PathBuf>,

    /// Playback duration of the finished video, in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Directory holding the rendered frames (defaults to <game>_frames)
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Board image edge in pixels (must be divisible by 8)
    #[arg(long)]
    board_size: Option<u32>,

    /// Use the default preset
    #[arg(long, default_value_t = false, conflicts_with_all = &["short", "long"])]
    default: bool,

    /// Use the short preset (quick, small reel)
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["default", "long"])]
    short: bool,

    /// Use the long preset (slow, large reel)
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["default", "short"])]
    long: bool,

    /// Discard any cached frames and re-render everything
    #[arg(long, default_value_t = false)]
    fresh: bool,

    /// Log details to standard output
    #[arg(long, default_value_t = false)]
    log_details: bool,
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    let is_interactive = !(args.default || args.short || args.long);

    if !is_ffmpeg_on_path() {
        return Err(anyhow!(
            "ffmpeg is required for video encoding, but was not found on PATH"
        ));
    }

    // --- Interactive Prompts ---
    if args.input.is_none() {
        if !is_interactive {
            return Err(anyhow!("Input file must be provided when using a preset."));
        }
        let files = find_pgn_files()?;
        if files.is_empty() {
            return Err(anyhow!("No .pgn files found in current directory."));
        }
        let selection = FuzzySelect::with_theme(&dialoguer::theme::ColorfulTheme::default())
            .with_prompt("Choose a game file")
            .default(0)
            .items(&files)
            .interact()?;
        args.input = Some(PathBuf::from(&files[selection]));
    }

    let input_path = args.input.as_ref().unwrap();

    // Load config and decide preset
    let cfg = load_config()?;
    let generator = ReelGenerator::with_config(cfg.clone())?;

    let active_preset_name = if args.short {
        "short"
    } else if args.long {
        "long"
    } else {
        cfg.default_preset.as_str()
    };
    let active = cfg
        .presets
        .get(active_preset_name)
        .ok_or_else(|| anyhow!(format!("Missing preset '{}' in config", active_preset_name)))?;

    if is_interactive {
        if args.duration.is_none() {
            args.duration = Some(
                Input::new()
                    .with_prompt("Playback duration (seconds)")
                    .default(active.duration_secs)
                    .interact()?,
            );
        }

        if args.board_size.is_none() {
            args.board_size = Some(
                Input::new()
                    .with_prompt("Board size (pixels)")
                    .default(active.board_size)
                    .interact()?,
            );
        }
    }

    let duration = args.duration.unwrap_or(active.duration_secs);
    let board_size = args.board_size.unwrap_or(active.board_size);
    if !duration.is_finite() || duration <= 0.0 {
        return Err(anyhow!("--duration must be a positive number of seconds"));
    }

    let stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("game");
    let out_path = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{stem}.mp4")));
    let frames_dir = args
        .frames_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{stem}_frames")));

    // --- Execution ---
    let game = generator.load_game(input_path)?;
    if game.positions.is_empty() {
        return Err(anyhow!(
            "{} contains no moves to render",
            input_path.display()
        ));
    }

    if out_path.exists() {
        println!(
            "Note: {} already exists and will be overwritten",
            out_path.display()
        );
    }

    println!(
        "Rendering {} positions from {}",
        game.positions.len(),
        input_path.display()
    );
    let renderer = generator.board_painter(board_size)?;

    let mut render_bar: Option<ProgressBar> = None;
    let mut encode_bar: Option<ProgressBar> = None;

    generator.generate_with_progress(
        &renderer,
        &game.positions,
        &frames_dir,
        &out_path,
        duration,
        args.fresh,
        |progress: Progress| match progress.phase {
            ProgressPhase::ReusingFrames => {
                println!("{}", progress.message);
            }
            ProgressPhase::RenderingFrames => {
                let bar = render_bar.get_or_insert_with(|| {
                    let pb = ProgressBar::new(progress.total as u64);
                    pb.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
                            .unwrap()
                            .progress_chars("#>-"),
                    );
                    pb.set_message("Rendering frames");
                    pb
                });
                bar.set_position(progress.completed as u64);
                if progress.completed == progress.total {
                    bar.finish_with_message("Frames rendered");
                }
            }
            ProgressPhase::EncodingVideo => {
                let bar = encode_bar.get_or_insert_with(|| {
                    let pb = ProgressBar::new(progress.total as u64);
                    pb.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
                            .unwrap()
                            .progress_chars("#>-"),
                    );
                    pb.set_message("Encoding video");
                    pb
                });
                bar.set_position(progress.completed as u64);
            }
            ProgressPhase::Complete => {
                if let Some(bar) = encode_bar.take() {
                    bar.finish_with_message("Done");
                }
            }
        },
    )?;

    println!("\nVideo generated in {}", out_path.display());

    // --- Create reel.md run summary ---
    let rate = playback_rate(game.positions.len(), duration)?;
    let unknown = "?".to_string();
    let mut details = format!(
        "Version: {}\nGame: {} vs {}\nPositions: {}\nDuration: {}s\nFrame rate: {}\nBoard size: {}",
        env!("CARGO_PKG_VERSION"),
        game.summary.white.as_ref().unwrap_or(&unknown),
        game.summary.black.as_ref().unwrap_or(&unknown),
        game.positions.len(),
        duration,
        rate,
        board_size
    );
    if let Some(event) = &game.summary.event {
        details.push_str(&format!("\nEvent: {}", event));
    }
    if let Some(result) = &game.summary.result {
        details.push_str(&format!("\nResult: {}", result));
    }

    let details_path = frames_dir.join("reel.md");
    fs::write(details_path, &details).context("writing run summary")?;

    if args.log_details {
        println!("\n--- Run Details ---");
        println!("{}", details);
    }

    Ok(())
}

fn find_pgn_files() -> Result<Vec<String>> {
    Ok(WalkDir::new(".")
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file()
                && e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pgn"))
        })
        .map(|e| e.path().to_str().unwrap_or("").to_string())
        .collect())
}
