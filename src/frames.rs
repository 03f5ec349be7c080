use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use walkdir::WalkDir;

use crate::board::RenderBoard;
use crate::game::BoardPosition;
use crate::ReelError;

pub const FRAME_PREFIX: &str = "frame_";
pub const FRAME_EXT: &str = "png";

/// Path of the frame for position `index`. The unpadded zero-based index in
/// the name is the one and only ordering key: the encoder consumes these
/// files through a `frame_%d.png` template, so the naming must stay in sync
/// with [`frame_index`].
pub fn frame_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{FRAME_PREFIX}{index}.{FRAME_EXT}"))
}

/// Inverse of [`frame_path`]: the index encoded in a frame file name, or
/// `None` for names that the encoder's numeric template would not match
/// (wrong prefix/extension, non-digits, or padded digits like `007`).
fn frame_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(FRAME_PREFIX)?.strip_suffix(".png")?;
    let index: usize = digits.parse().ok()?;
    (index.to_string() == digits).then_some(index)
}

/// Outcome of inspecting the frame directory against the current game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageState {
    /// A complete, correctly indexed set exists; paths are in ascending
    /// frame-index order and can feed the encoder as-is.
    Reuse(Vec<PathBuf>),
    /// Missing, wrong-sized, or mis-indexed set; it must be cleared and
    /// rebuilt from scratch.
    Regenerate,
}

/// Decide whether the on-disk frame set can be reused for a game with
/// `expected` positions.
///
/// Only entries matching the frame naming contract count; the run summary or
/// other stray files are ignored. Ordering comes from the index parsed out of
/// each name, never from directory-listing order, and a reusable set must
/// cover exactly the indices `0..expected-1`.
pub fn inspect_storage(dir: &Path, expected: usize) -> StorageState {
    if expected == 0 || !dir.is_dir() {
        return StorageState::Regenerate;
    }

    let mut indexed: Vec<(usize, PathBuf)> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let path = e.into_path();
            let index = frame_index(path.file_name()?.to_str()?)?;
            Some((index, path))
        })
        .collect();

    if indexed.len() != expected {
        return StorageState::Regenerate;
    }

    indexed.sort_by_key(|(index, _)| *index);
    let contiguous = indexed
        .iter()
        .enumerate()
        .all(|(want, (got, _))| want == *got);
    if !contiguous {
        return StorageState::Regenerate;
    }

    StorageState::Reuse(indexed.into_iter().map(|(_, path)| path).collect())
}

/// Remove every frame file from the directory, leaving other files (like the
/// run summary) alone. A stale set is always discarded in full; partial sets
/// are never merged with fresh output.
pub fn clear_frames(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)
        .with_context(|| format!("reading frame directory {}", dir.display()))?
        .flatten()
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
            if name.starts_with(FRAME_PREFIX) && name.ends_with(".png") {
                fs::remove_file(&path)
                    .with_context(|| format!("removing stale frame {}", path.display()))?;
            }
        }
    }
    Ok(())
}

/// Pacing for sustained production: a fixed pause before every `every`-th
/// frame keeps the renderer from being hammered for minutes on end.
#[derive(Debug, Clone)]
pub struct Throttle {
    every: usize,
    pause: Duration,
}

impl Throttle {
    pub fn new(every: usize, pause: Duration) -> Self {
        Self { every, pause }
    }

    /// Whether production pauses before frame `index`. Never fires for the
    /// first frame.
    pub fn applies_at(&self, index: usize) -> bool {
        self.every != 0 && index != 0 && index % self.every == 0
    }

    fn pause_before(&self, index: usize) {
        if self.applies_at(index) {
            thread::sleep(self.pause);
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(2))
    }
}

/// Render every position into `dir`, strictly in play order: frame `i` is
/// written and confirmed before frame `i+1` starts, so the indices in the
/// directory never have gaps. Any renderer failure aborts the whole step;
/// whatever was already written stays on disk as an obviously incomplete
/// (and therefore stale) set.
///
/// `progress` is called once per completed frame with `(done, total)`.
pub fn render_frames<R, F>(
    renderer: &R,
    positions: &[BoardPosition],
    dir: &Path,
    throttle: &Throttle,
    mut progress: F,
) -> Result<Vec<PathBuf>>
where
    R: RenderBoard + ?Sized,
    F: FnMut(usize, usize),
{
    fs::create_dir_all(dir)
        .with_context(|| format!("creating frame directory {}", dir.display()))?;

    let total = positions.len();
    let mut frames = Vec::with_capacity(total);
    for (index, position) in positions.iter().enumerate() {
        throttle.pause_before(index);

        let path = frame_path(dir, index);
        renderer.render(position, &path).map_err(|e| ReelError::Render {
            ply: position.ply,
            message: e.to_string(),
        })?;
        frames.push(path);
        progress(index + 1, total);
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_positions, CountingRenderer, TempDir};
    use anyhow::anyhow;

    struct FailingRenderer {
        fail_at_ply: usize,
    }

    impl RenderBoard for FailingRenderer {
        fn render(&self, position: &BoardPosition, out: &Path) -> Result<()> {
            if position.ply == self.fail_at_ply {
                return Err(anyhow!("synthetic renderer failure"));
            }
            fs::write(out, b"frame")?;
            Ok(())
        }
    }

    fn touch_frames(dir: &Path, indices: &[usize]) {
        fs::create_dir_all(dir).unwrap();
        for index in indices {
            fs::write(frame_path(dir, *index), b"frame").unwrap();
        }
    }

    #[test]
    fn missing_directory_regenerates() {
        let dir = TempDir::new("inspect_missing");
        let missing = dir.path().join("nope");
        assert_eq!(inspect_storage(&missing, 3), StorageState::Regenerate);
    }

    #[test]
    fn count_mismatch_regenerates() {
        let dir = TempDir::new("inspect_mismatch");
        touch_frames(dir.path(), &[0, 1, 2]);
        assert_eq!(inspect_storage(dir.path(), 5), StorageState::Regenerate);
    }

    #[test]
    fn matching_set_is_reused_in_numeric_order() {
        let dir = TempDir::new("inspect_order");
        let indices: Vec<usize> = (0..12).collect();
        touch_frames(dir.path(), &indices);
        fs::write(dir.path().join("reel.md"), b"summary").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        match inspect_storage(dir.path(), 12) {
            StorageState::Reuse(frames) => {
                assert_eq!(frames.len(), 12);
                for (i, path) in frames.iter().enumerate() {
                    // Lexicographic listing would put frame_10 before frame_2.
                    assert_eq!(path.file_name().unwrap().to_str().unwrap(), format!("frame_{i}.png"));
                }
            }
            StorageState::Regenerate => panic!("expected reuse"),
        }
    }

    #[test]
    fn index_gap_with_matching_count_is_stale() {
        let dir = TempDir::new("inspect_gap");
        touch_frames(dir.path(), &[0, 1, 3]);
        assert_eq!(inspect_storage(dir.path(), 3), StorageState::Regenerate);
    }

    #[test]
    fn padded_indices_do_not_match_the_template() {
        let dir = TempDir::new("inspect_padded");
        touch_frames(dir.path(), &[0]);
        fs::write(dir.path().join("frame_01.png"), b"frame").unwrap();
        assert_eq!(inspect_storage(dir.path(), 2), StorageState::Regenerate);
    }

    #[test]
    fn clear_removes_only_frame_files() {
        let dir = TempDir::new("clear");
        touch_frames(dir.path(), &[0, 1]);
        fs::write(dir.path().join("reel.md"), b"summary").unwrap();

        clear_frames(dir.path()).unwrap();

        let remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(remaining, vec!["reel.md"]);
    }

    #[test]
    fn throttle_pauses_exactly_after_every_thousandth_frame() {
        let throttle = Throttle::default();
        let pauses: Vec<usize> = (0..2500).filter(|i| throttle.applies_at(*i)).collect();
        assert_eq!(pauses, vec![1000, 2000]);

        let short: Vec<usize> = (0..999).filter(|i| throttle.applies_at(*i)).collect();
        assert!(short.is_empty());
    }

    #[test]
    fn renders_one_frame_per_position_in_play_order() {
        let dir = TempDir::new("render_order");
        let positions = sample_positions(5);
        let renderer = CountingRenderer::default();
        let mut reported = Vec::new();

        let frames = render_frames(
            &renderer,
            &positions,
            dir.path(),
            &Throttle::new(1000, Duration::ZERO),
            |done, total| reported.push((done, total)),
        )
        .unwrap();

        assert_eq!(frames.len(), 5);
        for (i, path) in frames.iter().enumerate() {
            assert!(path.ends_with(format!("frame_{i}.png")));
            assert!(path.is_file());
        }
        assert_eq!(renderer.rendered_plies(), vec![1, 2, 3, 4, 5]);
        assert_eq!(reported, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
    }

    #[test]
    fn renderer_failure_aborts_the_whole_step() {
        let dir = TempDir::new("render_fail");
        let positions = sample_positions(5);
        let renderer = FailingRenderer { fail_at_ply: 3 };

        let err = render_frames(
            &renderer,
            &positions,
            dir.path(),
            &Throttle::new(1000, Duration::ZERO),
            |_, _| {},
        )
        .unwrap_err();

        let reel = err.downcast_ref::<ReelError>().expect("typed error");
        assert!(matches!(reel, ReelError::Render { ply: 3, .. }));

        // The incomplete set stays behind and reads as stale next run.
        assert!(frame_path(dir.path(), 0).is_file());
        assert!(frame_path(dir.path(), 1).is_file());
        assert!(!frame_path(dir.path(), 2).exists());
        assert_eq!(inspect_storage(dir.path(), 5), StorageState::Regenerate);
    }
}
