//! Stereo pair discovery.
//!
//! Each stream directory holds frames named `<timestamp>_undistorted.jpg`.
//! A pair exists for every timestamp present in both directories. Pairs are
//! ordered by the textual timestamp, so `"10"` sorts before `"2"`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

/// Filename suffix of undistorted stream frames.
pub const IMAGE_SUFFIX: &str = "_undistorted.jpg";

/// Left/right frames captured at the same timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StereoPair {
    pub timestamp: String,
    pub left: PathBuf,
    pub right: PathBuf,
}

impl StereoPair {
    /// Name of the per-pair output directory, e.g. `pair_44335766666666`.
    pub fn output_dir_name(&self) -> String {
        format!("pair_{}", self.timestamp)
    }

    pub fn images(&self) -> [PathBuf; 2] {
        [self.left.clone(), self.right.clone()]
    }
}

/// Timestamp key of a frame filename: everything before the first `_`.
pub fn timestamp_from_filename(name: &str) -> &str {
    name.split_once('_').map_or(name, |(key, _)| key)
}

/// Find timestamp-matched pairs using the default frame suffix.
pub fn find_stereo_pairs(left_dir: &Path, right_dir: &Path) -> Result<Vec<StereoPair>> {
    find_stereo_pairs_with_suffix(left_dir, right_dir, IMAGE_SUFFIX)
}

pub fn find_stereo_pairs_with_suffix(
    left_dir: &Path,
    right_dir: &Path,
    suffix: &str,
) -> Result<Vec<StereoPair>> {
    let left = index_frames(left_dir, suffix)?;
    let mut right = index_frames(right_dir, suffix)?;

    let pairs: Vec<StereoPair> = left
        .into_iter()
        .filter_map(|(timestamp, left)| {
            right.remove(&timestamp).map(|right| StereoPair {
                timestamp,
                left,
                right,
            })
        })
        .collect();

    log::debug!(
        "matched {} pairs between {} and {}",
        pairs.len(),
        left_dir.display(),
        right_dir.display()
    );
    Ok(pairs)
}

/// Map timestamp key to frame path for one stream directory.
///
/// Entries are visited in filename order; a repeated key keeps the last
/// frame seen.
fn index_frames(dir: &Path, suffix: &str) -> Result<BTreeMap<String, PathBuf>> {
    let mut names = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            log::debug!("skipping non UTF-8 filename {}", path.display());
            continue;
        };
        if name.ends_with(suffix) && path.is_file() {
            names.push((name, path));
        }
    }
    names.sort();

    let mut frames = BTreeMap::new();
    for (name, path) in names {
        frames.insert(timestamp_from_filename(&name).to_string(), path);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"jpg").unwrap();
    }

    #[test]
    fn timestamp_is_prefix_before_first_underscore() {
        assert_eq!(
            timestamp_from_filename("44335766666666_undistorted.jpg"),
            "44335766666666"
        );
        assert_eq!(timestamp_from_filename("a_b_undistorted.jpg"), "a");
        assert_eq!(timestamp_from_filename("nounderscore.jpg"), "nounderscore.jpg");
        assert_eq!(timestamp_from_filename("_undistorted.jpg"), "");
    }

    #[test]
    fn output_dir_name_uses_timestamp() {
        let pair = StereoPair {
            timestamp: "44335766666666".to_string(),
            left: PathBuf::from("l"),
            right: PathBuf::from("r"),
        };
        assert_eq!(pair.output_dir_name(), "pair_44335766666666");
    }

    #[test]
    fn ignores_files_without_suffix_and_directories() {
        let left = tempfile::tempdir().unwrap();
        let right = tempfile::tempdir().unwrap();
        touch(left.path(), "1_undistorted.jpg");
        touch(left.path(), "2_raw.jpg");
        fs::create_dir(left.path().join("3_undistorted.jpg")).unwrap();
        touch(right.path(), "1_undistorted.jpg");
        touch(right.path(), "2_raw.jpg");
        touch(right.path(), "3_undistorted.jpg");

        let pairs = find_stereo_pairs(left.path(), right.path()).unwrap();
        let keys: Vec<&str> = pairs.iter().map(|p| p.timestamp.as_str()).collect();
        assert_eq!(keys, vec!["1"]);
    }

    #[test]
    fn duplicate_key_keeps_last_filename() {
        let left = tempfile::tempdir().unwrap();
        let right = tempfile::tempdir().unwrap();
        touch(left.path(), "7_a_undistorted.jpg");
        touch(left.path(), "7_undistorted.jpg");
        touch(right.path(), "7_undistorted.jpg");

        let pairs = find_stereo_pairs(left.path(), right.path()).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].left, left.path().join("7_undistorted.jpg"));
    }

    #[test]
    fn custom_suffix_is_honoured() {
        let left = tempfile::tempdir().unwrap();
        let right = tempfile::tempdir().unwrap();
        touch(left.path(), "5_rect.png");
        touch(right.path(), "5_rect.png");
        touch(right.path(), "5_undistorted.jpg");

        let pairs = find_stereo_pairs_with_suffix(left.path(), right.path(), "_rect.png").unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].right, right.path().join("5_rect.png"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let right = tempfile::tempdir().unwrap();
        let missing = right.path().join("absent");
        assert!(find_stereo_pairs(&missing, right.path()).is_err());
    }
}
