//! Plot file registration: filename grammar, directory scanning, on-disk
//! stagger layout. Grounded in creepMiner's `MinerConfig::addPlotLocation`
//! / `PlotFile` (see examples/original_source/src/MinerConfig.hpp). The
//! existing plot format is consumed bit-for-bit, not redesigned.

use crate::error::PlotError;
use std::fs;
use std::path::{Path, PathBuf};

pub const SCOOP_SIZE: usize = 64;
pub const NUM_SCOOPS: usize = 4096;
pub const NONCE_SIZE: usize = NUM_SCOOPS * SCOOP_SIZE;

/// A single registered plot file. Immutable once built by [`PlotRegistry`].
#[derive(Debug, Clone)]
pub struct PlotFile {
    pub path: PathBuf,
    pub account_id: u64,
    pub start_nonce: u64,
    pub nonces: u64,
    pub stagger: u64,
    pub size: u64,
}

impl PlotFile {
    /// Parses `account_startNonce_nonces_stagger` and validates the file's
    /// actual size against `nonces * NONCE_SIZE`.
    pub fn from_path(path: &Path) -> Result<PlotFile, PlotError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PlotError::BadFilename(path.display().to_string()))?;

        let parts: Vec<&str> = name.split('_').collect();
        if parts.len() != 4 {
            return Err(PlotError::BadFilename(name.to_owned()));
        }

        let account_id: u64 = parts[0].parse().map_err(|_| PlotError::BadFilename(name.to_owned()))?;
        let start_nonce: u64 = parts[1].parse().map_err(|_| PlotError::BadFilename(name.to_owned()))?;
        let nonces: u64 = parts[2].parse().map_err(|_| PlotError::BadFilename(name.to_owned()))?;
        let stagger: u64 = parts[3].parse().map_err(|_| PlotError::BadFilename(name.to_owned()))?;

        if nonces == 0 || stagger == 0 || nonces % stagger != 0 {
            return Err(PlotError::BadFilename(name.to_owned()));
        }

        let metadata = fs::metadata(path)?;
        let actual = metadata.len();
        let expected = nonces * NONCE_SIZE as u64;
        if actual != expected {
            return Err(PlotError::SizeMismatch {
                path: path.display().to_string(),
                expected,
                actual,
            });
        }

        Ok(PlotFile {
            path: path.to_path_buf(),
            account_id,
            start_nonce,
            nonces,
            stagger,
            size: actual,
        })
    }

    /// Number of staggers the file is divided into.
    pub fn num_staggers(&self) -> u64 {
        self.nonces / self.stagger
    }

    /// Byte size of a single stagger.
    pub fn stagger_size(&self) -> u64 {
        self.stagger * NONCE_SIZE as u64
    }

    /// Byte offset, within one stagger, of the contiguous `stagger * 64`-byte
    /// block holding scoop `scoop_number` for every nonce in that stagger.
    pub fn scoop_offset_in_stagger(&self, scoop_number: u32) -> u64 {
        scoop_number as u64 * self.stagger * SCOOP_SIZE as u64
    }
}

/// Resolves the `plots:` config entries into validated [`PlotFile`]s.
///
/// Directories are scanned recursively; files that don't match the naming
/// grammar, or whose size disagrees with the filename, are logged and
/// skipped rather than aborting startup.
#[derive(Debug, Clone, Default)]
pub struct PlotRegistry {
    plots: Vec<PlotFile>,
}

impl PlotRegistry {
    pub fn scan(locations: &[String]) -> PlotRegistry {
        let mut plots = Vec::new();
        for location in locations {
            scan_location(Path::new(location), &mut plots);
        }
        PlotRegistry { plots }
    }

    pub fn plots(&self) -> &[PlotFile] {
        &self.plots
    }

    pub fn total_size(&self) -> u64 {
        self.plots.iter().map(|p| p.size).sum()
    }

    pub fn total_nonces(&self) -> u64 {
        self.plots.iter().map(|p| p.nonces).sum()
    }
}

fn scan_location(path: &Path, out: &mut Vec<PlotFile>) {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            error!("plot location unreadable, skipping: path={}, err={}", path.display(), e);
            return;
        }
    };

    if metadata.is_file() {
        match PlotFile::from_path(path) {
            Ok(plot) => {
                info!(
                    "registered plot: path={}, account={}, start_nonce={}, nonces={}, stagger={}",
                    plot.path.display(),
                    plot.account_id,
                    plot.start_nonce,
                    plot.nonces,
                    plot.stagger
                );
                out.push(plot);
            }
            Err(e) => warn!("skipping plot file: path={}, err={}", path.display(), e),
        }
        return;
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            error!("can't scan plot directory: path={}, err={}", path.display(), e);
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                error!("directory entry unreadable: err={}", e);
                continue;
            }
        };
        scan_location(&entry.path(), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_plot(dir: &Path, name: &str, size: u64) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        let chunk = vec![0u8; 4096];
        let mut written = 0u64;
        while written < size {
            let to_write = std::cmp::min(chunk.len() as u64, size - written) as usize;
            f.write_all(&chunk[..to_write]).unwrap();
            written += to_write as u64;
        }
        path
    }

    #[test]
    fn parses_well_formed_filename() {
        let dir = tempdir().unwrap();
        let size = 2 * NONCE_SIZE as u64;
        let path = write_plot(dir.path(), "1337_0_2_2", size);
        let plot = PlotFile::from_path(&path).unwrap();
        assert_eq!(plot.account_id, 1337);
        assert_eq!(plot.start_nonce, 0);
        assert_eq!(plot.nonces, 2);
        assert_eq!(plot.stagger, 2);
        assert_eq!(plot.num_staggers(), 1);
    }

    #[test]
    fn rejects_malformed_filename() {
        let dir = tempdir().unwrap();
        let path = write_plot(dir.path(), "not_a_plot_file", 10);
        assert!(PlotFile::from_path(&path).is_err());
    }

    #[test]
    fn rejects_size_mismatch() {
        let dir = tempdir().unwrap();
        let path = write_plot(dir.path(), "1337_0_2_2", NONCE_SIZE as u64);
        match PlotFile::from_path(&path) {
            Err(PlotError::SizeMismatch { .. }) => {}
            other => panic!("expected size mismatch, got {:?}", other),
        }
    }

    #[test]
    fn rejects_nonces_not_multiple_of_stagger() {
        let dir = tempdir().unwrap();
        let path = write_plot(dir.path(), "1337_0_3_2", 3 * NONCE_SIZE as u64);
        assert!(PlotFile::from_path(&path).is_err());
    }

    #[test]
    fn scan_recurses_directories_and_skips_bad_files() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        write_plot(&sub, "1_0_1_1", NONCE_SIZE as u64);
        write_plot(dir.path(), "garbage.txt", 10);

        let registry = PlotRegistry::scan(&[dir.path().to_string_lossy().into_owned()]);
        assert_eq!(registry.plots().len(), 1);
        assert_eq!(registry.total_nonces(), 1);
    }
}
