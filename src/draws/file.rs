//! Directory-backed draw store.
//!
//! Layout under the root:
//!
//! - `RandomChange/<n_levels>.json`: non-parametric change draws
//! - `SFH_<age>_<n>_<sigmaReg>_<tauEq>_<tauIn>_<sigmaDyn>_<tauDyn>.json`: regulator draws
//! - `READY`: name of the family whose draws are complete
//!
//! Entries are written to a sibling `.tmp` file and renamed into place, so a reader
//! sees either the previous entry or the new one.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::StochasticFamily;
use crate::draws::store::ensure_finite;
use crate::draws::{DrawKey, DrawStore, Namespace};
use crate::error::AppError;

const ENTRY_FORMAT: &str = "sfh-draws/1";
const READY_FILE: &str = "READY";

/// On-disk entry: a row-major matrix with its shape.
#[derive(Debug, Serialize, Deserialize)]
struct DrawFile {
    format: String,
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct FileDrawStore {
    root: PathBuf,
}

impl FileDrawStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &DrawKey) -> PathBuf {
        self.root.join(key.relative_path())
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> AppError {
    AppError::config(format!("Failed to {action} '{}': {e}", path.display()))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| io_error("create directory", dir, e))?;
    }
    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp).map_err(|e| io_error("create", &tmp, e))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes).map_err(|e| io_error("write", &tmp, e))?;
        writer.flush().map_err(|e| io_error("write", &tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| io_error("move into place", path, e))
}

impl DrawStore for FileDrawStore {
    fn get(&self, key: &DrawKey) -> Result<Option<DMatrix<f64>>, AppError> {
        let path = self.entry_path(key);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("open", &path, e)),
        };
        let entry: DrawFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| AppError::config(format!("Failed to parse '{}': {e}", path.display())))?;

        if entry.format != ENTRY_FORMAT {
            return Err(AppError::config(format!(
                "'{}' has format '{}' (expected '{ENTRY_FORMAT}').",
                path.display(),
                entry.format
            )));
        }
        if entry.rows.checked_mul(entry.cols) != Some(entry.values.len()) {
            return Err(AppError::config(format!(
                "'{}' declares {}x{} but stores {} values.",
                path.display(),
                entry.rows,
                entry.cols,
                entry.values.len()
            )));
        }
        Ok(Some(DMatrix::from_row_slice(entry.rows, entry.cols, &entry.values)))
    }

    fn put(&self, key: &DrawKey, draws: &DMatrix<f64>) -> Result<(), AppError> {
        ensure_finite(key, draws)?;
        let entry = DrawFile {
            format: ENTRY_FORMAT.to_string(),
            rows: draws.nrows(),
            cols: draws.ncols(),
            values: draws.transpose().iter().copied().collect(),
        };
        let path = self.entry_path(key);
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| AppError::config(format!("Failed to encode draws for {key}: {e}")))?;
        write_atomic(&path, &bytes)?;
        debug!("draw store: wrote {key} ({}x{})", entry.rows, entry.cols);
        Ok(())
    }

    fn purge(&self, namespace: Namespace) -> Result<(), AppError> {
        match namespace {
            Namespace::Changes => {
                let dir = self.root.join(Namespace::Changes.as_str());
                match fs::remove_dir_all(&dir) {
                    Ok(()) => debug!("draw store: removed {}", dir.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(io_error("remove", &dir, e)),
                }
            }
            Namespace::Regulator => {
                let listing = match fs::read_dir(&self.root) {
                    Ok(l) => l,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                    Err(e) => return Err(io_error("list", &self.root, e)),
                };
                let prefix = format!("{}_", Namespace::Regulator.as_str());
                for item in listing {
                    let path = item.map_err(|e| io_error("list", &self.root, e))?.path();
                    let is_entry = path.is_file()
                        && path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"));
                    if is_entry {
                        fs::remove_file(&path).map_err(|e| io_error("remove", &path, e))?;
                    }
                }
                debug!("draw store: removed regulator entries under {}", self.root.display());
            }
        }
        Ok(())
    }

    fn ready_family(&self) -> Result<Option<StochasticFamily>, AppError> {
        let path = self.root.join(READY_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &path, e)),
        };
        StochasticFamily::parse(&text).map(Some).ok_or_else(|| {
            AppError::config(format!(
                "Unrecognised readiness marker '{}' in '{}'.",
                text.trim(),
                path.display()
            ))
        })
    }

    fn set_ready(&self, family: Option<StochasticFamily>) -> Result<(), AppError> {
        let path = self.root.join(READY_FILE);
        match family {
            Some(f) => write_atomic(&path, format!("{}\n", f.as_str()).as_bytes()),
            None => match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_error("remove", &path, e)),
            },
        }
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RegulatorParams;
    use tempfile::tempdir;

    #[test]
    fn file_store_round_trip_preserves_shape_and_order() {
        let dir = tempdir().unwrap();
        let store = FileDrawStore::new(dir.path());
        let key = DrawKey::changes(3);
        let m = DMatrix::from_row_slice(2, 3, &[0.1, -0.2, 0.3, 1.5, 2.5, -3.5]);

        assert!(store.get(&key).unwrap().is_none());
        store.put(&key, &m).unwrap();
        assert!(dir.path().join("RandomChange/3.json").is_file());
        assert!(!dir.path().join("RandomChange/3.tmp").exists());
        assert_eq!(store.get(&key).unwrap().unwrap(), m);
    }

    #[test]
    fn purge_removes_only_the_namespace() {
        let dir = tempdir().unwrap();
        let store = FileDrawStore::new(dir.path());
        let m = DMatrix::from_element(2, 2, 0.5);
        let changes = DrawKey::changes(2);
        let reg = DrawKey::regulator(1000, 1, &RegulatorParams::default()).unwrap();
        store.put(&changes, &m).unwrap();
        store.put(&reg, &m).unwrap();

        store.purge(Namespace::Changes).unwrap();
        assert!(!dir.path().join("RandomChange").exists());
        assert!(store.get(&reg).unwrap().is_some());

        store.put(&changes, &m).unwrap();
        store.purge(Namespace::Regulator).unwrap();
        assert!(store.get(&reg).unwrap().is_none());
        assert!(store.get(&changes).unwrap().is_some());

        // Purging an empty or absent store is fine.
        FileDrawStore::new(dir.path().join("missing")).purge(Namespace::Regulator).unwrap();
    }

    #[test]
    fn readiness_marker_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileDrawStore::new(dir.path());
        assert_eq!(store.ready_family().unwrap(), None);
        store.set_ready(Some(StochasticFamily::Nonparametric)).unwrap();
        assert_eq!(store.ready_family().unwrap(), Some(StochasticFamily::Nonparametric));
        store.set_ready(None).unwrap();
        store.set_ready(None).unwrap();
        assert_eq!(store.ready_family().unwrap(), None);
    }

    #[test]
    fn corrupt_entry_is_an_error_not_a_miss() {
        let dir = tempdir().unwrap();
        let store = FileDrawStore::new(dir.path());
        let key = DrawKey::changes(5);
        fs::create_dir_all(dir.path().join("RandomChange")).unwrap();
        fs::write(
            dir.path().join("RandomChange/5.json"),
            r#"{"format":"sfh-draws/1","rows":2,"cols":2,"values":[1.0]}"#,
        )
        .unwrap();
        assert_eq!(store.get(&key).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn oversized_shape_header_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FileDrawStore::new(dir.path());
        fs::create_dir_all(dir.path().join("RandomChange")).unwrap();
        fs::write(
            dir.path().join("RandomChange/2.json"),
            format!(
                r#"{{"format":"sfh-draws/1","rows":{},"cols":2,"values":[0.0]}}"#,
                usize::MAX
            ),
        )
        .unwrap();
        assert_eq!(store.get(&DrawKey::changes(2)).unwrap_err().exit_code(), 2);
    }
}
