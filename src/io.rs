//! Named-dataset data files
//!
//! A [`DataFile`] is a flat store of typed arrays keyed by slash-separated
//! paths such as `/x` or `/c/A`. It is used for the lattice geometry
//! (`positions.dat`) and for every field snapshot (`dat_00100.dat`).
//!
//! On disk a file is the magic bytes [`MAGIC`] followed by a bincode encoding
//! of the dataset map. Floats are stored bit-exactly, NaN and infinities
//! included.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Leading bytes of every data file
pub const MAGIC: &[u8; 6] = b"HEXRD\x01";

/// Errors that can occur while reading or writing a data file
#[derive(Error, Debug)]
pub enum DataError {
    /// An I/O error occurred on the underlying file
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file does not start with the data file magic
    #[error("{0} is not a hexrd data file")]
    BadMagic(String),

    /// The dataset map could not be decoded
    #[error("corrupt data file {path}: {message}")]
    Decode { path: String, message: String },

    /// The dataset map could not be encoded
    #[error("failed to encode {path}: {message}")]
    Encode { path: String, message: String },

    /// A dataset path was malformed
    #[error("invalid dataset path '{0}': paths start with '/' and have no empty segments")]
    InvalidPath(String),

    /// A dataset was added twice
    #[error("dataset {0} already exists")]
    PathExists(String),

    /// A dataset was read that is not in the file
    #[error("dataset {0} does not exist in this file")]
    MissingPath(String),

    /// A dataset was read as the wrong element type
    #[error("dataset {path} holds {found} values, not {expected}")]
    TypeMismatch {
        path: String,
        expected: DatasetKind,
        found: DatasetKind,
    },

    /// A single value was read from a dataset holding several
    #[error("dataset {path} holds {len} values, expected exactly one")]
    NotScalar { path: String, len: usize },

    /// A write was attempted on a file opened read-only
    #[error("{0} was opened read-only")]
    ReadOnly(String),
}

/// Result type for data file operations
pub type DataResult<T> = Result<T, DataError>;

/// Element type of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetKind {
    F32,
    F64,
    I32,
    U32,
    I64,
    U64,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatasetKind::F32 => "f32",
            DatasetKind::F64 => "f64",
            DatasetKind::I32 => "i32",
            DatasetKind::U32 => "u32",
            DatasetKind::I64 => "i64",
            DatasetKind::U64 => "u64",
        };
        f.write_str(name)
    }
}

/// One stored array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dataset {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
}

impl Dataset {
    pub fn kind(&self) -> DatasetKind {
        match self {
            Dataset::F32(_) => DatasetKind::F32,
            Dataset::F64(_) => DatasetKind::F64,
            Dataset::I32(_) => DatasetKind::I32,
            Dataset::U32(_) => DatasetKind::U32,
            Dataset::I64(_) => DatasetKind::I64,
            Dataset::U64(_) => DatasetKind::U64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Dataset::F32(v) => v.len(),
            Dataset::F64(v) => v.len(),
            Dataset::I32(v) => v.len(),
            Dataset::U32(v) => v.len(),
            Dataset::I64(v) => v.len(),
            Dataset::U64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest and largest value, ignoring NaN; `None` when there are none
    pub fn range(&self) -> Option<(f64, f64)> {
        let values: Box<dyn Iterator<Item = f64> + '_> = match self {
            Dataset::F32(v) => Box::new(v.iter().map(|&x| f64::from(x))),
            Dataset::F64(v) => Box::new(v.iter().copied()),
            Dataset::I32(v) => Box::new(v.iter().map(|&x| f64::from(x))),
            Dataset::U32(v) => Box::new(v.iter().map(|&x| f64::from(x))),
            Dataset::I64(v) => Box::new(v.iter().map(|&x| x as f64)),
            Dataset::U64(v) => Box::new(v.iter().map(|&x| x as f64)),
        };
        values
            .filter(|x| !x.is_nan())
            .fold(None, |acc, x| match acc {
                None => Some((x, x)),
                Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
            })
    }
}

/// A scalar type that can be stored in a [`DataFile`]
pub trait Element: Copy + Sized {
    const KIND: DatasetKind;

    fn wrap(values: Vec<Self>) -> Dataset;

    fn unwrap(dataset: &Dataset) -> Option<&[Self]>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const KIND: DatasetKind = DatasetKind::$variant;

            fn wrap(values: Vec<Self>) -> Dataset {
                Dataset::$variant(values)
            }

            fn unwrap(dataset: &Dataset) -> Option<&[Self]> {
                match dataset {
                    Dataset::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(f32, F32);
impl_element!(f64, F64);
impl_element!(i32, I32);
impl_element!(u32, U32);
impl_element!(i64, I64);
impl_element!(u64, U64);

/// How a file was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccess {
    /// Created empty, replacing any existing file
    Create,
    ReadOnly,
    /// Existing contents loaded and writes allowed
    ReadWrite,
}

/// What to do when a read names a dataset that is not in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadErrorAction {
    /// Return `Ok(None)`, noting the miss only at debug level
    Continue,
    /// Return `Ok(None)` and log at info level
    #[default]
    Info,
    /// Return `Ok(None)` and log a warning
    Warning,
    /// Return [`DataError::MissingPath`]
    Error,
}

/// A data file held in memory and written out on [`DataFile::commit`]
#[derive(Debug)]
pub struct DataFile {
    path: PathBuf,
    access: FileAccess,
    datasets: BTreeMap<String, Dataset>,
    dirty: bool,
    /// Behaviour of reads on missing datasets
    pub read_error_action: ReadErrorAction,
}

impl DataFile {
    /// Create (or truncate) a data file. The file is written immediately so an
    /// unwritable location fails here rather than at commit time.
    pub fn create(path: &Path) -> DataResult<Self> {
        let file = Self {
            path: path.to_path_buf(),
            access: FileAccess::Create,
            datasets: BTreeMap::new(),
            dirty: false,
            read_error_action: ReadErrorAction::default(),
        };
        file.write_out()?;
        Ok(file)
    }

    /// Open an existing file for reading
    pub fn open(path: &Path) -> DataResult<Self> {
        Self::open_with(path, FileAccess::ReadOnly)
    }

    /// Open an existing file for reading and adding datasets
    pub fn open_rw(path: &Path) -> DataResult<Self> {
        Self::open_with(path, FileAccess::ReadWrite)
    }

    fn open_with(path: &Path, access: FileAccess) -> DataResult<Self> {
        let display = path.display().to_string();
        let bytes = fs::read(path).map_err(|source| DataError::Io {
            path: display.clone(),
            source,
        })?;
        let body = bytes
            .strip_prefix(MAGIC.as_slice())
            .ok_or_else(|| DataError::BadMagic(display.clone()))?;
        let datasets = bincode::deserialize(body).map_err(|e| DataError::Decode {
            path: display,
            message: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            access,
            datasets,
            dirty: false,
            read_error_action: ReadErrorAction::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn access(&self) -> FileAccess {
        self.access
    }

    /// Store a single value at `path`
    pub fn add_val<T: Element>(&mut self, path: &str, val: T) -> DataResult<()> {
        self.insert(path, T::wrap(vec![val]))
    }

    /// Store an array of values at `path`
    pub fn add_contained_vals<T: Element>(&mut self, path: &str, vals: &[T]) -> DataResult<()> {
        self.insert(path, T::wrap(vals.to_vec()))
    }

    fn insert(&mut self, path: &str, dataset: Dataset) -> DataResult<()> {
        if self.access == FileAccess::ReadOnly {
            return Err(DataError::ReadOnly(self.path.display().to_string()));
        }
        validate_path(path)?;
        if self.datasets.contains_key(path) {
            return Err(DataError::PathExists(path.to_string()));
        }
        self.datasets.insert(path.to_string(), dataset);
        self.dirty = true;
        Ok(())
    }

    /// Read the array at `path`. A missing path is handled according to
    /// [`DataFile::read_error_action`].
    pub fn read_contained_vals<T: Element>(&self, path: &str) -> DataResult<Option<Vec<T>>> {
        validate_path(path)?;
        let Some(dataset) = self.datasets.get(path) else {
            return self.missing(path);
        };
        T::unwrap(dataset)
            .map(|v| Some(v.to_vec()))
            .ok_or_else(|| DataError::TypeMismatch {
                path: path.to_string(),
                expected: T::KIND,
                found: dataset.kind(),
            })
    }

    /// Read the single value at `path`
    pub fn read_val<T: Element>(&self, path: &str) -> DataResult<Option<T>> {
        match self.read_contained_vals::<T>(path)? {
            Some(vals) if vals.len() == 1 => Ok(Some(vals[0])),
            Some(vals) => Err(DataError::NotScalar {
                path: path.to_string(),
                len: vals.len(),
            }),
            None => Ok(None),
        }
    }

    fn missing<T>(&self, path: &str) -> DataResult<Option<T>> {
        let file = self.path.display();
        match self.read_error_action {
            ReadErrorAction::Continue => {
                debug!("{path} not found in {file}");
                Ok(None)
            }
            ReadErrorAction::Info => {
                info!("{path} not found in {file}");
                Ok(None)
            }
            ReadErrorAction::Warning => {
                warn!("{path} not found in {file}");
                Ok(None)
            }
            ReadErrorAction::Error => Err(DataError::MissingPath(path.to_string())),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.datasets.contains_key(path)
    }

    /// All datasets in path order
    pub fn datasets(&self) -> impl Iterator<Item = (&str, &Dataset)> {
        self.datasets.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// One line per dataset: path, element type, length and value range
    pub fn summary(&self) -> String {
        self.datasets()
            .map(|(path, ds)| match ds.range() {
                Some((lo, hi)) => format!("{path} {} [{}] min={lo} max={hi}\n", ds.kind(), ds.len()),
                None => format!("{path} {} [{}]\n", ds.kind(), ds.len()),
            })
            .collect()
    }

    /// Write pending datasets to disk. Read-only files are left untouched.
    pub fn commit(&mut self) -> DataResult<()> {
        if self.access == FileAccess::ReadOnly || !self.dirty {
            return Ok(());
        }
        self.write_out()?;
        self.dirty = false;
        Ok(())
    }

    fn write_out(&self) -> DataResult<()> {
        let display = self.path.display().to_string();
        let io_err = |source| DataError::Io {
            path: display.clone(),
            source,
        };

        let file = File::create(&self.path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC).map_err(io_err)?;
        bincode::serialize_into(&mut writer, &self.datasets).map_err(|e| DataError::Encode {
            path: display.clone(),
            message: e.to_string(),
        })?;
        writer.flush().map_err(io_err)
    }
}

impl Drop for DataFile {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.commit() {
                warn!("error closing data file: {e}");
            }
        }
    }
}

fn validate_path(path: &str) -> DataResult<()> {
    match path.strip_prefix('/') {
        Some(rest) if !rest.is_empty() && rest.split('/').all(|seg| !seg.is_empty()) => Ok(()),
        _ => Err(DataError::InvalidPath(path.to_string())),
    }
}
