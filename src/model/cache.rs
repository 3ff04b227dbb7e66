//! Local cache of model files.
//!
//! A [`ModelCache`] is created once by the caller and passed to whatever
//! needs weights or size-model parameters. Files are looked up as
//! `<root>/<basename>`; a missing file is requested from the injected
//! [`ModelFetcher`] and written into the cache before its path is returned.
use crate::error::{Result, SegmentError};
use log::info;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the default cache root.
pub const MODELS_PATH_ENV: &str = "CELLFLOW_LOCAL_MODELS_PATH";

/// Retrieves the bytes of a model file that is not yet cached.
pub trait ModelFetcher {
    fn fetch(&self, basename: &str) -> Result<Vec<u8>>;
}

/// Fetcher for offline use: every miss is an error.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFetch;

impl ModelFetcher for NoFetch {
    fn fetch(&self, basename: &str) -> Result<Vec<u8>> {
        Err(SegmentError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("model file {basename} is not cached and fetching is disabled"),
        )))
    }
}

pub struct ModelCache<F: ModelFetcher = NoFetch> {
    root: PathBuf,
    fetcher: F,
}

impl ModelCache<NoFetch> {
    /// Offline cache rooted at `root`.
    pub fn offline(root: impl Into<PathBuf>) -> Self {
        Self::new(root, NoFetch)
    }
}

impl<F: ModelFetcher> ModelCache<F> {
    pub fn new(root: impl Into<PathBuf>, fetcher: F) -> Self {
        Self {
            root: root.into(),
            fetcher,
        }
    }

    /// Root from `CELLFLOW_LOCAL_MODELS_PATH`, else `$HOME/.cellflow/models`.
    pub fn from_env(fetcher: F) -> Result<Self> {
        Ok(Self::new(default_root()?, fetcher))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a cached file, fetching it first when absent.
    pub fn resolve(&self, basename: &str) -> Result<PathBuf> {
        let path = self.root.join(basename);
        if path.exists() {
            return Ok(path);
        }
        fs::create_dir_all(&self.root)?;
        info!("fetching model file {basename} into {}", self.root.display());
        let bytes = self.fetcher.fetch(basename)?;
        // never leave a truncated file under the final name
        let partial = self.root.join(format!("{basename}.partial"));
        fs::write(&partial, bytes)?;
        fs::rename(&partial, &path)?;
        Ok(path)
    }
}

fn default_root() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(MODELS_PATH_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let home = env::var_os("HOME").ok_or_else(|| {
        SegmentError::InvalidParameter {
            name: "model cache root",
            reason: format!("neither {MODELS_PATH_ENV} nor HOME is set"),
        }
    })?;
    Ok(PathBuf::from(home).join(".cellflow").join("models"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counting {
        calls: Cell<usize>,
    }

    impl ModelFetcher for Counting {
        fn fetch(&self, basename: &str) -> Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            Ok(format!("weights for {basename}").into_bytes())
        }
    }

    fn temp_root(tag: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("cellflow-cache-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn missing_file_is_fetched_once() {
        let root = temp_root("fetch");
        let cache = ModelCache::new(&root, Counting { calls: Cell::new(0) });
        let p1 = cache.resolve("cytotorch_0").unwrap();
        let p2 = cache.resolve("cytotorch_0").unwrap();
        assert_eq!(p1, p2);
        assert_eq!(cache.fetcher.calls.get(), 1);
        assert_eq!(fs::read_to_string(&p1).unwrap(), "weights for cytotorch_0");
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn offline_cache_reports_missing_file() {
        let root = temp_root("offline");
        let cache = ModelCache::offline(&root);
        assert!(cache.resolve("nucleitorch_0").is_err());
        let _ = fs::remove_dir_all(&root);
    }
}
