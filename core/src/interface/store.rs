use crate::prelude::{CoreError, CoreResult, Sweep};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Load/save hook for a finished baseline, so a restart can skip warm-up.
pub trait BaselineStore: Send {
    /// `Ok(None)` means nothing has been stored yet.
    fn load(&self) -> CoreResult<Option<Sweep>>;
    fn save(&self, baseline: &Sweep) -> CoreResult<()>;
}

/// Serialized form of a baseline array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub steps: usize,
    pub bins: usize,
    pub values: Vec<f32>,
}

impl BaselineSnapshot {
    pub fn from_array(baseline: &Sweep) -> Self {
        let (steps, bins) = baseline.dim();
        Self {
            steps,
            bins,
            values: baseline.iter().copied().collect(),
        }
    }

    pub fn into_array(self) -> CoreResult<Sweep> {
        Array2::from_shape_vec((self.steps, self.bins), self.values)
            .map_err(|err| CoreError::Persistence(format!("stored baseline shape: {}", err)))
    }
}

/// Keeps the baseline as a JSON document on disk.
pub struct JsonBaselineStore {
    path: PathBuf,
}

impl JsonBaselineStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BaselineStore for JsonBaselineStore {
    fn load(&self) -> CoreResult<Option<Sweep>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let snapshot: BaselineSnapshot = serde_json::from_str(&contents)?;
        snapshot.into_array().map(Some)
    }

    fn save(&self, baseline: &Sweep) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(&BaselineSnapshot::from_array(baseline))?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
