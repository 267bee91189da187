// ============================================================
// Layer 3 — Sample & Dataset Domain Types
// ============================================================
// An ImageSample is the smallest unit the data pipeline moves
// around: a path to an image file plus its class index.
//
// DatasetKind names the three image collections the trainer
// understands. The data path selects exactly one of them by
// its final directory name:
//
//   ../data/OAI-train          → Knee       (KL grade 0..4)
//   ../data/ChinaSet_AllFiles  → ChestXray  (normal / TB)
//   ../data/blood-cells        → BloodCell  (4 leukocyte types)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One labelled image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSample {
    /// Absolute or root-relative path to the image file
    pub path: PathBuf,

    /// Class index in `0..num_classes`
    pub label: usize,
}

impl ImageSample {
    pub fn new(path: impl Into<PathBuf>, label: usize) -> Self {
        Self { path: path.into(), label }
    }
}

/// The dataset families selectable through `--data-path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetKind {
    /// Osteoarthritis Initiative knee radiographs, one folder per KL grade
    Knee,
    /// Shenzhen chest X-ray set, label encoded in the file name suffix
    ChestXray,
    /// Blood cell microscopy, one folder per cell type
    BloodCell,
}

impl DatasetKind {
    /// Directory names that select each dataset.
    pub const KNEE_DIR:       &'static str = "OAI-train";
    pub const CHEST_XRAY_DIR: &'static str = "ChinaSet_AllFiles";
    pub const BLOOD_CELL_DIR: &'static str = "blood-cells";

    /// Resolve a data path to a dataset family.
    ///
    /// Trailing slashes are ignored and only the last path
    /// component is compared, so `OAI-train`, `OAI-train/` and
    /// `/data/OAI-train` all resolve to `Knee`.
    pub fn from_data_path(data_path: &str) -> Option<Self> {
        let name = Path::new(data_path.trim_end_matches(['/', '\\']))
            .file_name()
            .and_then(|n| n.to_str())?;
        match name {
            Self::KNEE_DIR       => Some(Self::Knee),
            Self::CHEST_XRAY_DIR => Some(Self::ChestXray),
            Self::BLOOD_CELL_DIR => Some(Self::BloodCell),
            _ => None,
        }
    }

    /// Short name used in run directory names and logs
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Knee      => "knee",
            Self::ChestXray => "cxr",
            Self::BloodCell => "blood",
        }
    }

    /// Number of classes the dataset ships with
    pub fn native_num_classes(&self) -> usize {
        match self {
            Self::Knee      => 5,
            Self::ChestXray => 2,
            Self::BloodCell => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_kind_from_path() {
        assert_eq!(DatasetKind::from_data_path("OAI-train"), Some(DatasetKind::Knee));
        assert_eq!(
            DatasetKind::from_data_path("../data/ChinaSet_AllFiles/"),
            Some(DatasetKind::ChestXray)
        );
        assert_eq!(
            DatasetKind::from_data_path("/mnt/blood-cells"),
            Some(DatasetKind::BloodCell)
        );
    }

    #[test]
    fn test_unknown_dataset_path() {
        assert_eq!(DatasetKind::from_data_path("../data/NIH_X-ray/"), None);
        assert_eq!(DatasetKind::from_data_path(""), None);
    }
}
