use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error(
        "unrecognised data path '{0}': expected a directory named \
         OAI-train, ChinaSet_AllFiles or blood-cells"
    )]
    UnknownDataset(String),

    #[error("data directory '{}' does not exist", .0.display())]
    MissingRoot(PathBuf),

    #[error("no images found under '{}'", .0.display())]
    NoImages(PathBuf),

    #[error("fold {fold} requested but '{}' only defines {available} fold(s)", .path.display())]
    FoldOutOfRange {
        path:      PathBuf,
        fold:      usize,
        available: usize,
    },

    #[error("the {0} split is empty")]
    EmptySplit(&'static str),

    #[error("label {label} of '{}' is outside 0..{num_classes}", .path.display())]
    LabelOutOfRange {
        path:        PathBuf,
        label:       usize,
        num_classes: usize,
    },
}
