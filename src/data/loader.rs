// ============================================================
// Layer 4 — Sample Loaders
// ============================================================
// Finds labelled images for each dataset layout.
//
//   Knee / BloodCell   → class-folder layout
//       OAI-train/0/9001695L.png
//       blood-cells/images/TRAIN/EOSINOPHIL/_0_207.jpeg
//     The class is the name of the directory that directly
//     contains the image. Nested split folders (TRAIN/TEST)
//     are walked and merged.
//
//   ChestXray          → file-name suffix layout
//       ChinaSet_AllFiles/CXR_png/CHNCXR_0001_0.png
//     `_0` is normal, `_1` is tuberculosis.
//
//   Any dataset        → CSV annotation override
//     When `<root>/<annotation>` exists, labels are read from
//     its `image,label` columns instead.
//
// Reference: Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use crate::data::error::DataError;
use crate::domain::sample::{DatasetKind, ImageSample};
use crate::domain::traits::SampleSource;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

/// Pick the right source for a dataset and run discovery.
///
/// Returns the samples together with the class names so the
/// caller can log them and sanity-check `--num-classes`.
pub fn load_samples(
    kind:       DatasetKind,
    root:       &Path,
    annotation: Option<&Path>,
) -> Result<(Vec<ImageSample>, Vec<String>)> {
    if !root.is_dir() {
        return Err(DataError::MissingRoot(root.to_path_buf()).into());
    }

    let source: Box<dyn SampleSource> = match annotation.filter(|p| p.is_file()) {
        Some(csv_path) => {
            tracing::info!("Reading labels from annotation file '{}'", csv_path.display());
            Box::new(AnnotatedSource::new(root, csv_path))
        }
        None => match kind {
            DatasetKind::Knee | DatasetKind::BloodCell => Box::new(ClassFolderSource::new(root)),
            DatasetKind::ChestXray => Box::new(SuffixLabelSource::new(
                root,
                vec!["normal".to_string(), "tuberculosis".to_string()],
            )),
        },
    };

    let samples = source.discover()?;
    if samples.is_empty() {
        return Err(DataError::NoImages(root.to_path_buf()).into());
    }
    Ok((samples, source.class_names()))
}

/// True when the path has one of the supported image extensions
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively collect every image file under `dir`, sorted.
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(dir, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, found)?;
        } else if is_image(&path) {
            found.push(path);
        }
    }
    Ok(())
}

/// Sort class names numerically when every name is a number
/// (KL grades "0".."4"), lexicographically otherwise.
fn sort_class_names(names: &mut [String]) {
    if names.iter().all(|n| n.parse::<usize>().is_ok()) {
        names.sort_by_key(|n| n.parse::<usize>().unwrap_or(usize::MAX));
    } else {
        names.sort();
    }
}

// ─── ClassFolderSource ────────────────────────────────────────────────────────
pub struct ClassFolderSource {
    root: PathBuf,
}

impl ClassFolderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn class_of(path: &Path) -> Option<String> {
        path.parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
    }

    fn images_with_class(&self) -> Result<Vec<(PathBuf, String)>> {
        Ok(collect_images(&self.root)?
            .into_iter()
            .filter_map(|p| Self::class_of(&p).map(|c| (p, c)))
            // images lying directly in the root have no class folder
            .filter(|(p, _)| p.parent() != Some(self.root.as_path()))
            .collect())
    }
}

impl SampleSource for ClassFolderSource {
    fn discover(&self) -> Result<Vec<ImageSample>> {
        let images  = self.images_with_class()?;
        let classes = {
            let mut names: Vec<String> = images
                .iter()
                .map(|(_, c)| c.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            sort_class_names(&mut names);
            names
        };

        let samples: Vec<ImageSample> = images
            .into_iter()
            .filter_map(|(path, class)| {
                classes.iter().position(|c| *c == class).map(|label| ImageSample::new(path, label))
            })
            .collect();

        tracing::debug!(
            "Class-folder discovery under '{}': {} images, {} classes",
            self.root.display(),
            samples.len(),
            classes.len()
        );
        Ok(samples)
    }

    fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .images_with_class()
            .unwrap_or_default()
            .into_iter()
            .map(|(_, c)| c)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        sort_class_names(&mut names);
        names
    }
}

// ─── SuffixLabelSource ────────────────────────────────────────────────────────
pub struct SuffixLabelSource {
    root:    PathBuf,
    classes: Vec<String>,
}

impl SuffixLabelSource {
    pub fn new(root: impl Into<PathBuf>, classes: Vec<String>) -> Self {
        Self { root: root.into(), classes }
    }

    /// `CHNCXR_0001_1.png` → Some(1)
    pub fn label_from_name(path: &Path) -> Option<usize> {
        let stem = path.file_stem()?.to_str()?;
        let (_, suffix) = stem.rsplit_once('_')?;
        suffix.parse().ok()
    }
}

impl SampleSource for SuffixLabelSource {
    fn discover(&self) -> Result<Vec<ImageSample>> {
        let mut samples = Vec::new();
        for path in collect_images(&self.root)? {
            match Self::label_from_name(&path) {
                Some(label) if label < self.classes.len() => {
                    samples.push(ImageSample::new(path, label));
                }
                _ => tracing::debug!("Skipping '{}': no class suffix", path.display()),
            }
        }
        Ok(samples)
    }

    fn class_names(&self) -> Vec<String> {
        self.classes.clone()
    }
}

// ─── AnnotatedSource ──────────────────────────────────────────────────────────
#[derive(Debug, Deserialize)]
struct AnnotationRow {
    image: String,
    label: usize,
}

pub struct AnnotatedSource {
    root: PathBuf,
    csv:  PathBuf,
}

impl AnnotatedSource {
    pub fn new(root: impl Into<PathBuf>, csv: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), csv: csv.into() }
    }

    fn rows(&self) -> Result<Vec<AnnotationRow>> {
        let mut reader = csv::Reader::from_path(&self.csv)
            .with_context(|| format!("Cannot open annotation file '{}'", self.csv.display()))?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            let row: AnnotationRow = row
                .with_context(|| format!("Malformed row in '{}'", self.csv.display()))?;
            rows.push(row);
        }
        Ok(rows)
    }
}

impl SampleSource for AnnotatedSource {
    fn discover(&self) -> Result<Vec<ImageSample>> {
        let mut samples = Vec::new();
        let mut missing = 0usize;
        for row in self.rows()? {
            let path = self.root.join(&row.image);
            if path.is_file() {
                samples.push(ImageSample::new(path, row.label));
            } else {
                missing += 1;
            }
        }
        if missing > 0 {
            tracing::warn!("{} annotated images were not found on disk", missing);
        }
        samples.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(samples)
    }

    fn class_names(&self) -> Vec<String> {
        let max_label = self
            .rows()
            .unwrap_or_default()
            .iter()
            .map(|r| r.label)
            .max();
        match max_label {
            Some(m) => (0..=m).map(|i| i.to_string()).collect(),
            None    => Vec::new(),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_class_folders_sort_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for grade in ["0", "2", "10"] {
            touch(&dir.path().join(grade).join("a.png"));
        }
        touch(&dir.path().join("2").join("notes.txt"));

        let source  = ClassFolderSource::new(dir.path());
        let samples = source.discover().unwrap();
        assert_eq!(source.class_names(), vec!["0", "2", "10"]);
        assert_eq!(samples.len(), 3);
        let ten = samples.iter().find(|s| s.path.starts_with(dir.path().join("10"))).unwrap();
        assert_eq!(ten.label, 2);
    }

    #[test]
    fn test_nested_split_folders_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("TRAIN/MONOCYTE/a.jpeg"));
        touch(&dir.path().join("TEST/MONOCYTE/b.jpeg"));
        touch(&dir.path().join("TRAIN/EOSINOPHIL/c.jpeg"));

        let source  = ClassFolderSource::new(dir.path());
        let samples = source.discover().unwrap();
        assert_eq!(source.class_names(), vec!["EOSINOPHIL", "MONOCYTE"]);
        assert_eq!(samples.iter().filter(|s| s.label == 1).count(), 2);
    }

    #[test]
    fn test_suffix_labels() {
        assert_eq!(SuffixLabelSource::label_from_name(Path::new("CHNCXR_0001_1.png")), Some(1));
        assert_eq!(SuffixLabelSource::label_from_name(Path::new("CHNCXR_0002_0.png")), Some(0));
        assert_eq!(SuffixLabelSource::label_from_name(Path::new("readme.png")), None);
    }

    #[test]
    fn test_annotation_overrides_layout() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("x.png"));
        touch(&dir.path().join("y.png"));
        fs::write(dir.path().join("labels.csv"), "image,label\nx.png,3\ny.png,1\nz.png,0\n").unwrap();

        let (samples, classes) = load_samples(
            DatasetKind::Knee,
            dir.path(),
            Some(&dir.path().join("labels.csv")),
        )
        .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label, 3);
        assert_eq!(classes.len(), 4);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let err = load_samples(DatasetKind::BloodCell, Path::new("/no/such/blood-cells"), None);
        assert!(err.is_err());
    }
}
