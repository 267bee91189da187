use burn::data::dataset::Dataset;

use crate::domain::sample::ImageSample;

/// In-memory list of labelled image paths. Pixels are only
/// decoded when the batcher asks for them.
pub struct ImageDataset {
    samples: Vec<ImageSample>,
}

impl ImageDataset {
    pub fn new(samples: Vec<ImageSample>) -> Self { Self { samples } }

    /// Number of samples per class, indexed by label
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for s in &self.samples {
            if let Some(c) = counts.get_mut(s.label) {
                *c += 1;
            }
        }
        counts
    }
}

impl Dataset<ImageSample> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_counts_ignore_out_of_range() {
        let ds = ImageDataset::new(vec![
            ImageSample::new("a.png", 0),
            ImageSample::new("b.png", 1),
            ImageSample::new("c.png", 1),
            ImageSample::new("d.png", 7),
        ]);
        assert_eq!(ds.class_counts(2), vec![1, 2]);
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.get(2).unwrap().path.to_str(), Some("c.png"));
    }
}
