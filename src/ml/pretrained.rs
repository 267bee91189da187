// ============================================================
// Layer 5 — Pretrained Weight Import
// ============================================================
// Loads a PyTorch state dict (.pt / .pth) into a backbone with
// burn-import. Only the backbone record is read: classifier
// keys in the file (`head.*` for timm, `fc.*` for torchvision)
// have no field to land in and are skipped.
//
// Key differences between the two worlds, fixed by remapping:
//
//   LayerNorm / BatchNorm   weight, bias   → gamma, beta
//   torchvision downsample  downsample.0/1 → downsample.conv/bn
//
// Linear weights are transposed by the importer itself.
//
// JAX/big_vision `.npz` checkpoints are not readable here; they
// have to be converted to a PyTorch state dict first (loading
// them through timm and calling `torch.save(model.state_dict())`
// is enough).

use anyhow::{bail, Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, Recorder},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::Path;

use crate::ml::resnet::{ResNet, ResNetRecord};
use crate::ml::vit::{VisionTransformer, VisionTransformerRecord};

const NORM_WEIGHT: &str = r"^(.*norm\d?)\.weight$";
const NORM_BIAS:   &str = r"^(.*norm\d?)\.bias$";

fn check_format(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("pretrained weights '{}' not found", path.display());
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("npz") => bail!(
            "'{}' is a JAX .npz checkpoint; convert it to a PyTorch state dict (.pth) first",
            path.display()
        ),
        _ => Ok(()),
    }
}

pub fn vit_load_args(path: &Path) -> LoadArgs {
    LoadArgs::new(path.to_path_buf())
        .with_key_remap(NORM_WEIGHT, "$1.gamma")
        .with_key_remap(NORM_BIAS, "$1.beta")
}

pub fn resnet_load_args(path: &Path) -> LoadArgs {
    LoadArgs::new(path.to_path_buf())
        .with_key_remap(r"^(.*)\.downsample\.0\.(.+)$", "$1.downsample.conv.$2")
        .with_key_remap(r"^(.*)\.downsample\.1\.(.+)$", "$1.downsample.bn.$2")
        .with_key_remap(r"^(.*(?:bn\d|downsample\.bn))\.weight$", "$1.gamma")
        .with_key_remap(r"^(.*(?:bn\d|downsample\.bn))\.bias$", "$1.beta")
}

pub fn load_vit<B: Backend>(
    vit:    VisionTransformer<B>,
    path:   &Path,
    device: &B::Device,
) -> Result<VisionTransformer<B>> {
    check_format(path)?;
    let record: VisionTransformerRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(vit_load_args(path), device)
        .with_context(|| format!("Cannot import ViT weights from '{}'", path.display()))?;
    tracing::info!("Loaded pretrained ViT weights from '{}'", path.display());
    Ok(vit.load_record(record))
}

pub fn load_resnet<B: Backend>(
    resnet: ResNet<B>,
    path:   &Path,
    device: &B::Device,
) -> Result<ResNet<B>> {
    check_format(path)?;
    let record: ResNetRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(resnet_load_args(path), device)
        .with_context(|| format!("Cannot import ResNet weights from '{}'", path.display()))?;
    tracing::info!("Loaded pretrained ResNet weights from '{}'", path.display());
    Ok(resnet.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npz_is_rejected_with_hint() {
        let dir = tempfile::tempdir().unwrap();
        let npz = dir.path().join("B_16.npz");
        std::fs::write(&npz, b"PK").unwrap();

        let err = check_format(&npz).unwrap_err().to_string();
        assert!(err.contains(".pth"), "{err}");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(check_format(Path::new("/nonexistent/resnet50.pth")).is_err());
    }
}
