// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Two subcommands, `train` and `evaluate`.
//
// The `train` flags and defaults follow the reference training
// script, short aliases included (--nc, --tt, -r). Selector
// flags are clap value enums, so a typo such as `--tt adapter`
// is rejected before anything runs.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::{evaluate_use_case::EvaluateRequest, train_use_case::TrainConfig};
use crate::domain::strategy::{ComputeBackend, TrainType, VitSize};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune a classifier and keep the best validation checkpoint
    Train(TrainArgs),

    /// Score a finished run's best checkpoint on its test split
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[arg(long, visible_alias = "bs", default_value_t = 16)]
    pub batch_size: usize,

    /// Which fold of the split file to use (also offsets the seed
    /// of the generated split)
    #[arg(long, default_value_t = 0)]
    pub fold: usize,

    /// Dataset directory; its name selects the loader
    /// (OAI-train, ChinaSet_AllFiles, blood-cells)
    #[arg(long, default_value = "../data/NIH_X-ray/")]
    pub data_path: String,

    /// JSON split file inside the data directory
    #[arg(long, default_value = "nih_split_712.json")]
    pub data_info: String,

    /// Label CSV inside the data directory, used when present
    #[arg(long, default_value = "Data_Entry_2017_jpg.csv")]
    pub annotation: String,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    #[arg(long, default_value_t = 20)]
    pub epochs: usize,

    /// Data loader worker threads
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    #[arg(long, visible_alias = "nc", default_value_t = 14)]
    pub num_classes: usize,

    #[arg(long, visible_alias = "tt", value_enum, default_value_t = TrainType::Linear)]
    pub train_type: TrainType,

    /// LoRA rank
    #[arg(long, short = 'r', default_value_t = 4)]
    pub rank: usize,

    /// LoRA alpha; the update is scaled by alpha / rank
    /// [default: rank]
    #[arg(long)]
    pub lora_alpha: Option<f64>,

    #[arg(long, value_enum, default_value_t = VitSize::Base)]
    pub vit: VitSize,

    /// PyTorch state dict (.pth) for the backbone
    #[arg(long)]
    pub pretrained: Option<PathBuf>,

    /// Parent directory of the per-run checkpoint directories
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = ComputeBackend::Wgpu)]
    pub backend: ComputeBackend,

    /// Half-precision training (wgpu only)
    #[arg(long)]
    pub amp: bool,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            batch_size:     a.batch_size,
            fold:           a.fold,
            data_path:      a.data_path,
            data_info:      a.data_info,
            annotation:     a.annotation,
            lr:             a.lr,
            epochs:         a.epochs,
            num_workers:    a.num_workers,
            num_classes:    a.num_classes,
            train_type:     a.train_type,
            rank:           a.rank,
            lora_alpha:     a.lora_alpha,
            vit:            a.vit,
            pretrained:     a.pretrained,
            checkpoint_dir: a.checkpoint_dir,
            backend:        a.backend,
            amp:            a.amp,
            seed:           a.seed,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Run directory written by `train`
    #[arg(long)]
    pub run_dir: PathBuf,

    /// Backend override [default: the run's backend]
    #[arg(long, value_enum)]
    pub backend: Option<ComputeBackend>,

    /// Rebuild a LoRA model from the pretrained backbone and the
    /// exported adapters instead of the full checkpoint
    #[arg(long)]
    pub from_adapters: bool,
}

impl From<EvaluateArgs> for EvaluateRequest {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateRequest {
            run_dir:       a.run_dir,
            backend:       a.backend,
            from_adapters: a.from_adapters,
        }
    }
}
