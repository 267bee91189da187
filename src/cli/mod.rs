// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and routes to Layer 2.
//
//   medlora train    --data-path ../data/OAI-train --tt lora -r 4 --nc 5
//   medlora evaluate --run-dir checkpoints/lora-knee-20261016-101500
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "medlora",
    version,
    about = "Fine-tune ViT / ResNet-50 classifiers on medical images: LoRA, full, linear probe."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. The CLI only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training {:?} on '{}'", args.train_type, args.data_path);
    let run_dir = TrainUseCase::new(args.into()).execute()?;

    println!("Training complete. Run saved to '{}'.", run_dir.display());
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let summary = EvaluateUseCase::new(args.into()).execute()?;
    println!("\nTEST {summary}");
    for (label, row) in summary.confusion.iter().enumerate() {
        println!("  {label:>2}: {row:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::domain::strategy::{TrainType, VitSize};

    #[test]
    fn test_aliases_and_defaults() {
        let cli = Cli::try_parse_from([
            "medlora", "train", "--tt", "lora", "-r", "8", "--nc", "5", "--data-path", "OAI-train",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();

        assert_eq!(cfg.train_type, TrainType::Lora);
        assert_eq!(cfg.rank, 8);
        assert_eq!(cfg.num_classes, 5);
        assert_eq!(cfg.batch_size, 16);
        assert_eq!(cfg.vit, VitSize::Base);
        assert_eq!(cfg.lr, 1e-3);
    }

    #[test]
    fn test_unknown_selectors_are_rejected() {
        assert!(Cli::try_parse_from(["medlora", "train", "--tt", "adapter"]).is_err());
        assert!(Cli::try_parse_from(["medlora", "train", "--vit", "huge"]).is_err());
        assert!(Cli::try_parse_from(["medlora", "train", "--backend", "cuda"]).is_err());
    }

    #[test]
    fn test_evaluate_requires_run_dir() {
        assert!(Cli::try_parse_from(["medlora", "evaluate"]).is_err());
        assert!(Cli::try_parse_from(["medlora", "evaluate", "--run-dir", "x", "--from-adapters"]).is_ok());
    }
}
