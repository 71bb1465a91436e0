// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`    — fit one transform and evaluate it
//   2. `sweep`    — run a grid of configs across worker threads
//   3. `evaluate` — re-score a saved run
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, SweepArgs, TrainArgs};

use crate::ml::evaluator::{EvalReport, MatrixDiagnostics};

#[derive(Parser, Debug)]
#[command(
    name = "embed-align",
    version = "0.1.0",
    about = "Learn transforms that align word embeddings across languages."
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
            Commands::Sweep(args)    => run_sweep(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training '{}' on pairs from '{}'", args.transform, args.pairs.display());
    let results = TrainUseCase::new(args.into()).execute()?;

    println!("\nTrain pairs:         {}", results.train_metrics.n_pairs);
    println!("Train accuracy:      {:.4}", results.train_metrics.accuracy);
    println!("Cosine train loss:   {:.4}", results.train_metrics.cos_sim_loss);
    print_report(&results.evaluation, results.diagnostics.as_ref());
    Ok(())
}

fn run_sweep(args: SweepArgs) -> Result<()> {
    use crate::application::sweep_use_case::{SweepConfig, SweepUseCase};

    let mut config = SweepConfig::from_file(&args.config)?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    let output_dir = config.output_dir.clone();
    let entries = SweepUseCase::new(config).execute()?;

    println!("\n{:<60} {:>10}", "run", "accuracy");
    for e in &entries {
        let status = match (&e.results, &e.error) {
            (Some(r), _)    => format!("{:.4}", r.evaluation.test_accuracy),
            (None, Some(_)) => "FAILED".to_string(),
            (None, None)    => "-".to_string(),
        };
        println!("{:<60} {:>10}", e.output_dir.display(), status);
    }
    println!("\nResults written to '{}'", output_dir.join("sweep_results.json").display());
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let (report, diagnostics) = EvaluateUseCase::new(args.run_dir, args.backend).execute()?;
    print_report(&report, diagnostics.as_ref());
    Ok(())
}

fn print_report(report: &EvalReport, diagnostics: Option<&MatrixDiagnostics>) {
    println!("\nTest pairs:          {}", report.n_test);
    println!("Test accuracy:       {:.4}", report.test_accuracy);
    if let Some(acc) = report.mark_translation_acc {
        println!("Mark accuracy:       {:.4}", acc);
    }
    println!("Cosine test loss:    {:.4}", report.cos_sim_test_loss);
    println!("MSE test loss:       {:.4}", report.mse_test_loss);
    println!("Pred same as input:  {:.4}", report.pred_same_as_input);
    if let Some(d) = diagnostics {
        println!("Determinant:         {:.4}", d.determinant);
        println!("Orthogonality error: {:.2e}", d.orthogonality_error);
    }
}
