//! `diff` handler

use crate::commands::DiffArgs;
use crate::error::{CliError, CliResult};
use std::path::PathBuf;
use tracing::info;
use vistazo::{VisualRegressionConfig, VisualRegressionTester};

/// Summary of one comparison
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    /// Fraction of differing pixels
    pub divergence: f64,
    /// Whether the divergence exceeded the allowed deviation
    pub diverged: bool,
    /// Diff image written, if any
    pub diff_path: Option<PathBuf>,
}

impl DiffOutcome {
    /// One-line report
    #[must_use]
    pub fn summary(&self, max_deviation: f64) -> String {
        let verdict = if self.diverged { "DIVERGED" } else { "OK" };
        format!(
            "{verdict}: divergence {:.4} (max {max_deviation:.4})",
            self.divergence
        )
    }
}

/// Compare two screenshot files
pub fn run_diff(args: &DiffArgs) -> CliResult<DiffOutcome> {
    if !(0.0..=1.0).contains(&args.max_deviation) {
        return Err(CliError::invalid_argument(format!(
            "max deviation must be within 0.0..=1.0, got {}",
            args.max_deviation
        )));
    }
    let tester = VisualRegressionTester::new(
        VisualRegressionConfig::default().with_color_threshold(args.color_threshold),
    );
    let result = tester.compare_files(&args.actual, &args.baseline)?;
    let diverged = result.exceeds(args.max_deviation);

    let diff_path = match (&args.diff_out, diverged) {
        (Some(path), true) => {
            result.save_diff(path)?;
            info!(path = %path.display(), "diff image written");
            Some(path.clone())
        }
        _ => None,
    };

    let outcome = DiffOutcome {
        divergence: result.divergence,
        diverged,
        diff_path,
    };
    if diverged && args.fail {
        return Err(CliError::Diverged {
            message: outcome.summary(args.max_deviation),
        });
    }
    Ok(outcome)
}
