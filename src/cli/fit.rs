//! Fit command: load, fit, persist, then score the fit batch

use std::time::Instant;

use anyhow::Result;

use crate::pipeline::{ArtifactStore, FitStage, Pipeline, PipelineConfig};
use crate::report::display_fit_report;
use crate::utils::{print_banner, print_completion, print_config, print_step_header, StageProgress};

use super::args::BatchArgs;
use super::score::{load_records, score_with_progress, write_outputs};

pub fn run_fit(args: &BatchArgs, config: PipelineConfig) -> Result<()> {
    let started = Instant::now();
    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(&args.input, &args.artifacts, &args.output_path(), &config);

    print_step_header(1, "Load Records");
    let records = load_records(args)?;

    let store = ArtifactStore::new(&args.artifacts);
    let mut pipeline = Pipeline::new(config);
    let progress = StageProgress::new(1);

    let report = match pipeline.train(&records, &store, &progress) {
        Ok(report) => report,
        Err(e) => {
            progress.abandon();
            return Err(e.into());
        }
    };
    display_fit_report(&report);

    let context = pipeline.context()?;
    let step = 1 + FitStage::ALL.len() + 1;
    print_step_header(step, "Score Fit Batch");
    let scored = score_with_progress(&context, &records)?;

    write_outputs(&context, &scored, args, step + 1)?;

    print_completion(&format!(
        "Fit {} persisted to {} in {:.1}s",
        report.fit_id,
        store.root().display(),
        started.elapsed().as_secs_f64()
    ));
    Ok(())
}
