//! Batch scoring command

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::pipeline::{
    ArtifactStore, ContextCache, CsvRecordSource, PipelineConfig, Record, RecordSource,
    ScoredRecord, ScoringContext,
};
use crate::report::{analyze_sectors, save_scored};
use crate::utils::{
    create_progress_bar, create_spinner, finish_with_success, print_banner, print_completion,
    print_config, print_info, print_step_header, print_success,
};

use super::args::BatchArgs;

/// Records scored per progress tick.
const SCORE_CHUNK: usize = 10_000;

/// Load the batch named by `args`.
pub(crate) fn load_records(args: &BatchArgs) -> Result<Vec<Record>> {
    let source = CsvRecordSource::new(&args.input).with_infer_schema_length(args.schema_rows());
    let spinner = create_spinner(&format!("Reading {}...", source.describe()));
    let records = source
        .records()
        .with_context(|| format!("Failed to load records from {}", args.input.display()))?;
    finish_with_success(&spinner, &format!("Loaded {} records", records.len()));
    Ok(records)
}

/// Score in chunks so the progress bar moves on large batches.
pub(crate) fn score_with_progress(
    context: &ScoringContext,
    records: &[Record],
) -> Result<Vec<ScoredRecord>> {
    let pb = create_progress_bar(records.len() as u64, "Scoring");
    let mut scored = Vec::with_capacity(records.len());
    for chunk in records.chunks(SCORE_CHUNK) {
        scored.extend(context.score_records(chunk)?);
        pb.inc(chunk.len() as u64);
    }
    finish_with_success(&pb, &format!("Scored {} records", scored.len()));
    Ok(scored)
}

/// Show and write the sector report, then write the scored records.
pub(crate) fn write_outputs(
    context: &ScoringContext,
    scored: &[ScoredRecord],
    args: &BatchArgs,
    first_step: usize,
) -> Result<()> {
    print_step_header(first_step, "Sector Strategy Report");
    let report = analyze_sectors(scored, &context.segmenter().segment_names);
    report.display();

    let report_path = args.report_path();
    report.write_csv(&report_path)?;
    let json_path = report_path.with_extension("json");
    report.write_json(&json_path)?;
    print_success(&format!("Strategy report saved to {}", report_path.display()));

    print_step_header(first_step + 1, "Save Scored Records");
    let output = args.output_path();
    save_scored(scored, &output)?;
    print_success(&format!("Scored records saved to {}", output.display()));

    let eligible = scored.iter().filter(|s| s.interest_eligible).count();
    print_info(&format!(
        "{} of {} businesses eligible for interest reduction",
        eligible,
        scored.len()
    ));
    Ok(())
}

pub fn load_context(artifacts: &Path, config: &PipelineConfig) -> Result<std::sync::Arc<ScoringContext>> {
    let store = ArtifactStore::new(artifacts);
    ContextCache::global()
        .get_or_load(&store, config)
        .with_context(|| format!("Failed to load artifacts from {}", artifacts.display()))
}

pub fn run_score(args: &BatchArgs, config: PipelineConfig) -> Result<()> {
    let started = Instant::now();
    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(&args.input, &args.artifacts, &args.output_path(), &config);

    print_step_header(1, "Load Artifacts");
    let context = load_context(&args.artifacts, &config)?;
    print_success(&format!(
        "Artifact set {} ({} components, {} segments)",
        context.fit_id(),
        context.projector().n_components(),
        context.segmenter().k()
    ));

    print_step_header(2, "Load Records");
    let records = load_records(args)?;

    print_step_header(3, "Score Records");
    let scored = score_with_progress(&context, &records)?;

    write_outputs(&context, &scored, args, 4)?;

    print_completion(&format!(
        "Scoring complete in {:.1}s",
        started.elapsed().as_secs_f64()
    ));
    Ok(())
}
