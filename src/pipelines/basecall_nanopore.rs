use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use log::{debug, info};

use crate::cli::Arguments;
use crate::config::defs::{
    PipelineError, RunConfig, BASECALLED_DIR, FASTQ_GZ_EXT, FILTERED_DIR, GUPPY_DUMP_DIR, PASS_FASTQ_SUFFIX,
    PYCOQC_REPORT, QC_DIR, SEQUENCING_SUMMARY, TRIMMED_DIR, UNCLASSIFIED,
};
use crate::config::kits::check_barcode_kits;
use crate::config::workflows::{resolve, WorkflowCatalog};
use crate::pipelines::{PipelineStage, StageOutcome};
use crate::utils::barcodes::{merge_and_rename, BarcodeAssignment};
use crate::utils::command::{check_versions, filtlong, guppy, porechop, pycoqc};
use crate::utils::file::{check_input, check_raw_data, flag_done, make_folder, remove_folder_if_exists};
use crate::utils::manifest::{self, SampleManifest};
use crate::utils::parallel::{per_worker_budget, run_bounded};
use crate::utils::system::{check_cpus, check_mem, detect_cpus, detect_ram};


/// Fixed layout of the output root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub root: PathBuf,
    pub basecalled: PathBuf,
    pub qc: PathBuf,
    pub trimmed: PathBuf,
    pub filtered: PathBuf,
}

impl OutputLayout {
    pub fn new(root: &Path) -> Self {
        OutputLayout {
            root: root.to_path_buf(),
            basecalled: root.join(BASECALLED_DIR),
            qc: root.join(QC_DIR),
            trimmed: root.join(TRIMMED_DIR),
            filtered: root.join(FILTERED_DIR),
        }
    }

    pub fn flag(&self, stage: PipelineStage) -> PathBuf {
        self.root.join(stage.flag())
    }

    pub fn is_done(&self, stage: PipelineStage) -> bool {
        self.flag(stage).exists()
    }
}


/// Stage outcomes and the final sample manifest of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub stages: Vec<(PipelineStage, StageOutcome)>,
    pub samples: SampleManifest,
}


fn absolute(path: &str, cwd: &Path) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() { path } else { cwd.join(path) }
}


/// Validates the command line and turns it into a RunConfig.
///
/// Everything that can be checked without running a tool is checked here, before any stage
/// starts: input folder and raw data, resources, barcode kits and description file, and the
/// basecaller configuration.
pub fn build_run_config(args: Arguments) -> Result<RunConfig, PipelineError> {
    let cwd = std::env::current_dir().map_err(|e| PipelineError::io("Cannot read current directory", e))?;

    let input_dir = absolute(&args.input, &cwd);
    check_input(&input_dir)?;
    check_raw_data(&input_dir)?;
    let out_dir = absolute(&args.output, &cwd);

    let (threads, parallel) = check_cpus(args.threads, args.parallel, detect_cpus());
    let memory_gb = check_mem(args.memory, detect_ram()?);

    let barcode_kits = args.barcode_kits();
    check_barcode_kits(&barcode_kits, args.description.is_some())?;
    let assignment = match &args.description {
        Some(description) => {
            let assignment = BarcodeAssignment::from_file(&absolute(description, &cwd))?;
            if assignment.is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "Sample description file {} has no barcode assignments",
                    description
                )));
            }
            Some(assignment)
        }
        None => None,
    };

    let catalog = WorkflowCatalog::load(args.workflows.as_deref().map(|w| absolute(w, &cwd)).as_deref())?;
    let guppy_config = resolve(
        &catalog,
        args.flowcell.as_deref(),
        args.library_kit.as_deref(),
        args.sequencer,
        args.config.as_deref(),
    )?;

    let tool_timeout = match args.tool_timeout {
        Some(0) => return Err(PipelineError::InvalidConfig("--tool-timeout must be at least 1 minute".to_string())),
        Some(minutes) => Some(Duration::from_secs(minutes * 60)),
        None => None,
    };

    debug!(
        "{} threads, {} samples in parallel, {} GB memory, config {}",
        threads, parallel, memory_gb, guppy_config
    );

    Ok(RunConfig {
        cwd,
        input_dir,
        out_dir,
        args,
        threads,
        parallel,
        memory_gb,
        barcode_kits,
        guppy_config,
        assignment,
        tool_timeout,
    })
}


fn stage_program(config: &RunConfig, stage: PipelineStage) -> &str {
    match stage {
        PipelineStage::Convert => &config.args.guppy_bin,
        PipelineStage::QualityReport => &config.args.pycoqc_bin,
        PipelineStage::Trim => &config.args.porechop_bin,
        PipelineStage::Filter => &config.args.filtlong_bin,
    }
}


/// Runs `work` unless the stage is flagged done or not selected, then writes the stage flag.
///
/// The flag is only written after `work` succeeded, and `work` only succeeds once the stage's
/// outputs are on disk and its manifest is non-empty. On failure whatever the stage left on disk
/// stays there for inspection and the flag stays absent.
async fn run_stage<F, Fut>(
    stage: PipelineStage,
    layout: &OutputLayout,
    selected: &[PipelineStage],
    work: F,
) -> Result<StageOutcome, PipelineError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), PipelineError>>,
{
    if layout.is_done(stage) {
        info!("Skipping {}. Already done.", stage.label());
        return Ok(StageOutcome::AlreadyDone);
    }
    if !selected.contains(&stage) {
        info!("Skipping {}. Not selected.", stage.label());
        return Ok(StageOutcome::NotSelected);
    }
    work().await?;
    flag_done(&layout.flag(stage))?;
    Ok(StageOutcome::Executed)
}


async fn basecall(config: &RunConfig, layout: &OutputLayout) -> Result<(), PipelineError> {
    info!("Basecalling with Guppy using {}...", config.guppy_config);
    guppy::run(config, &layout.basecalled).await?;

    let basecalled = layout.basecalled.clone();
    let barcoding = config.barcoding();
    let assignment = config.assignment.clone();
    let report = tokio::task::spawn_blocking(move || merge_and_rename(&basecalled, barcoding, assignment.as_ref()))
        .await
        .map_err(|e| PipelineError::Other(anyhow!("Merging fastq failed: {}", e)))??;
    info!(
        "Merged {} fastq files, renamed {} barcode folders, deleted {} unassigned barcode folders",
        report.merged.len(),
        report.renamed.len(),
        report.deleted.len()
    );

    if remove_folder_if_exists(&layout.basecalled.join(GUPPY_DUMP_DIR))? {
        debug!("Removed {}", GUPPY_DUMP_DIR);
    }

    // no usable reads means no flag, so a rerun basecalls again
    basecalled_samples(config, layout)?;
    Ok(())
}


async fn quality_report(config: &RunConfig, layout: &OutputLayout) -> Result<(), PipelineError> {
    info!("Performing read QC with PycoQC...");
    make_folder(&layout.qc)?;
    pycoqc::run(
        config,
        &layout.basecalled.join(SEQUENCING_SUMMARY),
        &layout.qc.join(PYCOQC_REPORT),
    )
    .await
}


async fn trim(config: &RunConfig, layout: &OutputLayout, samples: &SampleManifest) -> Result<(), PipelineError> {
    info!("Removing Nanopore adapters with Porechop...");
    let program = config.args.porechop_bin.clone();
    let timeout = config.tool_timeout;
    let threads = per_worker_budget(config.threads, config.parallel);
    run_bounded(samples, &layout.trimmed, config.parallel, threads, move |job| {
        porechop::run(program.clone(), timeout, job)
    })
    .await?;
    manifest::build(&layout.trimmed, FASTQ_GZ_EXT)?;
    Ok(())
}


async fn filter(config: &RunConfig, layout: &OutputLayout, samples: &SampleManifest) -> Result<(), PipelineError> {
    info!("Filtering lower quality reads with Filtlong...");
    let program = config.args.filtlong_bin.clone();
    let keep_percent = config.args.keep_percent;
    let timeout = config.tool_timeout;
    let threads = per_worker_budget(config.threads, config.parallel);
    run_bounded(samples, &layout.filtered, config.parallel, threads, move |job| {
        filtlong::run(program.clone(), keep_percent, timeout, job)
    })
    .await?;
    manifest::build(&layout.filtered, FASTQ_GZ_EXT)?;
    Ok(())
}


/// Manifest of basecalled "pass" reads. With barcoding, the `unclassified` group stays on disk
/// but is left out of the downstream stages.
fn basecalled_samples(config: &RunConfig, layout: &OutputLayout) -> Result<SampleManifest, PipelineError> {
    let mut samples = manifest::build(&layout.basecalled, PASS_FASTQ_SUFFIX)?;
    if config.barcoding() {
        samples.remove(UNCLASSIFIED);
        if samples.is_empty() {
            return Err(PipelineError::EmptyManifest {
                dir: layout.basecalled.clone(),
                suffix: PASS_FASTQ_SUFFIX.to_string(),
            });
        }
    }
    Ok(samples)
}


/// Runs the stages selected on the command line.
pub async fn run(config: Arc<RunConfig>) -> Result<RunSummary, PipelineError> {
    let stages = config.args.stages.clone();
    run_stages(config, &stages).await
}


/// Runs basecalling, QC, trimming and filtering, in that order, restricted to `stages`.
///
/// Stages whose flag exists in the output root are skipped, so an interrupted run resumes at the
/// first unfinished stage. The sample manifest is rebuilt from disk after every stage; a run ends
/// early when basecalling or trimming has neither run nor been done before.
pub async fn run_stages(config: Arc<RunConfig>, stages: &[PipelineStage]) -> Result<RunSummary, PipelineError> {
    let layout = OutputLayout::new(&config.out_dir);
    make_folder(&layout.root)?;

    // Only the tools of stages that will actually run need to be installed
    let pending: Vec<(&str, &str)> = PipelineStage::ALL
        .iter()
        .filter(|stage| stages.contains(stage) && !layout.is_done(**stage))
        .filter(|stage| reachable(**stage, stages, &layout))
        .map(|stage| (stage.tool(), stage_program(&config, *stage)))
        .collect();
    check_versions(pending).await?;

    let mut summary = RunSummary::default();

    // 1- Basecalling
    let outcome = run_stage(PipelineStage::Convert, &layout, stages, || basecall(&config, &layout)).await?;
    summary.stages.push((PipelineStage::Convert, outcome));
    if !layout.is_done(PipelineStage::Convert) {
        return Ok(stop_after(summary, PipelineStage::Convert, SampleManifest::new()));
    }
    let basecalled = basecalled_samples(&config, &layout)?;
    info!("{} basecalled samples", basecalled.len());

    // 2- QC
    let outcome = run_stage(PipelineStage::QualityReport, &layout, stages, || quality_report(&config, &layout)).await?;
    summary.stages.push((PipelineStage::QualityReport, outcome));

    // 3- Trim reads
    let outcome = run_stage(PipelineStage::Trim, &layout, stages, || trim(&config, &layout, &basecalled)).await?;
    summary.stages.push((PipelineStage::Trim, outcome));
    if !layout.is_done(PipelineStage::Trim) {
        return Ok(stop_after(summary, PipelineStage::Trim, basecalled));
    }
    let trimmed = manifest::build(&layout.trimmed, FASTQ_GZ_EXT)?;

    // 4- Filter reads
    let outcome = run_stage(PipelineStage::Filter, &layout, stages, || filter(&config, &layout, &trimmed)).await?;
    summary.stages.push((PipelineStage::Filter, outcome));
    if !layout.is_done(PipelineStage::Filter) {
        return Ok(stop_after(summary, PipelineStage::Filter, trimmed));
    }
    let filtered = manifest::build(&layout.filtered, FASTQ_GZ_EXT)?;

    for (sample, path) in &filtered {
        info!("\t{}\t{}", sample, path.display());
    }
    summary.samples = filtered;
    Ok(summary)
}


/// Whether `stage` can start in this run: every earlier stage whose output it reads was either
/// selected or finished before.
fn reachable(stage: PipelineStage, selected: &[PipelineStage], layout: &OutputLayout) -> bool {
    [PipelineStage::Convert, PipelineStage::Trim]
        .into_iter()
        .filter(|producer| *producer < stage)
        .all(|producer| selected.contains(&producer) || layout.is_done(producer))
}


/// Ends a run whose `stage` produced no output because it was not selected. The later stages have
/// nothing to read and are reported as not selected.
fn stop_after(mut summary: RunSummary, stage: PipelineStage, samples: SampleManifest) -> RunSummary {
    for later in PipelineStage::ALL.iter().filter(|s| **s > stage) {
        if !summary.stages.iter().any(|(s, _)| s == later) {
            summary.stages.push((*later, StageOutcome::NotSelected));
        }
    }
    info!("No {} output to continue from; stopping", stage.label());
    summary.samples = samples;
    summary
}
