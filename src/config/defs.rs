use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cli::Arguments;
use crate::utils::barcodes::BarcodeAssignment;

// External software
pub const GUPPY_TAG: &str = "guppy_basecaller";
pub const PYCOQC_TAG: &str = "pycoQC";
pub const PORECHOP_TAG: &str = "porechop";
pub const FILTLONG_TAG: &str = "filtlong";

// Output folders
pub const BASECALLED_DIR: &str = "1_basecalled";
pub const QC_DIR: &str = "2_qc";
pub const TRIMMED_DIR: &str = "3_trimmed";
pub const FILTERED_DIR: &str = "4_filtered";

// Stage completion flags
pub const DONE_BASECALLING: &str = "done_basecalling";
pub const DONE_QC: &str = "done_QC";
pub const DONE_TRIMMING: &str = "done_trimming";
pub const DONE_FILTERING: &str = "done_filtering";

// Static Filenames
pub const GUPPY_DUMP_DIR: &str = "guppy_basecaller-core-dump-db";
pub const SEQUENCING_SUMMARY: &str = "sequencing_summary.txt";
pub const PYCOQC_REPORT: &str = "pycoQC_output.html";

// Classification groups written by the basecaller
pub const PASS_GROUP: &str = "pass";
pub const FAIL_GROUP: &str = "fail";
pub const CLASSIFICATION_GROUPS: &[&str] = &[PASS_GROUP, FAIL_GROUP];
pub const UNCLASSIFIED: &str = "unclassified";
pub const UNKNOWN_BARCODE_KIT: &str = "unknown";

// Static Parameters
pub const RAW_EXT: &str = ".fast5";
pub const FASTQ_GZ_EXT: &str = ".fastq.gz";
pub const PASS_FASTQ_SUFFIX: &str = "pass.fastq.gz";
pub const GUPPY_CONFIG_EXT: &str = ".cfg";
pub const PROMETHION_MARKER: &str = "prom";
pub const PORECHOP_CHECK_READS: usize = 1000;
pub const DEFAULT_KEEP_PERCENT: u8 = 95;
pub const MEMORY_FRACTION: f64 = 0.85;


/// Everything a pipeline run needs once the command line has been validated.
#[derive(Debug)]
pub struct RunConfig {
    pub cwd: PathBuf,
    pub input_dir: PathBuf,
    pub out_dir: PathBuf,
    pub args: Arguments,
    pub threads: usize,
    pub parallel: usize,
    pub memory_gb: u64,
    pub barcode_kits: Vec<String>,
    pub guppy_config: String,
    pub assignment: Option<BarcodeAssignment>,
    pub tool_timeout: Option<Duration>,
}

impl RunConfig {
    pub fn barcoding(&self) -> bool {
        !self.barcode_kits.is_empty()
    }
}


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Could not resolve a basecalling configuration for {query}: {reason}")]
    ConfigResolution { query: String, reason: String },

    #[error("Sample dictionary empty! No files ending with '{suffix}' found in {}", dir.display())]
    EmptyManifest { dir: PathBuf, suffix: String },

    #[error("{tool} is not available: {error}. Is it installed?")]
    MissingTool { tool: String, error: String },

    #[error("{tool} failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("{tool} timed out after {} seconds", timeout.as_secs())]
    ToolTimeout { tool: String, timeout: Duration },

    #[error("Cannot rename {barcode} to {sample} in '{group}': {} already exists", target.display())]
    BarcodeCollision {
        group: String,
        barcode: String,
        sample: String,
        target: PathBuf,
    },

    #[error("I/O error: {0}")]
    IOError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub(crate) fn io(context: impl std::fmt::Display, e: std::io::Error) -> Self {
        PipelineError::IOError(format!("{}: {}", context, e))
    }
}
