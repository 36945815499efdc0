pub mod basecall_nanopore;

use clap::ValueEnum;

use crate::config::defs::{
    DONE_BASECALLING, DONE_FILTERING, DONE_QC, DONE_TRIMMING, FILTLONG_TAG, GUPPY_TAG, PORECHOP_TAG, PYCOQC_TAG,
};

/// Pipeline stages, in the only order they ever run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum PipelineStage {
    #[value(name = "basecall")]
    Convert,
    #[value(name = "qc")]
    QualityReport,
    Trim,
    Filter,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 4] = [
        PipelineStage::Convert,
        PipelineStage::QualityReport,
        PipelineStage::Trim,
        PipelineStage::Filter,
    ];

    /// Name of the completion flag in the output root.
    pub fn flag(self) -> &'static str {
        match self {
            PipelineStage::Convert => DONE_BASECALLING,
            PipelineStage::QualityReport => DONE_QC,
            PipelineStage::Trim => DONE_TRIMMING,
            PipelineStage::Filter => DONE_FILTERING,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Convert => "basecalling",
            PipelineStage::QualityReport => "QC",
            PipelineStage::Trim => "trimming",
            PipelineStage::Filter => "filtering",
        }
    }

    /// External tool the stage depends on.
    pub fn tool(self) -> &'static str {
        match self {
            PipelineStage::Convert => GUPPY_TAG,
            PipelineStage::QualityReport => PYCOQC_TAG,
            PipelineStage::Trim => PORECHOP_TAG,
            PipelineStage::Filter => FILTLONG_TAG,
        }
    }
}


/// What happened to a stage during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Executed,
    AlreadyDone,
    NotSelected,
}
