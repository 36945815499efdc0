use clap::{Parser, ValueEnum};

use crate::config::defs::{DEFAULT_KEEP_PERCENT, FILTLONG_TAG, GUPPY_TAG, PORECHOP_TAG, PYCOQC_TAG};
use crate::pipelines::PipelineStage;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Sequencer {
    /// Every sequencer except PromethION
    Minion,
    Promethion,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "basecall-pipelines",
    version,
    about = "Basecall Nanopore raw data to quality filtered fastq."
)]
pub struct Arguments {
    #[arg(short = 'i', long = "input", help = "Folder that contains the fast5 files.")]
    pub input: String,

    #[arg(
        short = 'o',
        long = "output",
        help = "Folder to hold the result files. Created if missing."
    )]
    pub output: String,

    #[arg(
        short = 's',
        long = "sequencer",
        value_enum,
        help = "Sequencer used. \"minion\" includes all sequencers except \"promethion\"."
    )]
    pub sequencer: Option<Sequencer>,

    #[arg(
        short = 'c',
        long = "config",
        help = "Basecaller config file, e.g. dna_r9.4.1_450bps_hac.cfg. Incompatible with -f/-l/-s."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'f',
        long = "flowcell",
        help = "Flowcell type used for sequencing, e.g. FLO-MIN106."
    )]
    pub flowcell: Option<String>,

    #[arg(short = 'l', long = "library-kit", help = "Library kit used, e.g. SQK-LSK109.")]
    pub library_kit: Option<String>,

    #[arg(
        short = 'b',
        long = "barcode-kit",
        num_args = 1..,
        help = "Barcoding kit(s) used. Use \"unknown\" if barcodes were used but the kit is not known. \
                Omitting this option disables barcode splitting."
    )]
    pub barcode_kit: Vec<String>,

    #[arg(
        short = 'd',
        long = "description",
        help = "Tab-separated file with two columns: barcode name (barcode01) and sample name."
    )]
    pub description: Option<String>,

    #[arg(
        short = 'r',
        long = "recursive",
        action,
        help = "Look for fast5 recursively in sub-folders."
    )]
    pub recursive: bool,

    #[arg(
        short = 't',
        long = "threads",
        help = "Number of threads. Defaults to all logical CPUs."
    )]
    pub threads: Option<usize>,

    #[arg(
        short = 'g',
        long = "gpu",
        default_value = "cuda:0",
        help = "GPU device(s) to use, e.g. \"cuda:0\" or \"cuda:0 cuda:1\"."
    )]
    pub gpu: String,

    #[arg(
        short = 'p',
        long = "parallel",
        default_value_t = 2,
        help = "Number of samples to process in parallel for trimming and filtering."
    )]
    pub parallel: usize,

    #[arg(
        short = 'm',
        long = "memory",
        help = "Memory in GB. Defaults to 85% of total memory."
    )]
    pub memory: Option<u64>,

    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_value = "basecall,qc,trim,filter",
        help = "Comma-separated list of stages to run"
    )]
    pub stages: Vec<PipelineStage>,

    #[arg(
        long,
        help = "Optional workflow catalog (tab-separated, columns flowcell, kit, config_name); \
                defaults to the bundled one"
    )]
    pub workflows: Option<String>,

    #[arg(
        long,
        default_value_t = DEFAULT_KEEP_PERCENT,
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    pub keep_percent: u8,

    #[arg(long, help = "Optional timeout in minutes for every external tool invocation")]
    pub tool_timeout: Option<u64>,

    #[arg(long, default_value = GUPPY_TAG)]
    pub guppy_bin: String,

    #[arg(long, default_value = PYCOQC_TAG)]
    pub pycoqc_bin: String,

    #[arg(long, default_value = PORECHOP_TAG)]
    pub porechop_bin: String,

    #[arg(long, default_value = FILTLONG_TAG)]
    pub filtlong_bin: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,
}

impl Arguments {
    /// Barcode kits as a flat list; a single quoted value like "EXP-NBD104 EXP-NBA114" is split on whitespace.
    pub fn barcode_kits(&self) -> Vec<String> {
        self.barcode_kit
            .iter()
            .flat_map(|k| k.split_whitespace())
            .map(str::to_string)
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Arguments::parse_from(["basecall-pipelines", "-i", "in", "-o", "out", "-c", "dna_r9.4.1_450bps_hac.cfg"]);
        assert_eq!(args.parallel, 2);
        assert_eq!(args.gpu, "cuda:0");
        assert_eq!(args.keep_percent, 95);
        assert_eq!(args.stages, PipelineStage::ALL.to_vec());
        assert!(args.barcode_kits().is_empty());
        assert_eq!(args.guppy_bin, "guppy_basecaller");
    }

    #[test]
    fn test_barcode_kits_split() {
        let args = Arguments::parse_from([
            "basecall-pipelines", "-i", "in", "-o", "out",
            "-b", "EXP-NBD104 EXP-NBA114", "-b", "SQK-RBK004",
        ]);
        assert_eq!(args.barcode_kits(), vec!["EXP-NBD104", "EXP-NBA114", "SQK-RBK004"]);
    }

    #[test]
    fn test_stage_subset() {
        let args = Arguments::parse_from(["basecall-pipelines", "-i", "in", "-o", "out", "--stages", "trim,filter"]);
        assert_eq!(args.stages, vec![PipelineStage::Trim, PipelineStage::Filter]);
    }
}
