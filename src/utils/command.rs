/// Functions for building command lines for, and running, the external tools

use std::process::Stdio;
use std::time::Duration;

use futures::future::try_join_all;
use log::info;
use tokio::process::Command;

use crate::config::defs::PipelineError;

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(60);


pub mod guppy {
    use std::path::Path;
    use std::process::Stdio;

    use crate::config::defs::{PipelineError, RunConfig, GUPPY_TAG, UNKNOWN_BARCODE_KIT};
    use crate::utils::streams::{run_to_completion, spawn_tool};

    pub fn arg_generator(config: &RunConfig, save_path: &Path) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("--config".to_string());
        args_vec.push(config.guppy_config.clone());
        args_vec.push("--input_path".to_string());
        args_vec.push(config.input_dir.to_string_lossy().to_string());
        args_vec.push("--save_path".to_string());
        args_vec.push(save_path.to_string_lossy().to_string());
        args_vec.push("--calib_detect".to_string());
        args_vec.push("--records_per_fastq".to_string());
        args_vec.push("0".to_string());
        args_vec.push("--compress_fastq".to_string());
        args_vec.push("--disable_pings".to_string());
        args_vec.push("--gpu_runners_per_device".to_string());
        args_vec.push("2".to_string());
        args_vec.push("--chunk_size".to_string());
        args_vec.push("1000".to_string());
        args_vec.push("--chunks_per_runner".to_string());
        args_vec.push("128".to_string());
        args_vec.push("--device".to_string());
        args_vec.push(config.args.gpu.clone());
        args_vec.push("--detect_adapter".to_string());
        args_vec.push("--detect_primer".to_string());
        args_vec.push("--trim_adapters".to_string());
        args_vec.push("--trim_primers".to_string());

        if config.args.recursive {
            args_vec.push("--recursive".to_string());
        }
        if config.barcoding() {
            args_vec.push("--detect_barcodes".to_string());
            if config.barcode_kits.iter().all(|k| k != UNKNOWN_BARCODE_KIT) {
                args_vec.push("--barcode_kits".to_string());
                args_vec.push(config.barcode_kits.join(" "));
            }
        }
        args_vec
    }

    pub async fn run(config: &RunConfig, save_path: &Path) -> Result<(), PipelineError> {
        let args = arg_generator(config, save_path);
        let child = spawn_tool(GUPPY_TAG, &config.args.guppy_bin, &args, Stdio::inherit(), Stdio::inherit())?;
        run_to_completion(GUPPY_TAG, child, config.tool_timeout).await
    }
}


pub mod pycoqc {
    use std::path::Path;
    use std::process::Stdio;

    use crate::config::defs::{PipelineError, RunConfig, PYCOQC_TAG};
    use crate::utils::streams::{run_to_completion, spawn_tool};

    pub fn arg_generator(summary: &Path, report: &Path) -> Vec<String> {
        vec![
            "-f".to_string(),
            summary.to_string_lossy().to_string(),
            "-o".to_string(),
            report.to_string_lossy().to_string(),
        ]
    }

    pub async fn run(config: &RunConfig, summary: &Path, report: &Path) -> Result<(), PipelineError> {
        if !summary.is_file() {
            return Err(PipelineError::ToolExecution {
                tool: PYCOQC_TAG.to_string(),
                error: format!("sequencing summary {} not found", summary.display()),
            });
        }
        let args = arg_generator(summary, report);
        let child = spawn_tool(PYCOQC_TAG, &config.args.pycoqc_bin, &args, Stdio::null(), Stdio::inherit())?;
        run_to_completion(PYCOQC_TAG, child, config.tool_timeout).await
    }
}


pub mod porechop {
    use std::process::Stdio;
    use std::time::Duration;

    use crate::config::defs::{PipelineError, FASTQ_GZ_EXT, PORECHOP_CHECK_READS, PORECHOP_TAG};
    use crate::utils::parallel::SampleJob;
    use crate::utils::streams::{check_output, run_to_completion, spawn_tool};

    pub fn arg_generator(job: &SampleJob) -> Vec<String> {
        vec![
            "-i".to_string(),
            job.input.to_string_lossy().to_string(),
            "-o".to_string(),
            job.output(FASTQ_GZ_EXT).to_string_lossy().to_string(),
            "--threads".to_string(),
            job.threads.to_string(),
            // adapters are searched in 1,000 reads instead of 10,000
            "--check_reads".to_string(),
            PORECHOP_CHECK_READS.to_string(),
        ]
    }

    /// Trims one sample; the tool's own chatter is discarded. Exiting 0 without writing the
    /// sample's output counts as a failure.
    pub async fn run(program: String, timeout: Option<Duration>, job: SampleJob) -> Result<(), PipelineError> {
        let args = arg_generator(&job);
        let child = spawn_tool(PORECHOP_TAG, &program, &args, Stdio::null(), Stdio::null())?;
        run_to_completion(PORECHOP_TAG, child, timeout).await?;
        check_output(PORECHOP_TAG, &job.output(FASTQ_GZ_EXT))
    }
}


pub mod filtlong {
    use std::process::Stdio;
    use std::time::Duration;

    use log::debug;

    use crate::config::defs::{PipelineError, FASTQ_GZ_EXT, FILTLONG_TAG};
    use crate::utils::parallel::SampleJob;
    use crate::utils::streams::{check_output, spawn_tool, stdout_to_gzip};

    pub fn arg_generator(keep_percent: u8, job: &SampleJob) -> Vec<String> {
        vec![
            "--keep_percent".to_string(),
            keep_percent.to_string(),
            job.input.to_string_lossy().to_string(),
        ]
    }

    /// Filters one sample. The tool writes reads to stdout, which is compressed into
    /// `<out_dir>/<sample>.fastq.gz`.
    pub async fn run(
        program: String,
        keep_percent: u8,
        timeout: Option<Duration>,
        job: SampleJob,
    ) -> Result<(), PipelineError> {
        let args = arg_generator(keep_percent, &job);
        let child = spawn_tool(FILTLONG_TAG, &program, &args, Stdio::piped(), Stdio::null())?;
        let output = job.output(FASTQ_GZ_EXT);
        let written = stdout_to_gzip(FILTLONG_TAG, child, &output, timeout).await?;
        debug!("{}: kept {} bytes", job.sample, written);
        check_output(FILTLONG_TAG, &output)
    }
}


/// Pulls a version number out of `--version` output, e.g. `6.3.8` from
/// `... plc. Version 6.3.8+d9e0f64, minimap2 version 2.22-r1101`.
pub fn parse_version(output: &str) -> Option<String> {
    output
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|token| token.trim_start_matches(['v', 'V']))
        .find(|token| token.starts_with(|c: char| c.is_ascii_digit()) && token.contains('.'))
        .map(|token| token.split('+').next().unwrap_or(token).to_string())
}


/// Runs `<program> --version` to make sure a tool is installed.
///
/// # Returns
/// the reported version, or the first output line if no version number can be found
pub async fn check_version(tool: &str, program: &str) -> Result<String, PipelineError> {
    let mut command = Command::new(program);
    command
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(VERSION_CHECK_TIMEOUT, command.output())
        .await
        .map_err(|_| PipelineError::MissingTool {
            tool: tool.to_string(),
            error: format!("'{} --version' did not return", program),
        })?
        .map_err(|e| PipelineError::MissingTool {
            tool: tool.to_string(),
            error: format!("failed to spawn {}: {}", program, e),
        })?;

    if !output.status.success() {
        return Err(PipelineError::MissingTool {
            tool: tool.to_string(),
            error: format!("'{} --version' exited with {}", program, output.status),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stdout.trim().is_empty() { stderr } else { stdout };
    let version = parse_version(&text)
        .or_else(|| text.lines().next().map(|l| l.trim().to_string()))
        .unwrap_or_default();
    Ok(version)
}


/// Checks every `(tool, program)` pair concurrently and logs the versions found.
pub async fn check_versions(tools: Vec<(&str, &str)>) -> Result<Vec<String>, PipelineError> {
    let versions = try_join_all(tools.iter().map(|(tool, program)| check_version(tool, program))).await?;
    for ((tool, _), version) in tools.iter().zip(&versions) {
        info!("Running {} {}", tool, version);
    }
    Ok(versions)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    use clap::Parser;

    use crate::cli::Arguments;
    use crate::config::defs::RunConfig;
    use crate::utils::parallel::SampleJob;

    fn run_config(extra: &[&str], barcode_kits: &[&str]) -> RunConfig {
        let mut argv = vec!["basecall-pipelines", "-i", "/data/fast5", "-o", "/data/out"];
        argv.extend_from_slice(extra);
        let args = Arguments::parse_from(argv);
        RunConfig {
            cwd: PathBuf::from("/data"),
            input_dir: PathBuf::from("/data/fast5"),
            out_dir: PathBuf::from("/data/out"),
            args,
            threads: 8,
            parallel: 2,
            memory_gb: 16,
            barcode_kits: barcode_kits.iter().map(|k| k.to_string()).collect(),
            guppy_config: "dna_r9.4.1_450bps_hac.cfg".to_string(),
            assignment: None,
            tool_timeout: None,
        }
    }

    #[test]
    fn test_guppy_args_plain() {
        let config = run_config(&[], &[]);
        let args = guppy::arg_generator(&config, Path::new("/data/out/1_basecalled"));
        assert_eq!(&args[..6], ["--config", "dna_r9.4.1_450bps_hac.cfg", "--input_path", "/data/fast5", "--save_path", "/data/out/1_basecalled"]);
        let device = args.iter().position(|a| a == "--device").unwrap();
        assert_eq!(args[device + 1], "cuda:0");
        assert!(!args.contains(&"--recursive".to_string()));
        assert!(!args.contains(&"--detect_barcodes".to_string()));
    }

    #[test]
    fn test_guppy_args_barcodes() {
        let config = run_config(&["-r", "-g", "cuda:0 cuda:1"], &["EXP-NBD104", "EXP-NBA114"]);
        let args = guppy::arg_generator(&config, Path::new("/out"));
        assert!(args.contains(&"--recursive".to_string()));
        assert!(args.contains(&"cuda:0 cuda:1".to_string()));
        assert_eq!(&args[args.len() - 3..], ["--detect_barcodes", "--barcode_kits", "EXP-NBD104 EXP-NBA114"]);

        let config = run_config(&[], &["unknown"]);
        let args = guppy::arg_generator(&config, Path::new("/out"));
        assert_eq!(args.last().unwrap(), "--detect_barcodes");
    }

    #[test]
    fn test_sample_tool_args() {
        let job = SampleJob {
            sample: "fox".to_string(),
            input: PathBuf::from("/out/1_basecalled/pass/fox/fox_pass.fastq.gz"),
            out_dir: PathBuf::from("/out/3_trimmed"),
            threads: 4,
        };
        assert_eq!(
            porechop::arg_generator(&job),
            vec![
                "-i", "/out/1_basecalled/pass/fox/fox_pass.fastq.gz",
                "-o", "/out/3_trimmed/fox.fastq.gz",
                "--threads", "4",
                "--check_reads", "1000",
            ]
        );
        assert_eq!(
            filtlong::arg_generator(95, &job),
            vec!["--keep_percent", "95", "/out/1_basecalled/pass/fox/fox_pass.fastq.gz"]
        );
        assert_eq!(
            pycoqc::arg_generator(Path::new("/s.txt"), Path::new("/qc/r.html")),
            vec!["-f", "/s.txt", "-o", "/qc/r.html"]
        );
    }

    #[test]
    fn test_parse_version() {
        let guppy = ": Guppy Basecalling Software, (C) Oxford Nanopore Technologies plc. Version 6.3.8+d9e0f64, minimap2 version 2.22-r1101";
        assert_eq!(parse_version(guppy).as_deref(), Some("6.3.8"));
        assert_eq!(parse_version("Filtlong v0.2.1\n").as_deref(), Some("0.2.1"));
        assert_eq!(parse_version("0.2.4\n").as_deref(), Some("0.2.4"));
        assert_eq!(parse_version("no digits here"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_porechop_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let job = SampleJob {
            sample: "cat".to_string(),
            input: dir.path().join("cat_pass.fastq.gz"),
            out_dir: dir.path().to_path_buf(),
            threads: 1,
        };
        // `true` accepts any arguments, exits 0 and writes nothing
        let err = porechop::run("true".to_string(), None, job).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolExecution { ref tool, .. } if tool == "porechop"));
        assert!(err.to_string().contains("produced no output"));
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let err = check_version("porechop", "definitely-not-a-real-binary-xyz").await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingTool { .. }));
    }
}
