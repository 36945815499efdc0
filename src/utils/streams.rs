// src/utils/streams.rs: Child process plumbing for the external tools
use std::io::{BufWriter, Write};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use crate::config::defs::PipelineError;

const PIPE_BUFFER: usize = 64 * 1024;


/// Spawns `program` with `args`. The child is killed if its handle is dropped, which is what
/// cancels a tool when its task is aborted.
pub fn spawn_tool(
    tool: &str,
    program: &str,
    args: &[String],
    stdout: Stdio,
    stderr: Stdio,
) -> Result<Child, PipelineError> {
    debug!("{} {}", program, args.join(" "));
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!("failed to spawn {}: {}", program, e),
        })
}


/// Waits for `child`, killing it if `timeout` elapses first.
pub async fn wait_with_timeout(
    tool: &str,
    child: &mut Child,
    timeout: Option<Duration>,
) -> Result<ExitStatus, PipelineError> {
    let status = match timeout {
        Some(limit) => {
            let outcome = tokio::time::timeout(limit, child.wait()).await;
            match outcome {
                Ok(status) => status,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(PipelineError::ToolTimeout { tool: tool.to_string(), timeout: limit });
                }
            }
        }
        None => child.wait().await,
    };
    status.map_err(|e| PipelineError::ToolExecution {
        tool: tool.to_string(),
        error: format!("failed to wait: {}", e),
    })
}


pub fn check_status(tool: &str, status: ExitStatus) -> Result<(), PipelineError> {
    if status.success() {
        Ok(())
    } else {
        Err(PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!("exited with {}", status),
        })
    }
}


/// Fails with `ToolExecution` unless a tool that exited successfully left `output` behind.
pub fn check_output(tool: &str, output: &Path) -> Result<(), PipelineError> {
    if output.is_file() {
        Ok(())
    } else {
        Err(PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!("exited successfully but produced no output {}", output.display()),
        })
    }
}


/// Runs a child to completion and turns a non-zero exit into `ToolExecution`.
pub async fn run_to_completion(
    tool: &str,
    mut child: Child,
    timeout: Option<Duration>,
) -> Result<(), PipelineError> {
    let status = wait_with_timeout(tool, &mut child, timeout).await?;
    check_status(tool, status)
}


/// Gzip-compresses the child's stdout into `out_path`.
///
/// Output goes to a temp file next to `out_path` that is only renamed into place once the child
/// exited successfully, so a failed or killed tool never leaves a file under the final name.
///
/// # Returns
/// number of uncompressed bytes written
pub async fn stdout_to_gzip(
    tool: &str,
    mut child: Child,
    out_path: &Path,
    timeout: Option<Duration>,
) -> Result<u64, PipelineError> {
    let stdout = child.stdout.take().ok_or_else(|| PipelineError::ToolExecution {
        tool: tool.to_string(),
        error: "stdout was not captured".to_string(),
    })?;
    let parent = out_path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(parent)
        .map_err(|e| PipelineError::io(format!("Cannot create temp file in {}", parent.display()), e))?;

    let outcome = match timeout {
        Some(limit) => {
            let timed = tokio::time::timeout(limit, pump_gzip(tool, &mut child, stdout, tmp)).await;
            match timed {
                Ok(outcome) => outcome,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(PipelineError::ToolTimeout { tool: tool.to_string(), timeout: limit });
                }
            }
        }
        None => pump_gzip(tool, &mut child, stdout, tmp).await,
    };
    let (tmp, written, status) = outcome?;
    check_status(tool, status)?;

    tmp.persist(out_path)
        .map_err(|e| PipelineError::io(format!("Cannot write {}", out_path.display()), e.error))?;
    Ok(written)
}

async fn pump_gzip(
    tool: &str,
    child: &mut Child,
    mut stdout: ChildStdout,
    tmp: NamedTempFile,
) -> Result<(NamedTempFile, u64, ExitStatus), PipelineError> {
    let mut encoder = GzEncoder::new(BufWriter::new(tmp), Compression::default());
    let mut buf = vec![0u8; PIPE_BUFFER];
    let mut written = 0u64;
    loop {
        let n = stdout.read(&mut buf).await.map_err(|e| PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!("failed to read stdout: {}", e),
        })?;
        if n == 0 {
            break;
        }
        encoder
            .write_all(&buf[..n])
            .map_err(|e| PipelineError::io("Cannot write compressed output", e))?;
        written += n as u64;
    }
    let writer = encoder
        .finish()
        .map_err(|e| PipelineError::io("Cannot finish compressed output", e))?;
    let tmp = writer
        .into_inner()
        .map_err(|e| PipelineError::io("Cannot flush compressed output", e.into_error()))?;
    let status = wait_with_timeout(tool, child, None).await?;
    Ok((tmp, written, status))
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn sh(script: &str, stdout: Stdio) -> Child {
        spawn_tool("sh", "sh", &["-c".to_string(), script.to_string()], stdout, Stdio::null()).unwrap()
    }

    #[tokio::test]
    async fn test_run_to_completion_status() {
        assert!(run_to_completion("sh", sh("exit 0", Stdio::null()), None).await.is_ok());
        let err = run_to_completion("sh", sh("exit 3", Stdio::null()), None).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolExecution { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let child = sh("sleep 30", Stdio::null());
        let started = std::time::Instant::now();
        let err = run_to_completion("sh", child, Some(Duration::from_millis(200))).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let err = spawn_tool("nope", "definitely-not-a-real-binary-xyz", &[], Stdio::null(), Stdio::null()).unwrap_err();
        assert!(matches!(err, PipelineError::ToolExecution { .. }));
    }

    #[tokio::test]
    async fn test_stdout_to_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("fox.fastq.gz");
        let child = sh("printf '@r1\\nACGT\\n+\\nIIII\\n'", Stdio::piped());
        let written = stdout_to_gzip("sh", child, &out, None).await.unwrap();
        assert_eq!(written, 16);

        let mut text = String::new();
        GzDecoder::new(std::fs::File::open(&out).unwrap()).read_to_string(&mut text).unwrap();
        assert_eq!(text, "@r1\nACGT\n+\nIIII\n");
    }

    #[tokio::test]
    async fn test_stdout_to_gzip_failure_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("fox.fastq.gz");
        let child = sh("echo partial; exit 1", Stdio::piped());
        assert!(stdout_to_gzip("sh", child, &out, None).await.is_err());
        assert!(!out.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_stdout_to_gzip_timeout_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("fox.fastq.gz");
        let child = sh("printf '@r1\\n'; sleep 30", Stdio::piped());
        let started = std::time::Instant::now();
        let err = stdout_to_gzip("sh", child, &out, Some(Duration::from_millis(300))).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!out.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_check_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cat.fastq.gz");
        let err = check_output("porechop", &out).unwrap_err();
        assert!(err.to_string().contains("produced no output"));
        std::fs::write(&out, b"x").unwrap();
        assert!(check_output("porechop", &out).is_ok());
    }
}
