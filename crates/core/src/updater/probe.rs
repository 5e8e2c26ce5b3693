//! Runs the managed binary to learn its version.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use super::error::UpdateError;
use super::types::Version;

/// `ETXTBSY`: the file was opened for writing by another thread mid-fork.
const TEXT_FILE_BUSY: i32 = 26;
const SPAWN_ATTEMPTS: u32 = 3;

/// Runs `binary flag` and returns its single line of output.
///
/// Fails unless the process exits zero within `limit` and prints exactly one
/// non-empty line on stdout.
pub async fn probe_version_line(
    binary: &Path,
    flag: &str,
    limit: Duration,
) -> Result<String, UpdateError> {
    let mut attempt = 1;
    let output = loop {
        let run = Command::new(binary)
            .arg(flag)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(limit, run).await {
            Err(_) => {
                return Err(UpdateError::probe(format!(
                    "{} did not answer within {:?}",
                    binary.display(),
                    limit
                )))
            }
            Ok(Err(e)) if e.raw_os_error() == Some(TEXT_FILE_BUSY) && attempt < SPAWN_ATTEMPTS => {
                debug!("{} is busy, retrying probe", binary.display());
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(Err(e)) => {
                return Err(UpdateError::probe(format!(
                    "cannot run {}: {}",
                    binary.display(),
                    e
                )))
            }
            Ok(Ok(output)) => break output,
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(UpdateError::probe(format!(
            "{} exited with {}: {}",
            binary.display(),
            output.status,
            stderr.trim()
        )));
    }

    single_line(&String::from_utf8_lossy(&output.stdout))
}

/// Probes `binary` and parses the result as a [`Version`].
pub async fn probe_version(
    binary: &Path,
    flag: &str,
    limit: Duration,
) -> Result<Version, UpdateError> {
    let line = probe_version_line(binary, flag, limit).await?;
    Version::parse(&line)
        .ok_or_else(|| UpdateError::probe(format!("unrecognised version output: {:?}", line)))
}

fn single_line(stdout: &str) -> Result<String, UpdateError> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    match lines.as_slice() {
        [line] => Ok(line.to_string()),
        [] => Err(UpdateError::probe("no version output")),
        _ => Err(UpdateError::probe(format!(
            "expected one line of version output, got {}",
            lines.len()
        ))),
    }
}
