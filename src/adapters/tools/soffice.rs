//! LibreOffice converter. Implements DocumentConverter by running `soffice --headless`.
//!
//! One conversion at a time: concurrent soffice instances sharing a profile fail randomly.

use crate::domain::DomainError;
use crate::ports::DocumentConverter;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_SOFFICE: &str = "soffice";

pub struct SofficeConverter {
    bin: PathBuf,
    timeout: Duration,
    lock: Mutex<()>,
}

impl SofficeConverter {
    /// `bin` empty means `soffice` from PATH.
    pub fn new(bin: impl AsRef<Path>, timeout: Duration) -> Self {
        let bin = bin.as_ref();
        let bin = if bin.as_os_str().is_empty() {
            PathBuf::from(DEFAULT_SOFFICE)
        } else {
            bin.to_path_buf()
        };
        Self {
            bin,
            timeout,
            lock: Mutex::new(()),
        }
    }
}

fn converr(msg: String) -> DomainError {
    DomainError::Converter(msg)
}

#[async_trait]
impl DocumentConverter for SofficeConverter {
    async fn convert(&self, source: &Path) -> Result<PathBuf, DomainError> {
        let input = std::path::absolute(source)
            .map_err(|e| converr(format!("abs input: {}", e)))?;
        let out_dir = input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let stem = input
            .file_stem()
            .ok_or_else(|| converr("input has no file name".into()))?;
        let pdf = out_dir.join(format!("{}.pdf", stem.to_string_lossy()));

        let _guard = self.lock.lock().await;
        let _ = tokio::fs::remove_file(&pdf).await;

        let mut cmd = Command::new(&self.bin);
        cmd.args(["--headless", "--nologo", "--nofirststartwizard", "--convert-to", "pdf"])
            .arg("--outdir")
            .arg(&out_dir)
            .arg(&input)
            .kill_on_drop(true);

        debug!(bin = %self.bin.display(), input = %input.display(), "running soffice");
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(converr(format!("soffice failed to start: {}", e))),
            // Dropping the output future kills the child.
            Err(_) => {
                return Err(converr(format!(
                    "soffice timeout after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(converr(format!(
                "soffice failed: {}; stderr={}; stdout={}",
                output.status,
                stderr.trim(),
                stdout.trim()
            )));
        }
        if !tokio::fs::try_exists(&pdf).await.unwrap_or(false) {
            return Err(converr(format!(
                "pdf not created; stderr={}; stdout={}",
                stderr.trim(),
                stdout.trim()
            )));
        }
        info!(pdf = %pdf.display(), "converted to PDF");
        Ok(pdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_converter_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("invoice_1.xlsx");
        std::fs::write(&src, b"x").unwrap();
        let conv = SofficeConverter::new(dir.path().join("no-such-soffice"), Duration::from_secs(5));
        assert!(matches!(
            conv.convert(&src).await,
            Err(DomainError::Converter(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fake_soffice_produces_pdf() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-soffice");
        // Args: --headless --nologo --nofirststartwizard --convert-to pdf --outdir DIR INPUT
        std::fs::write(
            &script,
            "#!/bin/sh\nbase=$(basename \"$8\" .xlsx)\ntouch \"$7/$base.pdf\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let src = dir.path().join("invoice_9.xlsx");
        std::fs::write(&src, b"x").unwrap();
        let conv = SofficeConverter::new(&script, Duration::from_secs(10));
        let pdf = conv.convert(&src).await.unwrap();
        assert_eq!(pdf.file_name().unwrap(), "invoice_9.pdf");
        assert!(pdf.exists());
    }
}
