use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ConversionError;

/// Converts an office document to PDF with a headless LibreOffice.
///
/// LibreOffice names its output after the input stem, so `out_dir` must not
/// already hold a file of that name from another job.
pub fn convert_with_soffice(
    soffice: &str,
    source: &Path,
    out_dir: &Path,
) -> Result<PathBuf, ConversionError> {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ConversionError::Office("Source file has no usable name".to_string()))?;

    // A private profile dir lets several workers run soffice concurrently.
    let profile = tempfile::tempdir()
        .map_err(|e| ConversionError::Office(format!("Failed to create profile dir: {}", e)))?;
    let profile_url = format!("file://{}", profile.path().display());

    let output = Command::new(soffice)
        .arg(format!("-env:UserInstallation={}", profile_url))
        .args(["--headless", "--norestore", "--convert-to", "pdf", "--outdir"])
        .arg(out_dir)
        .arg(source)
        .output()
        .map_err(|e| {
            ConversionError::Office(format!(
                "Failed to run {}: {}. Make sure LibreOffice is installed.",
                soffice, e
            ))
        })?;

    if !output.status.success() {
        return Err(ConversionError::Office(format!(
            "soffice exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let pdf_path = out_dir.join(format!("{}.pdf", stem));
    if !pdf_path.exists() {
        return Err(ConversionError::Office(format!(
            "soffice reported success but {} was not written",
            crate::sanitize::redact_path(&pdf_path)
        )));
    }

    Ok(pdf_path)
}
