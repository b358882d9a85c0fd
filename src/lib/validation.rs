//! Command-line parameter checks run before any input is read.
//!
//! Every check returns a structured [`FgmateError`] so commands can surface the offending
//! parameter by name.

use std::fmt::Display;
use std::path::Path;

use crate::bam_io::is_stdio_path;
use crate::errors::{FgmateError, Result};

/// Checks that an input file exists. The stdin marker `-` always passes.
///
/// # Errors
///
/// Returns an error if the file does not exist.
///
/// ```
/// use fgmate_lib::validation::validate_file_exists;
///
/// assert!(validate_file_exists("/nonexistent/in.bam", "Input BAM").is_err());
/// assert!(validate_file_exists("-", "Input BAM").is_ok());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path = path.as_ref();
    if is_stdio_path(path) || path.exists() {
        return Ok(());
    }
    Err(FgmateError::InvalidFileFormat {
        file_type: description.to_string(),
        path: path.display().to_string(),
        reason: "File does not exist".to_string(),
    })
}

/// Checks a list of `(path, description)` inputs, failing on the first missing one.
///
/// # Errors
///
/// Returns an error for the first file that does not exist.
pub fn validate_files_exist<P: AsRef<Path>>(files: &[(P, &str)]) -> Result<()> {
    files.iter().try_for_each(|(path, description)| validate_file_exists(path, description))
}

/// Checks that a value is strictly positive.
///
/// # Errors
///
/// Returns an error if `value <= 0`.
#[allow(clippy::needless_pass_by_value)]
pub fn validate_positive<T: Ord + Display + Default>(value: T, name: &str) -> Result<()> {
    if value <= T::default() {
        return Err(FgmateError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be positive (> 0), got: {value}"),
        });
    }
    Ok(())
}

/// Checks a gzip compression level.
///
/// # Errors
///
/// Returns an error if `level > 9`.
pub fn validate_compression_level(level: u32, name: &str) -> Result<()> {
    if level > 9 {
        return Err(FgmateError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be between 0 and 9, got: {level}"),
        });
    }
    Ok(())
}

/// Checks that two output paths do not name the same file.
///
/// Writing both mates to stdout is also rejected since the records would interleave.
///
/// # Errors
///
/// Returns an error if the paths are equal.
pub fn validate_distinct_outputs(first: &Path, second: &Path) -> Result<()> {
    if first == second {
        return Err(FgmateError::InvalidParameter {
            parameter: "output2".to_string(),
            reason: format!("Must differ from --output ({})", first.display()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_file_exists() {
        let temp = NamedTempFile::new().unwrap();
        validate_file_exists(temp.path(), "Input BAM").unwrap();

        let err = validate_file_exists("/nonexistent/in.bam", "Input BAM").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Input BAM"));
        assert!(msg.contains("does not exist"));
    }

    #[test]
    fn test_validate_files_exist_reports_first_missing() {
        let temp = NamedTempFile::new().unwrap();
        let files = vec![
            (temp.path().to_path_buf(), "Input BAM"),
            (PathBuf::from("/nonexistent.bed"), "Regions BED"),
        ];
        let err = validate_files_exist(&files).unwrap_err();
        assert!(err.to_string().contains("Regions BED"));
    }

    #[rstest]
    #[case(1, true)]
    #[case(64, true)]
    #[case(0, false)]
    fn test_validate_positive(#[case] value: usize, #[case] ok: bool) {
        assert_eq!(validate_positive(value, "workers").is_ok(), ok);
    }

    #[rstest]
    #[case(0, true)]
    #[case(6, true)]
    #[case(9, true)]
    #[case(10, false)]
    fn test_validate_compression_level(#[case] level: u32, #[case] ok: bool) {
        assert_eq!(validate_compression_level(level, "compression-level").is_ok(), ok);
    }

    #[test]
    fn test_validate_distinct_outputs() {
        assert!(validate_distinct_outputs(Path::new("r1.fq"), Path::new("r2.fq")).is_ok());
        assert!(validate_distinct_outputs(Path::new("-"), Path::new("-")).is_err());
    }
}
