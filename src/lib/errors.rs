//! Custom error types for fgmate operations.

use thiserror::Error;

/// Result type alias for fgmate operations
pub type Result<T> = std::result::Result<T, FgmateError>;

/// Error type for fgmate operations
#[derive(Error, Debug)]
pub enum FgmateError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// File format error
    #[error("Invalid {file_type} file '{path}': {reason}")]
    InvalidFileFormat {
        /// Type of file (e.g., "BAM", "BED")
        file_type: String,
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Malformed or out-of-range horizontal shard specification
    #[error("Invalid shard '{spec}': {reason}")]
    InvalidShardSpec {
        /// The shard string as given
        spec: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Region string that could not be parsed
    #[error("Invalid region '{region}': {reason}")]
    InvalidRegion {
        /// The region string as given
        region: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Gene name missing from the gene table
    #[error("Gene '{gene}' not found in gene table '{table}'")]
    UnknownGene {
        /// The requested gene
        gene: String,
        /// Path of the table that was searched
        table: String,
    },

    /// Filter expression that failed to compile
    #[error("Invalid filter expression '{expression}' at column {column}: {reason}")]
    InvalidFilter {
        /// The full expression text
        expression: String,
        /// 1-based column of the offending token
        column: usize,
        /// Explanation of the problem
        reason: String,
    },

    /// Duplicate mate seen while the duplicate policy is set to fail
    #[error("Duplicate {mate} mate for read '{name}' (first at {first_position}, again at {second_position})")]
    DuplicateMate {
        /// Read name
        name: String,
        /// Which mate was duplicated
        mate: String,
        /// Position of the buffered record
        first_position: String,
        /// Position of the duplicate
        second_position: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameter() {
        let error = FgmateError::InvalidParameter {
            parameter: "workers".to_string(),
            reason: "must be >= 1".to_string(),
        };
        let msg = format!("{error}");
        assert!(msg.contains("Invalid parameter 'workers'"));
        assert!(msg.contains("must be >= 1"));
    }

    #[test]
    fn test_invalid_shard_spec() {
        let error =
            FgmateError::InvalidShardSpec { spec: "0,4".to_string(), reason: "too low".to_string() };
        assert_eq!(format!("{error}"), "Invalid shard '0,4': too low");
    }

    #[test]
    fn test_invalid_filter_reports_column() {
        let error = FgmateError::InvalidFilter {
            expression: "mapq >".to_string(),
            column: 7,
            reason: "expected operand".to_string(),
        };
        let msg = format!("{error}");
        assert!(msg.contains("column 7"));
        assert!(msg.contains("mapq >"));
    }

    #[test]
    fn test_duplicate_mate() {
        let error = FgmateError::DuplicateMate {
            name: "A".to_string(),
            mate: "first".to_string(),
            first_position: "chr1:10".to_string(),
            second_position: "chr1:20".to_string(),
        };
        let msg = format!("{error}");
        assert!(msg.contains("Duplicate first mate for read 'A'"));
        assert!(msg.contains("chr1:20"));
    }
}
