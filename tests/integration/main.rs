//! Integration tests for the fgmate binary.
//!
//! These tests generate coordinate-sorted BAMs, run `fgmate pairs` end to end and check the
//! FASTQ, metrics and residual files it writes.

mod helpers;
mod test_error_paths;
mod test_pairs_command;
mod test_sharding;
