//! CLI command implementations for fgmate.
//!
//! - [`pairs`] - Extract mate pairs from a coordinate-sorted BAM as FASTQ
//!
//! Shared argument groups live in [`common`].

#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::struct_excessive_bools,
    clippy::uninlined_format_args
)]

pub mod command;
pub mod common;
pub mod pairs;
