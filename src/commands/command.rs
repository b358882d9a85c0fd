//! Command trait definition for CLI commands.
//!
//! Every `fgmate` subcommand implements [`Command`]; `enum_dispatch` forwards `execute` from
//! the `Subcommand` enum in `main.rs` to the selected variant.

use anyhow::Result;
use enum_dispatch::enum_dispatch;

/// Trait implemented by all fgmate CLI commands.
///
/// `command_line` is the full invocation, kept for commands that record provenance.
#[enum_dispatch]
pub trait Command {
    #[allow(clippy::missing_errors_doc)]
    fn execute(&self, command_line: &str) -> Result<()>;
}
