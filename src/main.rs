#![deny(unsafe_code)]
pub mod commands;
mod version;

use anyhow::Result;
use clap::Parser;
use clap::builder::styling::{AnsiColor, Effects, Styles};

/// Custom styles for CLI help output
const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());
use commands::command::Command;
use commands::pairs::Pairs;
use enum_dispatch::enum_dispatch;
use env_logger::Env;
use log::{debug, info};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(styles = STYLES, version = version::VERSION.as_str())]
struct Args {
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[enum_dispatch(Command)]
#[derive(Parser, Debug)]
enum Subcommand {
    #[command(display_order = 1)]
    Pairs(Pairs),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let args = Args::parse();

    info!("Running fgmate version {}", version::VERSION.as_str());
    debug!("Built for {}", version::build_info());
    args.subcommand.execute(&command_line)
}
