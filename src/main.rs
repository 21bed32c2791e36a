// BRIGHTNESSD -- DISPLAY BACKLIGHT CONTROL SERVICE
// TEST UTILITY AND SERVICE RUNNER
//
// THE SERVICE CORE LIVES IN THE LIBRARY CRATE; THIS BINARY WIRES IT TO
// A REAL (OR SIMULATED) BACKLIGHT AND DRIVES IT FROM THE COMMAND LINE.

mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::{Parser, Subcommand};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "brightnessd")]
#[command(about = "BRIGHTNESSD -- DISPLAY BACKLIGHT CONTROL SERVICE")]
struct Cli {
    #[command(subcommand)]
    command: Option<SubCmd>,
}

#[derive(Subcommand)]
enum SubCmd {
    /// Print the current level; with -l, apply mode/level/ramp
    Info(InfoArgs),

    /// Run the in-process test suite (exit 0 on success)
    Test(TestArgs),
}

#[derive(Parser)]
struct InfoArgs {
    /// Brightness level to apply
    #[arg(short = 'l', long)]
    level: Option<i32>,

    /// Ramp rate in levels per second (0 = snap)
    #[arg(short = 'r', long, default_value_t = 0)]
    ramp: i32,

    /// Brightness mode (0 = auto, 1 = manual)
    #[arg(short = 'm', long, default_value_t = 1)]
    mode: i32,

    /// Watch level changes until ctrl+c
    #[arg(short = 'u', long)]
    ui: bool,

    /// Publish fake sensor data
    #[arg(short = 'f', long)]
    fakesensor: bool,

    /// Fake sensor sample rate in Hz
    #[arg(short = 's', long, default_value_t = 2)]
    samplerate: i32,

    /// Sysfs backlight directory (default: first /sys/class/backlight entry)
    #[arg(long)]
    device: Option<PathBuf>,

    #[arg(long)]
    verbose: bool,
}

#[derive(Parser)]
struct TestArgs {
    /// Fake sensor sample rate in Hz
    #[arg(short = 's', long, default_value_t = 100)]
    samplerate: i32,

    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })?;

    let cli = Cli::parse();

    match cli.command {
        None => cli::info::run_info(None, 0, 1, false, false, 2, None, false, &SHUTDOWN),
        Some(SubCmd::Info(args)) => cli::info::run_info(
            args.level,
            args.ramp,
            args.mode,
            args.ui,
            args.fakesensor,
            args.samplerate,
            args.device.as_deref(),
            args.verbose,
            &SHUTDOWN,
        ),
        Some(SubCmd::Test(args)) => cli::harness::run_test(args.samplerate, args.verbose),
    }
}
