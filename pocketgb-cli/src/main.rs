use clap::error::ErrorKind;
use clap::Parser;
use pocketgb_core::{InputConfig, RunConfig};
use std::process;

#[derive(Parser)]
#[command(name = "pocketgb", about = "An emulator for the 8-bit handheld game console")]
struct Cli {
    /// Path to the ROM image
    rom: String,

    /// Window scale factor
    #[arg(short = 's', long = "scale", default_value_t = 2)]
    scale: u32,

    /// Disable audio output
    #[arg(long = "no-audio", default_value_t = true, action = clap::ArgAction::SetFalse)]
    audio_enabled: bool,

    /// Disable VSync
    #[arg(long = "no-vsync", default_value_t = true, action = clap::ArgAction::SetFalse)]
    vsync_enabled: bool,
}

fn main() {
    env_logger::init();

    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return;
        }
        Err(_) => {
            eprintln!("ERROR: Usage: pocketgb <rom>");
            process::exit(1);
        }
    };

    let run_config = RunConfig {
        rom_file_path: args.rom,
        audio_enabled: args.audio_enabled,
        vsync_enabled: args.vsync_enabled,
        display_scale: args.scale,
        input_config: InputConfig::default(),
    };

    if let Err(err) = pocketgb_core::run(run_config) {
        eprintln!("ERROR: {err}");
        process::exit(1);
    }
}
