//! An emulator core for the 8-bit handheld game console and its color-mode
//! extension: CPU interpreter, banked memory map, scanline pixel pipeline,
//! and pull-model sound generator, with an SDL2 host adapter for video,
//! audio, and input.

mod apu;
mod audio;
mod bus;
mod config;
mod cpu;
mod eventloop;
mod graphics;
mod input;
mod memory;
mod ppu;
mod startup;
mod timer;

use thiserror::Error;

pub use config::{InputConfig, RunConfig};
pub use eventloop::RunError;
pub use startup::StartupError;

/// Which rendition of the console the loaded cartridge targets, decided by
/// the color support byte in its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    Dmg,
    Cgb,
}

#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("{source}")]
    Startup {
        #[from]
        source: StartupError,
    },
    #[error("{source}")]
    Run {
        #[from]
        source: RunError,
    },
}

/// Load the configured ROM, bring up the host video/audio/input adapter, and
/// run until quit. Battery-backed saves are written on the way out.
pub fn run(run_config: RunConfig) -> Result<(), EmulatorError> {
    let emulation_state = startup::init_emulation_state(&run_config)?;
    let sdl_state = startup::init_sdl_state(&run_config, emulation_state.address_space.apu_handle())?;

    eventloop::run(emulation_state, sdl_state, &run_config)?;

    Ok(())
}
