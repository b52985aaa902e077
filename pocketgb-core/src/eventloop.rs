use crate::bus::Bus;
use crate::cpu::{self, ExecutionError};
use crate::graphics::GraphicsError;
use crate::input::{JoypadState, KeyMap, KeyMapError};
use crate::startup::{EmulationState, SdlState};
use crate::{graphics, input, RunConfig};
use sdl2::event::Event;
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("error executing instruction: {source}")]
    Execution {
        #[from]
        source: ExecutionError,
    },
    #[error("rendering error: {source}")]
    Rendering {
        #[from]
        source: GraphicsError,
    },
    #[error("error processing input config: {source}")]
    InputConfig {
        #[from]
        source: KeyMapError,
    },
    #[error("error writing external RAM to save file: {source}")]
    RamPersist {
        #[source]
        source: io::Error,
    },
}

// One frame is 154 lines of 114 machine cycles at 1.048576 MHz
const FRAME_DURATION: Duration = Duration::from_nanos(16_742_706);

/// Run the emulator until the host reports a quit event. Each iteration
/// refreshes the joypad register, services at most one interrupt, and
/// executes one instruction (or one idle cycle in halt mode); finished
/// frames are presented and paced to the hardware frame rate. On exit,
/// battery-backed external RAM is flushed to the save file.
pub fn run(
    emulation_state: EmulationState,
    sdl_state: SdlState,
    run_config: &RunConfig,
) -> Result<(), RunError> {
    log::info!("Running with config:\n{run_config}");

    let EmulationState {
        mut address_space,
        mut cpu_registers,
        mut ppu_state,
        mut timer_state,
        console_mode,
    } = emulation_state;

    // The audio device binding keeps the callback running until this
    // function returns
    let SdlState {
        mut canvas,
        texture_creator,
        mut event_pump,
        audio_device: _audio_device,
        ..
    } = sdl_state;

    let mut texture = graphics::create_frame_texture(&texture_creator)?;

    let key_map = KeyMap::from_config(&run_config.input_config)?;
    let mut joypad_state = JoypadState::new();

    let mut quit_requested = false;
    let mut next_frame_time = Instant::now() + FRAME_DURATION;

    while !quit_requested {
        input::update_joyp_register(&joypad_state, address_space.io_registers_mut());

        let mut bus = Bus {
            address_space: &mut address_space,
            ppu_state: &mut ppu_state,
            timer_state: &mut timer_state,
        };

        cpu::service_interrupts(&mut cpu_registers, &mut bus);
        cpu::step(&mut cpu_registers, &mut bus)?;

        if ppu_state.take_finished_frame() {
            graphics::render_frame(console_mode, &ppu_state, &mut canvas, &mut texture)?;

            // Drain host events once per frame
            for event in event_pump.poll_iter() {
                match event {
                    Event::Quit { .. } => {
                        log::info!("Quit requested, exiting main loop");
                        quit_requested = true;
                    }
                    Event::KeyDown { keycode: Some(keycode), .. } => {
                        joypad_state.key_down(keycode, &key_map);
                    }
                    Event::KeyUp { keycode: Some(keycode), .. } => {
                        joypad_state.key_up(keycode, &key_map);
                    }
                    _ => {}
                }
            }

            // Hold the emulated frame rate; resynchronize instead of
            // sprinting after a long stall
            let now = Instant::now();
            if now < next_frame_time {
                std::thread::sleep(next_frame_time - now);
                next_frame_time += FRAME_DURATION;
            } else {
                next_frame_time = now + FRAME_DURATION;
            }
        }
    }

    address_space.persist_cartridge_ram().map_err(|err| RunError::RamPersist { source: err })?;

    Ok(())
}
