use crate::apu::SharedApu;
use crate::audio::AudioPull;
use crate::config::RunConfig;
use crate::cpu::CpuRegisters;
use crate::graphics::GraphicsError;
use crate::memory::{AddressSpace, Cartridge, CartridgeLoadError};
use crate::ppu::{self, PpuState};
use crate::timer::TimerState;
use crate::{audio, graphics, ConsoleMode};
use sdl2::audio::AudioDevice;
use sdl2::render::{TextureCreator, WindowCanvas};
use sdl2::video::{WindowBuildError, WindowContext};
use sdl2::{AudioSubsystem, EventPump, Sdl, VideoSubsystem};
use std::ffi::OsStr;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("error loading cartridge: {source}")]
    CartridgeLoad {
        #[from]
        source: CartridgeLoadError,
    },
    #[error("unable to get file name from path: {file_path}")]
    FileName { file_path: String },
    #[error("SDL2 error: {sdl_error}")]
    GenericSdl { sdl_error: String },
    #[error("error building SDL2 window: {source}")]
    SdlWindowBuild {
        #[from]
        source: WindowBuildError,
    },
    #[error("error building SDL2 canvas: {source}")]
    SdlCanvasBuild {
        #[from]
        source: GraphicsError,
    },
    #[error("SDL2 audio initialization error: {msg}")]
    SdlAudioInit { msg: String },
}

impl From<String> for StartupError {
    fn from(value: String) -> Self {
        Self::GenericSdl { sdl_error: value }
    }
}

/// All emulated state: the memory map, CPU registers, pixel pipeline, and
/// timer counters. The sound generator lives inside the address space and is
/// shared with the audio callback.
pub struct EmulationState {
    pub address_space: AddressSpace,
    pub cpu_registers: CpuRegisters,
    pub ppu_state: PpuState,
    pub timer_state: TimerState,
    pub console_mode: ConsoleMode,
}

pub struct SdlState {
    pub sdl: Sdl,
    pub video: VideoSubsystem,
    pub audio: AudioSubsystem,
    pub audio_device: Option<AudioDevice<AudioPull>>,
    pub canvas: WindowCanvas,
    pub texture_creator: TextureCreator<WindowContext>,
    pub event_pump: EventPump,
}

pub fn init_emulation_state(run_config: &RunConfig) -> Result<EmulationState, StartupError> {
    let cartridge = Cartridge::from_file(&run_config.rom_file_path)?;

    let console_mode =
        if cartridge.supports_color_mode() { ConsoleMode::Cgb } else { ConsoleMode::Dmg };
    log::info!("Running in {console_mode:?} mode");

    Ok(EmulationState {
        address_space: AddressSpace::new(cartridge),
        cpu_registers: CpuRegisters::new(),
        ppu_state: PpuState::new(),
        timer_state: TimerState::new(),
        console_mode,
    })
}

pub fn init_sdl_state(run_config: &RunConfig, apu: SharedApu) -> Result<SdlState, StartupError> {
    let sdl = sdl2::init()?;
    let video = sdl.video()?;
    let audio = sdl.audio()?;

    let window_title = get_window_title(&run_config.rom_file_path)?;
    let window = video
        .window(
            &window_title,
            ppu::SCREEN_WIDTH as u32 * run_config.display_scale,
            ppu::SCREEN_HEIGHT as u32 * run_config.display_scale,
        )
        .build()?;

    let canvas = graphics::create_renderer(window, run_config.vsync_enabled)?;
    let texture_creator = canvas.texture_creator();

    let event_pump = sdl.event_pump()?;

    let audio_device = if run_config.audio_enabled {
        let device =
            audio::initialize(&audio, apu).map_err(|msg| StartupError::SdlAudioInit { msg })?;
        Some(device)
    } else {
        None
    };

    Ok(SdlState { sdl, video, audio, audio_device, canvas, texture_creator, event_pump })
}

fn get_window_title(rom_file_path: &str) -> Result<String, StartupError> {
    let file_name = Path::new(rom_file_path).file_name().and_then(OsStr::to_str);
    match file_name {
        Some(file_name) => Ok(format!("pocketgb - {file_name}")),
        None => Err(StartupError::FileName { file_path: rom_file_path.into() }),
    }
}
