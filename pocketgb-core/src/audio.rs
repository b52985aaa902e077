use crate::apu::{self, SharedApu};
use sdl2::audio::{AudioCallback, AudioDevice, AudioSpecDesired};
use sdl2::AudioSubsystem;

/// The host audio pull: on each callback, lock the sound generator and have
/// it synthesize directly into the device buffer.
pub struct AudioPull {
    apu: SharedApu,
}

impl AudioCallback for AudioPull {
    type Channel = u8;

    fn callback(&mut self, stream: &mut [u8]) {
        self.apu.lock().unwrap().generate(stream);
    }
}

/// Open the playback device: unsigned 8-bit mono at 48 kHz, pulled in
/// 512-sample buffers.
pub fn initialize(
    audio_subsystem: &AudioSubsystem,
    apu: SharedApu,
) -> Result<AudioDevice<AudioPull>, String> {
    let device = audio_subsystem.open_playback(
        None,
        &AudioSpecDesired {
            freq: Some(apu::SAMPLE_RATE as i32),
            channels: Some(1),
            samples: Some(apu::BUFFER_SIZE),
        },
        |_spec| AudioPull { apu },
    )?;

    device.resume();

    Ok(device)
}
