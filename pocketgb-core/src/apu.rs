//! The sound generator. Samples are synthesized on demand from the current
//! audio register values: the host audio callback locks the state and pulls
//! a buffer of unsigned 8-bit mono PCM at 48 kHz.
//!
//! The register block (0xFF10-0xFF3F, waveform RAM included) lives here
//! rather than in the I/O register file so that the audio thread and the CPU
//! share one lock. The generator itself writes only NR13/NR14 (sweep
//! write-back) and NR52 (length/sweep silencing).

mod channels;

use crate::apu::channels::{NoiseChannel, SweepUnit, ToneChannel};
use std::sync::{Arc, Mutex};

pub const SAMPLE_RATE: u32 = 48_000;
pub const BUFFER_SIZE: u16 = 512;

const SAMPLE_PERIOD: f32 = 1.0 / SAMPLE_RATE as f32;

pub type SharedApu = Arc<Mutex<ApuState>>;

// Register indices relative to 0xFF10
const NR10: usize = 0x00;
const NR11: usize = 0x01;
const NR12: usize = 0x02;
const NR13: usize = 0x03;
const NR14: usize = 0x04;
const NR21: usize = 0x06;
const NR22: usize = 0x07;
const NR23: usize = 0x08;
const NR24: usize = 0x09;
const NR30: usize = 0x0A;
const NR31: usize = 0x0B;
const NR32: usize = 0x0C;
const NR33: usize = 0x0D;
const NR34: usize = 0x0E;
const NR41: usize = 0x10;
const NR42: usize = 0x11;
const NR43: usize = 0x12;
const NR44: usize = 0x13;
const NR50: usize = 0x14;
const NR51: usize = 0x15;
const NR52: usize = 0x16;
const WAVEFORM_RAM: usize = 0x20;

const REGISTERS_START: u16 = 0xFF10;

fn square_step_frequency(frequency: u16) -> f32 {
    1_048_576.0 / f32::from(2048 - frequency)
}

fn wave_step_frequency(frequency: u16) -> f32 {
    2_097_152.0 / f32::from(2048 - frequency)
}

pub struct ApuState {
    regs: [u8; 0x30],
    channel1: ToneChannel,
    channel1_sweep: SweepUnit,
    channel2: ToneChannel,
    channel3: ToneChannel,
    channel4: NoiseChannel,
    so1_divisor: u8,
    so2_divisor: u8,
}

impl ApuState {
    pub fn new() -> Self {
        Self {
            regs: [0; 0x30],
            channel1: ToneChannel::default(),
            channel1_sweep: SweepUnit::default(),
            channel2: ToneChannel::default(),
            channel3: ToneChannel::default(),
            channel4: NoiseChannel::new(),
            so1_divisor: 8,
            so2_divisor: 8,
        }
    }

    fn frequency(&self, lo: usize, hi: usize) -> u16 {
        (u16::from(self.regs[hi] & 0x07) << 8) | u16::from(self.regs[lo])
    }

    pub fn read_register(&self, address: u16) -> u8 {
        self.regs[usize::from(address - REGISTERS_START)]
    }

    /// Apply a CPU write to an audio register. Frequency writes rebase the
    /// channel phase; NRx4 writes with bit 7 set restart the channel and set
    /// its enable flag in NR52.
    pub fn write_register(&mut self, address: u16, value: u8) {
        match usize::from(address - REGISTERS_START) {
            NR13 => {
                self.regs[NR13] = value;
                self.channel1.rebase(SAMPLE_PERIOD);
                let frequency = self.frequency(NR13, NR14);
                self.channel1.retune(square_step_frequency(frequency), SAMPLE_RATE as f32);
            }
            NR14 => {
                self.regs[NR14] = value;
                if value & 0x80 != 0 {
                    self.channel1_sweep.tick_counter = 0;
                    self.channel1_sweep.shadow_frequency = self.frequency(NR13, NR14);
                    self.channel1.restart();
                    self.regs[NR52] |= 0x01;
                } else {
                    self.channel1.rebase(SAMPLE_PERIOD);
                }
                let frequency = self.frequency(NR13, NR14);
                self.channel1.retune(square_step_frequency(frequency), SAMPLE_RATE as f32);
            }
            NR23 => {
                self.regs[NR23] = value;
                self.channel2.rebase(SAMPLE_PERIOD);
                let frequency = self.frequency(NR23, NR24);
                self.channel2.retune(square_step_frequency(frequency), SAMPLE_RATE as f32);
            }
            NR24 => {
                self.regs[NR24] = value;
                if value & 0x80 != 0 {
                    self.channel2.restart();
                    self.regs[NR52] |= 0x02;
                } else {
                    self.channel2.rebase(SAMPLE_PERIOD);
                }
                let frequency = self.frequency(NR23, NR24);
                self.channel2.retune(square_step_frequency(frequency), SAMPLE_RATE as f32);
            }
            NR30 => {
                // Clearing the wave channel's DAC bit silences it
                if value & 0x80 == 0 {
                    self.regs[NR52] &= !0x04;
                }
                self.regs[NR30] = value;
            }
            NR33 => {
                self.regs[NR33] = value;
                self.channel3.rebase(SAMPLE_PERIOD);
                let frequency = self.frequency(NR33, NR34);
                self.channel3.retune(wave_step_frequency(frequency), SAMPLE_RATE as f32);
            }
            NR34 => {
                self.regs[NR34] = value;
                if self.regs[NR30] & 0x80 != 0 && value & 0x80 != 0 {
                    self.channel3.restart();
                    self.regs[NR52] |= 0x04;
                } else {
                    self.channel3.rebase(SAMPLE_PERIOD);
                }
                let frequency = self.frequency(NR33, NR34);
                self.channel3.retune(wave_step_frequency(frequency), SAMPLE_RATE as f32);
            }
            NR44 => {
                self.regs[NR44] = value;
                if value & 0x80 != 0 {
                    self.channel4.lfsr = 0x7FFF;
                    self.channel4.sample_counter = 0;
                    self.channel4.step_accumulator = 0.0;
                    self.regs[NR52] |= 0x08;
                }
            }
            NR52 => {
                // Only the master enable bit is writable; the low nibble
                // holds the per-channel enable flags
                self.regs[NR52] = (self.regs[NR52] & 0x0F) | (value & 0x80);
            }
            index => {
                self.regs[index] = value;
            }
        }
    }

    /// Fill a PCM buffer. Each enabled channel with a non-trivial envelope
    /// adds `envelope_step / divisor` into the mono stream for each terminal
    /// it is routed to by NR51.
    pub fn generate(&mut self, stream: &mut [u8]) {
        stream.fill(0);

        if self.regs[NR52] & 0x80 == 0 {
            return;
        }

        self.so1_divisor = 8 - (self.regs[NR50] & 0x07);
        self.so2_divisor = 8 - ((self.regs[NR50] >> 4) & 0x07);

        if (self.regs[NR12] >> 4 != 0 || self.regs[NR12] & 0x08 != 0)
            && self.regs[NR52] & 0x01 != 0
        {
            self.generate_channel1(stream);
        }

        if (self.regs[NR22] >> 4 != 0 || self.regs[NR22] & 0x08 != 0)
            && self.regs[NR52] & 0x02 != 0
        {
            self.generate_channel2(stream);
        }

        if self.regs[NR30] & 0x80 != 0 && self.regs[NR52] & 0x04 != 0 {
            self.generate_channel3(stream);
        }

        if (self.regs[NR42] >> 4 != 0 || self.regs[NR42] & 0x08 != 0)
            && self.regs[NR52] & 0x08 != 0
        {
            self.generate_channel4(stream);
        }
    }

    fn generate_channel1(&mut self, stream: &mut [u8]) {
        let envelope = channels::build_envelope(self.regs[NR12]);
        let envelope_step_frequency = 64.0 / f32::from(self.regs[NR12] & 0x07);

        let waveform = channels::duty_waveform(self.regs[NR11] >> 6);
        let sound_length = f32::from(64 - (self.regs[NR11] & 0x3F)) / 256.0;

        let sweep_shift_count = self.regs[NR10] & 0x07;
        let sweep_time = f32::from((self.regs[NR10] & 0x70) >> 4) / 128.0;

        for out in stream.iter_mut() {
            let time = self.channel1.sample_counter as f32 * SAMPLE_PERIOD
                + self.channel1.time_offset;

            if self.regs[NR14] & 0x40 != 0 && time >= sound_length {
                self.regs[NR52] &= !0x01;
                return;
            }

            if sweep_time != 0.0 {
                let ticks = ((time / sweep_time) as u32).min(u32::from(sweep_shift_count)) as u8;

                if ticks != self.channel1_sweep.tick_counter {
                    self.channel1_sweep.tick_counter = ticks;

                    let mut frequency = self.channel1_sweep.shadow_frequency;
                    frequency = sweep_frequency(frequency, sweep_shift_count, self.regs[NR10]);

                    if frequency > 2047 {
                        self.regs[NR52] &= !0x01;
                        return;
                    }

                    self.channel1_sweep.shadow_frequency = frequency;
                    self.regs[NR13] = (frequency & 0xFF) as u8;
                    self.regs[NR14] = (self.regs[NR14] & 0xF8) | (frequency >> 8) as u8;
                    let step_frequency = square_step_frequency(frequency);

                    // The overflow check runs a second time on the next
                    // sweep value without committing it
                    let probe = sweep_frequency(frequency, sweep_shift_count, self.regs[NR10]);
                    if probe > 2047 {
                        self.regs[NR52] &= !0x01;
                        return;
                    }

                    self.channel1.rebase(SAMPLE_PERIOD);
                    self.channel1.retune(step_frequency, SAMPLE_RATE as f32);
                }
            }

            let wave_step_count = (self.channel1.sample_counter as f32
                * self.channel1.wave_steps_per_sample
                + self.channel1.wave_step_offset) as u32;

            if waveform[(wave_step_count % 8) as usize] != 0 {
                let step = channels::envelope_step(&envelope, envelope_step_frequency, time);

                if self.regs[NR51] & 0x01 != 0 {
                    *out = out.wrapping_add(step / self.so1_divisor);
                }
                if self.regs[NR51] & 0x10 != 0 {
                    *out = out.wrapping_add(step / self.so2_divisor);
                }
            }

            self.channel1.sample_counter += 1;
        }
    }

    fn generate_channel2(&mut self, stream: &mut [u8]) {
        let envelope = channels::build_envelope(self.regs[NR22]);
        let envelope_step_frequency = 64.0 / f32::from(self.regs[NR22] & 0x07);

        let waveform = channels::duty_waveform(self.regs[NR21] >> 6);
        let sound_length = f32::from(64 - (self.regs[NR21] & 0x3F)) / 256.0;

        for out in stream.iter_mut() {
            let time = self.channel2.sample_counter as f32 * SAMPLE_PERIOD
                + self.channel2.time_offset;

            if self.regs[NR24] & 0x40 != 0 && time >= sound_length {
                self.regs[NR52] &= !0x02;
                return;
            }

            let wave_step_count = (self.channel2.sample_counter as f32
                * self.channel2.wave_steps_per_sample
                + self.channel2.wave_step_offset) as u32;

            if waveform[(wave_step_count % 8) as usize] != 0 {
                let step = channels::envelope_step(&envelope, envelope_step_frequency, time);

                if self.regs[NR51] & 0x02 != 0 {
                    *out = out.wrapping_add(step / self.so1_divisor);
                }
                if self.regs[NR51] & 0x20 != 0 {
                    *out = out.wrapping_add(step / self.so2_divisor);
                }
            }

            self.channel2.sample_counter += 1;
        }
    }

    fn generate_channel3(&mut self, stream: &mut [u8]) {
        // NR32 bits 5-6: mute, full, half, quarter volume
        let level_shift = match self.regs[NR32] & 0x60 {
            0x00 => 4,
            0x20 => 0,
            0x40 => 1,
            _ => 2,
        };

        let sound_length = f32::from(256 - u16::from(self.regs[NR31])) / 256.0;

        for out in stream.iter_mut() {
            if self.regs[NR34] & 0x40 != 0 {
                let time = self.channel3.sample_counter as f32 * SAMPLE_PERIOD
                    + self.channel3.time_offset;

                if time >= sound_length {
                    self.regs[NR52] &= !0x04;
                    return;
                }
            }

            let step_count = (self.channel3.sample_counter as f32
                * self.channel3.wave_steps_per_sample
                + self.channel3.wave_step_offset) as u32;
            let step_number = (step_count % 32) as usize;

            let byte = self.regs[WAVEFORM_RAM + step_number / 2];
            let sample = if step_number % 2 == 1 { byte & 0x0F } else { byte >> 4 };
            let sample = sample >> level_shift;

            if self.regs[NR51] & 0x04 != 0 {
                *out = out.wrapping_add(sample / self.so1_divisor);
            }
            if self.regs[NR51] & 0x40 != 0 {
                *out = out.wrapping_add(sample / self.so2_divisor);
            }

            self.channel3.sample_counter += 1;
        }
    }

    fn generate_channel4(&mut self, stream: &mut [u8]) {
        let envelope = channels::build_envelope(self.regs[NR42]);
        let envelope_step_frequency = 64.0 / f32::from(self.regs[NR42] & 0x07);

        let sound_length = f32::from(64 - (self.regs[NR41] & 0x3F)) / 256.0;

        let divider = self.regs[NR43] & 0x07;
        let shift = self.regs[NR43] >> 4;
        let step_frequency = 524_288.0
            / (if divider == 0 { 0.5 } else { f32::from(divider) })
            / (1_u32 << (shift + 1)) as f32;
        let steps_per_sample = step_frequency / SAMPLE_RATE as f32;

        for out in stream.iter_mut() {
            let time = self.channel4.sample_counter as f32 * SAMPLE_PERIOD;

            if self.regs[NR44] & 0x40 != 0 && time >= sound_length {
                self.regs[NR52] &= !0x08;
                return;
            }

            while self.channel4.step_accumulator >= 1.0 {
                self.channel4.step_accumulator -= 1.0;

                let bit0 = self.channel4.lfsr & 0x01;
                self.channel4.lfsr >>= 1;
                let bit1 = self.channel4.lfsr & 0x01;

                let feedback = bit1 ^ bit0;
                self.channel4.lfsr |= feedback << 14;

                // Short mode also feeds bit 6, giving a 7-bit sequence
                if self.regs[NR43] & 0x08 != 0 {
                    self.channel4.lfsr = (feedback << 6) | (self.channel4.lfsr & 0xFFBF);
                }
            }

            if self.channel4.lfsr & 0x01 != 0 {
                let step = channels::envelope_step(&envelope, envelope_step_frequency, time);

                if self.regs[NR51] & 0x08 != 0 {
                    *out = out.wrapping_add(step / self.so1_divisor);
                }
                if self.regs[NR51] & 0x80 != 0 {
                    *out = out.wrapping_add(step / self.so2_divisor);
                }
            }

            self.channel4.sample_counter += 1;
            self.channel4.step_accumulator += steps_per_sample;
        }
    }
}

/// One sweep step: shift the shadow frequency right by the shift count and
/// add or subtract the result per NR10 bit 3.
fn sweep_frequency(frequency: u16, shift_count: u8, nr10: u8) -> u16 {
    if nr10 & 0x08 != 0 {
        frequency - (frequency >> shift_count)
    } else {
        frequency + (frequency >> shift_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn powered_on() -> ApuState {
        let mut apu = ApuState::new();
        apu.write_register(0xFF26, 0x80);
        apu
    }

    #[test]
    fn master_disable_yields_silence() {
        let mut apu = ApuState::new();

        let mut stream = vec![0xAA_u8; 64];
        apu.generate(&mut stream);

        assert!(stream.iter().all(|&sample| sample == 0));
    }

    #[test]
    fn nr52_write_preserves_channel_flags() {
        let mut apu = powered_on();
        apu.regs[NR52] |= 0x05;

        apu.write_register(0xFF26, 0xFF);
        assert_eq!(0x85, apu.read_register(0xFF26));

        apu.write_register(0xFF26, 0x00);
        assert_eq!(0x05, apu.read_register(0xFF26));
    }

    #[test]
    fn channel2_restart_produces_output() {
        let mut apu = powered_on();

        apu.write_register(0xFF17, 0xF0); // full volume, no envelope sweep
        apu.write_register(0xFF16, 0x80); // 50% duty
        apu.write_register(0xFF25, 0x22); // channel 2 to both terminals
        apu.write_register(0xFF18, 0x00);
        apu.write_register(0xFF19, 0x87); // restart, frequency 0x700

        assert_eq!(0x02, apu.read_register(0xFF26) & 0x02);

        let mut stream = vec![0_u8; 512];
        apu.generate(&mut stream);

        assert!(stream.iter().any(|&sample| sample != 0));
        assert!(stream.iter().any(|&sample| sample == 0));
    }

    #[test]
    fn sweep_overflow_silences_channel1() {
        let mut apu = powered_on();

        apu.write_register(0xFF12, 0xF0); // full volume
        apu.write_register(0xFF10, 0x11); // period 1/128s, shift 1, increasing
        apu.write_register(0xFF25, 0x11);
        apu.write_register(0xFF13, 0xFF);
        apu.write_register(0xFF14, 0x87); // restart at frequency 2047

        assert_eq!(0x01, apu.read_register(0xFF26) & 0x01);

        // 1024 samples cover well past the first sweep tick at ~7.8ms
        let mut stream = vec![0_u8; 1024];
        apu.generate(&mut stream);

        assert_eq!(0x00, apu.read_register(0xFF26) & 0x01);
    }

    #[test]
    fn length_counter_silences_channel2() {
        let mut apu = powered_on();

        apu.write_register(0xFF17, 0xF0);
        apu.write_register(0xFF16, 0xBF); // duty 2, maximum length value -> 1/256s
        apu.write_register(0xFF25, 0x22);
        apu.write_register(0xFF18, 0x00);
        apu.write_register(0xFF19, 0xC7); // restart with length enabled

        // 512 samples at 48kHz is ~10.7ms, past the ~3.9ms length
        let mut stream = vec![0_u8; 512];
        apu.generate(&mut stream);

        assert_eq!(0x00, apu.read_register(0xFF26) & 0x02);
    }

    #[test]
    fn clearing_wave_dac_silences_channel3() {
        let mut apu = powered_on();

        apu.write_register(0xFF1A, 0x80);
        apu.write_register(0xFF1E, 0x80); // restart
        assert_eq!(0x04, apu.read_register(0xFF26) & 0x04);

        apu.write_register(0xFF1A, 0x00);
        assert_eq!(0x00, apu.read_register(0xFF26) & 0x04);
    }

    #[test]
    fn noise_restart_reloads_lfsr() {
        let mut apu = powered_on();

        apu.channel4.lfsr = 0x1234;
        apu.write_register(0xFF23, 0x80);

        assert_eq!(0x7FFF, apu.channel4.lfsr);
        assert_eq!(0x08, apu.read_register(0xFF26) & 0x08);
    }

    #[test]
    fn frequency_write_rebases_phase() {
        let mut apu = powered_on();

        apu.write_register(0xFF18, 0x00);
        apu.write_register(0xFF19, 0x87);
        apu.channel2.sample_counter = 4800;

        apu.write_register(0xFF18, 0x40);

        assert_eq!(0, apu.channel2.sample_counter);
        assert!(apu.channel2.time_offset > 0.0);
        assert!(apu.channel2.wave_step_offset > 0.0);
    }

    #[test]
    fn wave_ram_readback() {
        let mut apu = powered_on();

        apu.write_register(0xFF30, 0xAB);
        apu.write_register(0xFF3F, 0xCD);

        assert_eq!(0xAB, apu.read_register(0xFF30));
        assert_eq!(0xCD, apu.read_register(0xFF3F));
    }
}
