//! The free-running divider and the programmable timer, ticked once per
//! machine cycle from the shared clock.

use crate::memory::ioregisters::{IoRegister, IoRegisters};

const DIV_PERIOD: u8 = 128;

/// Sub-cycle counters for DIV and TIMA, the double-speed pipeline phase, and
/// a running machine-cycle count. These live in the emulator state rather
/// than anywhere static so that constructing a new emulator is a total reset.
#[derive(Debug, Clone, Default)]
pub struct TimerState {
    pub total_cycles: u64,
    div_counter: u8,
    tima_counter: u16,
    pub(crate) double_speed_phase: bool,
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Advance the divider and timer by one machine cycle.
pub fn tick_m_cycle(timer: &mut TimerState, io_registers: &mut IoRegisters) {
    timer.total_cycles += 1;

    timer.div_counter += 1;
    if timer.div_counter == DIV_PERIOD {
        timer.div_counter = 0;
        let div = io_registers.read_register(IoRegister::DIV);
        io_registers.write_register(IoRegister::DIV, div.wrapping_add(1));
    }

    let timer_control = io_registers.read_register(IoRegister::TAC);
    if timer_control & 0x04 == 0 {
        return;
    }

    let period: u16 = match timer_control & 0x03 {
        0x00 => 256,
        0x01 => 4,
        0x02 => 16,
        _ => 64,
    };

    timer.tima_counter += 1;
    if timer.tima_counter >= period {
        timer.tima_counter = 0;

        let tima = io_registers.read_register(IoRegister::TIMA);
        match tima.overflowing_add(1) {
            (new_tima, false) => {
                io_registers.write_register(IoRegister::TIMA, new_tima);
            }
            (_, true) => {
                let modulo = io_registers.read_register(IoRegister::TMA);
                io_registers.write_register(IoRegister::TIMA, modulo);
                io_registers.request_interrupt(crate::cpu::InterruptType::Timer);
            }
        }
    }
}

/// A software write to DIV zeroes the register and its sub-cycle counter.
pub fn reset_divider(timer: &mut TimerState, io_registers: &mut IoRegisters) {
    timer.div_counter = 0;
    io_registers.write_register(IoRegister::DIV, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(timer: &mut TimerState, io_registers: &mut IoRegisters, cycles: u32) {
        for _ in 0..cycles {
            tick_m_cycle(timer, io_registers);
        }
    }

    #[test]
    fn divider_increments_every_128_cycles() {
        let mut timer = TimerState::new();
        let mut io_registers = IoRegisters::new();

        tick(&mut timer, &mut io_registers, 127);
        assert_eq!(0x00, io_registers.read_register(IoRegister::DIV));

        tick(&mut timer, &mut io_registers, 1);
        assert_eq!(0x01, io_registers.read_register(IoRegister::DIV));

        tick(&mut timer, &mut io_registers, 128 * 255);
        assert_eq!(0x00, io_registers.read_register(IoRegister::DIV));
    }

    #[test]
    fn divider_runs_with_timer_disabled() {
        let mut timer = TimerState::new();
        let mut io_registers = IoRegisters::new();

        io_registers.write_register(IoRegister::TAC, 0x00);

        tick(&mut timer, &mut io_registers, 256);
        assert_eq!(0x02, io_registers.read_register(IoRegister::DIV));
        assert_eq!(0x00, io_registers.read_register(IoRegister::TIMA));
    }

    #[test]
    fn divider_write_resets() {
        let mut timer = TimerState::new();
        let mut io_registers = IoRegisters::new();

        tick(&mut timer, &mut io_registers, 200);
        reset_divider(&mut timer, &mut io_registers);
        assert_eq!(0x00, io_registers.read_register(IoRegister::DIV));

        // The sub-cycle counter restarts too
        tick(&mut timer, &mut io_registers, 127);
        assert_eq!(0x00, io_registers.read_register(IoRegister::DIV));
        tick(&mut timer, &mut io_registers, 1);
        assert_eq!(0x01, io_registers.read_register(IoRegister::DIV));
    }

    #[test]
    fn tima_period_follows_tac() {
        for (code, period) in [(0x00_u8, 256_u32), (0x01, 4), (0x02, 16), (0x03, 64)] {
            let mut timer = TimerState::new();
            let mut io_registers = IoRegisters::new();

            io_registers.write_register(IoRegister::TAC, 0x04 | code);

            tick(&mut timer, &mut io_registers, period - 1);
            assert_eq!(0x00, io_registers.read_register(IoRegister::TIMA));

            tick(&mut timer, &mut io_registers, 1);
            assert_eq!(0x01, io_registers.read_register(IoRegister::TIMA));
        }
    }

    #[test]
    fn tima_overflow_reloads_and_requests_interrupt() {
        for (code, period) in [(0x00_u8, 256_u32), (0x01, 4), (0x02, 16), (0x03, 64)] {
            let mut timer = TimerState::new();
            let mut io_registers = IoRegisters::new();

            io_registers.write_register(IoRegister::TAC, 0x04 | code);
            io_registers.write_register(IoRegister::TMA, 0xAB);
            io_registers.write_register(IoRegister::TIMA, 0xFE);

            // Two full periods overflow 0xFE -> 0xFF -> reload
            tick(&mut timer, &mut io_registers, 2 * period - 1);
            assert_eq!(0x00, io_registers.read_register(IoRegister::IF) & 0x04);

            tick(&mut timer, &mut io_registers, 1);
            assert_eq!(0xAB, io_registers.read_register(IoRegister::TIMA));
            assert_eq!(0x04, io_registers.read_register(IoRegister::IF) & 0x04);
        }
    }

    #[test]
    fn tima_paused_when_disabled() {
        let mut timer = TimerState::new();
        let mut io_registers = IoRegisters::new();

        io_registers.write_register(IoRegister::TAC, 0x01);

        tick(&mut timer, &mut io_registers, 1024);
        assert_eq!(0x00, io_registers.read_register(IoRegister::TIMA));
    }
}
