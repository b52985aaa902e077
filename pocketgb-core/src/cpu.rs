pub(crate) mod instructions;
mod registers;

#[cfg(test)]
mod tests;

use crate::bus::Bus;
use crate::memory::ioregisters::IoRegister;

pub use instructions::ExecutionError;
pub use registers::{CpuRegister, CpuRegisterPair, CpuRegisters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptType {
    VBlank,
    LcdStatus,
    Timer,
    Serial,
    Joypad,
}

impl InterruptType {
    /// All interrupt sources, highest priority first.
    pub const PRIORITY_ORDER: [Self; 5] =
        [Self::VBlank, Self::LcdStatus, Self::Timer, Self::Serial, Self::Joypad];

    pub fn bit(self) -> u8 {
        match self {
            Self::VBlank => 0x01,
            Self::LcdStatus => 0x02,
            Self::Timer => 0x04,
            Self::Serial => 0x08,
            Self::Joypad => 0x10,
        }
    }

    pub fn handler_address(self) -> u16 {
        match self {
            Self::VBlank => 0x0040,
            Self::LcdStatus => 0x0048,
            Self::Timer => 0x0050,
            Self::Serial => 0x0058,
            Self::Joypad => 0x0060,
        }
    }
}

/// Interrupt poll, run before each instruction dispatch. A pending enabled
/// interrupt always leaves halt mode; if the master enable is also set, the
/// highest-priority source is serviced: its IF bit is cleared, IME is
/// cleared, and PC is pushed and redirected to the handler vector. At most
/// one source is serviced per pass.
pub fn service_interrupts(cpu: &mut CpuRegisters, bus: &mut Bus<'_>) {
    let enabled = bus.address_space.read_address_u8(0xFFFF);
    let requested = bus.address_space.io_registers().read_register(IoRegister::IF);
    let pending = enabled & requested;

    for interrupt in InterruptType::PRIORITY_ORDER {
        if pending & interrupt.bit() != 0 {
            cpu.halted = false;

            if cpu.ime {
                log::trace!("servicing {interrupt:?} interrupt at PC={:04X}", cpu.pc);

                cpu.ime = false;
                let io_registers = bus.address_space.io_registers_mut();
                io_registers
                    .write_register(IoRegister::IF, requested & !interrupt.bit());

                let return_address = cpu.pc;
                instructions::push_stack(cpu, bus, return_address);
                cpu.pc = interrupt.handler_address();
            }

            break;
        }
    }
}

/// Execute one unit of work: a single decoded instruction, or one idle
/// machine cycle while in halt mode.
pub fn step(cpu: &mut CpuRegisters, bus: &mut Bus<'_>) -> Result<(), ExecutionError> {
    if cpu.halted {
        bus.tick(1);
        return Ok(());
    }

    let instruction = instructions::parse_next_instruction(cpu, bus)?;
    instruction.execute(cpu, bus);

    Ok(())
}
