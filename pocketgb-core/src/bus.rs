//! The CPU's view of the machine: every read and write goes through here,
//! advancing the shared machine-cycle clock that drives the divider, the
//! programmable timer, and the pixel pipeline in lockstep. Writes to
//! registers with side effects (LCDC, STAT, DMA, HDMA5, the palette data
//! ports, the serial control, KEY1, VBK, DIV) are dispatched before the
//! cycle is charged.

use crate::cpu::InterruptType;
use crate::memory::ioregisters::IoRegister;
use crate::memory::AddressSpace;
use crate::ppu::PpuState;
use crate::timer::TimerState;
use crate::{ppu, timer};

pub struct Bus<'a> {
    pub address_space: &'a mut AddressSpace,
    pub ppu_state: &'a mut PpuState,
    pub timer_state: &'a mut TimerState,
}

impl Bus<'_> {
    /// Advance the shared clock. The divider and timer tick every machine
    /// cycle; in double-speed mode the pixel pipeline ticks on every other
    /// call, modeling a CPU running at twice the pipeline rate.
    pub fn tick(&mut self, m_cycles: u8) {
        for _ in 0..m_cycles {
            timer::tick_m_cycle(self.timer_state, self.address_space.io_registers_mut());

            if self.address_space.io_registers().read_register(IoRegister::KEY1) & 0x80 != 0 {
                self.timer_state.double_speed_phase = !self.timer_state.double_speed_phase;
                if self.timer_state.double_speed_phase {
                    continue;
                }
            }

            ppu::tick_m_cycle(self.ppu_state, self.address_space);
        }
    }

    /// Read one byte, advancing the clock by one machine cycle.
    pub fn read(&mut self, address: u16) -> u8 {
        let value = match IoRegister::from_address(address) {
            Some(IoRegister::BCPD) => {
                ppu::read_bg_palette_color(self.ppu_state, self.address_space.io_registers())
            }
            Some(IoRegister::OCPD) => {
                ppu::read_obj_palette_color(self.ppu_state, self.address_space.io_registers())
            }
            _ => self.address_space.read_address_u8(address),
        };

        self.tick(1);
        value
    }

    /// Read a little-endian 16-bit value, advancing the clock by two cycles.
    pub fn read_u16(&mut self, address: u16) -> u16 {
        let lsb = self.read(address);
        let msb = self.read(address.wrapping_add(1));
        u16::from_le_bytes([lsb, msb])
    }

    /// Write one byte, applying MMIO side effects, then advance the clock by
    /// one machine cycle.
    pub fn write(&mut self, address: u16, value: u8) {
        match IoRegister::from_address(address) {
            Some(IoRegister::SC) => {
                self.address_space.io_registers_mut().write_register(IoRegister::SC, value);

                // Starting a transfer with no peer attached: the shift
                // register reads all ones and the transfer completes at once
                if value & 0x81 == 0x81 {
                    self.address_space.io_registers_mut().write_register(IoRegister::SB, 0xFF);
                    self.address_space.io_registers_mut().request_interrupt(InterruptType::Serial);
                }
            }
            Some(IoRegister::DIV) => {
                timer::reset_divider(self.timer_state, self.address_space.io_registers_mut());
            }
            Some(IoRegister::LCDC) => {
                ppu::write_lcdc(self.ppu_state, self.address_space.io_registers_mut(), value);
            }
            Some(IoRegister::STAT) => {
                let io_registers = self.address_space.io_registers_mut();
                let stat = io_registers.read_register(IoRegister::STAT);
                io_registers.write_register(IoRegister::STAT, (value & 0xF8) | (stat & 0x07));
            }
            Some(IoRegister::DMA) => {
                self.address_space.io_registers_mut().write_register(IoRegister::DMA, value);
                self.address_space.perform_oam_dma(value);
            }
            Some(IoRegister::KEY1) => {
                let io_registers = self.address_space.io_registers_mut();
                let key1 = io_registers.read_register(IoRegister::KEY1);
                io_registers.write_register(IoRegister::KEY1, (key1 & 0x80) | (value & 0x01));
            }
            Some(IoRegister::VBK) => {
                self.address_space.io_registers_mut().write_register(IoRegister::VBK, value & 0x01);
            }
            Some(IoRegister::HDMA5) => {
                self.address_space.write_hdma5(value);
            }
            Some(IoRegister::BCPD) => {
                ppu::write_bg_palette_color(
                    self.ppu_state,
                    self.address_space.io_registers_mut(),
                    value,
                );
            }
            Some(IoRegister::OCPD) => {
                ppu::write_obj_palette_color(
                    self.ppu_state,
                    self.address_space.io_registers_mut(),
                    value,
                );
            }
            _ => {
                self.address_space.write_address_u8(address, value);
            }
        }

        self.tick(1);
    }

    /// Write a little-endian 16-bit value, advancing the clock by two cycles.
    pub fn write_u16(&mut self, address: u16, value: u16) {
        let [lsb, msb] = value.to_le_bytes();
        self.write(address, lsb);
        self.write(address.wrapping_add(1), msb);
    }
}
