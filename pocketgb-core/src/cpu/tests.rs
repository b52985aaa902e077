mod interrupts;

use crate::bus::Bus;
use crate::cpu::{self, CpuRegisters};
use crate::memory::{AddressSpace, Cartridge};
use crate::ppu::PpuState;
use crate::timer::TimerState;
use std::collections::HashMap;

pub(super) struct TestHardware {
    pub address_space: AddressSpace,
    pub ppu_state: PpuState,
    pub timer_state: TimerState,
    pub cpu_registers: CpuRegisters,
}

impl TestHardware {
    pub fn new(rom: Vec<u8>) -> Self {
        let cartridge = Cartridge::new(rom, None).expect("synthesized test ROM should be valid");

        Self {
            address_space: AddressSpace::new(cartridge),
            ppu_state: PpuState::new(),
            timer_state: TimerState::new(),
            cpu_registers: CpuRegisters::new(),
        }
    }

    /// Run one interrupt poll + instruction dispatch, as the main loop does.
    pub fn step(&mut self) {
        let mut bus = Bus {
            address_space: &mut self.address_space,
            ppu_state: &mut self.ppu_state,
            timer_state: &mut self.timer_state,
        };

        cpu::service_interrupts(&mut self.cpu_registers, &mut bus);
        cpu::step(&mut self.cpu_registers, &mut bus)
            .expect("all instructions in program should be valid");
    }
}

/// Assemble a ROM that jumps from the entry point to the given program at
/// 0x0150 and run it until it halts or execution passes the end of the
/// program.
pub(super) fn run_program(program_hex: &str) -> TestHardware {
    assert!(program_hex.len() % 2 == 0, "program length must be a multiple of 2");

    let mut rom = vec![0x00; 0x150];
    // NOP; JP 0x0150
    rom[0x100..0x104].copy_from_slice(&[0x00, 0xC3, 0x50, 0x01]);

    for index in (0..program_hex.len()).step_by(2) {
        let byte = u8::from_str_radix(&program_hex[index..index + 2], 16)
            .expect("program should only contain hexadecimal digits");
        rom.push(byte);
    }

    let rom_len = rom.len() as u16;
    let mut hardware = TestHardware::new(rom);

    while hardware.cpu_registers.pc < rom_len && !hardware.cpu_registers.halted {
        hardware.step();

        assert!(hardware.timer_state.total_cycles < 10_000_000, "program did not terminate");
    }

    hardware
}

// Machine cycles consumed by the entry-point preamble (NOP + JP)
pub(super) const PREAMBLE_CYCLES: u64 = 5;

pub(super) struct ExpectedState {
    a: Option<u8>,
    f: Option<u8>,
    b: Option<u8>,
    c: Option<u8>,
    d: Option<u8>,
    e: Option<u8>,
    h: Option<u8>,
    l: Option<u8>,
    sp: Option<u16>,
    memory: HashMap<u16, u8>,
}

impl ExpectedState {
    pub fn empty() -> Self {
        Self {
            a: None,
            f: None,
            b: None,
            c: None,
            d: None,
            e: None,
            h: None,
            l: None,
            sp: None,
            memory: HashMap::new(),
        }
    }

    fn assert_matches(&self, hardware: &TestHardware) {
        let registers = &hardware.cpu_registers;
        let mut mismatches = Vec::new();

        let expected_u16 = [
            ("A", self.a.map(u16::from), u16::from(registers.a)),
            ("F", self.f.map(u16::from), u16::from(registers.f)),
            ("B", self.b.map(u16::from), u16::from(registers.b)),
            ("C", self.c.map(u16::from), u16::from(registers.c)),
            ("D", self.d.map(u16::from), u16::from(registers.d)),
            ("E", self.e.map(u16::from), u16::from(registers.e)),
            ("H", self.h.map(u16::from), u16::from(registers.h)),
            ("L", self.l.map(u16::from), u16::from(registers.l)),
            ("SP", self.sp, registers.sp),
        ];

        for (name, expected, actual) in expected_u16 {
            if let Some(expected) = expected {
                if expected != actual {
                    mismatches
                        .push(format!("{name}: expected 0x{expected:02X}, was 0x{actual:02X}"));
                }
            }
        }

        for (&address, &expected) in &self.memory {
            let actual = hardware.address_space.read_address_u8(address);
            if expected != actual {
                mismatches.push(format!(
                    "memory 0x{address:04X}: expected 0x{expected:02X}, was 0x{actual:02X}"
                ));
            }
        }

        assert!(mismatches.is_empty(), "state mismatches: [{}]", mismatches.join(", "));
    }
}

pub(super) fn run_test(program_hex: &str, expected_state: &ExpectedState) {
    let hardware = run_program(program_hex);
    expected_state.assert_matches(&hardware);
}

macro_rules! hash_map {
    ($($key:literal: $value:expr),+$(,)?) => {
        {
            let mut map = std::collections::HashMap::new();
            $(
                map.insert($key, $value);
            )*
            map
        }
    }
}

use hash_map;

#[test]
fn post_boot_register_state() {
    let hardware = run_program("");

    // The preamble leaves PC at the program start without touching anything
    // else; construction state is the post-boot state
    assert_eq!(0x11, hardware.cpu_registers.a);
    assert_eq!(0x00, hardware.cpu_registers.f);
    assert_eq!(0xFFFE, hardware.cpu_registers.sp);
    assert!(!hardware.cpu_registers.ime);
    assert!(!hardware.cpu_registers.halted);
}

#[test]
fn unknown_opcode_reports_byte_and_address() {
    // 0xDD is a hole in the base opcode table
    let mut hardware = TestHardware::new({
        let mut rom = vec![0x00; 0x150];
        rom[0x100] = 0xDD;
        rom
    });

    let mut bus = Bus {
        address_space: &mut hardware.address_space,
        ppu_state: &mut hardware.ppu_state,
        timer_state: &mut hardware.timer_state,
    };

    let result = cpu::step(&mut hardware.cpu_registers, &mut bus);
    let err = result.expect_err("invalid opcode should fail decode");
    let message = err.to_string();
    assert!(message.contains("0xDD"), "error should name the opcode: {message}");
    assert!(message.contains("0x0100"), "error should name the address: {message}");
}
