use crate::bus::Bus;
use crate::cpu::instructions::{
    Instruction, JumpCondition, ModifyTarget, ReadTarget, WriteTarget,
};
use crate::cpu::registers::{CpuRegister, CpuRegisterPair, CpuRegisters};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("unknown opcode 0x{opcode:02X} at address 0x{address:04X}")]
    UnknownOpcode { opcode: u8, address: u16 },
}

fn fetch_imm8(cpu: &mut CpuRegisters, bus: &mut Bus<'_>) -> u8 {
    let value = bus.read(cpu.pc);
    cpu.pc = cpu.pc.wrapping_add(1);
    value
}

fn fetch_imm16(cpu: &mut CpuRegisters, bus: &mut Bus<'_>) -> u16 {
    let value = bus.read_u16(cpu.pc);
    cpu.pc = cpu.pc.wrapping_add(2);
    value
}

/// Decode the instruction at PC, fetching the opcode and any immediate
/// operands through the timed bus and leaving PC past the instruction.
pub fn parse_next_instruction(
    cpu: &mut CpuRegisters,
    bus: &mut Bus<'_>,
) -> Result<Instruction, ExecutionError> {
    let opcode_address = cpu.pc;
    let opcode = fetch_imm8(cpu, bus);

    let instruction = match opcode {
        0x00 => Instruction::Nop,
        0x01 | 0x11 | 0x21 | 0x31 => {
            let rr = register_pair_for_other_ops(opcode);
            Instruction::LoadPairImmediate(rr, fetch_imm16(cpu, bus))
        }
        0x02 => Instruction::Load(WriteTarget::BCIndirect, ReadTarget::Register(CpuRegister::A)),
        0x03 | 0x13 | 0x23 | 0x33 => {
            Instruction::IncrementPair(register_pair_for_other_ops(opcode))
        }
        0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
            Instruction::Increment(mid_modify_target(opcode))
        }
        0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
            Instruction::Decrement(mid_modify_target(opcode))
        }
        0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
            let write_target = CpuRegister::from_mid_opcode_bits(opcode)
                .map_or(WriteTarget::HLIndirect, WriteTarget::Register);
            Instruction::Load(write_target, ReadTarget::Immediate(fetch_imm8(cpu, bus)))
        }
        0x07 => Instruction::RotateLeftAccumulator,
        0x08 => Instruction::StoreStackPointer(fetch_imm16(cpu, bus)),
        0x09 | 0x19 | 0x29 | 0x39 => Instruction::AddHL(register_pair_for_other_ops(opcode)),
        0x0A => Instruction::Load(WriteTarget::Register(CpuRegister::A), ReadTarget::BCIndirect),
        0x0B | 0x1B | 0x2B | 0x3B => {
            Instruction::DecrementPair(register_pair_for_other_ops(opcode))
        }
        0x0F => Instruction::RotateRightAccumulator,
        0x10 => {
            // The operand byte after STOP is skipped without a fetch
            cpu.pc = cpu.pc.wrapping_add(1);
            Instruction::Stop
        }
        0x12 => Instruction::Load(WriteTarget::DEIndirect, ReadTarget::Register(CpuRegister::A)),
        0x17 => Instruction::RotateLeftAccumulatorThruCarry,
        0x18 => Instruction::JumpRelative(fetch_imm8(cpu, bus) as i8),
        0x1A => Instruction::Load(WriteTarget::Register(CpuRegister::A), ReadTarget::DEIndirect),
        0x1F => Instruction::RotateRightAccumulatorThruCarry,
        0x20 | 0x28 | 0x30 | 0x38 => {
            let cc = parse_jump_condition(opcode);
            Instruction::JumpRelativeCond(cc, fetch_imm8(cpu, bus) as i8)
        }
        0x22 => {
            Instruction::Load(WriteTarget::HLIndirectInc, ReadTarget::Register(CpuRegister::A))
        }
        0x27 => Instruction::DecimalAdjust,
        0x2A => {
            Instruction::Load(WriteTarget::Register(CpuRegister::A), ReadTarget::HLIndirectInc)
        }
        0x2F => Instruction::ComplementAccumulator,
        0x32 => {
            Instruction::Load(WriteTarget::HLIndirectDec, ReadTarget::Register(CpuRegister::A))
        }
        0x37 => Instruction::SetCarryFlag,
        0x3A => {
            Instruction::Load(WriteTarget::Register(CpuRegister::A), ReadTarget::HLIndirectDec)
        }
        0x3F => Instruction::ComplementCarryFlag,
        0x76 => Instruction::Halt,
        0x40..=0x7F => {
            let write_target = CpuRegister::from_mid_opcode_bits(opcode)
                .map_or(WriteTarget::HLIndirect, WriteTarget::Register);
            let read_target = low_read_target(opcode);
            Instruction::Load(write_target, read_target)
        }
        0x80..=0x87 => Instruction::Add(low_read_target(opcode)),
        0x88..=0x8F => Instruction::Adc(low_read_target(opcode)),
        0x90..=0x97 => Instruction::Sub(low_read_target(opcode)),
        0x98..=0x9F => Instruction::Sbc(low_read_target(opcode)),
        0xA0..=0xA7 => Instruction::And(low_read_target(opcode)),
        0xA8..=0xAF => Instruction::Xor(low_read_target(opcode)),
        0xB0..=0xB7 => Instruction::Or(low_read_target(opcode)),
        0xB8..=0xBF => Instruction::Compare(low_read_target(opcode)),
        0xC0 | 0xC8 | 0xD0 | 0xD8 => Instruction::ReturnCond(parse_jump_condition(opcode)),
        0xC1 | 0xD1 | 0xE1 | 0xF1 => Instruction::Pop(register_pair_for_push_pop(opcode)),
        0xC2 | 0xCA | 0xD2 | 0xDA => {
            let cc = parse_jump_condition(opcode);
            Instruction::JumpCond(cc, fetch_imm16(cpu, bus))
        }
        0xC3 => Instruction::Jump(fetch_imm16(cpu, bus)),
        0xC4 | 0xCC | 0xD4 | 0xDC => {
            let cc = parse_jump_condition(opcode);
            Instruction::CallCond(cc, fetch_imm16(cpu, bus))
        }
        0xC5 | 0xD5 | 0xE5 | 0xF5 => Instruction::Push(register_pair_for_push_pop(opcode)),
        0xC6 => Instruction::Add(ReadTarget::Immediate(fetch_imm8(cpu, bus))),
        0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
            Instruction::Restart(opcode & 0x38)
        }
        0xC9 => Instruction::Return,
        0xCB => parse_cb_prefixed_opcode(fetch_imm8(cpu, bus)),
        0xCD => Instruction::Call(fetch_imm16(cpu, bus)),
        0xCE => Instruction::Adc(ReadTarget::Immediate(fetch_imm8(cpu, bus))),
        0xD6 => Instruction::Sub(ReadTarget::Immediate(fetch_imm8(cpu, bus))),
        0xD9 => Instruction::ReturnFromInterrupt,
        0xDE => Instruction::Sbc(ReadTarget::Immediate(fetch_imm8(cpu, bus))),
        0xE0 => Instruction::Load(
            WriteTarget::HighImmediate(fetch_imm8(cpu, bus)),
            ReadTarget::Register(CpuRegister::A),
        ),
        0xE2 => Instruction::Load(WriteTarget::HighC, ReadTarget::Register(CpuRegister::A)),
        0xE6 => Instruction::And(ReadTarget::Immediate(fetch_imm8(cpu, bus))),
        0xE8 => Instruction::AddSpOffset(fetch_imm8(cpu, bus) as i8),
        0xE9 => Instruction::JumpHL,
        0xEA => Instruction::Load(
            WriteTarget::Absolute(fetch_imm16(cpu, bus)),
            ReadTarget::Register(CpuRegister::A),
        ),
        0xEE => Instruction::Xor(ReadTarget::Immediate(fetch_imm8(cpu, bus))),
        0xF0 => Instruction::Load(
            WriteTarget::Register(CpuRegister::A),
            ReadTarget::HighImmediate(fetch_imm8(cpu, bus)),
        ),
        0xF2 => Instruction::Load(WriteTarget::Register(CpuRegister::A), ReadTarget::HighC),
        0xF3 => Instruction::DisableInterrupts,
        0xF6 => Instruction::Or(ReadTarget::Immediate(fetch_imm8(cpu, bus))),
        0xF8 => Instruction::LoadHLFromSpOffset(fetch_imm8(cpu, bus) as i8),
        0xF9 => Instruction::LoadStackPointerFromHL,
        0xFA => Instruction::Load(
            WriteTarget::Register(CpuRegister::A),
            ReadTarget::Absolute(fetch_imm16(cpu, bus)),
        ),
        0xFB => Instruction::EnableInterrupts,
        0xFE => Instruction::Compare(ReadTarget::Immediate(fetch_imm8(cpu, bus))),
        _ => return Err(ExecutionError::UnknownOpcode { opcode, address: opcode_address }),
    };

    Ok(instruction)
}

/// The 0xCB subtable decomposes into an operation in bits 6-7 (with bits 3-5
/// refining the shift/rotate group or selecting the bit index) and an operand
/// in bits 0-2.
fn parse_cb_prefixed_opcode(opcode: u8) -> Instruction {
    let target = low_modify_target(opcode);

    match opcode {
        0x00..=0x07 => Instruction::RotateLeft(target),
        0x08..=0x0F => Instruction::RotateRight(target),
        0x10..=0x17 => Instruction::RotateLeftThruCarry(target),
        0x18..=0x1F => Instruction::RotateRightThruCarry(target),
        0x20..=0x27 => Instruction::ShiftLeftArithmetic(target),
        0x28..=0x2F => Instruction::ShiftRightArithmetic(target),
        0x30..=0x37 => Instruction::SwapNibbles(target),
        0x38..=0x3F => Instruction::ShiftRightLogical(target),
        0x40..=0x7F => Instruction::TestBit((opcode >> 3) & 0x07, target),
        0x80..=0xBF => Instruction::ResetBit((opcode >> 3) & 0x07, target),
        0xC0..=0xFF => Instruction::SetBit((opcode >> 3) & 0x07, target),
    }
}

fn low_read_target(opcode: u8) -> ReadTarget {
    CpuRegister::from_low_opcode_bits(opcode).map_or(ReadTarget::HLIndirect, ReadTarget::Register)
}

fn low_modify_target(opcode: u8) -> ModifyTarget {
    CpuRegister::from_low_opcode_bits(opcode)
        .map_or(ModifyTarget::HLIndirect, ModifyTarget::Register)
}

fn mid_modify_target(opcode: u8) -> ModifyTarget {
    CpuRegister::from_mid_opcode_bits(opcode)
        .map_or(ModifyTarget::HLIndirect, ModifyTarget::Register)
}

fn register_pair_for_other_ops(opcode: u8) -> CpuRegisterPair {
    match opcode & 0x30 {
        0x00 => CpuRegisterPair::BC,
        0x10 => CpuRegisterPair::DE,
        0x20 => CpuRegisterPair::HL,
        _ => CpuRegisterPair::SP,
    }
}

fn register_pair_for_push_pop(opcode: u8) -> CpuRegisterPair {
    match opcode & 0x30 {
        0x00 => CpuRegisterPair::BC,
        0x10 => CpuRegisterPair::DE,
        0x20 => CpuRegisterPair::HL,
        _ => CpuRegisterPair::AF,
    }
}

fn parse_jump_condition(opcode: u8) -> JumpCondition {
    match opcode & 0x18 {
        0x00 => JumpCondition::NotZero,
        0x08 => JumpCondition::Zero,
        0x10 => JumpCondition::NotCarry,
        _ => JumpCondition::Carry,
    }
}
