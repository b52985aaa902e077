pub mod address;
pub mod ioregisters;
mod mapper;

use crate::apu::{ApuState, SharedApu};
use crate::memory::ioregisters::{IoRegister, IoRegisters};
use crate::memory::mapper::{Mbc, MbcKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::{fs, io};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CartridgeLoadError {
    #[error("cannot open file {file_path}: {source}")]
    FileRead {
        file_path: String,
        #[source]
        source: io::Error,
    },
    #[error("ROM image too short to contain a header: {rom_len} bytes")]
    RomTooShort { rom_len: usize },
    #[error("unknown cartridge type (0x{type_byte:02X})")]
    UnknownCartridgeType { type_byte: u8 },
    #[error("unknown external ram size (0x{size_code:02X})")]
    UnknownRamSize { size_code: u8 },
}

/// The loaded ROM image, external RAM, bank controller state, and
/// battery-backed save handling.
pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    mbc: Mbc,
    has_battery: bool,
    save_path: Option<PathBuf>,
}

impl Cartridge {
    /// Build a cartridge from a raw ROM image, consulting the header for the
    /// bank controller family and external RAM size. If `save_path` is given
    /// and the cartridge has a battery, external RAM is preloaded from that
    /// file when it exists.
    pub fn new(rom: Vec<u8>, save_path: Option<PathBuf>) -> Result<Self, CartridgeLoadError> {
        if rom.len() < 0x0150 {
            return Err(CartridgeLoadError::RomTooShort { rom_len: rom.len() });
        }

        let type_byte = rom[usize::from(address::CARTRIDGE_TYPE)];
        let Some((kind, has_battery, description)) = mapper::parse_cartridge_type(type_byte) else {
            return Err(CartridgeLoadError::UnknownCartridgeType { type_byte });
        };

        log::info!("Cartridge type: {description}");

        let size_code = rom[usize::from(address::RAM_SIZE)];
        let ram_size = match size_code {
            // MBC2 carries 512 nibble-sized cells regardless of the size code
            0x00 if kind == MbcKind::Mbc2 => 0x200,
            0x00 => 0,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            _ => return Err(CartridgeLoadError::UnknownRamSize { size_code }),
        };

        let mut ram = vec![0; ram_size];

        if has_battery {
            if let Some(save_path) = &save_path {
                match fs::read(save_path) {
                    Ok(saved) => {
                        if saved.len() != ram.len() {
                            log::warn!(
                                "save file {} is {} bytes, expected {}",
                                save_path.display(),
                                saved.len(),
                                ram.len()
                            );
                        }
                        let len = saved.len().min(ram.len());
                        ram[..len].copy_from_slice(&saved[..len]);
                        log::info!("Loaded external RAM from {}", save_path.display());
                    }
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => {
                        log::warn!("error reading save file {}: {err}", save_path.display());
                    }
                }
            }
        }

        log::info!("Cartridge has {} bytes of external RAM", ram.len());

        Ok(Self { rom, ram, mbc: Mbc::new(kind), has_battery, save_path })
    }

    pub fn from_file(file_path: &str) -> Result<Self, CartridgeLoadError> {
        log::info!("Loading cartridge from '{file_path}'");

        let rom = fs::read(Path::new(file_path)).map_err(|err| CartridgeLoadError::FileRead {
            file_path: file_path.into(),
            source: err,
        })?;

        let save_path = Path::new(file_path).with_extension("save");

        Self::new(rom, Some(save_path))
    }

    /// Read from the ROM address range, honoring the active switchable bank.
    pub fn read_rom_address(&self, address: u16) -> u8 {
        let mapped = self.mbc.map_rom_address(address, self.rom.len());
        self.rom.get(mapped).copied().unwrap_or(0xFF)
    }

    /// A write to the ROM address range is a bank controller register write.
    pub fn write_rom_address(&mut self, address: u16, value: u8) {
        self.mbc.write_rom_address(address, value);
    }

    /// Read from the external RAM range. Unpopulated addresses read as 0xFF.
    pub fn read_ram_address(&self, address: u16) -> u8 {
        let mapped = self.mbc.map_ram_address(address);
        self.ram.get(mapped).copied().unwrap_or(0xFF)
    }

    /// Write to the external RAM range. Unpopulated addresses are ignored.
    pub fn write_ram_address(&mut self, address: u16, value: u8) {
        let mapped = self.mbc.map_ram_address(address);
        if let Some(cell) = self.ram.get_mut(mapped) {
            *cell = value;
        }
    }

    /// Dump external RAM to the save file, if this cartridge has a battery.
    pub fn persist_external_ram(&self) -> Result<(), io::Error> {
        if !self.has_battery {
            return Ok(());
        }

        let Some(save_path) = &self.save_path else {
            return Ok(());
        };

        fs::write(save_path, &self.ram)?;
        log::info!("Wrote external RAM to {}", save_path.display());

        Ok(())
    }

    /// Whether the header declares color-mode support (byte 0x0143 is 0x80
    /// or 0xC0). Software detects color hardware through register A instead;
    /// this controls how finished frames are converted for the host.
    pub fn supports_color_mode(&self) -> bool {
        let code = self.rom[usize::from(address::CGB_SUPPORT)];
        code == 0x80 || code == 0xC0
    }
}

/// The full 16-bit address space: cartridge, display RAM, work RAM, OAM,
/// I/O registers, high RAM, and the interrupt enable register. The sound
/// generator's register block is shared with the audio thread and reached
/// through a mutex.
pub struct AddressSpace {
    cartridge: Cartridge,
    display_ram: [u8; 0x4000],
    work_ram: [u8; 0x8000],
    oam: [u8; 160],
    io_registers: IoRegisters,
    apu: SharedApu,
    hram: [u8; 127],
    ie_register: u8,
}

impl AddressSpace {
    pub fn new(cartridge: Cartridge) -> Self {
        Self {
            cartridge,
            display_ram: [0; 0x4000],
            work_ram: [0; 0x8000],
            oam: [0; 160],
            io_registers: IoRegisters::new(),
            apu: Arc::new(Mutex::new(ApuState::new())),
            hram: [0; 127],
            ie_register: 0,
        }
    }

    fn display_ram_offset(&self, address: u16) -> usize {
        let bank = self.io_registers.read_register(IoRegister::VBK) & 0x01;
        usize::from(address - address::DISPLAY_RAM_START)
            + usize::from(bank) * usize::from(address::DISPLAY_RAM_BANK_SIZE)
    }

    fn work_ram_offset(&self, address: u16) -> usize {
        let offset = usize::from(address - address::WORK_RAM_START);
        if offset < usize::from(address::WORK_RAM_BANK_SIZE) {
            offset
        } else {
            let bank = self.io_registers.read_register(IoRegister::SVBK) & 0x07;
            let bank = if bank == 0 { 1 } else { bank };
            offset + usize::from(bank - 1) * usize::from(address::WORK_RAM_BANK_SIZE)
        }
    }

    /// Read the byte at the given address. Reads are total: unmapped holes
    /// return 0xFF.
    pub fn read_address_u8(&self, address: u16) -> u8 {
        match address {
            address::ROM_START..=address::ROM_END => self.cartridge.read_rom_address(address),
            address::DISPLAY_RAM_START..=address::DISPLAY_RAM_END => {
                self.display_ram[self.display_ram_offset(address)]
            }
            address::EXTERNAL_RAM_START..=address::EXTERNAL_RAM_END => {
                self.cartridge.read_ram_address(address)
            }
            address::WORK_RAM_START..=address::WORK_RAM_END => {
                self.work_ram[self.work_ram_offset(address)]
            }
            address::ECHO_RAM_START..=address::ECHO_RAM_END => {
                self.read_address_u8(address - 0x2000)
            }
            address::OAM_START..=address::OAM_END => {
                self.oam[usize::from(address - address::OAM_START)]
            }
            address::UNUSABLE_START..=address::UNUSABLE_END => 0xFF,
            address::AUDIO_REGISTERS_START..=address::AUDIO_REGISTERS_END => {
                self.apu.lock().unwrap().read_register(address)
            }
            address::IO_REGISTERS_START..=address::IO_REGISTERS_END => {
                self.io_registers.read_address(address)
            }
            address::HRAM_START..=address::HRAM_END => {
                self.hram[usize::from(address - address::HRAM_START)]
            }
            address::IE_REGISTER => self.ie_register,
        }
    }

    /// Write the byte at the given address. Writes to the ROM range are bank
    /// controller commands; writes to unmapped holes are ignored. Audio
    /// register writes apply the sound generator's write hooks.
    pub fn write_address_u8(&mut self, address: u16, value: u8) {
        match address {
            address::ROM_START..=address::ROM_END => {
                self.cartridge.write_rom_address(address, value);
            }
            address::DISPLAY_RAM_START..=address::DISPLAY_RAM_END => {
                let offset = self.display_ram_offset(address);
                self.display_ram[offset] = value;
            }
            address::EXTERNAL_RAM_START..=address::EXTERNAL_RAM_END => {
                self.cartridge.write_ram_address(address, value);
            }
            address::WORK_RAM_START..=address::WORK_RAM_END => {
                let offset = self.work_ram_offset(address);
                self.work_ram[offset] = value;
            }
            address::ECHO_RAM_START..=address::ECHO_RAM_END => {
                self.write_address_u8(address - 0x2000, value);
            }
            address::OAM_START..=address::OAM_END => {
                self.oam[usize::from(address - address::OAM_START)] = value;
            }
            address::UNUSABLE_START..=address::UNUSABLE_END => {}
            address::AUDIO_REGISTERS_START..=address::AUDIO_REGISTERS_END => {
                self.apu.lock().unwrap().write_register(address, value);
            }
            address::IO_REGISTERS_START..=address::IO_REGISTERS_END => {
                self.io_registers.write_address(address, value);
            }
            address::HRAM_START..=address::HRAM_END => {
                self.hram[usize::from(address - address::HRAM_START)] = value;
            }
            address::IE_REGISTER => {
                self.ie_register = value;
            }
        }
    }

    /// Read a display RAM byte from an explicit bank, ignoring VBK. The pixel
    /// pipeline uses this to fetch tile maps and attributes from both banks.
    pub fn read_display_ram(&self, address: u16, bank: u8) -> u8 {
        let offset = usize::from(address - address::DISPLAY_RAM_START)
            + usize::from(bank & 0x01) * usize::from(address::DISPLAY_RAM_BANK_SIZE);
        self.display_ram[offset]
    }

    /// Copy 160 bytes from `source_page << 8` into OAM. Triggered by a write
    /// to the DMA register; runs as a block, outside the machine-cycle clock.
    pub fn perform_oam_dma(&mut self, source_page: u8) {
        let base = u16::from(source_page) << 8;
        for index in 0..address::OAM_SIZE {
            self.oam[usize::from(index)] = self.read_address_u8(base.wrapping_add(index));
        }
    }

    /// Write to HDMA5, scheduling or performing a display RAM transfer.
    ///
    /// Bit 7 set arms one-block-per-HBLANK transfers (the pipeline calls
    /// `run_hblank_hdma` at each HBLANK entry while HDMA5 bit 7 is clear).
    /// Bit 7 clear starts an immediate general-purpose transfer, unless a
    /// per-HBLANK transfer is already armed, in which case it cancels it.
    pub fn write_hdma5(&mut self, value: u8) {
        let old_value = self.io_registers.read_register(IoRegister::HDMA5);
        self.io_registers.write_register(IoRegister::HDMA5, value & 0x7F);

        if value & 0x80 == 0 {
            if old_value & 0x80 != 0 {
                self.perform_hdma_blocks(value & 0x7F);
            } else {
                self.io_registers.write_register(IoRegister::HDMA5, (value & 0x7F) | 0x80);
            }
        }
    }

    /// Transfer one 16-byte block at HBLANK while a per-HBLANK transfer is
    /// armed (HDMA5 bit 7 clear).
    pub fn run_hblank_hdma(&mut self) {
        self.perform_hdma_blocks(0);
    }

    /// Copy `block_count + 1` 16-byte blocks from the HDMA source to the HDMA
    /// destination in the currently selected display RAM bank, advancing the
    /// source/destination registers and decrementing HDMA5. Decrementing past
    /// zero sets bit 7, marking the transfer complete.
    fn perform_hdma_blocks(&mut self, block_count: u8) {
        let transfer_size = 16 * (u16::from(block_count) + 1);

        let mut source = (u16::from(self.io_registers.read_register(IoRegister::HDMA1)) << 8)
            | u16::from(self.io_registers.read_register(IoRegister::HDMA2) & 0xF0);
        let mut destination = (u16::from(self.io_registers.read_register(IoRegister::HDMA3) & 0x1F)
            << 8)
            | u16::from(self.io_registers.read_register(IoRegister::HDMA4) & 0xF0);

        let bank = self.io_registers.read_register(IoRegister::VBK) & 0x01;
        let bank_base = usize::from(bank) * usize::from(address::DISPLAY_RAM_BANK_SIZE);

        for _ in 0..transfer_size {
            let byte = self.read_address_u8(source);
            let offset = usize::from(destination) & (usize::from(address::DISPLAY_RAM_BANK_SIZE) - 1);
            self.display_ram[bank_base + offset] = byte;
            source = source.wrapping_add(1);
            destination = destination.wrapping_add(1);
        }

        self.io_registers.write_register(IoRegister::HDMA1, (source >> 8) as u8);
        self.io_registers.write_register(IoRegister::HDMA2, (source & 0x00FF) as u8);
        self.io_registers.write_register(IoRegister::HDMA3, (destination >> 8) as u8);
        self.io_registers.write_register(IoRegister::HDMA4, (destination & 0x00FF) as u8);

        let hdma5 = self.io_registers.read_register(IoRegister::HDMA5);
        self.io_registers.write_register(IoRegister::HDMA5, hdma5.wrapping_sub(block_count + 1));
    }

    pub fn io_registers(&self) -> &IoRegisters {
        &self.io_registers
    }

    pub fn io_registers_mut(&mut self) -> &mut IoRegisters {
        &mut self.io_registers
    }

    /// A shared handle to the sound generator state, for the audio callback.
    pub fn apu_handle(&self) -> SharedApu {
        Arc::clone(&self.apu)
    }

    pub fn persist_cartridge_ram(&self) -> Result<(), io::Error> {
        self.cartridge.persist_external_ram()
    }
}
