use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{error, info};
use thiserror::Error;

use crate::rtc::Rtc;
use crate::scheduler::{Scheduler, SyncToken, NEVER};
use crate::CPU_FREQUENCY;

const ROM_BANK_SIZE: usize = 16 * 1024;
const RAM_BANK_SIZE: usize = 8 * 1024;
const CART_MIN_SIZE: usize = 2 * ROM_BANK_SIZE;
// The largest licensed cartridge is 8 MiB; leave headroom for homebrew.
const CART_MAX_SIZE: usize = 32 * 1024 * 1024;

const OFF_TITLE: usize = 0x0134;
const OFF_CGB: usize = 0x0143;
const OFF_TYPE: usize = 0x0147;
const OFF_ROM_BANKS: usize = 0x0148;
const OFF_RAM_BANKS: usize = 0x0149;

/// Delay between the last cartridge RAM write and the save flush.
pub const SAVE_DELAY_CYCLES: i32 = (CPU_FREQUENCY * 3) as i32;

/// Fatal conditions while loading a ROM or its save file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("can't read ROM file: {0}")]
    Io(#[from] io::Error),
    #[error("ROM file is empty")]
    Empty,
    #[error("ROM file is too small ({0} bytes)")]
    TooSmall(usize),
    #[error("ROM file is too large ({0} bytes)")]
    TooLarge(usize),
    #[error("unknown ROM size code {0:#04x}")]
    UnknownRomSize(u8),
    #[error("unknown RAM size code {0:#04x}")]
    UnknownRamSize(u8),
    #[error("unsupported cartridge type {0:#04x}")]
    UnsupportedMapper(u8),
    #[error("ROM file is too small to hold the declared {0} banks")]
    TruncatedRom(usize),
    #[error("save file is too small")]
    TruncatedSave,
}

/// Supported mapper models.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MbcType {
    None,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// Per-mapper banking state.
enum MbcState {
    None,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        /// Banking mode: false = 128 ROM / 1 RAM, true = 32 ROM / 4 RAM.
        bank_ram: bool,
    },
    Mbc2 {
        rom_bank: u8,
    },
    Mbc3 {
        rom_bank: u8,
        /// Selects a RAM bank (0..=3) or an RTC register (0x08..=0x0C).
        ram_bank: u8,
        rtc: Option<Rtc>,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
    },
}

/// A loaded cartridge: ROM image, optional battery-backed RAM, mapper state
/// and the save file it flushes to.
pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    rom_banks: usize,
    ram_banks: usize,
    mbc: MbcState,
    model: MbcType,
    /// RAM (and RTC) writes are locked until the 0x0A unlock command.
    write_protected: bool,
    save_path: Option<PathBuf>,
    dirty: bool,
    pub title: String,
    pub cgb: bool,
}

impl Cartridge {
    /// Loads a ROM image and, for battery carts, the sibling `.sav` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let data = fs::read(&path)?;
        let mut cart = Self::load(data)?;

        if cart.has_battery() {
            let mut save = PathBuf::from(path.as_ref());
            save.set_extension("sav");

            match fs::read(&save) {
                Ok(bytes) => cart.restore_save(&bytes)?,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            cart.save_path = Some(save);
        }

        info!(
            "loaded ROM '{}' ({:?}, {} ROM banks, {} RAM banks, cgb={})",
            cart.title, cart.model, cart.rom_banks, cart.ram_banks, cart.cgb
        );
        Ok(cart)
    }

    /// Parses and validates a ROM image held in memory.
    pub fn load(data: Vec<u8>) -> Result<Self, LoadError> {
        if data.is_empty() {
            return Err(LoadError::Empty);
        }
        if data.len() > CART_MAX_SIZE {
            return Err(LoadError::TooLarge(data.len()));
        }
        if data.len() < CART_MIN_SIZE {
            return Err(LoadError::TooSmall(data.len()));
        }

        let rom_banks = match data[OFF_ROM_BANKS] {
            code @ 0..=8 => 2usize << code,
            0x52 => 72,
            0x53 => 80,
            0x54 => 96,
            code => return Err(LoadError::UnknownRomSize(code)),
        };
        if data.len() < rom_banks * ROM_BANK_SIZE {
            return Err(LoadError::TruncatedRom(rom_banks));
        }

        let (mut ram_banks, mut ram_len) = match data[OFF_RAM_BANKS] {
            0 => (0, 0),
            // A single bank holding only a 2 KiB chip, mirrored four times.
            1 => (1, RAM_BANK_SIZE / 4),
            2 => (1, RAM_BANK_SIZE),
            3 => (4, 4 * RAM_BANK_SIZE),
            4 => (16, 16 * RAM_BANK_SIZE),
            code => return Err(LoadError::UnknownRamSize(code)),
        };

        let cart_type = data[OFF_TYPE];
        let has_rtc = matches!(cart_type, 0x0F | 0x10);
        let (model, mbc) = match cart_type {
            0x00 => (MbcType::None, MbcState::None),
            0x01..=0x03 => (
                MbcType::Mbc1,
                MbcState::Mbc1 {
                    rom_bank: 1,
                    ram_bank: 0,
                    bank_ram: false,
                },
            ),
            0x05 | 0x06 => (MbcType::Mbc2, MbcState::Mbc2 { rom_bank: 1 }),
            0x0F..=0x13 => (
                MbcType::Mbc3,
                MbcState::Mbc3 {
                    rom_bank: 1,
                    ram_bank: 0,
                    rtc: has_rtc.then(Rtc::new),
                },
            ),
            0x19..=0x1B => (
                MbcType::Mbc5,
                MbcState::Mbc5 {
                    rom_bank: 1,
                    ram_bank: 0,
                },
            ),
            code => return Err(LoadError::UnsupportedMapper(code)),
        };

        if model == MbcType::Mbc2 {
            // MBC2 carries its own 512 x 4-bit RAM regardless of the header.
            ram_banks = 1;
            ram_len = 512;
        }

        let title = data[OFF_TITLE..OFF_TITLE + 16]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '?'
                }
            })
            .collect();
        let cgb = data[OFF_CGB] & 0x80 != 0;

        Ok(Self {
            rom: data,
            ram: vec![0; ram_len],
            rom_banks,
            ram_banks,
            mbc,
            model,
            write_protected: true,
            save_path: None,
            dirty: false,
            title,
            cgb,
        })
    }

    pub fn model(&self) -> MbcType {
        self.model
    }

    fn has_battery(&self) -> bool {
        matches!(
            self.rom[OFF_TYPE],
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E | 0xFF
        ) && (!self.ram.is_empty() || self.has_rtc())
    }

    fn has_rtc(&self) -> bool {
        matches!(self.mbc, MbcState::Mbc3 { rtc: Some(_), .. })
    }

    fn restore_save(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        let ram_len = self.ram.len();
        if bytes.len() < ram_len {
            return Err(LoadError::TruncatedSave);
        }
        self.ram.copy_from_slice(&bytes[..ram_len]);

        if let MbcState::Mbc3 { rtc: Some(rtc), .. } = &mut self.mbc {
            *rtc = Rtc::load_block(&bytes[ram_len..]).ok_or(LoadError::TruncatedSave)?;
        }
        Ok(())
    }

    /// Bank shown in the switchable window, already reduced modulo the bank
    /// count. Bank 0 can never alias there except on MBC5.
    fn switchable_bank(&self) -> usize {
        let bank = match &self.mbc {
            MbcState::None => 1,
            MbcState::Mbc1 {
                rom_bank,
                ram_bank,
                bank_ram,
            } => {
                let mut bank = ((*ram_bank as usize & 3) << 5) | (*rom_bank as usize & 0x1F);
                // RAM-banking mode can only address 32 ROM banks.
                bank %= if *bank_ram { 32 } else { 128 };
                if bank == 0 {
                    bank = 1;
                }
                bank
            }
            MbcState::Mbc2 { rom_bank } => *rom_bank as usize,
            MbcState::Mbc3 { rom_bank, .. } => *rom_bank as usize,
            MbcState::Mbc5 { rom_bank, .. } => return *rom_bank as usize % self.rom_banks,
        };

        let bank = bank % self.rom_banks;
        if bank == 0 && self.rom_banks > 1 {
            1
        } else {
            bank
        }
    }

    /// ROM read, 0x0000..=0x7FFF. Bank 0 is fixed in the low window.
    pub fn read_rom(&self, addr: u16) -> u8 {
        let addr = addr as usize;
        let offset = if addr < ROM_BANK_SIZE {
            addr
        } else {
            self.switchable_bank() * ROM_BANK_SIZE + (addr - ROM_BANK_SIZE)
        };
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }

    /// Mapper command write, 0x0000..=0x7FFF.
    pub fn write_rom(&mut self, addr: u16, value: u8) {
        let unlock = value & 0x0F == 0x0A;

        match &mut self.mbc {
            MbcState::None => {}
            MbcState::Mbc1 {
                rom_bank,
                ram_bank,
                bank_ram,
            } => match addr {
                0x0000..=0x1FFF => self.write_protected = !unlock,
                0x2000..=0x3FFF => *rom_bank = value & 0x1F,
                0x4000..=0x5FFF => *ram_bank = value & 0x03,
                _ => *bank_ram = value & 1 != 0,
            },
            MbcState::Mbc2 { rom_bank } => match addr {
                0x0000..=0x1FFF => self.write_protected = !unlock,
                0x2000..=0x3FFF => {
                    *rom_bank = value & 0x0F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
                _ => {}
            },
            MbcState::Mbc3 {
                rom_bank,
                ram_bank,
                rtc,
            } => match addr {
                0x0000..=0x1FFF => self.write_protected = !unlock,
                0x2000..=0x3FFF => {
                    *rom_bank = value & 0x7F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
                0x4000..=0x5FFF => *ram_bank = value,
                _ => {
                    if let Some(rtc) = rtc {
                        rtc.set_latch(value == 1);
                    }
                }
            },
            MbcState::Mbc5 { rom_bank, ram_bank } => match addr {
                0x0000..=0x1FFF => self.write_protected = !unlock,
                0x2000..=0x2FFF => *rom_bank = (*rom_bank & 0x100) | value as u16,
                0x3000..=0x3FFF => *rom_bank = (*rom_bank & 0xFF) | ((value as u16 & 1) << 8),
                0x4000..=0x5FFF => *ram_bank = value & 0x0F,
                _ => {}
            },
        }
    }

    /// Index into the RAM image for an access at 0xA000 + `offset`, or None
    /// when the access does not map to RAM.
    fn ram_index(&self, offset: u16) -> Option<usize> {
        if self.ram.is_empty() {
            return None;
        }

        match &self.mbc {
            MbcState::None => Some(offset as usize % self.ram.len()),
            MbcState::Mbc1 {
                ram_bank, bank_ram, ..
            } => {
                // A lone bank may be a partial 2 KiB chip mirrored four times.
                if self.ram_banks == 1 {
                    return Some(offset as usize % self.ram.len());
                }
                let bank = if *bank_ram {
                    *ram_bank as usize % self.ram_banks.min(4)
                } else {
                    0
                };
                Some(bank * RAM_BANK_SIZE + offset as usize)
            }
            MbcState::Mbc2 { .. } => Some(offset as usize % 512),
            MbcState::Mbc3 { ram_bank, .. } => {
                if *ram_bank <= 3 {
                    let bank = *ram_bank as usize % self.ram_banks;
                    Some(bank * RAM_BANK_SIZE + offset as usize)
                } else {
                    None
                }
            }
            MbcState::Mbc5 { ram_bank, .. } => {
                let bank = *ram_bank as usize % self.ram_banks;
                Some(bank * RAM_BANK_SIZE + offset as usize)
            }
        }
    }

    /// True when the current RAM-bank selection addresses the RTC.
    fn rtc_selected(&self) -> Option<u8> {
        match &self.mbc {
            MbcState::Mbc3 {
                ram_bank,
                rtc: Some(_),
                ..
            } if (0x08..=0x0C).contains(ram_bank) => Some(*ram_bank),
            _ => None,
        }
    }

    /// Cartridge RAM read; `offset` is relative to 0xA000.
    pub fn read_ram(&self, offset: u16) -> u8 {
        if let Some(register) = self.rtc_selected() {
            // The RTC is behind the same access lock as RAM, even for reads.
            if self.write_protected {
                return 0xFF;
            }
            if let MbcState::Mbc3 { rtc: Some(rtc), .. } = &self.mbc {
                return rtc.read(register);
            }
        }

        let Some(index) = self.ram_index(offset) else {
            return 0xFF;
        };
        let value = self.ram.get(index).copied().unwrap_or(0xFF);
        if self.model == MbcType::Mbc2 {
            0xF0 | (value & 0x0F)
        } else {
            value
        }
    }

    /// Cartridge RAM write. Returns true when battery-backed state changed,
    /// so the bus can schedule the deferred save flush.
    pub fn write_ram(&mut self, offset: u16, value: u8) -> bool {
        if self.write_protected {
            return false;
        }

        if let Some(register) = self.rtc_selected() {
            if let MbcState::Mbc3 { rtc: Some(rtc), .. } = &mut self.mbc {
                rtc.write(register, value);
            }
        } else {
            let Some(index) = self.ram_index(offset) else {
                return false;
            };
            // MBC2 only wires the low nibble.
            let value = if self.model == MbcType::Mbc2 {
                value | 0xF0
            } else {
                value
            };
            match self.ram.get_mut(index) {
                Some(slot) => *slot = value,
                None => return false,
            }
        }

        self.dirty = self.save_path.is_some();
        self.dirty
    }

    /// CART sync: flush any dirty save state, then go back to sleep.
    pub fn sync(&mut self, sched: &mut Scheduler) {
        sched.resync(SyncToken::Cart);
        if let Err(e) = self.flush_save() {
            error!("failed to flush save file: {e}");
        }
        sched.schedule(SyncToken::Cart, NEVER);
    }

    /// Writes RAM (and the RTC block) to the save file when dirty.
    pub fn flush_save(&mut self) -> io::Result<()> {
        let Some(path) = &self.save_path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let mut data = self.ram.clone();
        if let MbcState::Mbc3 { rtc: Some(rtc), .. } = &self.mbc {
            data.extend_from_slice(&rtc.save_block());
        }
        fs::write(path, &data)?;
        self.dirty = false;
        Ok(())
    }
}
