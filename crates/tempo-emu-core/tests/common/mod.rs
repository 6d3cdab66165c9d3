#![allow(dead_code)]

use tempo_emu_core::cartridge::Cartridge;
use tempo_emu_core::gameboy::GameBoy;
use tempo_emu_core::input::Input;
use tempo_emu_core::ui::{NullUi, Ui, LCD_WIDTH};

/// Builds a valid ROM image for the given mapper/size codes. Every bank is
/// tagged with its index in its first byte so bank switching is observable.
pub fn rom_image(mapper: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
    let banks = 2usize << rom_code;
    let mut rom = vec![0u8; banks * 0x4000];
    rom[0x0147] = mapper;
    rom[0x0148] = rom_code;
    rom[0x0149] = ram_code;
    for bank in 1..banks {
        rom[bank * 0x4000] = bank as u8;
    }
    rom
}

/// Same, but with the color-mode bit set in the header.
pub fn gbc_rom_image(mapper: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
    let mut rom = rom_image(mapper, rom_code, ram_code);
    rom[0x0143] = 0x80;
    rom
}

pub fn gameboy(rom: Vec<u8>) -> GameBoy<NullUi> {
    GameBoy::new(Cartridge::load(rom).expect("valid test ROM"), NullUi)
}

pub fn recording_gameboy(rom: Vec<u8>) -> GameBoy<RecordingUi> {
    GameBoy::new(
        Cartridge::load(rom).expect("valid test ROM"),
        RecordingUi::default(),
    )
}

/// Sink that records everything the PPU pushes at it.
#[derive(Default)]
pub struct RecordingUi {
    pub flips: u32,
    pub dmg_lines: Vec<(u8, [u8; LCD_WIDTH])>,
    pub gbc_lines: Vec<(u8, [u16; LCD_WIDTH])>,
}

impl Ui for RecordingUi {
    fn draw_line_dmg(&mut self, ly: u8, line: &[u8; LCD_WIDTH]) {
        self.dmg_lines.push((ly, *line));
    }

    fn draw_line_gbc(&mut self, ly: u8, line: &[u16; LCD_WIDTH]) {
        self.gbc_lines.push((ly, *line));
    }

    fn flip(&mut self) {
        self.flips += 1;
    }

    fn refresh_input(&mut self, _input: &mut Input) {}
}
