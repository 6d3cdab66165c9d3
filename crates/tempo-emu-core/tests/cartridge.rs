mod common;

use std::fs;
use tempfile::tempdir;

use tempo_emu_core::cartridge::{Cartridge, LoadError, MbcType};

fn cart(rom: Vec<u8>) -> Cartridge {
    Cartridge::load(rom).expect("valid test ROM")
}

#[test]
fn header_detects_model_and_mode() {
    let c = cart(common::rom_image(0x01, 0, 0));
    assert_eq!(c.model(), MbcType::Mbc1);
    assert!(!c.cgb);

    let c = cart(common::gbc_rom_image(0x19, 0, 0));
    assert_eq!(c.model(), MbcType::Mbc5);
    assert!(c.cgb);
}

#[test]
fn title_is_nul_trimmed() {
    let mut rom = common::rom_image(0x00, 0, 0);
    rom[0x0134..0x0139].copy_from_slice(b"HELLO");
    let c = cart(rom);
    assert_eq!(c.title, "HELLO");
}

#[test]
fn load_rejects_malformed_images() {
    assert!(matches!(Cartridge::load(vec![]), Err(LoadError::Empty)));
    assert!(matches!(
        Cartridge::load(vec![0; 0x100]),
        Err(LoadError::TooSmall(0x100))
    ));

    let mut rom = common::rom_image(0x00, 0, 0);
    rom[0x0148] = 0x09;
    assert!(matches!(
        Cartridge::load(rom),
        Err(LoadError::UnknownRomSize(0x09))
    ));

    let mut rom = common::rom_image(0x00, 0, 0);
    rom[0x0149] = 0x05;
    assert!(matches!(
        Cartridge::load(rom),
        Err(LoadError::UnknownRamSize(0x05))
    ));

    let mut rom = common::rom_image(0x00, 0, 0);
    rom[0x0147] = 0x20;
    assert!(matches!(
        Cartridge::load(rom),
        Err(LoadError::UnsupportedMapper(0x20))
    ));

    // Declares 16 banks but only ships 2.
    let mut rom = common::rom_image(0x00, 0, 0);
    rom[0x0148] = 0x03;
    assert!(matches!(
        Cartridge::load(rom),
        Err(LoadError::TruncatedRom(16))
    ));
}

#[test]
fn mbc1_bank_zero_aliases_bank_one() {
    let mut c = cart(common::rom_image(0x01, 0x02, 0)); // 8 banks
    assert_eq!(c.read_rom(0x4000), 1);

    c.write_rom(0x2000, 0x00);
    assert_eq!(c.read_rom(0x4000), 1);

    c.write_rom(0x2000, 0x02);
    assert_eq!(c.read_rom(0x4000), 2);
}

#[test]
fn mbc1_high_bits_and_mode() {
    let mut c = cart(common::rom_image(0x01, 0x05, 0)); // 64 banks

    c.write_rom(0x2000, 0x02);
    c.write_rom(0x4000, 0x01); // high bits: bank 0x22
    assert_eq!(c.read_rom(0x4000), 0x22);

    // RAM-banking mode drops the high bits.
    c.write_rom(0x6000, 0x01);
    assert_eq!(c.read_rom(0x4000), 0x02);

    // The low window always shows bank 0.
    assert_eq!(c.read_rom(0x0000), 0);
}

#[test]
fn mbc1_ram_write_protect() {
    let mut c = cart(common::rom_image(0x03, 0, 0x03));

    assert!(!c.write_ram(0, 0x55));
    assert_eq!(c.read_ram(0), 0x00);

    c.write_rom(0x0000, 0x0A);
    c.write_ram(0, 0x55);
    assert_eq!(c.read_ram(0), 0x55);

    c.write_rom(0x0000, 0x00);
    assert!(!c.write_ram(0, 0x99));
    assert_eq!(c.read_ram(0), 0x55);
}

#[test]
fn mbc1_small_ram_is_mirrored() {
    // RAM code 1: a lone 2 KiB chip mirrored across the 8 KiB window.
    let mut c = cart(common::rom_image(0x02, 0, 0x01));
    c.write_rom(0x0000, 0x0A);
    c.write_ram(0x0010, 0x7E);
    assert_eq!(c.read_ram(0x0810), 0x7E);
    assert_eq!(c.read_ram(0x1810), 0x7E);
}

#[test]
fn mbc2_nibble_ram_and_bank_select() {
    let mut c = cart(common::rom_image(0x06, 0x02, 0)); // 8 banks

    c.write_rom(0x0000, 0x0A);
    c.write_ram(0x0000, 0xAB);
    assert_eq!(c.read_ram(0x0000), 0xFB);
    // 512 nibbles, mirrored.
    assert_eq!(c.read_ram(0x0200), 0xFB);

    c.write_rom(0x2000, 0x00);
    assert_eq!(c.read_rom(0x4000), 1);
    c.write_rom(0x2000, 0x03);
    assert_eq!(c.read_rom(0x4000), 3);
}

#[test]
fn mbc3_selects_ram_banks_and_rtc() {
    let mut c = cart(common::rom_image(0x10, 0, 0x03));
    c.write_rom(0x0000, 0x0A);

    c.write_rom(0x4000, 0x00);
    c.write_ram(0, 0x11);
    c.write_rom(0x4000, 0x02);
    c.write_ram(0, 0x22);
    c.write_rom(0x4000, 0x00);
    assert_eq!(c.read_ram(0), 0x11);
    c.write_rom(0x4000, 0x02);
    assert_eq!(c.read_ram(0), 0x22);

    // Halt the clock, then write and read registers through the RTC window.
    c.write_rom(0x4000, 0x0C);
    c.write_ram(0, 0x40);
    c.write_rom(0x4000, 0x08);
    c.write_ram(0, 12);
    assert_eq!(c.read_ram(0), 12);
    c.write_rom(0x4000, 0x09);
    c.write_ram(0, 34);
    assert_eq!(c.read_ram(0), 34);

    // Latch on the 0 -> 1 edge keeps reading the same snapshot.
    c.write_rom(0x6000, 0x00);
    c.write_rom(0x6000, 0x01);
    c.write_rom(0x4000, 0x08);
    assert_eq!(c.read_ram(0), 12);
}

#[test]
fn mbc3_rtc_locked_with_ram_disabled() {
    let mut c = cart(common::rom_image(0x10, 0, 0x03));
    c.write_rom(0x4000, 0x08);
    assert_eq!(c.read_ram(0), 0xFF);
}

#[test]
fn mbc5_allows_bank_zero() {
    let mut c = cart(common::rom_image(0x19, 0x02, 0)); // 8 banks

    c.write_rom(0x2000, 0x00);
    assert_eq!(c.read_rom(0x4000), 0x00);

    c.write_rom(0x2000, 0x03);
    assert_eq!(c.read_rom(0x4000), 0x03);

    // Bank bit 8 wraps modulo the bank count.
    c.write_rom(0x2000, 0x00);
    c.write_rom(0x3000, 0x01);
    assert_eq!(c.read_rom(0x4000), 0x00);
}

#[test]
fn battery_ram_round_trips_through_the_save_file() {
    let dir = tempdir().unwrap();
    let rom_path = dir.path().join("game.gb");
    fs::write(&rom_path, common::rom_image(0x03, 0, 0x03)).unwrap();

    let mut c = Cartridge::from_file(&rom_path).unwrap();
    c.write_rom(0x0000, 0x0A);
    c.write_ram(0x0123, 0xAB);
    c.flush_save().unwrap();

    let save = fs::read(rom_path.with_extension("sav")).unwrap();
    assert_eq!(save.len(), 0x8000);
    assert_eq!(save[0x0123], 0xAB);

    let mut c = Cartridge::from_file(&rom_path).unwrap();
    c.write_rom(0x0000, 0x0A);
    assert_eq!(c.read_ram(0x0123), 0xAB);
}

#[test]
fn rtc_state_round_trips_through_the_save_file() {
    let dir = tempdir().unwrap();
    let rom_path = dir.path().join("clock.gb");
    fs::write(&rom_path, common::rom_image(0x10, 0, 0x03)).unwrap();

    let mut c = Cartridge::from_file(&rom_path).unwrap();
    c.write_rom(0x0000, 0x0A);
    c.write_rom(0x4000, 0x0C);
    c.write_ram(0, 0x40); // halt so nothing drifts between saves
    c.write_rom(0x4000, 0x08);
    c.write_ram(0, 0x07);
    c.flush_save().unwrap();

    let save = fs::read(rom_path.with_extension("sav")).unwrap();
    assert_eq!(save.len(), 0x8000 + 22);

    let mut c = Cartridge::from_file(&rom_path).unwrap();
    c.write_rom(0x0000, 0x0A);
    c.write_rom(0x6000, 0x00);
    c.write_rom(0x6000, 0x01);
    c.write_rom(0x4000, 0x08);
    assert_eq!(c.read_ram(0), 0x07);
    c.write_rom(0x4000, 0x0C);
    assert_eq!(c.read_ram(0) & 0x40, 0x40);
}

#[test]
fn save_flush_happens_after_a_quiet_period() {
    let dir = tempdir().unwrap();
    let rom_path = dir.path().join("game.gb");
    fs::write(&rom_path, common::rom_image(0x03, 0, 0x03)).unwrap();

    let cart = Cartridge::from_file(&rom_path).unwrap();
    let mut gb = tempo_emu_core::gameboy::GameBoy::new(cart, tempo_emu_core::ui::NullUi);
    gb.cpu.halted = true;

    gb.bus.write(0x0000, 0x0A);
    gb.bus.write(0xA000, 0x5A);

    let save_path = rom_path.with_extension("sav");
    assert!(!save_path.exists());

    // Three emulated seconds later the CART event flushes.
    for _ in 0..13 {
        gb.run_cycles(1_048_576).unwrap();
    }
    let save = fs::read(save_path).unwrap();
    assert_eq!(save[0], 0x5A);
}
