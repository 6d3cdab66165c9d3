mod common;

#[test]
fn wram_echo_and_svbk_banking() {
    let mut gb = common::gameboy(common::gbc_rom_image(0x00, 0, 0));

    gb.bus.write(0xC000, 0xAA);
    assert_eq!(gb.bus.read(0xE000), 0xAA);
    gb.bus.write(0xE123, 0xBB);
    assert_eq!(gb.bus.read(0xC123), 0xBB);

    gb.bus.write(0xFF70, 0x02);
    gb.bus.write(0xD000, 0x11);
    gb.bus.write(0xFF70, 0x03);
    assert_eq!(gb.bus.read(0xD000), 0x00);
    gb.bus.write(0xD000, 0x22);
    gb.bus.write(0xFF70, 0x02);
    assert_eq!(gb.bus.read(0xD000), 0x11);

    // Bank 0 aliases bank 1.
    gb.bus.write(0xFF70, 0x01);
    gb.bus.write(0xD000, 0x55);
    gb.bus.write(0xFF70, 0x00);
    assert_eq!(gb.bus.read(0xD000), 0x55);

    assert_eq!(gb.bus.read(0xFF70), 0x00 | 0xF8);
}

#[test]
fn vbk_selects_vram_bank() {
    let mut gb = common::gameboy(common::gbc_rom_image(0x00, 0, 0));

    gb.bus.write(0x8000, 0x11);
    assert_eq!(gb.bus.read(0x8000), 0x11);

    gb.bus.write(0xFF4F, 0x01);
    assert_eq!(gb.bus.read(0xFF4F), 0x01 | 0xFE);
    assert_eq!(gb.bus.read(0x8000), 0x00);
    gb.bus.write(0x8000, 0x22);
    assert_eq!(gb.bus.read(0x8000), 0x22);

    gb.bus.write(0xFF4F, 0x00);
    assert_eq!(gb.bus.read(0x8000), 0x11);
}

#[test]
fn color_registers_are_absent_on_dmg() {
    let mut gb = common::gameboy(common::rom_image(0x00, 0, 0));

    gb.bus.write(0xFF70, 0x03);
    assert_eq!(gb.bus.read(0xFF70), 0xFF);
    gb.bus.write(0xFF4F, 0x01);
    assert_eq!(gb.bus.read(0xFF4F), 0xFF);

    // SVBK writes must not have rebanked anything.
    gb.bus.write(0xD000, 0x77);
    assert_eq!(gb.bus.read(0xD000), 0x77);
}

#[test]
fn zero_page_and_ie() {
    let mut gb = common::gameboy(common::rom_image(0x00, 0, 0));

    gb.bus.write(0xFF80, 0x12);
    gb.bus.write(0xFFFE, 0x34);
    assert_eq!(gb.bus.read(0xFF80), 0x12);
    assert_eq!(gb.bus.read(0xFFFE), 0x34);

    gb.bus.write(0xFFFF, 0x1F);
    assert_eq!(gb.bus.read(0xFFFF), 0x1F);
}

#[test]
fn interrupt_flags_upper_bits_read_one() {
    let mut gb = common::gameboy(common::rom_image(0x00, 0, 0));
    gb.bus.write(0xFF0F, 0x00);
    assert_eq!(gb.bus.read(0xFF0F), 0xE0);
    gb.bus.write(0xFF0F, 0x05);
    assert_eq!(gb.bus.read(0xFF0F), 0xE5);
}

#[test]
fn unknown_mmio_reads_ff() {
    let mut gb = common::gameboy(common::rom_image(0x00, 0, 0));
    assert_eq!(gb.bus.read(0xFF03), 0xFF);
    assert_eq!(gb.bus.read(0xFF7F), 0xFF);
    gb.bus.write(0xFF03, 0x12); // ignored
    assert_eq!(gb.bus.read(0xFF03), 0xFF);
}

#[test]
fn serial_stubs() {
    let mut gb = common::gameboy(common::rom_image(0x00, 0, 0));
    assert_eq!(gb.bus.read(0xFF01), 0xFF);
    assert_eq!(gb.bus.read(0xFF02), 0x00);
}

#[test]
fn joypad_select_lines() {
    let mut gb = common::gameboy(common::rom_image(0x00, 0, 0));
    use tempo_emu_core::input::Button;

    gb.set_button(Button::Start, true);
    // Neither row selected: nothing visible.
    gb.bus.write(0xFF00, 0x30);
    assert_eq!(gb.bus.read(0xFF00) & 0x0F, 0x0F);

    // Buttons row selected: Start is bit 3, active low.
    gb.bus.write(0xFF00, 0x10);
    assert_eq!(gb.bus.read(0xFF00) & 0x0F, 0x07);

    // The press on a selected row raises the joypad interrupt.
    gb.set_button(Button::Start, false);
    gb.set_button(Button::Start, true);
    assert_eq!(gb.bus.read(0xFF0F) & 0x10, 0x10);
}

#[test]
fn oam_dma_copies_160_bytes() {
    let mut gb = common::gameboy(common::rom_image(0x00, 0, 0));
    gb.cpu.halted = true;

    for i in 0..160u16 {
        gb.bus.write(0xC100 + i, 0x20 + i as u8);
    }
    gb.bus.write(0xFF46, 0xC1);
    assert!(gb.bus.dma.running);
    assert_eq!(gb.bus.read(0xFF46), 0xC1);

    gb.run_cycles(640).unwrap();

    for i in 0..160u16 {
        assert_eq!(gb.bus.read(0xFE00 + i), 0x20 + i as u8);
    }
    assert!(!gb.bus.dma.running);
}

#[test]
fn oam_dma_rejects_unreachable_sources_on_dmg() {
    let mut gb = common::gameboy(common::rom_image(0x00, 0, 0));
    gb.cpu.halted = true;

    gb.bus.write(0xFE00, 0x00);
    gb.bus.write(0xFF46, 0x10); // ROM region: silently cancelled on DMG
    assert!(!gb.bus.dma.running);

    gb.run_cycles(640).unwrap();
    assert_eq!(gb.bus.read(0xFE00), 0x00);
}

#[test]
fn oam_dma_reads_cartridge_on_gbc() {
    let mut rom = common::gbc_rom_image(0x00, 0, 0);
    for i in 0..160 {
        rom[0x0200 + i] = i as u8 ^ 0x5A;
    }
    let mut gb = common::gameboy(rom);
    gb.cpu.halted = true;

    gb.bus.write(0xFF46, 0x02);
    assert!(gb.bus.dma.running);
    gb.run_cycles(640).unwrap();

    for i in 0..160u16 {
        assert_eq!(gb.bus.read(0xFE00 + i), (i as u8) ^ 0x5A);
    }
}
