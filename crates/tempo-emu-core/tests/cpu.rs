mod common;

use tempo_emu_core::cpu::CpuFault;
use tempo_emu_core::gameboy::GameBoy;
use tempo_emu_core::ui::NullUi;

const FLAG_Z: u8 = 0x80;
const FLAG_N: u8 = 0x40;
const FLAG_H: u8 = 0x20;
const FLAG_C: u8 = 0x10;

/// Machine whose entry point jumps to `code` placed at 0x0150, clear of the
/// cartridge header.
fn gb_with_code(code: &[u8]) -> GameBoy<NullUi> {
    let mut rom = common::rom_image(0x00, 0, 0);
    rom[0x0100..0x0103].copy_from_slice(&[0xC3, 0x50, 0x01]); // JP 0x0150
    rom[0x0150..0x0150 + code.len()].copy_from_slice(code);
    common::gameboy(rom)
}

/// Cycles consumed by the entry jump.
const JP_CYCLES: i32 = 16;

#[test]
fn daa_adjusts_bcd_addition_and_subtraction() {
    let mut gb = gb_with_code(&[
        0x3E, 0x45, // LD A,0x45
        0xC6, 0x38, // ADD A,0x38
        0x27, // DAA
        0xD6, 0x38, // SUB A,0x38
        0x27, // DAA
    ]);

    gb.run_cycles(JP_CYCLES + 8 + 8 + 4).unwrap();
    assert_eq!(gb.cpu.a, 0x83);
    assert_eq!(gb.cpu.f, 0x00);

    gb.run_cycles(8 + 4).unwrap();
    assert_eq!(gb.cpu.a, 0x45);
    assert_eq!(gb.cpu.f, FLAG_N);
}

#[test]
fn pop_af_masks_the_low_flag_nibble() {
    let mut gb = gb_with_code(&[
        0x01, 0xFF, 0x12, // LD BC,0x12FF
        0xC5, // PUSH BC
        0xF1, // POP AF
    ]);

    gb.run_cycles(JP_CYCLES + 12 + 16 + 12).unwrap();
    assert_eq!(gb.cpu.a, 0x12);
    assert_eq!(gb.cpu.f, 0xF0);
}

#[test]
fn run_overshoots_by_less_than_one_instruction() {
    // Tight JR loop; the longest instruction on this ISA costs 24 cycles.
    let mut gb = gb_with_code(&[0x18, 0xFE]); // JR -2

    let spent = gb.run_cycles(1000).unwrap();
    assert!(spent >= 1000);
    assert!(spent < 1000 + 24);
}

#[test]
fn add_hl_sets_half_carry_on_bit_11() {
    let mut gb = gb_with_code(&[
        0x21, 0xFF, 0x0F, // LD HL,0x0FFF
        0x01, 0x01, 0x00, // LD BC,0x0001
        0x09, // ADD HL,BC
    ]);

    gb.run_cycles(JP_CYCLES + 12 + 12 + 8).unwrap();
    assert_eq!(gb.cpu.hl(), 0x1000);
    assert_eq!(gb.cpu.f, FLAG_H);
}

#[test]
fn ld_hl_sp_e8_uses_low_byte_carries() {
    let mut gb = gb_with_code(&[
        0x31, 0xF8, 0xFF, // LD SP,0xFFF8
        0xF8, 0x08, // LD HL,SP+8
    ]);

    gb.run_cycles(JP_CYCLES + 12 + 12).unwrap();
    assert_eq!(gb.cpu.hl(), 0x0000);
    assert_eq!(gb.cpu.f, FLAG_H | FLAG_C);
}

#[test]
fn rotates_on_a_clear_zero() {
    let mut gb = gb_with_code(&[
        0x3E, 0x80, // LD A,0x80
        0x07, // RLCA
    ]);

    gb.run_cycles(JP_CYCLES + 8 + 4).unwrap();
    assert_eq!(gb.cpu.a, 0x01);
    assert_eq!(gb.cpu.f, FLAG_C);
}

#[test]
fn cb_shifts_set_zero_normally() {
    let mut gb = gb_with_code(&[
        0x3E, 0x01, // LD A,0x01
        0xCB, 0x3F, // SRL A
    ]);

    gb.run_cycles(JP_CYCLES + 8 + 8).unwrap();
    assert_eq!(gb.cpu.a, 0x00);
    assert_eq!(gb.cpu.f, FLAG_Z | FLAG_C);
}

#[test]
fn interrupt_dispatch_clears_flag_and_jumps() {
    let mut rom = common::rom_image(0x00, 0, 0);
    rom[0x0040] = 0x1C; // VBlank handler: INC E; RETI
    rom[0x0041] = 0xD9;
    rom[0x0100..0x0103].copy_from_slice(&[0xC3, 0x50, 0x01]);
    rom[0x0150] = 0x76; // HALT
    let mut gb = common::gameboy(rom);

    gb.bus.write(0xFFFF, 0x01); // IE: VBlank
    gb.bus.write(0xFF0F, 0x01); // IF: VBlank pending
    gb.cpu.ime = true;
    gb.cpu.ime_next = true;

    gb.run_cycles(200).unwrap();

    assert_eq!(gb.cpu.e, 1);
    assert_eq!(gb.bus.read(0xFF0F) & 0x1F, 0); // acknowledged
    assert!(gb.cpu.halted);
}

#[test]
fn disabled_sources_are_not_dispatched() {
    let mut rom = common::rom_image(0x00, 0, 0);
    rom[0x0040] = 0x1C; // VBlank: INC E
    rom[0x0041] = 0xD9;
    rom[0x0050] = 0x14; // Timer: INC D
    rom[0x0051] = 0xD9;
    rom[0x0100..0x0103].copy_from_slice(&[0xC3, 0x50, 0x01]);
    rom[0x0150] = 0x76; // HALT
    let mut gb = common::gameboy(rom);

    gb.bus.write(0xFFFF, 0x04); // only the timer source is enabled
    gb.bus.write(0xFF0F, 0x05); // both VBlank and timer pending
    gb.cpu.ime = true;
    gb.cpu.ime_next = true;

    gb.run_cycles(200).unwrap();

    assert_eq!(gb.cpu.d, 1);
    assert_eq!(gb.cpu.e, 0);
    // The masked VBlank request stays pending.
    assert_eq!(gb.bus.read(0xFF0F) & 0x01, 0x01);
}

#[test]
fn ei_takes_effect_after_the_next_instruction() {
    let mut rom = common::rom_image(0x00, 0, 0);
    rom[0x0040] = 0x76; // VBlank handler halts for good
    rom[0x0100..0x0103].copy_from_slice(&[0xC3, 0x50, 0x01]);
    // EI; INC B; INC B; ... - exactly one INC must run before dispatch.
    rom[0x0150..0x0155].copy_from_slice(&[0xFB, 0x04, 0x04, 0x04, 0x04]);
    let mut gb = common::gameboy(rom);

    gb.bus.write(0xFFFF, 0x01);
    gb.bus.write(0xFF0F, 0x01);

    gb.run_cycles(200).unwrap();

    assert_eq!(gb.cpu.b, 1);
    assert!(gb.cpu.halted);
    assert_eq!(gb.cpu.pc, 0x0041);
}

#[test]
fn pending_interrupt_wakes_halt_without_ime() {
    let mut gb = gb_with_code(&[
        0x76, // HALT
        0x04, // INC B
        0x18, 0xFC, // JR back to the HALT
    ]);

    gb.bus.write(0xFFFF, 0x04); // IE: timer
    gb.bus.write(0xFF07, 0x05); // fastest divider, started
    gb.run_cycles(20_000).unwrap();

    // The timer overflow request un-halts the CPU even though IME is off,
    // and the flag stays set because nothing dispatches it.
    assert!(gb.cpu.b >= 1);
    assert_eq!(gb.bus.read(0xFF0F) & 0x04, 0x04);
    assert!(!gb.cpu.ime);
}

#[test]
fn undefined_opcode_reports_location() {
    let mut gb = gb_with_code(&[0xD3]);
    let fault = gb.run_cycles(100).unwrap_err();
    assert_eq!(
        fault,
        CpuFault::UndefinedOpcode {
            opcode: 0xD3,
            pc: 0x0150
        }
    );
}

#[test]
fn stop_is_fatal() {
    let mut gb = gb_with_code(&[0x10, 0x00]);
    let fault = gb.run_cycles(100).unwrap_err();
    assert_eq!(fault, CpuFault::Stop { pc: 0x0150 });
}
