use thiserror::Error;

use crate::bus::Bus;
use crate::interrupts::Interrupt;
use crate::ui::Ui;

// Flag register bits; the lower nibble of F is not wired and always reads 0.
const FLAG_Z: u8 = 0x80;
const FLAG_N: u8 = 0x40;
const FLAG_H: u8 = 0x20;
const FLAG_C: u8 = 0x10;

/// Cycles consumed entering the interrupt context, before the PC push and
/// the 4-cycle handler load.
const INTERRUPT_ENTRY_CYCLES: i32 = 12;

/// Fatal CPU conditions. Real hardware hangs on an undefined opcode; since
/// that always means a corrupted ROM or a mis-decoded state, the core
/// reports it instead of spinning forever.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CpuFault {
    #[error("undefined opcode {opcode:#04x} at {pc:#06x}")]
    UndefinedOpcode { opcode: u8, pc: u16 },
    #[error("STOP executed at {pc:#06x}")]
    Stop { pc: u16 },
}

/// The LR35902 core: register file, interrupt-enable state and the
/// fetch/decode/execute loop. All memory access goes through the bus, 4
/// cycles per byte.
pub struct Cpu {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub pc: u16,
    pub sp: u16,
    pub ime: bool,
    /// EI takes effect one instruction late; this latch is committed into
    /// `ime` at the top of each loop iteration.
    pub ime_next: bool,
    pub halted: bool,
}

impl Cpu {
    /// Post-bootrom state: execution starts at the cartridge entry point,
    /// and A tells the game whether it woke up on color hardware.
    pub fn new(gbc: bool) -> Self {
        Self {
            a: if gbc { 0x11 } else { 0x00 },
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            pc: 0x0100,
            sp: 0xFFFE,
            ime: false,
            ime_next: false,
            halted: false,
        }
    }

    fn bc(&self) -> u16 {
        (self.b as u16) << 8 | self.c as u16
    }

    fn set_bc(&mut self, value: u16) {
        self.b = (value >> 8) as u8;
        self.c = value as u8;
    }

    fn de(&self) -> u16 {
        (self.d as u16) << 8 | self.e as u16
    }

    fn set_de(&mut self, value: u16) {
        self.d = (value >> 8) as u8;
        self.e = value as u8;
    }

    pub fn hl(&self) -> u16 {
        (self.h as u16) << 8 | self.l as u16
    }

    fn set_hl(&mut self, value: u16) {
        self.h = (value >> 8) as u8;
        self.l = value as u8;
    }

    #[inline]
    fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }

    #[inline]
    fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        self.f = (z as u8) << 7 | (n as u8) << 6 | (h as u8) << 5 | (c as u8) << 4;
    }

    #[inline]
    fn read8<U: Ui>(&mut self, bus: &mut Bus<U>, addr: u16) -> u8 {
        let value = bus.read(addr);
        bus.tick(4);
        value
    }

    #[inline]
    fn write8<U: Ui>(&mut self, bus: &mut Bus<U>, addr: u16, value: u8) {
        bus.write(addr, value);
        bus.tick(4);
    }

    #[inline]
    fn fetch8<U: Ui>(&mut self, bus: &mut Bus<U>) -> u8 {
        let value = self.read8(bus, self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    fn fetch16<U: Ui>(&mut self, bus: &mut Bus<U>) -> u16 {
        let lo = self.fetch8(bus) as u16;
        let hi = self.fetch8(bus) as u16;
        hi << 8 | lo
    }

    fn push8<U: Ui>(&mut self, bus: &mut Bus<U>, value: u8) {
        self.sp = self.sp.wrapping_sub(1);
        self.write8(bus, self.sp, value);
    }

    fn pop8<U: Ui>(&mut self, bus: &mut Bus<U>) -> u8 {
        let value = self.read8(bus, self.sp);
        self.sp = self.sp.wrapping_add(1);
        value
    }

    fn push16<U: Ui>(&mut self, bus: &mut Bus<U>, value: u16) {
        self.push8(bus, (value >> 8) as u8);
        self.push8(bus, value as u8);
    }

    fn pop16<U: Ui>(&mut self, bus: &mut Bus<U>) -> u16 {
        let lo = self.pop8(bus) as u16;
        let hi = self.pop8(bus) as u16;
        hi << 8 | lo
    }

    /// PC load with the internal cycle every jump pays.
    fn load_pc<U: Ui>(&mut self, bus: &mut Bus<U>, pc: u16) {
        self.pc = pc;
        bus.tick(4);
    }

    /// Runs until the global cycle counter reaches `cycles`, servicing
    /// interrupts and scheduler events along the way. Returns the counter,
    /// which overshoots by at most one instruction.
    pub fn run<U: Ui>(&mut self, bus: &mut Bus<U>, cycles: i32) -> Result<i32, CpuFault> {
        bus.scheduler.rebase();

        while bus.scheduler.timestamp < cycles {
            self.service_interrupts(bus);
            self.ime = self.ime_next;

            if self.halted {
                // Sleep straight to the next device event (or the end of the
                // chunk); whatever fires may request the wake-up interrupt.
                let target = cycles.min(bus.scheduler.first_event());
                let skip = target - bus.scheduler.timestamp;
                bus.tick(skip.max(0));
                bus.check_events();
            } else {
                self.step(bus)?;
            }
        }

        Ok(bus.scheduler.timestamp)
    }

    /// Executes a single instruction.
    pub fn step<U: Ui>(&mut self, bus: &mut Bus<U>) -> Result<(), CpuFault> {
        let pc = self.pc;
        let opcode = self.fetch8(bus);
        self.execute(bus, opcode, pc)
    }

    /// Checks for a pending interrupt; any pending source leaves halt, and
    /// with IME set the highest-priority one is dispatched.
    fn service_interrupts<U: Ui>(&mut self, bus: &mut Bus<U>) {
        let pending = bus.interrupts.pending();
        if pending == 0 {
            return;
        }

        self.halted = false;

        if !self.ime {
            return;
        }

        let source = [
            Interrupt::VBlank,
            Interrupt::LcdStat,
            Interrupt::Timer,
            Interrupt::Serial,
            Interrupt::Joypad,
        ]
        .into_iter()
        .find(|source| pending & source.mask() != 0)
        .unwrap_or(Interrupt::Joypad);

        self.ime = false;
        self.ime_next = false;

        bus.tick(INTERRUPT_ENTRY_CYCLES);
        self.push16(bus, self.pc);
        bus.interrupts.acknowledge(source.mask());
        self.load_pc(bus, source.handler());
    }

    /// Register/memory operand by the 3-bit encoding used in the regular
    /// opcode blocks; index 6 goes through (HL).
    fn reg8<U: Ui>(&mut self, bus: &mut Bus<U>, index: u8) -> u8 {
        match index {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => {
                let hl = self.hl();
                self.read8(bus, hl)
            }
            _ => self.a,
        }
    }

    fn set_reg8<U: Ui>(&mut self, bus: &mut Bus<U>, index: u8, value: u8) {
        match index {
            0 => self.b = value,
            1 => self.c = value,
            2 => self.d = value,
            3 => self.e = value,
            4 => self.h = value,
            5 => self.l = value,
            6 => {
                let hl = self.hl();
                self.write8(bus, hl, value);
            }
            _ => self.a = value,
        }
    }

    /// Condition codes NZ/Z/NC/C as encoded in branch opcodes.
    fn condition(&self, index: u8) -> bool {
        match index {
            0 => !self.flag(FLAG_Z),
            1 => self.flag(FLAG_Z),
            2 => !self.flag(FLAG_C),
            _ => self.flag(FLAG_C),
        }
    }

    // 8-bit ALU. Results are computed in 16 bits; H comes from the XOR mix
    // on bit 4 and C from bit 8.

    fn alu_add(&mut self, value: u8, with_carry: bool) {
        let a = self.a as u16;
        let b = value as u16;
        let c = (with_carry && self.flag(FLAG_C)) as u16;
        let r = a + b + c;

        self.set_flags(r & 0xFF == 0, false, (a ^ b ^ r) & 0x10 != 0, r & 0x100 != 0);
        self.a = r as u8;
    }

    fn alu_sub(&mut self, value: u8, with_carry: bool, store: bool) {
        let a = self.a as u16;
        let b = value as u16;
        let c = (with_carry && self.flag(FLAG_C)) as u16;
        let r = a.wrapping_sub(b).wrapping_sub(c);

        self.set_flags(r & 0xFF == 0, true, (a ^ b ^ r) & 0x10 != 0, r & 0x100 != 0);
        if store {
            self.a = r as u8;
        }
    }

    fn alu_and(&mut self, value: u8) {
        self.a &= value;
        self.set_flags(self.a == 0, false, true, false);
    }

    fn alu_xor(&mut self, value: u8) {
        self.a ^= value;
        self.set_flags(self.a == 0, false, false, false);
    }

    fn alu_or(&mut self, value: u8) {
        self.a |= value;
        self.set_flags(self.a == 0, false, false, false);
    }

    /// Dispatches the 8-operation ALU block (ADD/ADC/SUB/SBC/AND/XOR/OR/CP).
    fn alu(&mut self, operation: u8, value: u8) {
        match operation {
            0 => self.alu_add(value, false),
            1 => self.alu_add(value, true),
            2 => self.alu_sub(value, false, true),
            3 => self.alu_sub(value, true, true),
            4 => self.alu_and(value),
            5 => self.alu_xor(value),
            6 => self.alu_or(value),
            _ => self.alu_sub(value, false, false),
        }
    }

    fn alu_inc(&mut self, value: u8) -> u8 {
        let r = value.wrapping_add(1);
        let c = self.flag(FLAG_C);
        self.set_flags(r == 0, false, value & 0xF == 0xF, c);
        r
    }

    fn alu_dec(&mut self, value: u8) -> u8 {
        let r = value.wrapping_sub(1);
        let c = self.flag(FLAG_C);
        self.set_flags(r == 0, true, value & 0xF == 0, c);
        r
    }

    /// ADD HL,rr: Z untouched, H on bit 11, C on bit 15, one internal cycle.
    fn add_hl<U: Ui>(&mut self, bus: &mut Bus<U>, value: u16) {
        let hl = self.hl() as u32;
        let b = value as u32;
        let r = hl + b;

        let z = self.flag(FLAG_Z);
        self.set_flags(z, false, (hl ^ b ^ r) & 0x1000 != 0, r & 0x10000 != 0);
        self.set_hl(r as u16);
        bus.tick(4);
    }

    /// Shared by ADD SP,e8 and LD HL,SP+e8: the displacement is signed but H
    /// and C are computed on the low byte only.
    fn add_sp_e8<U: Ui>(&mut self, bus: &mut Bus<U>) -> u16 {
        let offset = self.fetch8(bus) as i8 as i32;
        let sp = self.sp as i32;
        let r = sp + offset;

        let mix = sp ^ offset ^ r;
        self.set_flags(false, false, mix & 0x10 != 0, mix & 0x100 != 0);
        r as u16
    }

    // Rotates and shifts. The CB variants set Z from the result; the four
    // A-register shorthands force Z to 0 at their call sites.

    fn rlc(&mut self, value: u8) -> u8 {
        let c = value >> 7;
        let r = value << 1 | c;
        self.set_flags(r == 0, false, false, c != 0);
        r
    }

    fn rrc(&mut self, value: u8) -> u8 {
        let c = value & 1;
        let r = value >> 1 | c << 7;
        self.set_flags(r == 0, false, false, c != 0);
        r
    }

    fn rl(&mut self, value: u8) -> u8 {
        let c = self.flag(FLAG_C) as u8;
        let r = value << 1 | c;
        self.set_flags(r == 0, false, false, value & 0x80 != 0);
        r
    }

    fn rr(&mut self, value: u8) -> u8 {
        let c = self.flag(FLAG_C) as u8;
        let r = value >> 1 | c << 7;
        self.set_flags(r == 0, false, false, value & 1 != 0);
        r
    }

    fn sla(&mut self, value: u8) -> u8 {
        let r = value << 1;
        self.set_flags(r == 0, false, false, value & 0x80 != 0);
        r
    }

    fn sra(&mut self, value: u8) -> u8 {
        let r = value >> 1 | value & 0x80;
        self.set_flags(r == 0, false, false, value & 1 != 0);
        r
    }

    fn swap(&mut self, value: u8) -> u8 {
        let r = value >> 4 | value << 4;
        self.set_flags(r == 0, false, false, false);
        r
    }

    fn srl(&mut self, value: u8) -> u8 {
        let r = value >> 1;
        self.set_flags(r == 0, false, false, value & 1 != 0);
        r
    }

    /// BCD adjust after an addition or subtraction, driven by N/H/C.
    fn daa(&mut self) {
        let mut adjust = 0u8;
        if self.flag(FLAG_H) {
            adjust |= 0x06;
        }
        if self.flag(FLAG_C) {
            adjust |= 0x60;
        }

        if self.flag(FLAG_N) {
            // A subtraction never leaves a nibble above 9 without the
            // matching borrow flag, so the set flags say it all.
            self.a = self.a.wrapping_sub(adjust);
        } else {
            if self.a & 0x0F > 0x09 {
                adjust |= 0x06;
            }
            if self.a > 0x99 {
                adjust |= 0x60;
            }
            self.a = self.a.wrapping_add(adjust);
        }

        let n = self.flag(FLAG_N);
        self.set_flags(self.a == 0, n, false, adjust & 0x60 != 0);
    }

    fn jr<U: Ui>(&mut self, bus: &mut Bus<U>, taken: bool) {
        let offset = self.fetch8(bus) as i8;
        if taken {
            let pc = self.pc.wrapping_add(offset as u16);
            self.load_pc(bus, pc);
        }
    }

    fn jp<U: Ui>(&mut self, bus: &mut Bus<U>, taken: bool) {
        let target = self.fetch16(bus);
        if taken {
            self.load_pc(bus, target);
        }
    }

    fn call<U: Ui>(&mut self, bus: &mut Bus<U>, taken: bool) {
        let target = self.fetch16(bus);
        if taken {
            self.push16(bus, self.pc);
            self.load_pc(bus, target);
        }
    }

    fn ret<U: Ui>(&mut self, bus: &mut Bus<U>) {
        let target = self.pop16(bus);
        self.load_pc(bus, target);
    }

    fn execute<U: Ui>(&mut self, bus: &mut Bus<U>, opcode: u8, pc: u16) -> Result<(), CpuFault> {
        match opcode {
            0x00 => {}

            // 16-bit immediate loads.
            0x01 => {
                let value = self.fetch16(bus);
                self.set_bc(value);
            }
            0x11 => {
                let value = self.fetch16(bus);
                self.set_de(value);
            }
            0x21 => {
                let value = self.fetch16(bus);
                self.set_hl(value);
            }
            0x31 => self.sp = self.fetch16(bus),

            // A to/from pointer registers, with HL post-inc/dec variants.
            0x02 => {
                let bc = self.bc();
                let a = self.a;
                self.write8(bus, bc, a);
            }
            0x12 => {
                let de = self.de();
                let a = self.a;
                self.write8(bus, de, a);
            }
            0x22 => {
                let hl = self.hl();
                let a = self.a;
                self.write8(bus, hl, a);
                self.set_hl(hl.wrapping_add(1));
            }
            0x32 => {
                let hl = self.hl();
                let a = self.a;
                self.write8(bus, hl, a);
                self.set_hl(hl.wrapping_sub(1));
            }
            0x0A => {
                let bc = self.bc();
                self.a = self.read8(bus, bc);
            }
            0x1A => {
                let de = self.de();
                self.a = self.read8(bus, de);
            }
            0x2A => {
                let hl = self.hl();
                self.a = self.read8(bus, hl);
                self.set_hl(hl.wrapping_add(1));
            }
            0x3A => {
                let hl = self.hl();
                self.a = self.read8(bus, hl);
                self.set_hl(hl.wrapping_sub(1));
            }

            // 16-bit inc/dec: one internal cycle each.
            0x03 => {
                let value = self.bc().wrapping_add(1);
                self.set_bc(value);
                bus.tick(4);
            }
            0x13 => {
                let value = self.de().wrapping_add(1);
                self.set_de(value);
                bus.tick(4);
            }
            0x23 => {
                let value = self.hl().wrapping_add(1);
                self.set_hl(value);
                bus.tick(4);
            }
            0x33 => {
                self.sp = self.sp.wrapping_add(1);
                bus.tick(4);
            }
            0x0B => {
                let value = self.bc().wrapping_sub(1);
                self.set_bc(value);
                bus.tick(4);
            }
            0x1B => {
                let value = self.de().wrapping_sub(1);
                self.set_de(value);
                bus.tick(4);
            }
            0x2B => {
                let value = self.hl().wrapping_sub(1);
                self.set_hl(value);
                bus.tick(4);
            }
            0x3B => {
                self.sp = self.sp.wrapping_sub(1);
                bus.tick(4);
            }

            // INC/DEC r and LD r,d8 across all eight operand encodings.
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let index = (opcode >> 3) & 7;
                let value = self.reg8(bus, index);
                let value = self.alu_inc(value);
                self.set_reg8(bus, index, value);
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let index = (opcode >> 3) & 7;
                let value = self.reg8(bus, index);
                let value = self.alu_dec(value);
                self.set_reg8(bus, index, value);
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let index = (opcode >> 3) & 7;
                let value = self.fetch8(bus);
                self.set_reg8(bus, index, value);
            }

            // Accumulator rotates always clear Z.
            0x07 => {
                self.a = self.rlc(self.a);
                self.f &= !FLAG_Z;
            }
            0x0F => {
                self.a = self.rrc(self.a);
                self.f &= !FLAG_Z;
            }
            0x17 => {
                self.a = self.rl(self.a);
                self.f &= !FLAG_Z;
            }
            0x1F => {
                self.a = self.rr(self.a);
                self.f &= !FLAG_Z;
            }

            0x08 => {
                let addr = self.fetch16(bus);
                let sp = self.sp;
                self.write8(bus, addr, sp as u8);
                self.write8(bus, addr.wrapping_add(1), (sp >> 8) as u8);
            }

            0x09 => self.add_hl(bus, self.bc()),
            0x19 => self.add_hl(bus, self.de()),
            0x29 => self.add_hl(bus, self.hl()),
            0x39 => self.add_hl(bus, self.sp),

            0x10 => return Err(CpuFault::Stop { pc }),

            0x18 => self.jr(bus, true),
            0x20 | 0x28 | 0x30 | 0x38 => {
                let taken = self.condition((opcode >> 3) & 3);
                self.jr(bus, taken);
            }

            0x27 => self.daa(),
            0x2F => {
                self.a = !self.a;
                self.f |= FLAG_N | FLAG_H;
            }
            0x37 => {
                let z = self.flag(FLAG_Z);
                self.set_flags(z, false, false, true);
            }
            0x3F => {
                let z = self.flag(FLAG_Z);
                let c = self.flag(FLAG_C);
                self.set_flags(z, false, false, !c);
            }

            0x76 => self.halted = true,

            // LD r,r' block (0x76 carved out above as HALT).
            0x40..=0x7F => {
                let value = self.reg8(bus, opcode & 7);
                self.set_reg8(bus, (opcode >> 3) & 7, value);
            }

            // The ALU block and its immediate-operand variants.
            0x80..=0xBF => {
                let value = self.reg8(bus, opcode & 7);
                self.alu((opcode >> 3) & 7, value);
            }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let value = self.fetch8(bus);
                self.alu((opcode >> 3) & 7, value);
            }

            // Conditional returns pay their internal cycle either way.
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                if self.condition((opcode >> 3) & 3) {
                    self.ret(bus);
                }
                bus.tick(4);
            }
            0xC9 => self.ret(bus),
            0xD9 => {
                self.ret(bus);
                self.ime = true;
                self.ime_next = true;
            }

            0xC1 => {
                let value = self.pop16(bus);
                self.set_bc(value);
            }
            0xD1 => {
                let value = self.pop16(bus);
                self.set_de(value);
            }
            0xE1 => {
                let value = self.pop16(bus);
                self.set_hl(value);
            }
            0xF1 => {
                let value = self.pop16(bus);
                self.a = (value >> 8) as u8;
                self.f = value as u8 & 0xF0;
            }

            0xC5 => {
                let value = self.bc();
                self.push16(bus, value);
                bus.tick(4);
            }
            0xD5 => {
                let value = self.de();
                self.push16(bus, value);
                bus.tick(4);
            }
            0xE5 => {
                let value = self.hl();
                self.push16(bus, value);
                bus.tick(4);
            }
            0xF5 => {
                let value = (self.a as u16) << 8 | self.f as u16;
                self.push16(bus, value);
                bus.tick(4);
            }

            0xC3 => self.jp(bus, true),
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let taken = self.condition((opcode >> 3) & 3);
                self.jp(bus, taken);
            }
            0xE9 => self.pc = self.hl(),

            0xCD => self.call(bus, true),
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let taken = self.condition((opcode >> 3) & 3);
                self.call(bus, taken);
            }

            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                let pc = self.pc;
                self.push16(bus, pc);
                self.load_pc(bus, (opcode & 0x38) as u16);
            }

            0xCB => self.execute_cb(bus),

            // High-page accesses.
            0xE0 => {
                let addr = 0xFF00 | self.fetch8(bus) as u16;
                let a = self.a;
                self.write8(bus, addr, a);
            }
            0xF0 => {
                let addr = 0xFF00 | self.fetch8(bus) as u16;
                self.a = self.read8(bus, addr);
            }
            0xE2 => {
                let addr = 0xFF00 | self.c as u16;
                let a = self.a;
                self.write8(bus, addr, a);
            }
            0xF2 => {
                let addr = 0xFF00 | self.c as u16;
                self.a = self.read8(bus, addr);
            }

            0xEA => {
                let addr = self.fetch16(bus);
                let a = self.a;
                self.write8(bus, addr, a);
            }
            0xFA => {
                let addr = self.fetch16(bus);
                self.a = self.read8(bus, addr);
            }

            0xE8 => {
                self.sp = self.add_sp_e8(bus);
                bus.tick(8);
            }
            0xF8 => {
                let value = self.add_sp_e8(bus);
                self.set_hl(value);
                bus.tick(4);
            }
            0xF9 => {
                self.sp = self.hl();
                bus.tick(4);
            }

            0xF3 => {
                self.ime = false;
                self.ime_next = false;
            }
            0xFB => self.ime_next = true,

            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                return Err(CpuFault::UndefinedOpcode { opcode, pc });
            }
        }

        Ok(())
    }

    /// CB-prefixed table: rotates/shifts, BIT, RES and SET, fully regular in
    /// the low three operand bits.
    fn execute_cb<U: Ui>(&mut self, bus: &mut Bus<U>) {
        let opcode = self.fetch8(bus);
        let index = opcode & 7;
        let bit = (opcode >> 3) & 7;

        match opcode >> 6 {
            0 => {
                let value = self.reg8(bus, index);
                let value = match bit {
                    0 => self.rlc(value),
                    1 => self.rrc(value),
                    2 => self.rl(value),
                    3 => self.rr(value),
                    4 => self.sla(value),
                    5 => self.sra(value),
                    6 => self.swap(value),
                    _ => self.srl(value),
                };
                self.set_reg8(bus, index, value);
            }
            1 => {
                let value = self.reg8(bus, index);
                let c = self.flag(FLAG_C);
                self.set_flags(value & 1 << bit == 0, false, true, c);
            }
            2 => {
                let value = self.reg8(bus, index);
                self.set_reg8(bus, index, value & !(1 << bit));
            }
            _ => {
                let value = self.reg8(bus, index);
                self.set_reg8(bus, index, value | 1 << bit);
            }
        }
    }
}
