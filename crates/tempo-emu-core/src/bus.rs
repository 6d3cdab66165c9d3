use log::debug;

use crate::apu::Apu;
use crate::cartridge::{Cartridge, SAVE_DELAY_CYCLES};
use crate::dma::Dma;
use crate::hdma::Hdma;
use crate::input::{Button, Input};
use crate::interrupts::{Interrupt, InterruptController};
use crate::ppu::Ppu;
use crate::scheduler::{Scheduler, SyncToken};
use crate::timer::Timer;
use crate::ui::Ui;

const WRAM_SIZE: usize = 0x8000;
const HRAM_SIZE: usize = 0x7F;

/// The memory bus: single dispatch point from a 16-bit address to ROM, RAM,
/// VRAM, OAM, zero page or an MMIO register, and the owner of every device.
///
/// MMIO accesses that observe or change a device's time-dependent state call
/// the device's sync function first, so the CPU always sees values that are
/// current at the present cycle.
pub struct Bus<U: Ui> {
    pub gbc: bool,
    pub scheduler: Scheduler,
    pub interrupts: InterruptController,
    pub cart: Cartridge,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub dma: Dma,
    pub hdma: Hdma,
    pub input: Input,
    pub ui: U,
    /// 8 x 4 KiB; bank 0 fixed at 0xC000, SVBK selects 1..=7 at 0xD000.
    wram: Box<[u8; WRAM_SIZE]>,
    wram_high_bank: u8,
    /// VBK: which VRAM bank the CPU window shows.
    vram_high_bank: bool,
    hram: [u8; HRAM_SIZE],
}

impl<U: Ui> Bus<U> {
    pub fn new(cart: Cartridge, ui: U, gbc: bool) -> Self {
        Self {
            gbc,
            scheduler: Scheduler::new(),
            interrupts: InterruptController::new(),
            cart,
            ppu: Ppu::new(gbc),
            apu: Apu::new(),
            timer: Timer::new(),
            dma: Dma::new(),
            hdma: Hdma::new(),
            input: Input::new(),
            ui,
            wram: Box::new([0; WRAM_SIZE]),
            wram_high_bank: 1,
            vram_high_bank: false,
            hram: [0; HRAM_SIZE],
        }
    }

    /// Advances the global clock and services any device whose event came
    /// due. Called by the CPU for every memory access and internal cycle.
    #[inline]
    pub fn tick(&mut self, cycles: i32) {
        self.scheduler.advance(cycles);
        if self.scheduler.pending() {
            self.check_events();
        }
    }

    /// Catches up every device whose next event has fired, in fixed order.
    /// The PPU runs first: it is the only source of the HBlank edge HDMA
    /// depends on.
    pub fn check_events(&mut self) {
        while self.scheduler.pending() {
            if self.scheduler.due(SyncToken::Ppu) {
                self.sync_ppu();
            }
            if self.scheduler.due(SyncToken::Dma) {
                self.sync_dma();
            }
            if self.scheduler.due(SyncToken::Timer) {
                self.sync_timer();
            }
            if self.scheduler.due(SyncToken::Apu) {
                self.sync_apu();
            }
            if self.scheduler.due(SyncToken::Cart) {
                self.sync_cart();
            }
        }
    }

    pub(crate) fn sync_ppu(&mut self) {
        let hdma_armed = self.hdma.run_on_hblank;
        let slots = self.ppu.sync(
            &mut self.scheduler,
            &mut self.interrupts,
            hdma_armed,
            &mut self.ui,
        );
        for _ in 0..slots {
            if self.hdma.run_on_hblank {
                self.hblank_hdma();
            }
        }
    }

    pub(crate) fn sync_timer(&mut self) {
        self.timer.sync(&mut self.scheduler, &mut self.interrupts);
    }

    pub(crate) fn sync_apu(&mut self) {
        self.apu.sync(&mut self.scheduler);
    }

    pub(crate) fn sync_cart(&mut self) {
        self.cart.sync(&mut self.scheduler);
    }

    /// Lets the host deliver queued input events, then applies any joypad
    /// interrupt edge they produced.
    pub(crate) fn poll_input(&mut self) {
        let Self { ui, input, .. } = self;
        ui.refresh_input(input);
        if self.input.take_interrupt() {
            self.interrupts.request(Interrupt::Joypad);
        }
    }

    /// Direct button update (equivalent to an event delivered through
    /// [`Ui::refresh_input`]).
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.input.set_button(button, pressed);
        if self.input.take_interrupt() {
            self.interrupts.request(Interrupt::Joypad);
        }
    }

    fn wram_index(&self, offset: u16) -> usize {
        let mut offset = offset as usize;
        if offset >= 0x1000 {
            let bank = self.wram_high_bank.max(1) as usize;
            offset += (bank - 1) * 0x1000;
        }
        offset
    }

    /// Reads one byte. Does not consume time; the CPU ticks separately.
    pub fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self.cart.read_rom(addr),
            0x8000..=0x9FFF => {
                self.ppu.vram[self.vram_high_bank as usize][(addr - 0x8000) as usize]
            }
            0xA000..=0xBFFF => self.cart.read_ram(addr - 0xA000),
            0xC000..=0xDFFF => self.wram[self.wram_index(addr - 0xC000)],
            // Echo of 0xC000..=0xDDFF, same banking.
            0xE000..=0xFDFF => self.wram[self.wram_index(addr - 0xE000)],
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize],

            0xFF00 => self.input.state(),
            // Serial is not wired up.
            0xFF01 => 0xFF,
            0xFF02 => 0x00,

            0xFF04 => {
                self.sync_timer();
                self.timer.div()
            }
            0xFF05 => {
                self.sync_timer();
                self.timer.counter()
            }
            0xFF06 => self.timer.modulo(),
            0xFF07 => self.timer.configuration(),

            0xFF0F => self.interrupts.flags,

            0xFF10..=0xFF3F => self.apu.read_register(addr, &mut self.scheduler),

            0xFF40 => {
                self.sync_ppu();
                self.ppu.lcdc()
            }
            0xFF41 => {
                self.sync_ppu();
                self.ppu.stat()
            }
            0xFF42 => self.ppu.scroll_y,
            0xFF43 => self.ppu.scroll_x,
            0xFF44 => {
                self.sync_ppu();
                self.ppu.ly
            }
            0xFF45 => self.ppu.lyc,
            0xFF46 => self.dma.source_high(),
            0xFF47 => self.ppu.background_palette,
            0xFF48 => self.ppu.sprite_palette0,
            0xFF49 => self.ppu.sprite_palette1,
            0xFF4A => self.ppu.window_y,
            0xFF4B => self.ppu.window_x,

            0xFF4F if self.gbc => self.vram_high_bank as u8 | 0xFE,
            0xFF51 if self.gbc => (self.hdma.source >> 8) as u8,
            0xFF52 if self.gbc => self.hdma.source as u8,
            0xFF53 if self.gbc => (self.hdma.destination >> 8) as u8,
            0xFF54 if self.gbc => self.hdma.destination as u8,
            0xFF55 if self.gbc => self.hdma.status(),
            0xFF68 if self.gbc => self.ppu.background_palettes.specification(),
            0xFF69 if self.gbc => self.ppu.background_palettes.data(),
            0xFF6A if self.gbc => self.ppu.sprite_palettes.specification(),
            0xFF6B if self.gbc => self.ppu.sprite_palettes.data(),
            0xFF70 if self.gbc => self.wram_high_bank | 0xF8,

            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.interrupts.enable,

            _ => {
                debug!("unsupported bus read at {addr:#06x}");
                0xFF
            }
        }
    }

    /// Writes one byte. Does not consume time; the CPU ticks separately.
    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x7FFF => self.cart.write_rom(addr, value),
            0x8000..=0x9FFF => {
                self.sync_ppu();
                self.ppu.vram[self.vram_high_bank as usize][(addr - 0x8000) as usize] = value;
            }
            0xA000..=0xBFFF => {
                if self.cart.write_ram(addr - 0xA000, value) {
                    // Battery state changed: flush after a quiet period.
                    self.scheduler.schedule(SyncToken::Cart, SAVE_DELAY_CYCLES);
                }
            }
            0xC000..=0xDFFF => {
                let index = self.wram_index(addr - 0xC000);
                self.wram[index] = value;
            }
            0xE000..=0xFDFF => {
                let index = self.wram_index(addr - 0xE000);
                self.wram[index] = value;
            }
            0xFE00..=0xFE9F => {
                self.sync_ppu();
                self.ppu.oam[(addr - 0xFE00) as usize] = value;
            }

            0xFF00 => self.input.select(value),
            0xFF01 | 0xFF02 => {}

            0xFF04 => {
                self.sync_timer();
                self.timer.reset_divider();
                self.sync_timer();
            }
            0xFF05 => {
                self.sync_timer();
                self.timer.set_counter(value);
                self.sync_timer();
            }
            0xFF06 => {
                self.sync_timer();
                self.timer.set_modulo(value);
                self.sync_timer();
            }
            0xFF07 => {
                self.sync_timer();
                self.timer.set_configuration(value);
                self.sync_timer();
            }

            0xFF0F => self.interrupts.write_flags(value),

            0xFF10..=0xFF3F => self.apu.write_register(addr, value, &mut self.scheduler),

            0xFF40 => {
                self.sync_ppu();
                let Self { ppu, ui, .. } = self;
                if ppu.set_lcdc(value, ui) {
                    self.sync_ppu();
                }
            }
            0xFF41 => {
                self.sync_ppu();
                if self.ppu.set_stat(value) {
                    // Enabling Mode 0 interrupts moves the next PPU event.
                    self.sync_ppu();
                }
            }
            0xFF42 => {
                self.sync_ppu();
                self.ppu.scroll_y = value;
            }
            0xFF43 => {
                self.sync_ppu();
                self.ppu.scroll_x = value;
            }
            0xFF45 => self.ppu.lyc = value,
            0xFF46 => self.start_dma(value),
            0xFF47 => {
                self.sync_ppu();
                self.ppu.background_palette = value;
            }
            0xFF48 => {
                self.sync_ppu();
                self.ppu.sprite_palette0 = value;
            }
            0xFF49 => {
                self.sync_ppu();
                self.ppu.sprite_palette1 = value;
            }
            0xFF4A => {
                self.sync_ppu();
                self.ppu.window_y = value;
            }
            0xFF4B => {
                self.sync_ppu();
                self.ppu.window_x = value;
            }

            0xFF4F if self.gbc => self.vram_high_bank = value & 1 != 0,
            0xFF51 if self.gbc => {
                self.hdma.source = (self.hdma.source & 0x00FF) | (value as u16) << 8;
            }
            0xFF52 if self.gbc => {
                // The low four bits of the source are ignored.
                self.hdma.source = (self.hdma.source & 0xFF00) | (value & 0xF0) as u16;
            }
            0xFF53 if self.gbc => {
                self.hdma.destination = (self.hdma.destination & 0x00FF) | (value as u16) << 8;
            }
            0xFF54 if self.gbc => {
                self.hdma.destination = (self.hdma.destination & 0xFF00) | (value & 0xF0) as u16;
            }
            0xFF55 if self.gbc => self.write_hdma_control(value),
            0xFF68 if self.gbc => self.ppu.background_palettes.set_specification(value),
            0xFF69 if self.gbc => self.ppu.background_palettes.set_data(value),
            0xFF6A if self.gbc => self.ppu.sprite_palettes.set_specification(value),
            0xFF6B if self.gbc => self.ppu.sprite_palettes.set_data(value),
            0xFF70 if self.gbc => self.wram_high_bank = value & 7,

            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = value,
            0xFFFF => self.interrupts.enable = value,

            _ => debug!("unsupported bus write at {addr:#06x} [value={value:#04x}]"),
        }
    }
}
