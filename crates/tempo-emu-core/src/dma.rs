use crate::bus::Bus;
use crate::scheduler::{SyncToken, NEVER};
use crate::ui::Ui;

/// Total bytes per transfer: the whole OAM.
const DMA_LENGTH: u16 = 160;

/// Cycles per copied byte.
const DMA_STEP_CYCLES: i32 = 4;

/// The OAM DMA engine. It reads through the normal bus and does not block
/// the CPU; the scheduler drives copy progress one byte per four cycles.
pub struct Dma {
    pub running: bool,
    source: u16,
    position: u16,
}

impl Dma {
    pub fn new() -> Self {
        Self {
            running: false,
            source: 0,
            position: 0,
        }
    }

    /// DMA register readback (the last written source page).
    pub fn source_high(&self) -> u8 {
        (self.source >> 8) as u8
    }
}

impl Default for Dma {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: Ui> Bus<U> {
    /// Copies as many bytes as the elapsed cycles allow and schedules the
    /// next byte (or goes idle when the transfer completed).
    pub(crate) fn sync_dma(&mut self) {
        let elapsed = self.scheduler.resync(SyncToken::Dma);

        if !self.dma.running {
            self.scheduler.schedule(SyncToken::Dma, NEVER);
            return;
        }

        let mut budget = elapsed / DMA_STEP_CYCLES;
        while budget > 0 && self.dma.position < DMA_LENGTH {
            let addr = self.dma.source.wrapping_add(self.dma.position);
            let byte = self.read(addr);
            self.ppu.oam[self.dma.position as usize] = byte;

            budget -= 1;
            self.dma.position += 1;
        }

        if self.dma.position >= DMA_LENGTH {
            self.dma.running = false;
            self.scheduler.schedule(SyncToken::Dma, NEVER);
        } else {
            self.scheduler.schedule(SyncToken::Dma, DMA_STEP_CYCLES);
        }
    }

    /// DMA register write: begins a transfer from `source << 8`. A source
    /// the engine cannot reach silently cancels the transfer.
    pub(crate) fn start_dma(&mut self, source: u8) {
        self.sync_dma();

        self.dma.source = (source as u16) << 8;
        self.dma.position = 0;

        // Only the color model can copy from the cartridge region.
        let unreachable_source =
            (!self.gbc && self.dma.source < 0x8000) || self.dma.source >= 0xE000;
        self.dma.running = !unreachable_source;

        self.sync_dma();
    }
}
