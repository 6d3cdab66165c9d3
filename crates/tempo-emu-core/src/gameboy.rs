use crate::audio_queue::AudioConsumer;
use crate::bus::Bus;
use crate::cartridge::Cartridge;
use crate::cpu::{Cpu, CpuFault};
use crate::input::Button;
use crate::ui::Ui;
use crate::CPU_FREQUENCY;

/// Default run-chunk length: input is pumped and control returned to the
/// host at 120 Hz.
pub const CYCLES_PER_CHUNK: i32 = (CPU_FREQUENCY / 120) as i32;

/// The whole machine: CPU plus the bus that owns every other device.
///
/// The host drives it in chunks: each [`GameBoy::run_chunk`] pumps input
/// through the sink, then executes CPU cycles; scanlines, frames and audio
/// come back through the [`Ui`] sink and the audio consumer as a side
/// effect.
pub struct GameBoy<U: Ui> {
    pub cpu: Cpu,
    pub bus: Bus<U>,
    pub quit: bool,
}

impl<U: Ui> GameBoy<U> {
    /// Builds a machine around a loaded cartridge. The hardware model (DMG
    /// or GBC) follows the cartridge header.
    pub fn new(cart: Cartridge, ui: U) -> Self {
        let gbc = cart.cgb;
        Self::new_with_mode(cart, ui, gbc)
    }

    /// Builds a machine with an explicit hardware model, regardless of what
    /// the cartridge asks for.
    pub fn new_with_mode(cart: Cartridge, ui: U, gbc: bool) -> Self {
        Self {
            cpu: Cpu::new(gbc),
            bus: Bus::new(cart, ui, gbc),
            quit: false,
        }
    }

    /// Pumps input, then runs the CPU for `cycles` simulated cycles.
    /// Returns the cycle counter, which overshoots by at most one
    /// instruction.
    pub fn run_cycles(&mut self, cycles: i32) -> Result<i32, CpuFault> {
        self.bus.poll_input();
        self.cpu.run(&mut self.bus, cycles)
    }

    /// One 120 Hz host chunk.
    pub fn run_chunk(&mut self) -> Result<i32, CpuFault> {
        self.run_cycles(CYCLES_PER_CHUNK)
    }

    /// Direct button update, equivalent to an event delivered through
    /// [`Ui::refresh_input`].
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.bus.set_button(button, pressed);
    }

    /// Hands out the audio-consumer half of the sample queue and switches
    /// the producer to the blocking handshake. Call once, from the host,
    /// before starting the audio stream.
    pub fn audio_consumer(&self) -> AudioConsumer {
        self.bus.apu.audio_consumer()
    }

    pub fn ui(&mut self) -> &mut U {
        &mut self.bus.ui
    }

    /// Cooperative shutdown: flush battery-backed state and tear the sink
    /// down.
    pub fn shutdown(&mut self) {
        self.bus.cart.sync(&mut self.bus.scheduler);
        self.bus.ui.destroy();
    }
}
