use crate::audio_queue::{AudioConsumer, AudioProducer};
use crate::scheduler::{Scheduler, SyncToken};

/// One output frame is produced every 64 CPU cycles.
pub const SAMPLE_RATE_DIVISOR: i32 = 64;

/// Output sample rate in Hz.
pub const SAMPLE_RATE_HZ: u32 = crate::CPU_FREQUENCY / SAMPLE_RATE_DIVISOR as u32;

const WAVE_RAM_SIZE: usize = 16;
const NPHASES: u8 = 16;

// Maximum programmable length per channel (NRx1 low bits).
const SQUARE_T1_MAX: u32 = 0x3F;
const WAVE_T1_MAX: u32 = 0xFF;
const NOISE_T1_MAX: u32 = 0x3F;

/// Length counter. Runs even while the channel itself is stopped; expiry
/// silences the channel when enabled.
#[derive(Default)]
struct Duration {
    enable: bool,
    counter: u32,
}

impl Duration {
    fn reload(&mut self, max: u32, t1: u8) {
        self.counter = (max + 1 - t1 as u32) * 0x4000;
    }

    /// Returns true when the counter elapsed and the channel must stop.
    fn update(&mut self, max: u32, mut cycles: u32) -> bool {
        if !self.enable {
            return false;
        }

        let mut elapsed = false;
        while cycles > 0 {
            if self.counter > cycles {
                self.counter -= cycles;
                cycles = 0;
            } else {
                elapsed = true;
                cycles -= self.counter;
                self.reload(max, 0);
            }
        }
        elapsed
    }
}

/// Frequency divider: one waveform step every `2 * (0x800 - offset)` cycles.
#[derive(Default)]
struct FreqDivider {
    offset: u16,
    counter: u32,
}

impl FreqDivider {
    fn reload(&mut self) {
        self.counter = 2 * (0x800 - self.offset as u32);
    }

    fn set_low(&mut self, value: u8) {
        self.offset = (self.offset & 0x700) | value as u16;
    }

    fn set_high(&mut self, value: u8) {
        self.offset = (self.offset & 0xFF) | ((value as u16 & 7) << 8);
    }

    /// Returns how many times the divider ran out.
    fn update(&mut self, mut cycles: u32) -> u32 {
        let mut count = 0;
        while cycles > 0 {
            if self.counter > cycles {
                self.counter -= cycles;
                cycles = 0;
            } else {
                count += 1;
                cycles -= self.counter;
                self.reload();
            }
        }
        count
    }
}

/// Frequency sweep (channel 1 only): every `time * 0x8000` cycles the period
/// offset is shifted up or down; an addition overflowing 0x7FF disables the
/// channel.
#[derive(Default)]
struct Sweep {
    divider: FreqDivider,
    shift: u8,
    subtract: bool,
    time: u8,
    counter: u32,
}

impl Sweep {
    fn reload(&mut self, configuration: u8) {
        self.shift = configuration & 0x7;
        self.subtract = configuration & 0x08 != 0;
        self.time = (configuration >> 4) & 0x7;
        self.counter = 0x8000 * self.time as u32;
    }

    fn configuration(&self) -> u8 {
        self.shift | (self.subtract as u8) << 3 | self.time << 4
    }

    /// Steps the sweep and the underlying divider together, since the sweep
    /// changes the divider's frequency mid-flight. Returns the number of
    /// waveform steps and whether the channel got disabled.
    fn update(&mut self, mut cycles: u32) -> (u32, bool) {
        if self.time == 0 {
            return (self.divider.update(cycles), false);
        }

        let mut count = 0;
        while cycles > 0 {
            // Both counters are nonzero here: the sweep counter reloads to
            // time * 0x8000 and the divider to at least 2 cycles.
            let to_run = cycles.min(self.counter).min(self.divider.counter);

            self.counter -= to_run;
            if self.counter == 0 {
                let delta = self.divider.offset >> self.shift;

                if self.subtract {
                    if self.shift != 0 && delta <= self.divider.offset {
                        self.divider.offset -= delta;
                    }
                } else {
                    let offset = self.divider.offset as u32 + delta as u32;
                    if offset > 0x7FF {
                        return (count, true);
                    }
                    self.divider.offset = offset as u16;
                }

                self.counter = 0x8000 * self.time as u32;
            }

            count += self.divider.update(to_run);
            cycles -= to_run;
        }

        (count, false)
    }
}

/// Rectangular waveform phase, 16 steps per period.
#[derive(Default)]
struct SquareWave {
    phase: u8,
    duty: u8,
}

impl SquareWave {
    fn next_sample(&mut self, phase_steps: u32) -> u8 {
        const WAVEFORMS: [[u8; 8]; 4] = [
            [1, 0, 0, 0, 0, 0, 0, 0], // 1/8
            [1, 1, 0, 0, 0, 0, 0, 0], // 1/4
            [1, 1, 1, 1, 0, 0, 0, 0], // 1/2
            [1, 1, 1, 1, 1, 1, 0, 0], // 3/4
        ];

        self.phase = ((self.phase as u32 + phase_steps) % NPHASES as u32) as u8;
        WAVEFORMS[self.duty as usize][self.phase as usize / 2]
    }
}

/// Volume envelope: one step every `step_duration * 0x10000` cycles,
/// saturating at 0 or 15.
#[derive(Default)]
struct Envelope {
    step_duration: u8,
    value: u8,
    increment: bool,
    counter: u32,
}

impl Envelope {
    fn init(&mut self, configuration: u8) {
        self.value = configuration >> 4;
        self.increment = configuration & 0x08 != 0;
        self.step_duration = configuration & 0x7;
        self.reload();
    }

    fn reload(&mut self) {
        self.counter = self.step_duration as u32 * 0x10000;
    }

    /// A decrementing envelope stuck at 0 leaves the channel dead.
    fn active(&self) -> bool {
        self.value != 0 || self.increment
    }

    /// Returns true when the envelope reached an inactive state.
    fn update(&mut self, mut cycles: u32) -> bool {
        if self.step_duration != 0 {
            while cycles > 0 {
                if self.counter > cycles {
                    self.counter -= cycles;
                    cycles = 0;
                } else {
                    cycles -= self.counter;
                    if self.increment {
                        if self.value < 0xF {
                            self.value += 1;
                        }
                    } else if self.value > 0 {
                        self.value -= 1;
                    }
                    self.reload();
                }
            }
        }

        !self.active()
    }
}

/// Channel 1: rectangle wave with envelope and frequency sweep.
#[derive(Default)]
struct Channel1 {
    running: bool,
    duration: Duration,
    sweep: Sweep,
    wave: SquareWave,
    envelope_configuration: u8,
    envelope: Envelope,
}

/// Channel 2: rectangle wave with envelope.
#[derive(Default)]
struct Channel2 {
    running: bool,
    duration: Duration,
    divider: FreqDivider,
    wave: SquareWave,
    envelope_configuration: u8,
    envelope: Envelope,
}

/// Channel 3: 32 x 4-bit user waveform.
#[derive(Default)]
struct Channel3 {
    enable: bool,
    running: bool,
    duration: Duration,
    t1: u8,
    divider: FreqDivider,
    volume_shift: u8,
    ram: [u8; WAVE_RAM_SIZE],
    index: u8,
}

/// Channel 4: LFSR noise with envelope.
#[derive(Default)]
struct Channel4 {
    running: bool,
    duration: Duration,
    envelope_configuration: u8,
    envelope: Envelope,
    lfsr: u16,
    configuration: u8,
    counter: u32,
}

impl Channel4 {
    fn reload_counter(&mut self) {
        let div = (self.configuration & 7) as u32;
        let shift = (self.configuration >> 4) + 1;

        self.counter = if div == 0 { 4 } else { 8 * div };
        self.counter <<= shift;
    }

    fn lfsr_step(&mut self) {
        // Period is 7 bits instead of 15 when bit 3 of NR43 is set.
        let period_7bits = self.configuration & 0x08 != 0;

        let shifted = self.lfsr >> 1;
        let carry = (self.lfsr ^ shifted) & 1;

        self.lfsr = shifted | carry << 14;
        if period_7bits {
            self.lfsr = (self.lfsr & !(1 << 6)) | carry << 6;
        }
    }
}

/// The sound unit: four channels mixed into a stereo stream, one frame per
/// 64 CPU cycles, pushed into the double-buffered sample queue.
pub struct Apu {
    enable: bool,
    /// NR50: per-side master volume.
    output_level: u8,
    /// NR51: channel/side routing matrix.
    sound_mux: u8,
    /// Per-channel, per-side amplification derived from NR50/NR51.
    amp: [[i16; 2]; 4],
    ch1: Channel1,
    ch2: Channel2,
    ch3: Channel3,
    ch4: Channel4,
    /// Cycles carried over when the last sync did not land on a sample edge.
    sample_period: i32,
    producer: AudioProducer,
}

impl Apu {
    pub fn new() -> Self {
        let mut apu = Self {
            enable: true,
            output_level: 0,
            sound_mux: 0,
            amp: [[0; 2]; 4],
            ch1: Channel1::default(),
            ch2: Channel2::default(),
            ch3: Channel3::default(),
            ch4: Channel4::default(),
            sample_period: 0,
            producer: AudioProducer::new(),
        };
        apu.reset();
        apu
    }

    /// Power-on / NR52-off register state.
    fn reset(&mut self) {
        self.enable = true;
        self.output_level = 0;
        self.sound_mux = 0;
        self.update_amp();

        self.ch1.running = false;
        self.ch1.duration.enable = false;
        self.ch1.wave.duty = 0;
        self.ch1.envelope_configuration = 0;
        self.ch1.sweep.reload(0);
        self.ch1.sweep.divider.offset = 0;
        self.ch1.sweep.divider.reload();

        self.ch2.running = false;
        self.ch2.duration.enable = false;
        self.ch2.wave.duty = 0;
        self.ch2.envelope_configuration = 0;
        self.ch2.divider.offset = 0;
        self.ch2.divider.reload();

        self.ch3.enable = false;
        self.ch3.running = false;
        self.ch3.duration.enable = false;
        self.ch3.volume_shift = 0;
        self.ch3.t1 = 0;
        self.ch3.index = 0;
        self.ch3.divider.offset = 0;
        self.ch3.divider.reload();

        self.ch4.running = false;
        self.ch4.duration.enable = false;
        self.ch4.envelope_configuration = 0;
        self.ch4.configuration = 0;
        self.ch4.lfsr = 0x7FFF;
    }

    /// Consumer handle for the host audio thread.
    pub fn audio_consumer(&self) -> AudioConsumer {
        self.producer.consumer()
    }

    /// Rebuilds the amplification table from NR50/NR51.
    fn update_amp(&mut self) {
        // Each channel emits 4-bit samples, amplified up to 8x, and four
        // channels sum per side; scale so the sum saturates at i16 range.
        let scaling = 0x7FFF / (15 * 8 * 4);

        for sound in 0..4 {
            for side in 0..2 {
                let enabled = self.sound_mux & 1 << (sound + side * 4) != 0;
                self.amp[sound][side] = if enabled {
                    (1 + (self.output_level as i16 >> (side * 4) & 7)) * scaling
                } else {
                    0
                };
            }
        }
    }

    fn ch1_sample(&mut self, cycles: u32) -> u8 {
        if self.ch1.duration.update(SQUARE_T1_MAX, cycles) {
            self.ch1.running = false;
        }
        if !self.ch1.running {
            return 0;
        }

        if self.ch1.envelope.update(cycles) {
            self.ch1.running = false;
            return 0;
        }

        let (steps, disable) = self.ch1.sweep.update(cycles);
        if disable {
            self.ch1.running = false;
            return 0;
        }

        self.ch1.wave.next_sample(steps) * self.ch1.envelope.value
    }

    fn ch2_sample(&mut self, cycles: u32) -> u8 {
        if self.ch2.duration.update(SQUARE_T1_MAX, cycles) {
            self.ch2.running = false;
        }
        if !self.ch2.running {
            return 0;
        }

        if self.ch2.envelope.update(cycles) {
            self.ch2.running = false;
            return 0;
        }

        let steps = self.ch2.divider.update(cycles);
        self.ch2.wave.next_sample(steps) * self.ch2.envelope.value
    }

    fn ch3_sample(&mut self, cycles: u32) -> u8 {
        if self.ch3.duration.update(WAVE_T1_MAX, cycles) {
            self.ch3.running = false;
        }
        if !self.ch3.running {
            return 0;
        }

        let steps = self.ch3.divider.update(cycles);
        self.ch3.index = ((self.ch3.index as u32 + steps) % (WAVE_RAM_SIZE as u32 * 2)) as u8;

        if self.ch3.volume_shift == 0 {
            return 0;
        }

        // Two samples per byte, high nibble first.
        let byte = self.ch3.ram[self.ch3.index as usize / 2];
        let sample = if self.ch3.index & 1 != 0 {
            byte & 0xF
        } else {
            byte >> 4
        };

        sample >> (self.ch3.volume_shift - 1)
    }

    fn ch4_sample(&mut self, mut cycles: u32) -> u8 {
        if self.ch4.duration.update(NOISE_T1_MAX, cycles) {
            self.ch4.running = false;
        }
        if !self.ch4.running {
            return 0;
        }

        if self.ch4.envelope.update(cycles) {
            self.ch4.running = false;
            return 0;
        }

        while cycles > 0 {
            if self.ch4.counter > cycles {
                self.ch4.counter -= cycles;
                cycles = 0;
            } else {
                cycles -= self.ch4.counter;
                self.ch4.reload_counter();
                self.ch4.lfsr_step();
            }
        }

        (self.ch4.lfsr as u8 & 1) * self.ch4.envelope.value
    }

    /// Catches the channels up and emits one frame per 64 elapsed cycles,
    /// then schedules the sync that will complete the current buffer.
    pub fn sync(&mut self, sched: &mut Scheduler) {
        let elapsed = sched.resync(SyncToken::Apu) + self.sample_period;
        let mut period = self.sample_period;

        for _ in 0..elapsed / SAMPLE_RATE_DIVISOR {
            let step = (SAMPLE_RATE_DIVISOR - period) as u32;
            period = 0;

            let samples = [
                self.ch1_sample(step) as i16,
                self.ch2_sample(step) as i16,
                self.ch3_sample(step) as i16,
                self.ch4_sample(step) as i16,
            ];

            let mut left = 0i16;
            let mut right = 0i16;
            for (sound, sample) in samples.iter().enumerate() {
                left += sample * self.amp[sound][0];
                right += sample * self.amp[sound][1];
            }

            self.producer.push(left, right);
        }

        // Advance through the leftover so the running flags stay current even
        // between output frames.
        let leftover = (elapsed % SAMPLE_RATE_DIVISOR - period) as u32;
        self.ch1_sample(leftover);
        self.ch2_sample(leftover);
        self.ch3_sample(leftover);
        self.ch4_sample(leftover);
        self.sample_period = elapsed % SAMPLE_RATE_DIVISOR;

        let frames_left =
            crate::audio_queue::SAMPLE_BUFFER_LEN - self.producer.pending_frames();
        let next = frames_left as i32 * SAMPLE_RATE_DIVISOR - self.sample_period;
        sched.schedule(SyncToken::Apu, next);
    }

    fn start_ch1(&mut self) {
        self.ch1.wave.phase = 0;
        self.ch1.sweep.divider.reload();
        self.ch1.envelope.init(self.ch1.envelope_configuration);
        self.ch1.running = self.ch1.envelope.active();
    }

    fn start_ch2(&mut self) {
        self.ch2.wave.phase = 0;
        self.ch2.divider.reload();
        self.ch2.envelope.init(self.ch2.envelope_configuration);
        self.ch2.running = self.ch2.envelope.active();
    }

    fn start_ch3(&mut self) {
        if !self.ch3.enable {
            return;
        }
        self.ch3.index = 0;
        self.ch3.running = true;
        self.ch3.divider.reload();
    }

    fn start_ch4(&mut self) {
        self.ch4.envelope.init(self.ch4.envelope_configuration);
        self.ch4.reload_counter();
        self.ch4.running = true;
    }

    /// Sound register read, 0xFF10..=0xFF3F.
    pub fn read_register(&mut self, addr: u16, sched: &mut Scheduler) -> u8 {
        match addr {
            0xFF10 => 0x80 | self.ch1.sweep.configuration(),
            0xFF11 => self.ch1.wave.duty << 6 | 0x3F,
            0xFF12 => self.ch1.envelope_configuration,
            0xFF14 => (self.ch1.duration.enable as u8) << 6 | 0xBF,
            0xFF16 => self.ch2.wave.duty << 6 | 0x3F,
            0xFF17 => self.ch2.envelope_configuration,
            0xFF19 => (self.ch2.duration.enable as u8) << 6 | 0xBF,
            0xFF1A => {
                self.sync(sched);
                (self.ch3.enable as u8) << 7 | 0x7F
            }
            0xFF1B => self.ch3.t1,
            0xFF1C => self.ch3.volume_shift << 5 | 0x9F,
            0xFF1E => (self.ch3.duration.enable as u8) << 6 | 0xBF,
            0xFF21 => self.ch4.envelope_configuration,
            0xFF22 => self.ch4.configuration,
            0xFF23 => (self.ch4.duration.enable as u8) << 6 | 0xBF,
            0xFF24 => self.output_level,
            0xFF25 => self.sound_mux,
            0xFF26 => {
                self.sync(sched);
                (self.ch1.running as u8)
                    | (self.ch2.running as u8) << 1
                    | (self.ch3.running as u8) << 2
                    | (self.ch4.running as u8) << 3
                    | (self.enable as u8) << 7
            }
            0xFF30..=0xFF3F => self.ch3.ram[addr as usize - 0xFF30],
            // NR13/NR23/NR33/NR41 and the gaps are write-only.
            _ => 0xFF,
        }
    }

    /// Sound register write, 0xFF10..=0xFF3F. Registers are frozen while the
    /// unit is powered off, except NR52 itself and wave RAM.
    pub fn write_register(&mut self, addr: u16, value: u8, sched: &mut Scheduler) {
        if addr == 0xFF26 {
            let enable = value & 0x80 != 0;
            if self.enable != enable {
                self.sync(sched);
                if !enable {
                    self.reset();
                }
                self.enable = enable;
            }
            return;
        }

        if let 0xFF30..=0xFF3F = addr {
            self.ch3.ram[addr as usize - 0xFF30] = value;
            return;
        }

        if !self.enable {
            return;
        }

        match addr {
            0xFF10 => {
                self.sync(sched);
                self.ch1.sweep.reload(value);
            }
            0xFF11 => {
                self.sync(sched);
                self.ch1.wave.duty = value >> 6;
                self.ch1.duration.reload(SQUARE_T1_MAX, value & 0x3F);
            }
            // Envelope configuration takes effect on channel start.
            0xFF12 => self.ch1.envelope_configuration = value,
            0xFF13 => {
                self.sync(sched);
                self.ch1.sweep.divider.set_low(value);
            }
            0xFF14 => {
                self.sync(sched);
                self.ch1.sweep.divider.set_high(value);
                self.ch1.duration.enable = value & 0x40 != 0;
                if value & 0x80 != 0 {
                    self.start_ch1();
                }
            }
            0xFF16 => {
                self.sync(sched);
                self.ch2.wave.duty = value >> 6;
                self.ch2.duration.reload(SQUARE_T1_MAX, value & 0x3F);
            }
            0xFF17 => self.ch2.envelope_configuration = value,
            0xFF18 => {
                self.sync(sched);
                self.ch2.divider.set_low(value);
            }
            0xFF19 => {
                self.sync(sched);
                self.ch2.divider.set_high(value);
                self.ch2.duration.enable = value & 0x40 != 0;
                if value & 0x80 != 0 {
                    self.start_ch2();
                }
            }
            0xFF1A => {
                // Enabling arms the channel; it only starts via NR34 bit 7.
                self.sync(sched);
                self.ch3.enable = value & 0x80 != 0;
                if !self.ch3.enable {
                    self.ch3.running = false;
                }
            }
            0xFF1B => {
                self.sync(sched);
                self.ch3.t1 = value;
                self.ch3.duration.reload(WAVE_T1_MAX, value);
            }
            0xFF1C => {
                self.sync(sched);
                self.ch3.volume_shift = (value >> 5) & 3;
            }
            0xFF1D => {
                self.sync(sched);
                self.ch3.divider.set_low(value);
            }
            0xFF1E => {
                self.sync(sched);
                self.ch3.divider.set_high(value);
                self.ch3.duration.enable = value & 0x40 != 0;
                if value & 0x80 != 0 {
                    self.start_ch3();
                }
            }
            0xFF20 => {
                self.sync(sched);
                self.ch4.duration.reload(NOISE_T1_MAX, value & 0x3F);
            }
            0xFF21 => self.ch4.envelope_configuration = value,
            0xFF22 => {
                self.sync(sched);
                self.ch4.configuration = value;
            }
            0xFF23 => {
                self.sync(sched);
                self.ch4.duration.enable = value & 0x40 != 0;
                if value & 0x80 != 0 {
                    self.start_ch4();
                }
            }
            0xFF24 => {
                self.sync(sched);
                self.output_level = value;
                self.update_amp();
            }
            0xFF25 => {
                self.sync(sched);
                self.sound_mux = value;
                self.update_amp();
            }
            _ => {}
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lfsr_feeds_xor_of_low_bits_into_bit_14() {
        let mut ch = Channel4 {
            lfsr: 0x7FFF,
            ..Channel4::default()
        };
        ch.lfsr_step();
        // 0x7FFF: bit0 ^ bit1 = 0, so a zero shifts in.
        assert_eq!(ch.lfsr, 0x3FFF);

        ch.lfsr = 0x0001;
        ch.lfsr_step();
        assert_eq!(ch.lfsr, 0x4000);
    }

    #[test]
    fn lfsr_seven_bit_mode_mirrors_carry_into_bit_6() {
        let mut ch = Channel4 {
            lfsr: 0x0001,
            configuration: 0x08,
            ..Channel4::default()
        };
        ch.lfsr_step();
        assert_eq!(ch.lfsr, 0x4040);
    }

    #[test]
    fn envelope_decrements_to_silence() {
        let mut env = Envelope::default();
        env.init(0x21); // volume 2, decrement, step duration 1
        assert!(env.active());
        assert!(!env.update(0x10000));
        assert_eq!(env.value, 1);
        assert!(env.update(0x10000));
        assert_eq!(env.value, 0);
    }

    #[test]
    fn sweep_addition_overflow_disables() {
        let mut sweep = Sweep::default();
        sweep.reload(0x11); // time 1, add, shift 1
        sweep.divider.offset = 0x7FF;
        sweep.divider.reload();
        let (_, disabled) = sweep.update(0x8000 * 2);
        assert!(disabled);
    }

    #[test]
    fn duty_cycle_shapes() {
        let mut wave = SquareWave::default();
        wave.duty = 2; // 1/2
        let mut ones = 0;
        for _ in 0..NPHASES {
            ones += wave.next_sample(1) as u32;
        }
        assert_eq!(ones, 8);
    }
}
