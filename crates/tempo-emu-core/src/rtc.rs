use std::time::{SystemTime, UNIX_EPOCH};

/// The five user-visible clock registers.
///
/// `days_high` packs bit 0 = day counter MSB, bit 6 = halt, bit 7 = sticky
/// day-overflow carry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RtcDate {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub days_low: u8,
    pub days_high: u8,
}

/// MBC3 real-time clock.
///
/// Logical time is `wall_now - base` seconds, where `wall_now` freezes at
/// `halt_date` while the halt bit is set. Reads always see the latched
/// snapshot; writes edit the snapshot and re-derive `base` so the live clock
/// matches the written date.
pub struct Rtc {
    base: u64,
    halt_date: u64,
    latch: bool,
    latched: RtcDate,
}

fn wall_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Rtc {
    pub fn new() -> Self {
        let mut rtc = Self {
            base: wall_seconds(),
            halt_date: 0,
            latch: false,
            latched: RtcDate::default(),
        };
        rtc.latched = rtc.current_date();
        rtc
    }

    fn halted(&self) -> bool {
        self.latched.days_high & 0x40 != 0
    }

    fn current_timestamp(&self) -> u64 {
        if self.halted() {
            self.halt_date
        } else {
            wall_seconds()
        }
    }

    /// Derives the displayed date from logical time. The halt bit of the
    /// previous snapshot is preserved; day MSB and carry are recomputed.
    fn current_date(&mut self) -> RtcDate {
        let mut now = self.current_timestamp();

        if now >= self.base {
            now -= self.base;
        } else {
            // The system clock moved backwards past the base; restart.
            self.base = now;
            now = 0;
        }

        let mut date = RtcDate {
            seconds: (now % 60) as u8,
            ..RtcDate::default()
        };
        now /= 60;
        date.minutes = (now % 60) as u8;
        now /= 60;
        date.hours = (now % 24) as u8;
        now /= 24;
        date.days_low = (now & 0xFF) as u8;
        date.days_high = self.latched.days_high & 0x40;
        date.days_high |= ((now >> 8) & 1) as u8;
        if now > 0x1FF {
            date.days_high |= 0x80;
        }

        date
    }

    /// Recomputes `base` so the live clock reads `date` right now.
    fn set_date(&mut self, date: &RtcDate) {
        let mut base = self.current_timestamp();
        let days = date.days_low as u64 + ((date.days_high & 1) as u64) * 0x100;

        base -= days * 60 * 60 * 24;
        base -= date.hours as u64 * 60 * 60;
        base -= date.minutes as u64 * 60;
        base -= date.seconds as u64;

        self.base = base;
    }

    /// Latch command (MBC3 0x6000 region). The snapshot refreshes only on a
    /// 0 -> 1 transition.
    pub fn set_latch(&mut self, latch: bool) {
        if !self.latch && latch {
            self.latched = self.current_date();
        }
        self.latch = latch;
    }

    /// Register read (0x08..=0x0C), from the latched snapshot.
    pub fn read(&self, register: u8) -> u8 {
        match register {
            0x08 => self.latched.seconds,
            0x09 => self.latched.minutes,
            0x0A => self.latched.hours,
            0x0B => self.latched.days_low,
            0x0C => self.latched.days_high,
            _ => 0xFF,
        }
    }

    /// Register write: edits the snapshot and rebases the live clock.
    pub fn write(&mut self, register: u8, value: u8) {
        let was_halted = self.halted();
        let mut date = self.current_date();

        match register {
            0x08 => {
                self.latched.seconds = value;
                date.seconds = value;
            }
            0x09 => {
                self.latched.minutes = value;
                date.minutes = value;
            }
            0x0A => {
                self.latched.hours = value;
                date.hours = value;
            }
            0x0B => {
                self.latched.days_low = value;
                date.days_low = value;
            }
            0x0C => {
                self.latched.days_high = value;
                date.days_high = value;

                if !was_halted && self.halted() {
                    self.halt_date = wall_seconds();
                }
            }
            _ => return,
        }

        self.set_date(&date);
    }

    /// Length in bytes of the serialized block.
    pub const BLOCK_LEN: usize = 22;

    /// Serializes as the save-file RTC block: base and halt timestamp as
    /// big-endian u64, the latch flag, then the five latched registers.
    pub fn save_block(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::BLOCK_LEN);
        out.extend_from_slice(&self.base.to_be_bytes());
        out.extend_from_slice(&self.halt_date.to_be_bytes());
        out.push(self.latch as u8);
        out.push(self.latched.seconds);
        out.push(self.latched.minutes);
        out.push(self.latched.hours);
        out.push(self.latched.days_low);
        out.push(self.latched.days_high);
        out
    }

    /// Restores from a save-file block. Returns `None` when truncated.
    pub fn load_block(data: &[u8]) -> Option<Self> {
        if data.len() < Self::BLOCK_LEN {
            return None;
        }
        let base = u64::from_be_bytes(data[0..8].try_into().ok()?);
        let halt_date = u64::from_be_bytes(data[8..16].try_into().ok()?);
        Some(Self {
            base,
            halt_date,
            latch: data[16] != 0,
            latched: RtcDate {
                seconds: data[17],
                minutes: data[18],
                hours: data[19],
                days_low: data[20],
                days_high: data[21],
            },
        })
    }
}

impl Default for Rtc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn halted_rtc() -> Rtc {
        let mut rtc = Rtc::new();
        rtc.write(0x0C, 0x40);
        rtc
    }

    #[test]
    fn writes_read_back_while_halted() {
        let mut rtc = halted_rtc();
        rtc.write(0x08, 12);
        rtc.write(0x09, 34);
        rtc.write(0x0A, 5);
        rtc.write(0x0B, 200);

        assert_eq!(rtc.read(0x08), 12);
        assert_eq!(rtc.read(0x09), 34);
        assert_eq!(rtc.read(0x0A), 5);
        assert_eq!(rtc.read(0x0B), 200);
        assert_eq!(rtc.read(0x0C) & 0x40, 0x40);
    }

    #[test]
    fn latch_refreshes_only_on_rising_edge() {
        let mut rtc = halted_rtc();
        rtc.write(0x08, 30);
        rtc.set_latch(true);

        // Edit the live clock behind the latch; the snapshot is refreshed by
        // the next 0 -> 1 transition only.
        rtc.latched.seconds = 99;
        rtc.set_latch(true);
        assert_eq!(rtc.read(0x08), 99);

        rtc.set_latch(false);
        rtc.set_latch(true);
        assert_eq!(rtc.read(0x08), 30);
    }

    #[test]
    fn day_msb_feeds_the_derived_base() {
        let mut rtc = halted_rtc();
        rtc.write(0x0B, 0x34);
        rtc.write(0x0C, 0x41); // halt + day bit 8
        rtc.set_latch(false);
        rtc.set_latch(true);
        assert_eq!(rtc.read(0x0B), 0x34);
        assert_eq!(rtc.read(0x0C) & 0x01, 0x01);
    }

    #[test]
    fn save_block_round_trips() {
        let mut rtc = halted_rtc();
        rtc.write(0x08, 7);
        rtc.write(0x0B, 0x12);
        rtc.set_latch(true);

        let block = rtc.save_block();
        assert_eq!(block.len(), Rtc::BLOCK_LEN);
        let restored = Rtc::load_block(&block).unwrap();
        assert_eq!(restored.read(0x08), 7);
        assert_eq!(restored.read(0x0B), 0x12);
        assert_eq!(restored.read(0x0C) & 0x40, 0x40);

        assert!(Rtc::load_block(&block[..10]).is_none());
    }
}
