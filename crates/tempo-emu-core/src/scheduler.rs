use log::warn;

/// Delay used when a device has no event planned. The device is still synced
/// at this low frequency so elapsed-cycle counters never grow unbounded.
pub const NEVER: i32 = 10_000_000;

/// Catch-up channels, one per lazily synchronized device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncToken {
    Ppu,
    Dma,
    Timer,
    Cart,
    Apu,
}

const TOKEN_COUNT: usize = 5;

/// Tracks the global cycle counter and, for every [`SyncToken`], the
/// timestamp it was last brought current and the timestamp at which it must
/// be synced again.
///
/// All timestamps are signed 32-bit so that [`Scheduler::rebase`] stays
/// valid; the CPU rebases before every dispatch chunk, which keeps values
/// far away from overflow.
pub struct Scheduler {
    /// Global cycle counter, advanced by the CPU in 4-cycle steps.
    pub timestamp: i32,
    last_sync: [i32; TOKEN_COUNT],
    next_event: [i32; TOKEN_COUNT],
    /// Cached `min(next_event[..])`, so the CPU hot path is a single compare.
    first_event: i32,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            timestamp: 0,
            last_sync: [0; TOKEN_COUNT],
            next_event: [0; TOKEN_COUNT],
            first_event: 0,
        }
    }

    #[inline]
    pub fn advance(&mut self, cycles: i32) {
        self.timestamp += cycles;
    }

    /// True when at least one device's next event has come due.
    #[inline]
    pub fn pending(&self) -> bool {
        self.timestamp >= self.first_event
    }

    #[inline]
    pub fn due(&self, token: SyncToken) -> bool {
        self.timestamp >= self.next_event[token as usize]
    }

    /// Returns the number of cycles elapsed since `token` was last synced and
    /// marks it current. Called at the start of every device sync function.
    pub fn resync(&mut self, token: SyncToken) -> i32 {
        let elapsed = self.timestamp - self.last_sync[token as usize];
        if elapsed < 0 {
            warn!("negative resync of {} cycles for {:?}", elapsed, token);
        }
        self.last_sync[token as usize] = self.timestamp;
        elapsed
    }

    /// Schedules the next sync of `token` in `cycles` cycles from now.
    pub fn schedule(&mut self, token: SyncToken, cycles: i32) {
        self.next_event[token as usize] = self.timestamp + cycles;

        let mut first = self.next_event[0];
        for &event in &self.next_event[1..] {
            if event < first {
                first = event;
            }
        }
        self.first_event = first;
    }

    pub fn first_event(&self) -> i32 {
        self.first_event
    }

    pub fn next_event(&self, token: SyncToken) -> i32 {
        self.next_event[token as usize]
    }

    pub fn last_sync(&self, token: SyncToken) -> i32 {
        self.last_sync[token as usize]
    }

    /// Subtracts the current timestamp from every stored date and zeroes the
    /// counter, keeping all relative distances intact.
    pub fn rebase(&mut self) {
        for i in 0..TOKEN_COUNT {
            self.last_sync[i] -= self.timestamp;
            self.next_event[i] -= self.timestamp;
        }
        self.first_event -= self.timestamp;
        self.timestamp = 0;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKENS: [SyncToken; 5] = [
        SyncToken::Ppu,
        SyncToken::Dma,
        SyncToken::Timer,
        SyncToken::Cart,
        SyncToken::Apu,
    ];

    #[test]
    fn resync_returns_elapsed_and_marks_current() {
        let mut s = Scheduler::new();
        s.advance(100);
        assert_eq!(s.resync(SyncToken::Timer), 100);
        assert_eq!(s.resync(SyncToken::Timer), 0);
        s.advance(24);
        assert_eq!(s.resync(SyncToken::Timer), 24);
    }

    #[test]
    fn first_event_is_minimum_of_next_events() {
        let mut s = Scheduler::new();
        for token in TOKENS {
            s.schedule(token, NEVER);
        }
        s.schedule(SyncToken::Apu, 64);
        s.schedule(SyncToken::Ppu, 456);
        assert_eq!(s.first_event(), 64);
        for token in TOKENS {
            assert!(s.first_event() <= s.next_event(token));
        }

        s.schedule(SyncToken::Apu, NEVER);
        assert_eq!(s.first_event(), 456);
    }

    #[test]
    fn pending_tracks_first_event() {
        let mut s = Scheduler::new();
        for token in TOKENS {
            s.schedule(token, 100);
        }
        assert!(!s.pending());
        s.advance(99);
        assert!(!s.pending());
        s.advance(1);
        assert!(s.pending());
    }

    #[test]
    fn rebase_preserves_distances() {
        let mut s = Scheduler::new();
        s.advance(5000);
        s.resync(SyncToken::Dma);
        for token in TOKENS {
            s.schedule(token, 123);
        }
        s.rebase();
        assert_eq!(s.timestamp, 0);
        assert_eq!(s.next_event(SyncToken::Dma), 123);
        assert_eq!(s.last_sync(SyncToken::Dma), 0);
        assert_eq!(s.first_event(), 123);
        assert!(s.last_sync(SyncToken::Timer) < 0);
    }
}
