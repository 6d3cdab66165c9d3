use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Stereo frames per sample buffer.
pub const SAMPLE_BUFFER_LEN: usize = 2048;

/// Number of buffers in flight.
pub const SAMPLE_BUFFER_COUNT: usize = 2;

/// One interleaved stereo sample pair.
pub type StereoFrame = [i16; 2];

/// Counting permit, the cross-thread primitive of the sample handshake.
struct Semaphore {
    permits: Mutex<u32>,
    available: Condvar,
}

impl Semaphore {
    fn new(permits: u32) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut permits = self.permits.lock().unwrap();
        while *permits == 0 {
            permits = self.available.wait(permits).unwrap();
        }
        *permits -= 1;
    }

    fn try_wait(&self) -> bool {
        let mut permits = self.permits.lock().unwrap();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    fn post(&self) {
        *self.permits.lock().unwrap() += 1;
        self.available.notify_one();
    }
}

struct SampleBuffer {
    frames: Mutex<Box<[StereoFrame; SAMPLE_BUFFER_LEN]>>,
    /// Posted by the consumer once it has drained the buffer.
    free: Semaphore,
    /// Posted by the producer once the buffer is full.
    ready: Semaphore,
}

impl SampleBuffer {
    fn new() -> Self {
        Self {
            frames: Mutex::new(Box::new([[0; 2]; SAMPLE_BUFFER_LEN])),
            free: Semaphore::new(1),
            ready: Semaphore::new(0),
        }
    }
}

struct Shared {
    buffers: [SampleBuffer; SAMPLE_BUFFER_COUNT],
    /// Whether a consumer exists. Until one does, the producer overwrites
    /// buffers instead of blocking, so headless runs never stall on audio.
    connected: AtomicBool,
}

/// Producer half, owned by the APU. Frames go into the current buffer; when
/// it fills, `ready` is posted and filling moves to the next buffer after
/// acquiring its `free` permit.
pub struct AudioProducer {
    shared: Arc<Shared>,
    buffer_index: usize,
    frame_index: usize,
}

/// Consumer half, handed to the audio callback thread.
pub struct AudioConsumer {
    shared: Arc<Shared>,
    buffer_index: usize,
}

impl AudioProducer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                buffers: [SampleBuffer::new(), SampleBuffer::new()],
                connected: AtomicBool::new(false),
            }),
            buffer_index: 0,
            frame_index: 0,
        }
    }

    /// Creates the consumer half and switches the producer to the blocking
    /// handshake. Intended to be called once, before audio starts.
    pub fn consumer(&self) -> AudioConsumer {
        self.shared.connected.store(true, Ordering::Release);
        AudioConsumer {
            shared: Arc::clone(&self.shared),
            buffer_index: 0,
        }
    }

    /// Appends one stereo frame. This is the only call in the core that may
    /// block, and only while a consumer is attached.
    pub fn push(&mut self, left: i16, right: i16) {
        let buffer = &self.shared.buffers[self.buffer_index];

        if self.frame_index == 0 {
            if self.shared.connected.load(Ordering::Acquire) {
                buffer.free.wait();
            } else {
                // Detached: claim the permit when it exists, overwrite if not.
                let _ = buffer.free.try_wait();
            }
        }

        buffer.frames.lock().unwrap()[self.frame_index] = [left, right];
        self.frame_index += 1;

        if self.frame_index == SAMPLE_BUFFER_LEN {
            if self.shared.connected.load(Ordering::Acquire) {
                buffer.ready.post();
            } else {
                buffer.free.post();
            }
            self.buffer_index = (self.buffer_index + 1) % SAMPLE_BUFFER_COUNT;
            self.frame_index = 0;
        }
    }

    /// Frames already written into the buffer currently being filled.
    pub fn pending_frames(&self) -> usize {
        self.frame_index
    }
}

impl Default for AudioProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioConsumer {
    /// Copies the next ready buffer into `out`. Returns false (leaving `out`
    /// untouched) when no buffer is ready; the caller emits silence.
    pub fn pop(&mut self, out: &mut [StereoFrame; SAMPLE_BUFFER_LEN]) -> bool {
        let buffer = &self.shared.buffers[self.buffer_index];
        if !buffer.ready.try_wait() {
            return false;
        }

        out.copy_from_slice(&buffer.frames.lock().unwrap()[..]);
        buffer.free.post();
        self.buffer_index = (self.buffer_index + 1) % SAMPLE_BUFFER_COUNT;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_producer_never_blocks() {
        let mut producer = AudioProducer::new();
        for i in 0..(SAMPLE_BUFFER_LEN * SAMPLE_BUFFER_COUNT * 3) {
            producer.push(i as i16, -(i as i16));
        }
    }

    #[test]
    fn frames_round_trip_in_fifo_order() {
        let mut producer = AudioProducer::new();
        let mut consumer = producer.consumer();
        let mut out = Box::new([[0i16; 2]; SAMPLE_BUFFER_LEN]);

        assert!(!consumer.pop(&mut out));

        for i in 0..SAMPLE_BUFFER_LEN {
            producer.push(i as i16, 2 * i as i16);
        }
        assert!(consumer.pop(&mut out));
        assert_eq!(out[0], [0, 0]);
        assert_eq!(out[100], [100, 200]);
        assert!(!consumer.pop(&mut out));
    }

    #[test]
    fn ready_and_free_permits_balance() {
        let mut producer = AudioProducer::new();
        let mut consumer = producer.consumer();
        let mut out = Box::new([[0i16; 2]; SAMPLE_BUFFER_LEN]);

        // Both buffers start free, so two full buffers fit without a drain.
        for _ in 0..2 * SAMPLE_BUFFER_LEN {
            producer.push(1, 1);
        }
        assert!(consumer.pop(&mut out));
        assert!(consumer.pop(&mut out));
        assert!(!consumer.pop(&mut out));

        // The drain handed the permits back; two more buffers fit again.
        for _ in 0..2 * SAMPLE_BUFFER_LEN {
            producer.push(2, 2);
        }
        assert!(consumer.pop(&mut out));
        assert_eq!(out[0], [2, 2]);
    }
}
