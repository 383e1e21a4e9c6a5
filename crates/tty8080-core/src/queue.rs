use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct State {
    bytes: VecDeque<u8>,
    // Bumped by `cancel_waiters`; a reader gives up once it changes.
    epoch: u64,
}

/// Unbounded FIFO shared between the transport's reader thread (producer)
/// and the emulated CPU (consumer).
#[derive(Default)]
pub struct InboundQueue {
    state: Mutex<State>,
    ready: Condvar,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_all(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state.bytes.extend(bytes.iter().copied());
        drop(state);
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn try_pop(&self) -> Option<u8> {
        self.state.lock().bytes.pop_front()
    }

    /// Blocks until a byte is available and returns the oldest one.
    ///
    /// Returns `None` only if [`cancel_waiters`](Self::cancel_waiters) is
    /// called while waiting.
    pub fn pop(&self) -> Option<u8> {
        let mut state = self.state.lock();
        let epoch = state.epoch;
        loop {
            if let Some(byte) = state.bytes.pop_front() {
                return Some(byte);
            }
            if state.epoch != epoch {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`. A timeout too
    /// large to express as a deadline waits without one.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<u8> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.pop();
        };
        let mut state = self.state.lock();
        let epoch = state.epoch;
        loop {
            if let Some(byte) = state.bytes.pop_front() {
                return Some(byte);
            }
            if state.epoch != epoch {
                return None;
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return state.bytes.pop_front();
            }
        }
    }

    /// Wakes every blocked reader and makes it return `None`. Queued bytes
    /// are left alone and later reads block as usual.
    pub fn cancel_waiters(&self) {
        let mut state = self.state.lock();
        state.epoch = state.epoch.wrapping_add(1);
        drop(state);
        self.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn bytes_come_out_in_arrival_order() {
        let queue = InboundQueue::new();
        queue.push_all(&[1, 2, 3]);
        queue.push_all(&[]);
        queue.push_all(&[4]);

        let drained: Vec<u8> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(drained, vec![1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn len_does_not_consume() {
        let queue = InboundQueue::new();
        queue.push_all(b"AB");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(b'A'));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pop_blocks_until_push() {
        let queue = Arc::new(InboundQueue::new());
        let reader = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!reader.is_finished());
        queue.push_all(&[0x41]);
        queue.push_all(&[0x42]);

        assert_eq!(reader.join().unwrap(), Some(0x41));
        assert_eq!(queue.try_pop(), Some(0x42));
    }

    #[test]
    fn concurrent_producer_loses_nothing() {
        let queue = Arc::new(InboundQueue::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for chunk in (0..=255u8).collect::<Vec<_>>().chunks(7) {
                    queue.push_all(chunk);
                    thread::yield_now();
                }
            })
        };

        let received: Vec<u8> = (0..256).map(|_| queue.pop().unwrap()).collect();
        producer.join().unwrap();

        assert_eq!(received, (0..=255u8).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_timeout_expires_on_empty_queue() {
        let queue = InboundQueue::new();
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));

        queue.push_all(&[9]);
        assert_eq!(queue.pop_timeout(Duration::from_millis(30)), Some(9));
    }

    #[test]
    fn unrepresentable_timeout_waits_like_pop() {
        let queue = Arc::new(InboundQueue::new());
        queue.push_all(&[3]);
        assert_eq!(queue.pop_timeout(Duration::MAX), Some(3));

        let reader = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop_timeout(Duration::MAX))
        };
        thread::sleep(Duration::from_millis(30));
        queue.push_all(&[4]);
        assert_eq!(reader.join().unwrap(), Some(4));
    }

    #[test]
    fn cancel_wakes_blocked_reader_without_losing_data() {
        let queue = Arc::new(InboundQueue::new());
        let reader = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop())
        };

        // Keep cancelling until the reader has actually parked and noticed.
        while !reader.is_finished() {
            thread::sleep(Duration::from_millis(10));
            queue.cancel_waiters();
        }
        assert_eq!(reader.join().unwrap(), None);

        queue.push_all(&[7]);
        assert_eq!(queue.pop(), Some(7));
    }
}
