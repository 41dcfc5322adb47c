// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Double-buffered hand-off of frames from the acquisition thread to any number of readers.
//!
//! The producer always writes into one buffer while readers share the other. Publishing a frame
//! swaps the two, but only if nobody is reading at that moment. When a reader is busy the publish
//! is dropped instead of waiting, as stalling the acquisition thread would lose synchronization
//! with the camera.
extern crate std;

use std::boxed::Box;
use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::time::Duration;
use std::vec;
use std::vec::Vec;

use log::{trace, warn};

#[derive(Debug)]
struct ArbitrationState {
    /// The buffer the producer is writing into. Readers use the other one.
    write_index: usize,

    /// How many readers are holding the read buffer.
    readers: usize,

    /// Incremented every time a frame is published.
    sequence: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ArbitrationState>,

    published: Condvar,

    /// The lock on each buffer is never contended, the state above decides who gets which.
    buffers: [RwLock<Box<[u8]>>; 2],

    frame_len: usize,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ArbitrationState> {
        self.state.lock().expect("frame arbitration lock poisoned")
    }
}

/// The result of trying to publish a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Publish {
    /// The frame is now visible to readers with this sequence number.
    Published(u64),

    /// A reader was holding the other buffer, so the frame stays in the write buffer.
    Dropped,
}

/// Creates the producer and consumer halves sharing a pair of frame buffers.
#[derive(Debug)]
pub struct FrameArbiter;

impl FrameArbiter {
    /// Allocate two buffers of `frame_len` bytes.
    ///
    /// Until the first frame is published readers see a zeroed frame with sequence number 0.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(frame_len: usize) -> (Producer, Consumer) {
        let shared = Arc::new(Shared {
            state: Mutex::new(ArbitrationState {
                write_index: 0,
                readers: 0,
                sequence: 0,
            }),
            published: Condvar::new(),
            buffers: [
                RwLock::new(vec![0u8; frame_len].into_boxed_slice()),
                RwLock::new(vec![0u8; frame_len].into_boxed_slice()),
            ],
            frame_len,
        });
        let producer = Producer {
            shared: Arc::clone(&shared),
            write_index: 0,
        };
        (producer, Consumer { shared })
    }
}

/// The writing half. There is only ever one of these.
#[derive(Debug)]
pub struct Producer {
    shared: Arc<Shared>,

    /// A copy of the shared write index. Only the producer changes it.
    write_index: usize,
}

impl Producer {
    pub fn frame_len(&self) -> usize {
        self.shared.frame_len
    }

    /// Run `f` with mutable access to the write buffer.
    pub fn write_with<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut buffer = self.shared.buffers[self.write_index]
            .write()
            .expect("frame buffer lock poisoned");
        f(&mut buffer)
    }

    /// Make the write buffer visible to readers, if none of them are busy.
    pub fn publish(&mut self) -> Publish {
        let mut state = self.shared.lock_state();
        if state.readers > 0 {
            let readers = state.readers;
            drop(state);
            warn!("Dropping frame, {} readers still busy", readers);
            return Publish::Dropped;
        }
        state.write_index ^= 1;
        state.sequence += 1;
        self.write_index = state.write_index;
        let sequence = state.sequence;
        drop(state);
        self.shared.published.notify_all();
        trace!("Published frame {}", sequence);
        Publish::Published(sequence)
    }
}

/// The reading half. Clone it to share frames between threads.
#[derive(Clone, Debug)]
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    pub fn frame_len(&self) -> usize {
        self.shared.frame_len
    }

    /// The sequence number of the most recently published frame.
    pub fn sequence(&self) -> u64 {
        self.shared.lock_state().sequence
    }

    /// Borrow the most recently published frame.
    ///
    /// Frames can't be published while any guard is alive, so hold on to it only as long as
    /// needed.
    pub fn acquire(&self) -> FrameGuard<'_> {
        let state = self.shared.lock_state();
        self.acquire_locked(state)
    }

    /// Wait up to `timeout` for a frame newer than `last_seen` to be published.
    pub fn wait_for_frame(&self, last_seen: u64, timeout: Duration) -> Option<FrameGuard<'_>> {
        let state = self.shared.lock_state();
        let (state, _) = self
            .shared
            .published
            .wait_timeout_while(state, timeout, |state| state.sequence <= last_seen)
            .expect("frame arbitration lock poisoned");
        if state.sequence <= last_seen {
            None
        } else {
            Some(self.acquire_locked(state))
        }
    }

    /// Copy out the most recently published frame.
    pub fn snapshot(&self) -> (u64, Vec<u8>) {
        let guard = self.acquire();
        (guard.sequence(), guard.to_vec())
    }

    fn acquire_locked(&self, mut state: MutexGuard<'_, ArbitrationState>) -> FrameGuard<'_> {
        let index = state.write_index ^ 1;
        state.readers += 1;
        let sequence = state.sequence;
        drop(state);
        let buffer = self.shared.buffers[index]
            .read()
            .expect("frame buffer lock poisoned");
        FrameGuard {
            shared: &*self.shared,
            buffer: Some(buffer),
            sequence,
            index,
        }
    }

    #[cfg(test)]
    fn write_index(&self) -> usize {
        self.shared.lock_state().write_index
    }
}

/// Read access to a published frame.
#[derive(Debug)]
pub struct FrameGuard<'a> {
    shared: &'a Shared,

    buffer: Option<RwLockReadGuard<'a, Box<[u8]>>>,

    sequence: u64,

    index: usize,
}

impl<'a> FrameGuard<'a> {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl<'a> Deref for FrameGuard<'a> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.buffer {
            Some(buffer) => &buffer[..],
            None => &[],
        }
    }
}

impl<'a> Drop for FrameGuard<'a> {
    fn drop(&mut self) {
        // Release the buffer before telling the producer it's free.
        self.buffer.take();
        let mut state = self.shared.lock_state();
        state.readers = state
            .readers
            .checked_sub(1)
            .expect("frame reader count underflow");
    }
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn nothing_published() {
        let (_producer, consumer) = FrameArbiter::new(16);
        let guard = consumer.acquire();
        assert_eq!(guard.sequence(), 0);
        assert_eq!(&guard[..], &[0u8; 16]);
    }

    #[test]
    fn publish_and_acquire() {
        let (mut producer, consumer) = FrameArbiter::new(4);
        producer.write_with(|buf| buf.copy_from_slice(&[1, 2, 3, 4]));
        // Not visible until published
        assert_eq!(&consumer.acquire()[..], &[0, 0, 0, 0]);
        assert_eq!(producer.publish(), Publish::Published(1));
        let (sequence, frame) = consumer.snapshot();
        assert_eq!(sequence, 1);
        assert_eq!(frame, [1, 2, 3, 4]);
        assert_eq!(consumer.sequence(), 1);
    }

    #[test]
    fn busy_reader_drops_publishes() {
        let (mut producer, consumer) = FrameArbiter::new(4);
        let guard = consumer.acquire();
        for value in 0..5u8 {
            producer.write_with(|buf| buf.fill(value));
            assert_eq!(producer.publish(), Publish::Dropped);
        }
        assert_eq!(consumer.sequence(), 0);
        drop(guard);
        assert_eq!(producer.publish(), Publish::Published(1));
        // Only the last write survives
        assert_eq!(consumer.snapshot(), (1, vec![4, 4, 4, 4]));
    }

    #[test]
    fn multiple_readers() {
        let (mut producer, consumer) = FrameArbiter::new(2);
        let other = consumer.clone();
        let first = consumer.acquire();
        let second = other.acquire();
        assert_eq!(producer.publish(), Publish::Dropped);
        drop(first);
        assert_eq!(producer.publish(), Publish::Dropped);
        drop(second);
        assert_eq!(producer.publish(), Publish::Published(1));
    }

    #[test]
    fn wait_timeout() {
        let (_producer, consumer) = FrameArbiter::new(2);
        assert!(consumer
            .wait_for_frame(0, Duration::from_millis(10))
            .is_none());
    }

    #[test]
    fn wait_for_publish() {
        let (mut producer, consumer) = FrameArbiter::new(2);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.write_with(|buf| buf.fill(7));
            producer.publish()
        });
        let guard = consumer
            .wait_for_frame(0, Duration::from_secs(10))
            .expect("frame should have been published");
        assert_eq!(guard.sequence(), 1);
        assert_eq!(&guard[..], &[7, 7]);
        drop(guard);
        assert_eq!(handle.join().unwrap(), Publish::Published(1));
        // Already seen frames don't wake waiters
        assert!(consumer
            .wait_for_frame(1, Duration::from_millis(10))
            .is_none());
    }

    #[test]
    fn concurrent_readers_see_whole_frames() {
        const FRAME_LEN: usize = 4096;
        const PUBLISHES: u64 = 500;
        let (mut producer, consumer) = FrameArbiter::new(FRAME_LEN);
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let consumer = consumer.clone();
                thread::spawn(move || {
                    let mut last_seen = 0;
                    while last_seen < PUBLISHES {
                        let guard = match consumer.wait_for_frame(
                            last_seen,
                            Duration::from_millis(100),
                        ) {
                            Some(guard) => guard,
                            None => continue,
                        };
                        assert_ne!(consumer.write_index(), guard.index);
                        let expected = guard.sequence() as u8;
                        assert!(guard.iter().all(|b| *b == expected));
                        assert!(guard.sequence() > last_seen);
                        last_seen = guard.sequence();
                    }
                })
            })
            .collect();
        let mut published = 0;
        while published < PUBLISHES {
            let next = published + 1;
            producer.write_with(|buf| buf.fill(next as u8));
            match producer.publish() {
                Publish::Published(sequence) => {
                    assert_eq!(sequence, next);
                    published = sequence;
                }
                Publish::Dropped => thread::yield_now(),
            }
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(consumer.sequence(), PUBLISHES);
    }
}
