// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Fanning published frames out to a bounded set of streaming clients.
extern crate std;

use core::fmt;
use std::sync::Mutex;
use std::time::Duration;
use std::vec::Vec;

use arrayvec::ArrayVec;
use log::{debug, trace, warn};

use crate::arbiter::Consumer;
use crate::video::FrameGeometry;

/// Something frames can be streamed to, like a network connection.
pub trait StreamClient {
    type Error: fmt::Debug;

    /// Whether the client is still worth writing to.
    fn is_connected(&self) -> bool;

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Converts raw frames into whatever format clients expect.
pub trait FrameEncoder {
    type Error: fmt::Debug;

    /// Append the encoded form of `frame` to `output`.
    fn encode(
        &mut self,
        frame: &[u8],
        geometry: &FrameGeometry,
        output: &mut Vec<u8>,
    ) -> Result<(), Self::Error>;
}

/// Frames passed through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawEncoder;

impl FrameEncoder for RawEncoder {
    type Error = core::convert::Infallible;

    fn encode(
        &mut self,
        frame: &[u8],
        geometry: &FrameGeometry,
        output: &mut Vec<u8>,
    ) -> Result<(), Self::Error> {
        output.extend_from_slice(&frame[..geometry.frame_len().min(frame.len())]);
        Ok(())
    }
}

/// The results of writing a frame to every client.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FanOut {
    pub delivered: usize,

    /// Clients removed, either because they disconnected or a write failed.
    pub dropped: usize,
}

/// A fixed-capacity list of clients.
#[derive(Debug)]
pub struct ClientRegistry<C, const N: usize> {
    clients: Mutex<ArrayVec<C, N>>,
}

impl<C: StreamClient, const N: usize> Default for ClientRegistry<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, const N: usize> ClientRegistry<C, N>
where
    C: StreamClient,
{
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(ArrayVec::new()),
        }
    }

    /// Add a client, handing it back if the registry is full.
    pub fn register(&self, client: C) -> Result<(), C> {
        let mut clients = self.lock();
        clients.try_push(client).map_err(|err| {
            warn!("Client registry full ({} clients), rejecting client", N);
            err.element()
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Remove disconnected clients, keeping the rest in order. Returns how many were removed.
    pub fn compact(&self) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|client| client.is_connected());
        before - clients.len()
    }

    /// Write `bytes` to every connected client.
    ///
    /// Clients that have disconnected or fail the write are removed.
    pub fn fan_out(&self, bytes: &[u8]) -> FanOut {
        let mut clients = self.lock();
        let before = clients.len();
        let mut delivered = 0;
        clients.retain(|client| {
            if !client.is_connected() {
                return false;
            }
            match client.write_all(bytes) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(err) => {
                    debug!("Dropping client after failed write: {:?}", err);
                    false
                }
            }
        });
        FanOut {
            delivered,
            dropped: before - clients.len(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ArrayVec<C, N>> {
        self.clients.lock().expect("client registry lock poisoned")
    }
}

/// What happened during a single [`FrameStreamer::serve_next`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServeOutcome {
    /// Nobody is listening, so nothing was waited for.
    NoClients,

    /// No new frame was published before the timeout.
    NoNewFrame,

    /// The frame couldn't be encoded and was skipped.
    EncodeFailed { sequence: u64 },

    Delivered { sequence: u64, fan_out: FanOut },
}

/// Streams each newly published frame to every registered client.
#[derive(Debug)]
pub struct FrameStreamer<E, C, const N: usize> {
    consumer: Consumer,

    encoder: E,

    registry: ClientRegistry<C, N>,

    geometry: FrameGeometry,

    last_sequence: u64,

    /// Reused between frames.
    encoded: Vec<u8>,
}

impl<E, C, const N: usize> FrameStreamer<E, C, N>
where
    E: FrameEncoder,
    C: StreamClient,
{
    pub fn new(consumer: Consumer, encoder: E, geometry: FrameGeometry) -> Self {
        Self {
            consumer,
            encoder,
            registry: ClientRegistry::new(),
            geometry,
            last_sequence: 0,
            encoded: Vec::new(),
        }
    }

    pub fn registry(&self) -> &ClientRegistry<C, N> {
        &self.registry
    }

    /// Update the geometry handed to the encoder, after a video format change.
    pub fn set_geometry(&mut self, geometry: FrameGeometry) {
        self.geometry = geometry;
    }

    /// The sequence number of the last frame handled.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Wait up to `timeout` for a new frame, then encode it once and send it to every client.
    ///
    /// The frame is released before writing to clients, so slow clients don't hold up the
    /// producer.
    pub fn serve_next(&mut self, timeout: Duration) -> ServeOutcome {
        if self.registry.compact() > 0 {
            debug!("Removed disconnected clients");
        }
        if self.registry.is_empty() {
            return ServeOutcome::NoClients;
        }
        let sequence = {
            let frame = match self.consumer.wait_for_frame(self.last_sequence, timeout) {
                Some(frame) => frame,
                None => return ServeOutcome::NoNewFrame,
            };
            self.encoded.clear();
            if let Err(err) = self
                .encoder
                .encode(&frame, &self.geometry, &mut self.encoded)
            {
                warn!("Failed to encode frame {}: {:?}", frame.sequence(), err);
                self.last_sequence = frame.sequence();
                return ServeOutcome::EncodeFailed {
                    sequence: frame.sequence(),
                };
            }
            frame.sequence()
        };
        if sequence > self.last_sequence + 1 && self.last_sequence != 0 {
            trace!(
                "Skipped {} frames before {}",
                sequence - self.last_sequence - 1,
                sequence
            );
        }
        self.last_sequence = sequence;
        let fan_out = self.registry.fan_out(&self.encoded);
        ServeOutcome::Delivered { sequence, fan_out }
    }
}
