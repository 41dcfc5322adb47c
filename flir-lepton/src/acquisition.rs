// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The acquisition loop body: read a frame straight into the arbiter's write buffer, then
//! publish it.
use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::blocking::{i2c, spi};
use embedded_hal::digital::v2::OutputPin;
use log::debug;

use crate::arbiter::{Producer, Publish};
use crate::driver::Lepton;
use crate::error::Error;
use crate::time::Clock;
use crate::vospi::{FrameRead, FrameStatus};

/// Anything frames can be read from.
pub trait FrameSource {
    type Error;

    /// Attempt to read one frame into `buffer`. See [`Lepton::read_frame`].
    fn read_frame(&mut self, buffer: &mut [u8]) -> Result<FrameRead, Self::Error>;
}

impl<I2C, SPI, CS, RST, D, C, E, SE, PE> FrameSource for Lepton<I2C, SPI, CS, RST, D, C>
where
    I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>,
    SPI: spi::Transfer<u8, Error = SE>,
    CS: OutputPin<Error = PE>,
    RST: OutputPin<Error = PE>,
    D: DelayUs<u32>,
    C: Clock,
{
    type Error = Error<E, SE, PE>;

    fn read_frame(&mut self, buffer: &mut [u8]) -> Result<FrameRead, Self::Error> {
        Lepton::read_frame(self, buffer)
    }
}

/// Running totals, mostly for logging.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AcquisitionStats {
    pub cycles: u64,

    /// Frames read completely.
    pub frames: u64,

    pub published: u64,

    /// Publish attempts refused because a reader was busy.
    pub dropped: u64,

    /// Reads abandoned after losing synchronization.
    pub aborted: u64,

    pub errors: u64,
}

/// What a single [`Acquisition::cycle`] did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CycleOutcome {
    pub read: FrameRead,

    /// Set when a publish was attempted, either for a new frame or a previously dropped one.
    pub publish: Option<Publish>,
}

/// Moves frames from a [`FrameSource`] into a [`Producer`].
///
/// A completed frame that can't be published right away (because a reader is busy) stays
/// pending, and publishing is retried on every later cycle until either it succeeds or the next
/// read starts overwriting the buffer.
#[derive(Debug)]
pub struct Acquisition {
    producer: Producer,

    pending_publish: bool,

    stats: AcquisitionStats,
}

impl Acquisition {
    pub fn new(producer: Producer) -> Self {
        Self {
            producer,
            pending_publish: false,
            stats: AcquisitionStats::default(),
        }
    }

    pub fn stats(&self) -> &AcquisitionStats {
        &self.stats
    }

    /// Whether a completed frame is still waiting to be published.
    pub fn has_pending_publish(&self) -> bool {
        self.pending_publish
    }

    /// Read once from `source`, publishing any completed frame.
    ///
    /// Errors are returned after the cycle's bookkeeping is done, so the caller can log them and
    /// call `cycle` again.
    pub fn cycle<S: FrameSource>(&mut self, source: &mut S) -> Result<CycleOutcome, S::Error> {
        self.stats.cycles += 1;
        let read = match self.producer.write_with(|buffer| source.read_frame(buffer)) {
            Ok(read) => read,
            Err(err) => {
                // The write buffer may have been partially overwritten.
                self.pending_publish = false;
                self.stats.errors += 1;
                return Err(err);
            }
        };
        if read.buffer_written {
            self.pending_publish = false;
        }
        match read.status {
            FrameStatus::Complete => {
                self.stats.frames += 1;
                self.pending_publish = true;
            }
            FrameStatus::Aborted(_) => self.stats.aborted += 1,
            FrameStatus::NoFrame(_) => (),
        }
        let publish = if self.pending_publish {
            let publish = self.producer.publish();
            match publish {
                Publish::Published(_) => {
                    self.pending_publish = false;
                    self.stats.published += 1;
                }
                Publish::Dropped => self.stats.dropped += 1,
            }
            Some(publish)
        } else {
            None
        };
        if self.stats.cycles % 1000 == 0 {
            debug!("Acquisition stats: {:?}", self.stats);
        }
        Ok(CycleOutcome { read, publish })
    }
}
