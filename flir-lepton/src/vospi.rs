// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Video over SPI (VoSPI) frame synchronization.
//!
//! The camera streams fixed-size packets, each starting with a four byte header (a 16-bit ID and
//! a 16-bit CRC) followed by the payload. Packets are grouped into segments, and segments into
//! frames. The reader has no way to tell the camera where it is in the stream, so it has to
//! recognize frame boundaries from the packet IDs and, when it loses track, stop reading long
//! enough for the camera to time out and restart the stream.
use core::fmt;

use embedded_hal::blocking::spi;
use embedded_hal::digital::v2::OutputPin;
use log::{debug, trace, warn};

use crate::error::{LibraryError, StreamError};
use crate::video::{FrameGeometry, MAX_PACKET_PAYLOAD_LEN};

/// The length of a packet header.
pub const HEADER_LEN: usize = 4;

/// How to treat packet CRCs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CrcPolicy {
    /// Don't check CRCs.
    Ignore,

    /// Abort the frame (and resynchronize) when a packet CRC doesn't match.
    Validate,
}

/// Tuning for frame synchronization.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SyncConfig {
    /// How long chip select is held deasserted to force the camera to restart the stream.
    pub resync_cooldown_ms: u64,

    /// The packet carrying the segment number on segmented sensors.
    pub segment_packet: usize,

    pub crc: CrcPolicy,

    /// How many discard packets are tolerated inside a single frame.
    pub max_discard_packets: usize,

    /// How many invalid (segment number zero) segments are tolerated inside a single frame.
    pub max_discarded_segments: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            resync_cooldown_ms: 185,
            segment_packet: 20,
            crc: CrcPolicy::Ignore,
            max_discard_packets: 1000,
            max_discarded_segments: 16,
        }
    }
}

/// A decoded packet header.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct PacketHeader {
    id: u16,
    crc: u16,
}

impl PacketHeader {
    pub fn from_bytes(bytes: [u8; HEADER_LEN]) -> Self {
        Self {
            id: u16::from_be_bytes([bytes[0], bytes[1]]),
            crc: u16::from_be_bytes([bytes[2], bytes[3]]),
        }
    }

    /// Discard packets are sent when the camera has nothing to send.
    pub fn is_discard(&self) -> bool {
        self.id & 0x0F00 == 0x0F00
    }

    pub fn packet_number(&self) -> u16 {
        self.id & 0x0FFF
    }

    /// The segment number, only meaningful on the segment packet.
    pub fn segment(&self) -> u8 {
        ((self.id >> 12) & 0x7) as u8
    }

    pub fn crc(&self) -> u16 {
        self.crc
    }

    /// Check the CRC against the packet payload.
    pub fn crc_matches(&self, payload: &[u8]) -> bool {
        packet_crc(self.id, payload) == self.crc
    }
}

impl fmt::Debug for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketHeader(id: {:#06X}, crc: {:#06X})", self.id, self.crc)
    }
}

/// CRC-16-CCITT with polynomial 0x1021 and no reflection.
pub fn crc16_ccitt(mut crc: u16, bytes: &[u8]) -> u16 {
    for byte in bytes {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// The CRC the camera computes for a packet.
///
/// The top nibble of the ID and the CRC field itself are zeroed for the calculation.
pub fn packet_crc(id: u16, payload: &[u8]) -> u16 {
    let id_bytes = (id & 0x0FFF).to_be_bytes();
    let crc = crc16_ccitt(0, &[id_bytes[0], id_bytes[1], 0, 0]);
    crc16_ccitt(crc, payload)
}

/// Why a read didn't produce a frame, without anything being wrong.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NoFrameReason {
    /// A resynchronization cooldown is in progress.
    Cooldown,

    /// The camera is sending discard packets (no frame is ready yet).
    Discard,
}

/// Why a frame read was abandoned partway through.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Desync {
    PacketNumber { expected: u16, actual: u16 },
    Segment { expected: u8, actual: u8 },
    Crc { packet: u16 },
    /// Too many discard packets were interleaved in one frame.
    DiscardOverrun,
    /// Too many invalid segments were sent in one frame.
    SegmentOverrun,
}

impl fmt::Display for Desync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Desync::PacketNumber { expected, actual } => {
                write!(f, "expected packet {}, got packet {}", expected, actual)
            }
            Desync::Segment { expected, actual } => {
                write!(f, "expected segment {}, got segment {}", expected, actual)
            }
            Desync::Crc { packet } => write!(f, "CRC mismatch on packet {}", packet),
            Desync::DiscardOverrun => write!(f, "too many discard packets inside a frame"),
            Desync::SegmentOverrun => write!(f, "too many invalid segments inside a frame"),
        }
    }
}

/// The outcome of a single frame read.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameStatus {
    /// A whole frame was written to the buffer.
    Complete,

    NoFrame(NoFrameReason),

    /// The read lost synchronization. A resynchronization has been scheduled.
    Aborted(Desync),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameRead {
    pub status: FrameStatus,

    /// Whether any part of the destination buffer was modified.
    pub buffer_written: bool,
}

impl FrameRead {
    pub fn is_complete(&self) -> bool {
        self.status == FrameStatus::Complete
    }
}

/// Reads frames from the camera's VoSPI port.
#[derive(Debug)]
pub struct VoSpi<SPI, CS> {
    spi: SPI,

    /// Chip select, active low.
    cs: CS,

    geometry: FrameGeometry,

    config: SyncConfig,

    resync_requested: bool,

    /// When the current resynchronization cooldown started, in milliseconds.
    resync_started: Option<u64>,
}

impl<SPI, CS, SE, PE> VoSpi<SPI, CS>
where
    SPI: spi::Transfer<u8, Error = SE>,
    CS: OutputPin<Error = PE>,
{
    pub fn new(spi: SPI, cs: CS, geometry: FrameGeometry) -> Self {
        Self::with_config(spi, cs, geometry, SyncConfig::default())
    }

    pub fn with_config(spi: SPI, cs: CS, geometry: FrameGeometry, config: SyncConfig) -> Self {
        Self {
            spi,
            cs,
            geometry,
            config,
            resync_requested: false,
            resync_started: None,
        }
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Change the expected frame geometry.
    ///
    /// A resynchronization is scheduled, as the camera will be restarting its stream anyways.
    pub fn set_geometry(&mut self, geometry: FrameGeometry) -> Result<(), LibraryError> {
        geometry.validate()?;
        self.geometry = geometry;
        self.request_resync();
        Ok(())
    }

    pub fn sync_config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn set_sync_config(&mut self, config: SyncConfig) {
        self.config = config;
    }

    /// Schedule a resynchronization, starting with the next read.
    pub fn request_resync(&mut self) {
        self.resync_requested = true;
    }

    /// Whether a resynchronization is pending or in progress.
    pub fn is_resynchronizing(&self) -> bool {
        self.resync_requested || self.resync_started.is_some()
    }

    /// Attempt to read a single frame into `buffer`.
    ///
    /// `now_ms` is a monotonic timestamp used for resynchronization timing. `buffer` must be at
    /// least [`FrameGeometry::stream_len`] bytes, anything past that is left untouched.
    pub fn read_frame(
        &mut self,
        now_ms: u64,
        buffer: &mut [u8],
    ) -> Result<FrameRead, StreamError<SE, PE>> {
        let required = self.geometry.stream_len();
        if buffer.len() < required {
            return Err(LibraryError::BufferTooSmall {
                required,
                actual: buffer.len(),
            }
            .into());
        }
        if self.resync_requested {
            self.resync_requested = false;
            self.resync_started = Some(now_ms);
            debug!("Starting VoSPI resynchronization");
        }
        if let Some(started) = self.resync_started {
            if now_ms.saturating_sub(started) < self.config.resync_cooldown_ms {
                self.cs.set_high().map_err(StreamError::ChipSelect)?;
                return Ok(FrameRead {
                    status: FrameStatus::NoFrame(NoFrameReason::Cooldown),
                    buffer_written: false,
                });
            }
            self.resync_started = None;
        }
        self.cs.set_low().map_err(StreamError::ChipSelect)?;
        let mut buffer_written = false;
        let result = self.read_segments(&mut buffer[..required], &mut buffer_written);
        let deselect = self.cs.set_high().map_err(StreamError::ChipSelect);
        let status = match result {
            Ok(status) => status,
            Err(err) => {
                // Whatever was in flight is lost, so the stream position is unknown.
                self.request_resync();
                return Err(err);
            }
        };
        deselect?;
        if let FrameStatus::Aborted(reason) = status {
            warn!("Lost VoSPI synchronization: {}", reason);
            self.request_resync();
        }
        Ok(FrameRead {
            status,
            buffer_written,
        })
    }

    fn read_segments(
        &mut self,
        buffer: &mut [u8],
        buffer_written: &mut bool,
    ) -> Result<FrameStatus, StreamError<SE, PE>> {
        let geometry = self.geometry;
        let payload_len = geometry.packet_payload_len;
        let segmented = geometry.segments_per_frame > 1;
        let mut discarded_packets = 0;
        let mut discarded_segments = 0;
        let mut segment = 1;
        while segment <= geometry.segments_per_frame {
            let mut packet = 0;
            let mut invalid_segment = false;
            while packet < geometry.packets_per_segment {
                let header = self.read_header()?;
                if header.is_discard() {
                    self.skip_payload(payload_len)?;
                    if segment == 1 && packet == 0 {
                        return Ok(FrameStatus::NoFrame(NoFrameReason::Discard));
                    }
                    discarded_packets += 1;
                    if discarded_packets > self.config.max_discard_packets {
                        return Ok(FrameStatus::Aborted(Desync::DiscardOverrun));
                    }
                    continue;
                }
                let offset = ((segment - 1) * geometry.packets_per_segment + packet) * payload_len;
                let payload = &mut buffer[offset..(offset + payload_len)];
                self.spi.transfer(payload).map_err(StreamError::Bus)?;
                *buffer_written = true;
                if self.config.crc == CrcPolicy::Validate && !header.crc_matches(payload) {
                    return Ok(FrameStatus::Aborted(Desync::Crc {
                        packet: header.packet_number(),
                    }));
                }
                if usize::from(header.packet_number()) != packet {
                    return Ok(FrameStatus::Aborted(Desync::PacketNumber {
                        expected: packet as u16,
                        actual: header.packet_number(),
                    }));
                }
                if segmented && packet == self.config.segment_packet {
                    match header.segment() {
                        0 => invalid_segment = true,
                        actual if usize::from(actual) != segment => {
                            return Ok(FrameStatus::Aborted(Desync::Segment {
                                expected: segment as u8,
                                actual,
                            }))
                        }
                        _ => (),
                    }
                }
                packet += 1;
            }
            if invalid_segment {
                // Segment number zero marks a segment the camera wants thrown away, the same
                // segment gets read again.
                trace!("Discarding invalid segment {}", segment);
                discarded_segments += 1;
                if discarded_segments > self.config.max_discarded_segments {
                    return Ok(FrameStatus::Aborted(Desync::SegmentOverrun));
                }
                continue;
            }
            segment += 1;
        }
        Ok(FrameStatus::Complete)
    }

    fn read_header(&mut self) -> Result<PacketHeader, StreamError<SE, PE>> {
        let mut header = [0u8; HEADER_LEN];
        self.spi.transfer(&mut header).map_err(StreamError::Bus)?;
        Ok(PacketHeader::from_bytes(header))
    }

    fn skip_payload(&mut self, payload_len: usize) -> Result<(), StreamError<SE, PE>> {
        let mut scratch = [0u8; MAX_PACKET_PAYLOAD_LEN];
        self.spi
            .transfer(&mut scratch[..payload_len])
            .map_err(StreamError::Bus)?;
        Ok(())
    }

    /// Give back the SPI bus and chip select pin.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}
