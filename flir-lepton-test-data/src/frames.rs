// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Builders for synthetic VoSPI packet streams.

/// The length of a VoSPI packet header (ID word and CRC word).
pub const HEADER_LEN: usize = 4;

/// A packet ID the camera uses for discard packets.
pub const DISCARD_ID: u16 = 0x0F00;

/// The packet index carrying the segment number on segmented sensors.
pub const SEGMENT_PACKET: usize = 20;

/// The shape of a VoSPI stream, independent of pixel dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamGeometry {
    pub packet_payload_len: usize,
    pub packets_per_segment: usize,
    pub segments_per_frame: usize,
}

impl StreamGeometry {
    /// 160x120, 14-bit pixels in four segments.
    pub const LEPTON_3_RAW14: Self = Self {
        packet_payload_len: 160,
        packets_per_segment: 60,
        segments_per_frame: 4,
    };

    /// 160x120, 24-bit RGB pixels in four segments.
    pub const LEPTON_3_RGB888: Self = Self {
        packet_payload_len: 240,
        packets_per_segment: 60,
        segments_per_frame: 4,
    };

    /// 80x60, 14-bit pixels in a single segment.
    pub const LEPTON_2_RAW14: Self = Self {
        packet_payload_len: 160,
        packets_per_segment: 60,
        segments_per_frame: 1,
    };

    pub fn segment_len(&self) -> usize {
        self.packet_payload_len * self.packets_per_segment
    }

    pub fn frame_len(&self) -> usize {
        self.segment_len() * self.segments_per_frame
    }

    /// The number of bytes on the wire for one packet.
    pub fn packet_len(&self) -> usize {
        HEADER_LEN + self.packet_payload_len
    }
}

/// CRC-16-CCITT (polynomial 0x1021, initial value 0) over a packet.
///
/// The camera computes the CRC with the top nibble of the ID and the whole CRC field cleared.
pub fn vospi_crc(id: u16, payload: &[u8]) -> u16 {
    let id_bytes = (id & 0x0FFF).to_be_bytes();
    id_bytes
        .iter()
        .chain([0u8, 0u8].iter())
        .chain(payload.iter())
        .fold(0u16, |crc, byte| {
            (0..8).fold(crc ^ (u16::from(*byte) << 8), |crc, _| {
                if crc & 0x8000 != 0 {
                    (crc << 1) ^ 0x1021
                } else {
                    crc << 1
                }
            })
        })
}

/// A packet with a correct CRC.
pub fn packet(id: u16, payload: &[u8]) -> Vec<u8> {
    packet_with_crc(id, vospi_crc(id, payload), payload)
}

pub fn packet_with_crc(id: u16, crc: u16, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&id.to_be_bytes());
    bytes.extend_from_slice(&crc.to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// A discard packet with a junk payload.
pub fn discard_packet(payload_len: usize) -> Vec<u8> {
    let payload = vec![0xA5; payload_len];
    packet_with_crc(DISCARD_ID, 0xFFFF, &payload)
}

/// Packetize one segment's worth of data.
///
/// `segment_number` is placed in the segment bits of packet 20, every other packet has them
/// cleared like the camera does.
pub fn segment_stream(geometry: &StreamGeometry, segment_number: u8, data: &[u8]) -> Vec<u8> {
    assert_eq!(data.len(), geometry.segment_len());
    data.chunks_exact(geometry.packet_payload_len)
        .enumerate()
        .flat_map(|(packet_number, payload)| {
            let segment_bits = if packet_number == SEGMENT_PACKET {
                u16::from(segment_number & 0x7) << 12
            } else {
                0
            };
            packet(segment_bits | packet_number as u16, payload)
        })
        .collect()
}

/// Packetize a whole frame, with the segment numbers a healthy camera would send.
pub fn frame_stream(geometry: &StreamGeometry, frame: &[u8]) -> Vec<u8> {
    assert_eq!(frame.len(), geometry.frame_len());
    frame
        .chunks_exact(geometry.segment_len())
        .enumerate()
        .flat_map(|(index, segment)| {
            let segment_number = if geometry.segments_per_frame > 1 {
                index as u8 + 1
            } else {
                0
            };
            segment_stream(geometry, segment_number, segment)
        })
        .collect()
}

/// Deterministic frame contents where every byte depends on its position and the seed.
pub fn synthetic_frame(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|index| (index as u32 * 7 + (index >> 8) as u32 + u32::from(seed)) as u8)
        .collect()
}

/// A position sensitive checksum (Adler-32) for comparing frames.
pub fn frame_checksum(frame: &[u8]) -> u32 {
    const MODULUS: u32 = 65521;
    let (a, b) = frame.iter().fold((1u32, 0u32), |(a, b), byte| {
        let a = (a + u32::from(*byte)) % MODULUS;
        (a, (b + a) % MODULUS)
    });
    (b << 16) | a
}
