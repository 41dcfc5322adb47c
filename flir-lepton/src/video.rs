// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Frame geometry and the video settings that change it.
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::LibraryError;

/// The largest packet payload any supported output format produces.
pub const MAX_PACKET_PAYLOAD_LEN: usize = 240;

/// The number of pixels carried in each packet.
const PIXELS_PER_PACKET: usize = 80;

/// The most segments a frame can be split into (the segment field is three bits).
pub const MAX_SEGMENTS_PER_FRAME: usize = 7;

/// The shape of a frame, both as pixels and as VoSPI packets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameGeometry {
    pub width: usize,
    pub height: usize,
    pub bytes_per_pixel: usize,
    pub packet_payload_len: usize,
    pub packets_per_segment: usize,
    pub segments_per_frame: usize,
}

impl FrameGeometry {
    /// Lepton 3.x with 14-bit (two byte) pixels.
    pub const LEPTON_3_RAW14: Self = Self {
        width: 160,
        height: 120,
        bytes_per_pixel: 2,
        packet_payload_len: 160,
        packets_per_segment: 60,
        segments_per_frame: 4,
    };

    /// Lepton 3.x with RGB888 pixels.
    pub const LEPTON_3_RGB888: Self = Self {
        width: 160,
        height: 120,
        bytes_per_pixel: 3,
        packet_payload_len: 240,
        packets_per_segment: 60,
        segments_per_frame: 4,
    };

    /// Lepton 2.x with 14-bit pixels.
    pub const LEPTON_2_RAW14: Self = Self {
        width: 80,
        height: 60,
        bytes_per_pixel: 2,
        packet_payload_len: 160,
        packets_per_segment: 60,
        segments_per_frame: 1,
    };

    /// The same sensor, sending pixels in a different format.
    ///
    /// Both Lepton generations send 80 pixels per packet, so only the pixel size and packet
    /// payload change.
    pub fn with_format(&self, format: VideoFormat) -> Self {
        Self {
            bytes_per_pixel: format.bytes_per_pixel(),
            packet_payload_len: format.bytes_per_pixel() * PIXELS_PER_PACKET,
            ..*self
        }
    }

    /// The number of bytes of pixel data in a frame.
    pub fn frame_len(&self) -> usize {
        self.width * self.height * self.bytes_per_pixel
    }

    /// The number of payload bytes in a single segment.
    pub fn segment_len(&self) -> usize {
        self.packet_payload_len * self.packets_per_segment
    }

    /// The number of payload bytes the camera sends for a frame.
    ///
    /// This is the size a destination buffer needs to be for a frame read.
    pub fn stream_len(&self) -> usize {
        self.segment_len() * self.segments_per_frame
    }

    /// Check that the packet layout can actually carry a frame.
    pub fn validate(&self) -> Result<(), LibraryError> {
        if self.packet_payload_len == 0 || self.packet_payload_len > MAX_PACKET_PAYLOAD_LEN {
            Err(LibraryError::InvalidData(
                "Packet payload length must be between 1 and 240 bytes",
            ))
        } else if self.packets_per_segment == 0 {
            Err(LibraryError::InvalidData("Segments need at least one packet"))
        } else if self.segments_per_frame == 0
            || self.segments_per_frame > MAX_SEGMENTS_PER_FRAME
        {
            Err(LibraryError::InvalidData(
                "Frames must have between 1 and 7 segments",
            ))
        } else if self.stream_len() < self.frame_len() {
            Err(LibraryError::InvalidData(
                "Packets are too small to carry a whole frame",
            ))
        } else {
            Ok(())
        }
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self::LEPTON_3_RAW14
    }
}

/// How the camera processes pixel values before sending them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VideoMode {
    /// Raw 14-bit sensor counts.
    Raw14,

    /// Radiometric output, with each pixel in centikelvin.
    TLinear,

    /// Automatic gain control with a linear histogram.
    AgcLinear,

    /// Automatic gain control with histogram equalization.
    AgcHeq,
}

impl VideoMode {
    /// Whether this mode uses automatic gain control.
    ///
    /// RGB888 output requires one of these modes.
    pub fn uses_agc(&self) -> bool {
        matches!(self, VideoMode::AgcLinear | VideoMode::AgcHeq)
    }

    pub(crate) fn tlinear_enabled(&self) -> bool {
        matches!(self, VideoMode::TLinear)
    }

    pub(crate) fn agc_policy(&self) -> Option<AgcPolicy> {
        match self {
            VideoMode::AgcLinear => Some(AgcPolicy::Linear),
            VideoMode::AgcHeq => Some(AgcPolicy::HistogramEqualization),
            _ => None,
        }
    }
}

impl Default for VideoMode {
    fn default() -> Self {
        VideoMode::TLinear
    }
}

/// The pixel format of the video output.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum VideoFormat {
    /// 24-bit color, colorized by the camera's color lookup table.
    Rgb888 = 3,

    /// 14-bit values in 16-bit words.
    Raw14 = 7,
}

impl VideoFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            VideoFormat::Rgb888 => 3,
            VideoFormat::Raw14 => 2,
        }
    }
}

impl Default for VideoFormat {
    fn default() -> Self {
        VideoFormat::Raw14
    }
}

/// The AGC algorithm.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum AgcPolicy {
    Linear = 0,
    HistogramEqualization = 1,
}

/// The color lookup table used for RGB888 output.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum ColorLut {
    Wheel6 = 0,
    Fusion = 1,
    Rainbow = 2,
    Globow = 3,
    Sepia = 4,
    Color = 5,
    IceFire = 6,
    Rain = 7,
    User = 8,
}

impl Default for ColorLut {
    fn default() -> Self {
        ColorLut::Fusion
    }
}

/// What the camera's GPIO3 pin is used for.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum GpioMode {
    Gpio = 0,
    I2cMaster = 1,
    SpiMasterVlbData = 2,
    SpiMasterRegData = 3,
    SpiSlaveVlbData = 4,
    /// Pulse at the start of every frame.
    Vsync = 5,
}

/// A value that fits in a single 32-bit command payload.
pub trait CommandValue: Copy + Sized {
    fn to_word(self) -> u32;

    fn from_word(word: u32) -> Result<Self, LibraryError>;
}

impl CommandValue for bool {
    fn to_word(self) -> u32 {
        self as u32
    }

    fn from_word(word: u32) -> Result<Self, LibraryError> {
        Ok(word != 0)
    }
}

impl CommandValue for u32 {
    fn to_word(self) -> u32 {
        self
    }

    fn from_word(word: u32) -> Result<Self, LibraryError> {
        Ok(word)
    }
}

macro_rules! enum_command_value {
    ($($typ:ident),*) => {
        $(
            impl CommandValue for $typ {
                fn to_word(self) -> u32 {
                    self.into()
                }

                fn from_word(word: u32) -> Result<Self, LibraryError> {
                    $typ::try_from_primitive(word).map_err(|_| {
                        LibraryError::InvalidData(concat!("Unknown ", stringify!($typ), " value"))
                    })
                }
            }
        )*
    };
}

enum_command_value!(VideoFormat, AgcPolicy, ColorLut, GpioMode);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtin_geometries_are_valid() {
        for geometry in [
            FrameGeometry::LEPTON_3_RAW14,
            FrameGeometry::LEPTON_3_RGB888,
            FrameGeometry::LEPTON_2_RAW14,
        ] {
            assert_eq!(geometry.validate(), Ok(()), "{:?}", geometry);
            assert_eq!(geometry.stream_len(), geometry.frame_len());
        }
    }

    #[test]
    fn geometry_lengths() {
        let geometry = FrameGeometry::LEPTON_3_RAW14;
        assert_eq!(geometry.segment_len(), 9600);
        assert_eq!(geometry.frame_len(), 38400);
        assert_eq!(FrameGeometry::LEPTON_3_RGB888.frame_len(), 57600);
        assert_eq!(
            FrameGeometry::LEPTON_3_RAW14.with_format(VideoFormat::Rgb888),
            FrameGeometry::LEPTON_3_RGB888
        );
        let lepton_2_rgb = FrameGeometry::LEPTON_2_RAW14.with_format(VideoFormat::Rgb888);
        assert_eq!(lepton_2_rgb.packet_payload_len, 240);
        assert_eq!(lepton_2_rgb.validate(), Ok(()));
        assert_eq!(lepton_2_rgb.stream_len(), lepton_2_rgb.frame_len());
    }

    #[test]
    fn invalid_geometry() {
        let mut geometry = FrameGeometry::LEPTON_3_RAW14;
        geometry.packet_payload_len = 241;
        assert!(geometry.validate().is_err());
        let mut geometry = FrameGeometry::LEPTON_3_RAW14;
        geometry.segments_per_frame = 8;
        assert!(geometry.validate().is_err());
        let mut geometry = FrameGeometry::LEPTON_3_RAW14;
        geometry.packets_per_segment = 30;
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn command_values() {
        assert_eq!(VideoFormat::Raw14.to_word(), 7);
        assert_eq!(VideoFormat::from_word(3), Ok(VideoFormat::Rgb888));
        assert!(VideoFormat::from_word(0).is_err());
        assert_eq!(GpioMode::Vsync.to_word(), 5);
        assert_eq!(bool::from_word(2), Ok(true));
        assert_eq!(ColorLut::default(), ColorLut::Fusion);
    }

    #[test]
    fn video_modes() {
        assert_eq!(VideoMode::default(), VideoMode::TLinear);
        assert!(VideoMode::AgcHeq.uses_agc());
        assert!(!VideoMode::Raw14.uses_agc());
        assert_eq!(
            VideoMode::AgcHeq.agc_policy(),
            Some(AgcPolicy::HistogramEqualization)
        );
        assert_eq!(VideoMode::TLinear.agc_policy(), None);
    }
}
