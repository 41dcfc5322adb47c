// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! A pure-Rust driver for the FLIR Lepton family of thermal camera modules.
//!
//! Lepton modules have two interfaces: a command and control interface (CCI) on I²C used for
//! configuration, and a video over SPI (VoSPI) interface that streams frames as a sequence of
//! fixed-size packets. This crate handles both, along with the camera's power-on sequence.
//!
//! This library uses the [`embedded-hal`][embedded-hal] I²C, SPI, and GPIO traits, so it should
//! work on any platform with `embedded-hal` implementations available. The core driver is
//! `no_std` compatible, the frame sharing and streaming helpers require the `std` feature (enabled
//! by default).
//!
//! [embedded-hal]: https://docs.rs/embedded-hal/0.2/embedded_hal/
//!
//! # High-Level API
//! ```no_run
//! use std::thread::sleep;
//! use std::time::Duration;
//! use flir_lepton::{FrameGeometry, Lepton, StdClock, VideoMode};
//! use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
//! use linux_embedded_hal::sysfs_gpio::Direction;
//! use linux_embedded_hal::{Delay, I2cdev, Pin, Spidev};
//!
//! let i2c_bus = I2cdev::new("/dev/i2c-1")?;
//! let mut spi_bus = Spidev::open("/dev/spidev0.0")?;
//! spi_bus.configure(
//!     &SpidevOptions::new()
//!         .max_speed_hz(16_000_000)
//!         .mode(SpiModeFlags::SPI_MODE_3)
//!         .build(),
//! )?;
//! let chip_select = Pin::new(8);
//! chip_select.export()?;
//! chip_select.set_direction(Direction::High)?;
//! let reset = Pin::new(17);
//! reset.export()?;
//! reset.set_direction(Direction::High)?;
//! let mut camera = Lepton::new(i2c_bus, spi_bus, chip_select, reset, Delay, StdClock::new());
//! camera.boot()?;
//! while !camera.poll_ready()? {
//!     sleep(Duration::from_millis(100));
//! }
//! camera.set_video_mode(VideoMode::TLinear)?;
//! let mut frame = vec![0u8; camera.geometry().stream_len()];
//! loop {
//!     if camera.read_frame(&mut frame)?.is_complete() {
//!         break;
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//! The camera needs around a second after reset before it responds to commands, and a bit longer
//! to finish its startup calibration. [`Lepton::boot`] toggles the reset line, then
//! [`Lepton::poll_ready`] is called until the camera is ready. Neither of these block for long,
//! timing is tracked through a [`Clock`] instead.
//!
//! Frames are read with [`Lepton::read_frame`]. The camera sends frames at a fixed rate
//! regardless of whether anyone is reading, so the reader needs to keep up; most calls will
//! return a status other than complete while waiting for the start of a frame or recovering from
//! a loss of synchronization.
//!
//! # Low-Level API
//! [`control::ControlInterface`] issues individual commands (see the [`command`] module for the
//! known ones), and [`vospi::VoSpi`] handles frame reassembly. Both are usable on their own if the
//! high-level driver doesn't fit.
//!
//! # Sharing Frames
//! With the `std` feature, the [`arbiter`] module provides a double-buffered hand-off between an
//! acquisition thread and any number of readers, [`acquisition`] ties a camera to that hand-off,
//! and [`stream`] fans frames out to a bounded set of clients.

#![no_std]

#[cfg(any(feature = "std", test))]
extern crate std;

#[cfg(feature = "std")]
pub mod acquisition;
#[cfg(feature = "std")]
pub mod arbiter;
pub mod command;
pub mod control;
pub mod driver;
pub mod error;
pub mod register;
#[cfg(feature = "std")]
pub mod stream;
#[cfg(test)]
mod test;
pub mod time;
mod util;
pub mod video;
pub mod vospi;

#[cfg(feature = "std")]
pub use acquisition::{Acquisition, FrameSource};
#[cfg(feature = "std")]
pub use arbiter::{Consumer, FrameArbiter, FrameGuard, Producer, Publish};
pub use command::{Command, CommandWord, ResultCode};
pub use driver::{BootConfig, Lepton, LeptonConfig, Metadata, Phase};
pub use error::{Error, LibraryError};
pub use time::Clock;
#[cfg(feature = "std")]
pub use time::StdClock;
pub use video::{ColorLut, FrameGeometry, GpioMode, VideoFormat, VideoMode};
pub use vospi::{FrameRead, FrameStatus, SyncConfig};

/// The error type returned by a [`Lepton`] using the given bus and pin types.
pub type LeptonError<I2C, SPI, PIN> = Error<
    <I2C as embedded_hal::blocking::i2c::Write>::Error,
    <SPI as embedded_hal::blocking::spi::Transfer<u8>>::Error,
    <PIN as embedded_hal::digital::v2::OutputPin>::Error,
>;
