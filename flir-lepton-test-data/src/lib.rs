// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Mock buses and synthetic data for exercising the `flir-lepton` driver without hardware.
//!
//! Nothing in here depends on the driver crate itself, so the mocks can be shared between the
//! driver's unit tests and its benchmarks.
mod cci_mock;
mod timing;
mod vospi_mock;
pub mod frames;

pub use cci_mock::{command_words, CciOperation, MockCci, MockCciError, DEFAULT_SERIAL_NUMBER};
pub use timing::{MockClock, MockDelay, MockPin};
pub use vospi_mock::{MockSpiError, MockVoSpi};
