// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
#[cfg(feature = "std")]
extern crate std;

use core::fmt;

use crate::command::ResultCode;

/// Errors that don't involve a bus or a pin.
#[derive(Clone, Debug, PartialEq)]
pub enum LibraryError {
    /// When a value from the camera is malformed in some way.
    InvalidData(&'static str),

    /// An operation was attempted that isn't valid in the current session phase.
    InvalidState(&'static str),

    /// The camera didn't reach the expected state in time.
    Timeout(&'static str),

    /// The camera reported something the protocol doesn't allow, and the session can't continue.
    ProtocolViolation(&'static str),

    /// A command completed with a non-zero result code.
    Command(ResultCode),

    /// The camera reported a fatal calibration (flat field correction) status.
    Calibration(i32),

    /// A caller provided buffer can't hold the data being requested.
    BufferTooSmall { required: usize, actual: usize },
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::InvalidData(msg) => write!(f, "{}", msg),
            LibraryError::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            LibraryError::Timeout(msg) => write!(f, "timed out waiting for {}", msg),
            LibraryError::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            LibraryError::Command(result) => write!(f, "command failed: {}", result),
            LibraryError::Calibration(status) => {
                write!(f, "calibration failed with status {}", status)
            }
            LibraryError::BufferTooSmall { required, actual } => write!(
                f,
                "buffer too small ({} bytes given, {} required)",
                actual, required
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LibraryError {}

/// Errors from the command and control interface.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlError<E> {
    /// Errors originating from the I²C implementation.
    Bus(E),

    /// Errors originating from within this library.
    Library(LibraryError),
}

impl<E> From<LibraryError> for ControlError<E> {
    fn from(lib_err: LibraryError) -> Self {
        Self::Library(lib_err)
    }
}

impl<E: fmt::Debug> fmt::Display for ControlError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::Bus(err) => write!(f, "I2C Error: {:?}", err),
            ControlError::Library(err) => write!(f, "Library Error: {}", err),
        }
    }
}

/// Errors from the video (VoSPI) interface.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamError<S, P> {
    /// Errors originating from the SPI implementation.
    Bus(S),

    /// Errors from driving the chip select line.
    ChipSelect(P),

    /// Errors originating from within this library.
    Library(LibraryError),
}

impl<S, P> From<LibraryError> for StreamError<S, P> {
    fn from(lib_err: LibraryError) -> Self {
        Self::Library(lib_err)
    }
}

impl<S: fmt::Debug, P: fmt::Debug> fmt::Display for StreamError<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Bus(err) => write!(f, "SPI Error: {:?}", err),
            StreamError::ChipSelect(err) => write!(f, "Chip select Error: {:?}", err),
            StreamError::Library(err) => write!(f, "Library Error: {}", err),
        }
    }
}

/// Every error the high-level [`Lepton`][crate::Lepton] driver can return.
///
/// The bus error types are kept separate (instead of being generic over the bus types themselves)
/// so that this type only needs `Debug` when the underlying errors are `Debug`.
#[derive(Clone, PartialEq)]
pub enum Error<I2cE, SpiE, PinE> {
    /// Errors from the command and control (I²C) bus.
    ControlBus(I2cE),

    /// Errors from the video (SPI) bus.
    StreamingBus(SpiE),

    /// Errors from the reset or chip select lines.
    Pin(PinE),

    /// Errors originating from within this library.
    Library(LibraryError),
}

impl<I2cE, SpiE, PinE> fmt::Debug for Error<I2cE, SpiE, PinE>
where
    I2cE: fmt::Debug,
    SpiE: fmt::Debug,
    PinE: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ControlBus(err) => f.debug_tuple("Error::ControlBus").field(err).finish(),
            Error::StreamingBus(err) => f.debug_tuple("Error::StreamingBus").field(err).finish(),
            Error::Pin(err) => f.debug_tuple("Error::Pin").field(err).finish(),
            Error::Library(err) => f.debug_tuple("Error::Library").field(err).finish(),
        }
    }
}

impl<I2cE, SpiE, PinE> fmt::Display for Error<I2cE, SpiE, PinE>
where
    I2cE: fmt::Debug,
    SpiE: fmt::Debug,
    PinE: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ControlBus(err) => write!(f, "I2C Error: {:?}", err),
            Error::StreamingBus(err) => write!(f, "SPI Error: {:?}", err),
            Error::Pin(err) => write!(f, "Pin Error: {:?}", err),
            Error::Library(err) => write!(f, "Library Error: {}", err),
        }
    }
}

#[cfg(feature = "std")]
impl<I2cE, SpiE, PinE> std::error::Error for Error<I2cE, SpiE, PinE>
where
    I2cE: std::error::Error + 'static,
    SpiE: std::error::Error + 'static,
    PinE: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ControlBus(err) => Some(err),
            Error::StreamingBus(err) => Some(err),
            Error::Pin(err) => Some(err),
            Error::Library(err) => Some(err),
        }
    }
}

impl<I2cE, SpiE, PinE> Error<I2cE, SpiE, PinE> {
    /// The library error, if this isn't a bus or pin error.
    pub fn library_error(&self) -> Option<&LibraryError> {
        match self {
            Error::Library(err) => Some(err),
            _ => None,
        }
    }
}

impl<I2cE, SpiE, PinE> From<LibraryError> for Error<I2cE, SpiE, PinE> {
    fn from(lib_err: LibraryError) -> Self {
        Self::Library(lib_err)
    }
}

impl<I2cE, SpiE, PinE> From<ControlError<I2cE>> for Error<I2cE, SpiE, PinE> {
    fn from(err: ControlError<I2cE>) -> Self {
        match err {
            ControlError::Bus(err) => Self::ControlBus(err),
            ControlError::Library(err) => Self::Library(err),
        }
    }
}

impl<I2cE, SpiE, PinE> From<StreamError<SpiE, PinE>> for Error<I2cE, SpiE, PinE> {
    fn from(err: StreamError<SpiE, PinE>) -> Self {
        match err {
            StreamError::Bus(err) => Self::StreamingBus(err),
            StreamError::ChipSelect(err) => Self::Pin(err),
            StreamError::Library(err) => Self::Library(err),
        }
    }
}
