// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The command and control interface (CCI) protocol.
//!
//! A command is issued by writing any payload to the data registers, writing the payload length
//! (in words) to the data length register, then writing the command word to the command
//! register. The camera sets the busy bit until the command has been processed, after which the
//! result code is available in the status register (and for GET commands, the response is in the
//! data registers).
use arrayvec::ArrayVec;
use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::blocking::i2c;
use log::{debug, trace};

use crate::command::{Command, CommandKind, CommandWord, ResultCode};
use crate::error::{ControlError, LibraryError};
use crate::register::{
    Address, CommandRegister, DataLengthRegister, Register, StatusRegister, MAX_DATA_LEN,
};

/// The default I²C address of the camera.
pub const DEFAULT_ADDRESS: u8 = 0x2A;

/// How to wait for the camera to finish a command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BusyPoll {
    /// Time between status reads, in microseconds.
    pub interval_us: u32,

    /// How many status reads to make before giving up.
    pub max_polls: u32,
}

impl Default for BusyPoll {
    fn default() -> Self {
        Self {
            interval_us: 1000,
            max_polls: 1000,
        }
    }
}

/// The low-level command interface to a camera.
#[derive(Clone, Debug)]
pub struct ControlInterface<I2C> {
    /// The I²C bus the camera is accessible on.
    bus: I2C,

    /// The I²C address of the camera.
    address: u8,

    busy_poll: BusyPoll,
}

impl<I2C, E> ControlInterface<I2C>
where
    I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>,
{
    pub fn new(bus: I2C, address: u8) -> Self {
        Self::with_busy_poll(bus, address, BusyPoll::default())
    }

    pub fn with_busy_poll(bus: I2C, address: u8, busy_poll: BusyPoll) -> Self {
        Self {
            bus,
            address,
            busy_poll,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Read the status register.
    pub fn status(&mut self) -> Result<StatusRegister, ControlError<E>> {
        read_register(&mut self.bus, self.address)
    }

    /// Poll the status register until the busy bit clears, returning the last result code.
    pub fn wait_until_idle<D>(&mut self, delay: &mut D) -> Result<ResultCode, ControlError<E>>
    where
        D: DelayUs<u32>,
    {
        for _ in 0..self.busy_poll.max_polls {
            let status = self.status()?;
            if !status.busy() {
                return Ok(status.result());
            }
            delay.delay_us(self.busy_poll.interval_us);
        }
        Err(LibraryError::Timeout("the camera to finish a command").into())
    }

    /// Issue a GET command, filling `data` with the response.
    ///
    /// `data` must be a whole number of words, and at most 32 bytes. The response is read even if
    /// the result code is not OK, it is up to the caller to decide what to do with it.
    pub fn command_get<C, D>(
        &mut self,
        delay: &mut D,
        command: C,
        data: &mut [u8],
    ) -> Result<ResultCode, ControlError<E>>
    where
        C: Into<Command>,
        D: DelayUs<u32>,
    {
        check_data_len(data.len())?;
        if data.is_empty() {
            return Err(LibraryError::InvalidData("GET commands need room for a response").into());
        }
        let word = command.into().word(CommandKind::Get);
        write_register(
            &mut self.bus,
            self.address,
            DataLengthRegister::from_byte_len(data.len()),
        )?;
        let result = self.execute(delay, word)?;
        self.bus
            .write_read(self.address, &Address::DATA_0.as_bytes(), data)
            .map_err(ControlError::Bus)?;
        Ok(result)
    }

    /// Issue a SET command with the given payload.
    pub fn command_set<C, D>(
        &mut self,
        delay: &mut D,
        command: C,
        data: &[u8],
    ) -> Result<ResultCode, ControlError<E>>
    where
        C: Into<Command>,
        D: DelayUs<u32>,
    {
        check_data_len(data.len())?;
        let word = command.into().word(CommandKind::Set);
        // The data registers are contiguous, so the whole payload can go in one write.
        if !data.is_empty() {
            let mut buffer: ArrayVec<u8, { MAX_DATA_LEN + 2 }> = ArrayVec::new();
            buffer.extend(Address::DATA_0.as_bytes());
            buffer.extend(data.iter().copied());
            self.bus
                .write(self.address, &buffer)
                .map_err(ControlError::Bus)?;
        }
        write_register(
            &mut self.bus,
            self.address,
            DataLengthRegister::from_byte_len(data.len()),
        )?;
        self.execute(delay, word)
    }

    /// Issue a RUN command.
    pub fn command_run<C, D>(
        &mut self,
        delay: &mut D,
        command: C,
    ) -> Result<ResultCode, ControlError<E>>
    where
        C: Into<Command>,
        D: DelayUs<u32>,
    {
        let word = command.into().word(CommandKind::Run);
        write_register(&mut self.bus, self.address, DataLengthRegister::from_byte_len(0))?;
        self.execute(delay, word)
    }

    fn execute<D>(
        &mut self,
        delay: &mut D,
        word: CommandWord,
    ) -> Result<ResultCode, ControlError<E>>
    where
        D: DelayUs<u32>,
    {
        trace!("Issuing {:?}", word);
        write_register(&mut self.bus, self.address, CommandRegister::from(word))?;
        let result = self.wait_until_idle(delay)?;
        if !result.is_ok() {
            debug!("{:?} completed with {}", word, result);
        }
        Ok(result)
    }

    /// Give back the I²C bus.
    pub fn release(self) -> I2C {
        self.bus
    }
}

fn check_data_len(len: usize) -> Result<(), LibraryError> {
    if len % 2 != 0 {
        Err(LibraryError::InvalidData(
            "Command payloads must be a whole number of 16-bit words",
        ))
    } else if len > MAX_DATA_LEN {
        Err(LibraryError::BufferTooSmall {
            required: len,
            actual: MAX_DATA_LEN,
        })
    } else {
        Ok(())
    }
}

fn read_register<R, I2C, E>(bus: &mut I2C, address: u8) -> Result<R, ControlError<E>>
where
    I2C: i2c::WriteRead<Error = E>,
    R: Register,
{
    let mut register_bytes = [0u8; 2];
    bus.write_read(address, &R::address().as_bytes(), &mut register_bytes)
        .map_err(ControlError::Bus)?;
    Ok(R::from(&register_bytes[..]))
}

fn write_register<R, I2C, E>(
    bus: &mut I2C,
    address: u8,
    register: R,
) -> Result<(), ControlError<E>>
where
    I2C: i2c::Write<Error = E>,
    R: Register,
{
    let register_address = R::address().as_bytes();
    let register_data: [u8; 2] = register.into();
    let combined: [u8; 4] = [
        register_address[0],
        register_address[1],
        register_data[0],
        register_data[1],
    ];
    bus.write(address, &combined).map_err(ControlError::Bus)
}
