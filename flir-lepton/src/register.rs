// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The registers making up the command and control interface.
use core::convert::TryInto;
use core::fmt;

use crate::command::{CommandWord, ResultCode};
use crate::util::is_bit_set;

/// The number of 16-bit data registers (`DATA0` through `DATA15`).
pub const DATA_REGISTER_COUNT: usize = 16;

/// The largest command payload, in bytes.
pub const MAX_DATA_LEN: usize = DATA_REGISTER_COUNT * 2;

/// Marker newtype for register addresses accessible over I²C.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord)]
pub struct Address(u16);

impl Address {
    /// Status (busy, boot state, and the last result code).
    pub const STATUS: Self = Self::new(0x0002);

    /// Writing a command word here starts a command.
    pub const COMMAND: Self = Self::new(0x0004);

    /// The length of the command payload, in 16-bit words.
    pub const DATA_LENGTH: Self = Self::new(0x0006);

    /// The first data register.
    pub const DATA_0: Self = Self::new(0x0008);

    /// Wrap the given address in an `Address`.
    ///
    /// This function is intended to be used in const contexts, in other cases the
    /// [`From`][core::convert::From] implementation is probably easier to use.
    pub const fn new(address: u16) -> Self {
        Self(address)
    }

    pub(crate) fn as_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#X})", self.0)
    }
}

impl From<u16> for Address {
    fn from(raw_address: u16) -> Self {
        Self::new(raw_address)
    }
}

impl From<Address> for u16 {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Trait for common register functionality.
pub trait Register: Into<[u8; 2]> + for<'a> From<&'a [u8]> {
    /// The address of this register.
    fn address() -> Address;
}

fn first_word(buf: &[u8]) -> u16 {
    let (int_bytes, _) = buf.split_at(core::mem::size_of::<u16>());
    // split_at already guarantees the length
    let int_bytes: [u8; 2] = int_bytes.try_into().unwrap_or_default();
    u16::from_be_bytes(int_bytes)
}

/// The status register (0x0002).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusRegister {
    /// Set while the camera is processing a command.
    busy: bool,

    /// Set once the camera has entered its normal boot mode.
    boot_mode: bool,

    /// Set once the camera has finished booting.
    booted: bool,

    /// The result of the most recently completed command.
    result: ResultCode,
}

impl StatusRegister {
    pub fn busy(&self) -> bool {
        self.busy
    }

    pub fn boot_mode(&self) -> bool {
        self.boot_mode
    }

    pub fn booted(&self) -> bool {
        self.booted
    }

    pub fn result(&self) -> ResultCode {
        self.result
    }
}

impl Register for StatusRegister {
    fn address() -> Address {
        Address::STATUS
    }
}

impl<'a> From<&'a [u8]> for StatusRegister {
    /// Create a `StatusRegister` from the raw bytes read from the camera.
    ///
    /// This method will `panic` if there aren't enough bytes in the slice.
    fn from(buf: &'a [u8]) -> Self {
        let raw = first_word(buf);
        Self {
            busy: is_bit_set(raw, 0),
            boot_mode: is_bit_set(raw, 1),
            booted: is_bit_set(raw, 2),
            result: ResultCode((raw >> 8) as u8 as i8),
        }
    }
}

impl From<StatusRegister> for [u8; 2] {
    fn from(status: StatusRegister) -> Self {
        let mut register = u16::from(status.result.0 as u8) << 8;
        register |= status.busy as u16;
        register |= (status.boot_mode as u16) << 1;
        register |= (status.booted as u16) << 2;
        register.to_be_bytes()
    }
}

/// The data length register (0x0006), counting 16-bit words.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DataLengthRegister(u16);

impl DataLengthRegister {
    /// Create a data length register value from a payload length in bytes.
    pub fn from_byte_len(len: usize) -> Self {
        Self((len / 2) as u16)
    }

    pub fn words(&self) -> u16 {
        self.0
    }
}

impl Register for DataLengthRegister {
    fn address() -> Address {
        Address::DATA_LENGTH
    }
}

impl<'a> From<&'a [u8]> for DataLengthRegister {
    fn from(buf: &'a [u8]) -> Self {
        Self(first_word(buf))
    }
}

impl From<DataLengthRegister> for [u8; 2] {
    fn from(register: DataLengthRegister) -> Self {
        register.0.to_be_bytes()
    }
}

/// The command register (0x0004).
///
/// This only holds the raw word, use [`CommandWord`] to decode it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommandRegister(u16);

impl CommandRegister {
    pub fn raw(&self) -> u16 {
        self.0
    }
}

impl From<CommandWord> for CommandRegister {
    fn from(word: CommandWord) -> Self {
        Self(word.into())
    }
}

impl Register for CommandRegister {
    fn address() -> Address {
        Address::COMMAND
    }
}

impl<'a> From<&'a [u8]> for CommandRegister {
    fn from(buf: &'a [u8]) -> Self {
        Self(first_word(buf))
    }
}

impl From<CommandRegister> for [u8; 2] {
    fn from(register: CommandRegister) -> Self {
        register.0.to_be_bytes()
    }
}

#[cfg(test)]
mod test {
    use core::convert::TryFrom;

    use super::*;
    use crate::command::{CommandKind, Module};

    #[test]
    fn status_flags() {
        let status = StatusRegister::from(&b"\x00\x06"[..]);
        assert!(!status.busy());
        assert!(status.boot_mode());
        assert!(status.booted());
        assert!(status.result().is_ok());
        let status = StatusRegister::from(&b"\x00\x01"[..]);
        assert!(status.busy());
        assert!(!status.booted());
        let status = StatusRegister::from(&b"\x07\x05"[..]);
        assert!(status.busy());
        let status = StatusRegister::from(&b"\x07\x04"[..]);
        assert!(!status.busy());
        assert_eq!(status.result(), ResultCode(7));
    }

    #[test]
    fn status_result_is_signed() {
        let status = StatusRegister::from(&b"\xF9\x06"[..]);
        assert_eq!(status.result(), ResultCode(-7));
        let raw: [u8; 2] = status.into();
        assert_eq!(raw, *b"\xF9\x06");
    }

    #[test]
    fn data_length_in_words() {
        let register = DataLengthRegister::from_byte_len(4);
        assert_eq!(register.words(), 2);
        let raw: [u8; 2] = register.into();
        assert_eq!(raw, [0x00, 0x02]);
        assert_eq!(DataLengthRegister::from(&raw[..]), register);
    }

    #[test]
    fn command_register() {
        let word = CommandWord::new(Module::Rad, 0x30, CommandKind::Set, true);
        let register = CommandRegister::from(word);
        let raw: [u8; 2] = register.into();
        assert_eq!(raw, [0x4E, 0xC1]);
        let decoded = CommandRegister::from(&raw[..]);
        assert_eq!(CommandWord::try_from(decoded.raw()), Ok(word));
    }

    #[test]
    fn addresses() {
        assert_eq!(u16::from(Address::DATA_0), 0x0008);
        assert_eq!(Address::COMMAND.as_bytes(), [0x00, 0x04]);
    }
}
