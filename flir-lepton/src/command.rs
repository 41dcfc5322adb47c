// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Typed commands for the Lepton command and control interface (CCI).
//!
//! Every command the camera understands is addressed by a subsystem (module), a command code
//! within that subsystem, and a command type (get, set, or run). These are packed into the 16-bit
//! word written to the command register:
//!
//! ```text
//!  15  14  13 12  11 .. 8   7 .. 2   1 0
//! [ 0 | P | 0  0 | module | code   | type ]
//! ```
//!
//! `P` is the "protected" bit, required for the OEM and radiometry subsystems.
use core::convert::TryFrom;
use core::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::LibraryError;

/// The bit set on the command word for the protected subsystems.
const PROTECTED_BIT: u16 = 0x4000;

/// Bits of the command word that are always zero.
const RESERVED_BITS: u16 = 0xB000;

/// The largest command code (the IDD command ID shifted right by two).
pub const MAX_COMMAND_CODE: u8 = 0x3F;

/// The camera subsystems commands can be addressed to.
#[derive(Clone, Copy, Debug, Eq, Hash, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum Module {
    /// Automatic gain control.
    Agc = 0x1,

    /// System information and flat field correction.
    Sys = 0x2,

    /// Video processing (color maps, output format).
    Vid = 0x3,

    /// OEM configuration (part number, GPIO modes).
    Oem = 0x8,

    /// Radiometry.
    Rad = 0xE,
}

impl Module {
    /// Whether commands to this subsystem need the protected bit set.
    pub fn is_protected(self) -> bool {
        matches!(self, Module::Oem | Module::Rad)
    }
}

/// The three kinds of command.
#[derive(Clone, Copy, Debug, Eq, Hash, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandKind {
    /// Read an attribute from the camera.
    Get = 0,

    /// Write an attribute to the camera.
    Set = 1,

    /// Trigger an action.
    Run = 2,
}

/// AGC subsystem commands, identified by their command ID.
#[derive(Clone, Copy, Debug, Eq, Hash, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum AgcCommand {
    Enable = 0x00,
    Policy = 0x04,
}

/// SYS subsystem commands.
#[derive(Clone, Copy, Debug, Eq, Hash, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum SysCommand {
    Ping = 0x00,
    SerialNumber = 0x08,
    FfcStatus = 0x44,
}

/// VID subsystem commands.
#[derive(Clone, Copy, Debug, Eq, Hash, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum VidCommand {
    ColorLut = 0x04,
    OutputFormat = 0x30,
}

/// OEM subsystem commands.
#[derive(Clone, Copy, Debug, Eq, Hash, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum OemCommand {
    PartNumber = 0x1C,
    SoftwareRevision = 0x20,
    GpioMode = 0x54,
}

/// RAD subsystem commands.
#[derive(Clone, Copy, Debug, Eq, Hash, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum RadCommand {
    TLinearEnable = 0xC0,
}

/// A command the driver knows how to issue.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Command {
    Agc(AgcCommand),
    Sys(SysCommand),
    Vid(VidCommand),
    Oem(OemCommand),
    Rad(RadCommand),
}

impl Command {
    pub fn module(&self) -> Module {
        match self {
            Command::Agc(_) => Module::Agc,
            Command::Sys(_) => Module::Sys,
            Command::Vid(_) => Module::Vid,
            Command::Oem(_) => Module::Oem,
            Command::Rad(_) => Module::Rad,
        }
    }

    /// The six bit command code (the command ID without the type bits).
    pub fn code(&self) -> u8 {
        let id: u8 = match *self {
            Command::Agc(command) => command.into(),
            Command::Sys(command) => command.into(),
            Command::Vid(command) => command.into(),
            Command::Oem(command) => command.into(),
            Command::Rad(command) => command.into(),
        };
        id >> 2
    }

    /// Build the command word for issuing this command as the given kind.
    pub fn word(&self, kind: CommandKind) -> CommandWord {
        let module = self.module();
        CommandWord::new(module, self.code(), kind, module.is_protected())
    }
}

macro_rules! command_from {
    ($($variant:ident => $typ:ty),*) => {
        $(
            impl From<$typ> for Command {
                fn from(command: $typ) -> Self {
                    Command::$variant(command)
                }
            }
        )*
    };
}

command_from!(
    Agc => AgcCommand,
    Sys => SysCommand,
    Vid => VidCommand,
    Oem => OemCommand,
    Rad => RadCommand
);

impl TryFrom<CommandWord> for Command {
    type Error = LibraryError;

    fn try_from(word: CommandWord) -> Result<Self, Self::Error> {
        fn unknown<E>(_: E) -> LibraryError {
            LibraryError::InvalidData("Unknown command code for subsystem")
        }
        let id = word.code() << 2;
        let command = match word.module() {
            Module::Agc => Command::Agc(AgcCommand::try_from_primitive(id).map_err(unknown)?),
            Module::Sys => Command::Sys(SysCommand::try_from_primitive(id).map_err(unknown)?),
            Module::Vid => Command::Vid(VidCommand::try_from_primitive(id).map_err(unknown)?),
            Module::Oem => Command::Oem(OemCommand::try_from_primitive(id).map_err(unknown)?),
            Module::Rad => Command::Rad(RadCommand::try_from_primitive(id).map_err(unknown)?),
        };
        Ok(command)
    }
}

/// The decoded form of the 16-bit command register value.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct CommandWord {
    module: Module,
    code: u8,
    kind: CommandKind,
    protected: bool,
}

impl CommandWord {
    /// Create a command word. Only the lower six bits of `code` are used.
    pub const fn new(module: Module, code: u8, kind: CommandKind, protected: bool) -> Self {
        Self {
            module,
            code: code & MAX_COMMAND_CODE,
            kind,
            protected,
        }
    }

    pub fn module(&self) -> Module {
        self.module
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }
}

impl fmt::Debug for CommandWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CommandWord({:#06X}: {:?} {:?} {:#04X})",
            u16::from(*self),
            self.kind,
            self.module,
            self.code
        )
    }
}

impl From<CommandWord> for u16 {
    fn from(word: CommandWord) -> Self {
        let protected = if word.protected { PROTECTED_BIT } else { 0 };
        let module: u8 = word.module.into();
        let kind: u8 = word.kind.into();
        protected
            | (u16::from(module) & 0x0F) << 8
            | u16::from(word.code & MAX_COMMAND_CODE) << 2
            | u16::from(kind)
    }
}

impl TryFrom<u16> for CommandWord {
    type Error = LibraryError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        if raw & RESERVED_BITS != 0 {
            return Err(LibraryError::InvalidData("Reserved command word bits are set"));
        }
        let module = Module::try_from_primitive(((raw >> 8) & 0x0F) as u8)
            .map_err(|_| LibraryError::InvalidData("Unknown command subsystem"))?;
        let kind = CommandKind::try_from_primitive((raw & 0x03) as u8)
            .map_err(|_| LibraryError::InvalidData("Invalid command type"))?;
        Ok(Self {
            module,
            code: ((raw >> 2) & 0x3F) as u8,
            kind,
            protected: raw & PROTECTED_BIT != 0,
        })
    }
}

/// The signed result code the camera reports in the upper byte of the status register.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct ResultCode(pub i8);

impl ResultCode {
    pub const OK: Self = Self(0);

    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }

    /// Convert into a `Result`, mapping any non-zero code to [`LibraryError::Command`].
    pub fn check(self) -> Result<(), LibraryError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(LibraryError::Command(self))
        }
    }

    fn name(&self) -> Option<&'static str> {
        Some(match self.0 {
            0 => "OK",
            -1 => "error",
            -2 => "not ready",
            -3 => "range error",
            -4 => "checksum error",
            -5 => "bad argument pointer",
            -6 => "data size error",
            -7 => "undefined function",
            -8 => "function not supported",
            -9 => "data out of range",
            -11 => "command not allowed",
            _ => return None,
        })
    }
}

impl fmt::Debug for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultCode({})", self.0)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "result code {}", self.0),
        }
    }
}
