// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::cell::{Ref, RefCell};
use std::collections::{HashMap, VecDeque};
use std::convert::TryInto;
use std::rc::Rc;

use embedded_hal::blocking::i2c;

/// The I²C address the Lepton responds on.
const LEPTON_ADDRESS: u8 = 0x2A;

const STATUS_REGISTER: u16 = 0x0002;
const COMMAND_REGISTER: u16 = 0x0004;
const DATA_LENGTH_REGISTER: u16 = 0x0006;
const DATA_REGISTER_START: u16 = 0x0008;
/// The number of 16-bit data registers.
const DATA_REGISTER_COUNT: u16 = 16;

/// Booted, boot mode set, not busy.
const BOOTED_STATUS: u16 = 0x0006;

const RESULT_UNDEFINED_FUNCTION: i8 = -7;

const RECENT_OPERATIONS_QUEUE_LENGTH: usize = 64;

/// The serial number the default booted mock reports.
pub const DEFAULT_SERIAL_NUMBER: u64 = 0x0000_1B2C_3D4E_5F60;

/// Raw command words (with the command type bits cleared) for the commands the driver issues.
pub mod command_words {
    pub const AGC_ENABLE: u16 = 0x0100;
    pub const AGC_POLICY: u16 = 0x0104;
    pub const SYS_PING: u16 = 0x0200;
    pub const SYS_SERIAL_NUMBER: u16 = 0x0208;
    pub const SYS_FFC_STATUS: u16 = 0x0244;
    pub const VID_COLOR_LUT: u16 = 0x0304;
    pub const VID_OUTPUT_FORMAT: u16 = 0x0330;
    pub const OEM_PART_NUMBER: u16 = 0x481C;
    pub const OEM_SOFTWARE_REVISION: u16 = 0x4820;
    pub const OEM_GPIO_MODE: u16 = 0x4854;
    pub const RAD_TLINEAR_ENABLE: u16 = 0x4EC0;

    pub const GET: u16 = 0;
    pub const SET: u16 = 1;
    pub const RUN: u16 = 2;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockCciError {
    /// An unknown I²C address was given.
    UnknownI2cAddress(u8),

    /// The given register doesn't exist, or can't be accessed that way.
    IllegalAccess(u16),

    /// The requested operation is not allowed.
    ///
    /// This covers reads and writes that aren't a whole number of 16-bit words, and write-read
    /// transactions that write more than a register address.
    IllegalOperation,

    /// A failure requested by the test.
    Injected,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CciOperation {
    Write { register: u16, length: usize },
    Read { register: u16, length: usize },
}

#[derive(Debug, Default)]
struct CciState {
    status: u16,
    scripted_status: VecDeque<u16>,
    busy_reads_per_command: usize,
    busy_reads_remaining: usize,
    last_result: i8,
    data_length: u16,
    data: [u8; DATA_REGISTER_COUNT as usize * 2],
    attributes: HashMap<u16, Vec<u8>>,
    forced_results: HashMap<u16, i8>,
    commands: Vec<u16>,
    set_values: Vec<(u16, Vec<u8>)>,
    failures_remaining: usize,
    recent_operations: VecDeque<CciOperation>,
}

/// A simulated Lepton command and control interface.
///
/// The mock stores every SET payload and hands it back on the matching GET, so attribute state
/// round-trips like it does on a real camera. Clones share the same state.
#[derive(Clone, Debug)]
pub struct MockCci {
    i2c_address: u8,
    state: Rc<RefCell<CciState>>,
}

impl MockCci {
    /// A mock that has finished booting, with metadata and a ready calibration status loaded.
    pub fn booted() -> Self {
        let mock = Self::powered_off();
        mock.set_status(BOOTED_STATUS);
        mock.set_attribute(
            command_words::SYS_SERIAL_NUMBER,
            &lepton_u64_bytes(DEFAULT_SERIAL_NUMBER),
        );
        mock.set_part_number("500-0771-01");
        mock.set_attribute(
            command_words::OEM_SOFTWARE_REVISION,
            &[0x03, 0x02, 0x11, 0x05, 0x00, 0x09, 0x00, 0x00],
        );
        mock.set_ffc_status(0);
        mock
    }

    /// A mock with an empty attribute table and a status register of zero.
    pub fn powered_off() -> Self {
        let state = CciState {
            busy_reads_per_command: 1,
            ..CciState::default()
        };
        Self {
            i2c_address: LEPTON_ADDRESS,
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn i2c_address(&self) -> u8 {
        self.i2c_address
    }

    /// Set the base status word (booted and boot mode bits).
    pub fn set_status(&self, status: u16) {
        self.state.borrow_mut().status = status;
    }

    /// Queue raw status words to be returned before the normal status logic resumes.
    pub fn queue_status(&self, words: &[u16]) {
        self.state
            .borrow_mut()
            .scripted_status
            .extend(words.iter().copied());
    }

    /// How many status reads report busy after each command is issued.
    pub fn set_busy_reads(&self, count: usize) {
        self.state.borrow_mut().busy_reads_per_command = count;
    }

    /// Store the value a GET of `word` responds with.
    pub fn set_attribute(&self, word: u16, bytes: &[u8]) {
        self.state
            .borrow_mut()
            .attributes
            .insert(word & !0x3, bytes.to_vec());
    }

    pub fn attribute(&self, word: u16) -> Option<Vec<u8>> {
        self.state.borrow().attributes.get(&(word & !0x3)).cloned()
    }

    /// Store a part number, byte-swapping each word like the camera does.
    pub fn set_part_number(&self, part_number: &str) {
        let mut bytes = [0u8; 32];
        bytes[..part_number.len()].copy_from_slice(part_number.as_bytes());
        for word in bytes.chunks_exact_mut(2) {
            word.swap(0, 1);
        }
        self.set_attribute(command_words::OEM_PART_NUMBER, &bytes);
    }

    pub fn set_ffc_status(&self, status: i32) {
        self.set_attribute(
            command_words::SYS_FFC_STATUS,
            &lepton_u32_bytes(status as u32),
        );
    }

    /// Make every command with the given raw word (type bits included) complete with `result`.
    pub fn force_result(&self, word: u16, result: i8) {
        self.state.borrow_mut().forced_results.insert(word, result);
    }

    /// Fail the next `count` bus operations.
    pub fn fail_next(&self, count: usize) {
        self.state.borrow_mut().failures_remaining = count;
    }

    /// Every command word written to the command register, oldest first.
    pub fn commands(&self) -> Ref<Vec<u16>> {
        Ref::map(self.state.borrow(), |s| &s.commands)
    }

    /// Every SET command with its payload, oldest first.
    pub fn set_values(&self) -> Ref<Vec<(u16, Vec<u8>)>> {
        Ref::map(self.state.borrow(), |s| &s.set_values)
    }

    pub fn recent_operations(&self) -> Ref<VecDeque<CciOperation>> {
        Ref::map(self.state.borrow(), |s| &s.recent_operations)
    }

    pub fn clear_recent_operations(&self) {
        let mut state = self.state.borrow_mut();
        state.recent_operations.clear();
        state.commands.clear();
        state.set_values.clear();
    }

    fn check_failure(&self) -> Result<(), MockCciError> {
        let mut state = self.state.borrow_mut();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            Err(MockCciError::Injected)
        } else {
            Ok(())
        }
    }

    fn add_operation(&self, operation: CciOperation) {
        let mut state = self.state.borrow_mut();
        state.recent_operations.push_front(operation);
        state
            .recent_operations
            .truncate(RECENT_OPERATIONS_QUEUE_LENGTH);
    }

    fn read_status(&self) -> u16 {
        let mut state = self.state.borrow_mut();
        if let Some(scripted) = state.scripted_status.pop_front() {
            return scripted;
        }
        if state.busy_reads_remaining > 0 {
            state.busy_reads_remaining -= 1;
            state.status | 0x0001
        } else {
            state.status | (u16::from(state.last_result as u8) << 8)
        }
    }

    fn execute(&self, word: u16) {
        let mut state = self.state.borrow_mut();
        state.commands.push(word);
        state.busy_reads_remaining = state.busy_reads_per_command;
        let base = word & !0x3;
        let byte_count = (state.data_length as usize * 2).min(state.data.len());
        let mut result = match word & 0x3 {
            command_words::GET => match state.attributes.get(&base).cloned() {
                Some(value) => {
                    state.data = [0u8; DATA_REGISTER_COUNT as usize * 2];
                    let count = value.len().min(byte_count);
                    state.data[..count].copy_from_slice(&value[..count]);
                    0
                }
                None => RESULT_UNDEFINED_FUNCTION,
            },
            command_words::SET => {
                let payload = state.data[..byte_count].to_vec();
                state.set_values.push((word, payload.clone()));
                state.attributes.insert(base, payload);
                0
            }
            _ => 0,
        };
        if let Some(forced) = state.forced_results.get(&word) {
            result = *forced;
        }
        state.last_result = result;
    }
}

impl i2c::Write for MockCci {
    type Error = MockCciError;

    fn write(&mut self, i2c_address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        if i2c_address != self.i2c_address {
            return Err(MockCciError::UnknownI2cAddress(i2c_address));
        }
        self.check_failure()?;
        if bytes.len() < 4 || bytes.len() % 2 != 0 {
            return Err(MockCciError::IllegalOperation);
        }
        let register = u16::from_be_bytes([bytes[0], bytes[1]]);
        let payload = &bytes[2..];
        self.add_operation(CciOperation::Write {
            register,
            length: payload.len(),
        });
        let first_word = u16::from_be_bytes(payload[..2].try_into().unwrap());
        match register {
            COMMAND_REGISTER if payload.len() == 2 => {
                self.execute(first_word);
                Ok(())
            }
            DATA_LENGTH_REGISTER if payload.len() == 2 => {
                if first_word > DATA_REGISTER_COUNT {
                    return Err(MockCciError::IllegalAccess(register));
                }
                self.state.borrow_mut().data_length = first_word;
                Ok(())
            }
            r if (DATA_REGISTER_START..DATA_REGISTER_START + DATA_REGISTER_COUNT).contains(&r) => {
                let start = (r - DATA_REGISTER_START) as usize * 2;
                let mut state = self.state.borrow_mut();
                if start + payload.len() > state.data.len() {
                    return Err(MockCciError::IllegalAccess(register));
                }
                state.data[start..start + payload.len()].copy_from_slice(payload);
                Ok(())
            }
            _ => Err(MockCciError::IllegalAccess(register)),
        }
    }
}

impl i2c::WriteRead for MockCci {
    type Error = MockCciError;

    fn write_read(
        &mut self,
        i2c_address: u8,
        write_buffer: &[u8],
        out_buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        if i2c_address != self.i2c_address {
            return Err(MockCciError::UnknownI2cAddress(i2c_address));
        }
        self.check_failure()?;
        // Write-reads should only be writing the register address.
        if write_buffer.len() != 2 || out_buffer.is_empty() || out_buffer.len() % 2 != 0 {
            return Err(MockCciError::IllegalOperation);
        }
        let register = u16::from_be_bytes(write_buffer.try_into().unwrap());
        self.add_operation(CciOperation::Read {
            register,
            length: out_buffer.len(),
        });
        match register {
            STATUS_REGISTER if out_buffer.len() == 2 => {
                out_buffer.copy_from_slice(&self.read_status().to_be_bytes());
                Ok(())
            }
            DATA_LENGTH_REGISTER if out_buffer.len() == 2 => {
                let length = self.state.borrow().data_length;
                out_buffer.copy_from_slice(&length.to_be_bytes());
                Ok(())
            }
            r if (DATA_REGISTER_START..DATA_REGISTER_START + DATA_REGISTER_COUNT).contains(&r) => {
                let start = (r - DATA_REGISTER_START) as usize * 2;
                let state = self.state.borrow();
                if start + out_buffer.len() > state.data.len() {
                    return Err(MockCciError::IllegalAccess(register));
                }
                out_buffer.copy_from_slice(&state.data[start..start + out_buffer.len()]);
                Ok(())
            }
            _ => Err(MockCciError::IllegalAccess(register)),
        }
    }
}

/// Encode a 32-bit value the way the camera does: big-endian words, least significant word first.
pub(crate) fn lepton_u32_bytes(value: u32) -> [u8; 4] {
    let low = (value as u16).to_be_bytes();
    let high = ((value >> 16) as u16).to_be_bytes();
    [low[0], low[1], high[0], high[1]]
}

pub(crate) fn lepton_u64_bytes(value: u64) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    for (index, chunk) in bytes.chunks_exact_mut(2).enumerate() {
        chunk.copy_from_slice(&((value >> (16 * index)) as u16).to_be_bytes());
    }
    bytes
}
