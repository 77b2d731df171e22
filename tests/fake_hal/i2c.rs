use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use std::collections::VecDeque;

#[derive(Debug, PartialEq)]
pub enum Error {
    NoAcknowledge,
    Injected(u8),
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::NoAcknowledge => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            Error::Injected(_) => ErrorKind::Bus,
        }
    }
}

const REG_STATUS: u8 = 0xF3;

/// A device with a 256-byte register file behind a single address.
///
/// Writes move the register pointer and store any following bytes. Reads auto-increment from the
/// pointer. Reads of the status register pop scripted values first, then fall back to the
/// register file.
#[derive(Debug)]
pub struct Bus {
    address: u8,
    registers: [u8; 256],
    status_script: VecDeque<u8>,
    failing_registers: Vec<u8>,
    failing_once: Vec<u8>,
    writes: Vec<(u8, u8)>,
    pointer: u8,
}

impl Bus {
    pub fn new(address: u8) -> Bus {
        Bus {
            address,
            registers: [0u8; 256],
            status_script: VecDeque::new(),
            failing_registers: Vec::new(),
            failing_once: Vec::new(),
            writes: Vec::new(),
            pointer: 0,
        }
    }

    pub fn set_registers(&mut self, start: u8, values: &[u8]) {
        let start = usize::from(start);
        self.registers[start..start + values.len()].copy_from_slice(values);
    }

    pub fn script_status(&mut self, values: &[u8]) {
        self.status_script.extend(values.iter().copied());
    }

    /// Any transfer touching `register` fails.
    pub fn fail_on(&mut self, register: u8) {
        self.failing_registers.push(register);
    }

    /// The next transfer touching `register` fails, later ones succeed.
    pub fn fail_once_on(&mut self, register: u8) {
        self.failing_once.push(register);
    }

    pub fn writes(&self) -> &[(u8, u8)] {
        self.writes.as_slice()
    }

    fn check(&mut self, register: u8) -> Result<(), Error> {
        if self.failing_registers.contains(&register) {
            return Err(Error::Injected(register));
        }
        if let Some(index) = self.failing_once.iter().position(|r| *r == register) {
            self.failing_once.remove(index);
            return Err(Error::Injected(register));
        }
        Ok(())
    }
}

impl ErrorType for Bus {
    type Error = Error;
}

impl I2c for Bus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(Error::NoAcknowledge);
        }
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    let (register, values) = match bytes.split_first() {
                        Some(split) => split,
                        None => continue,
                    };
                    self.check(*register)?;
                    self.pointer = *register;
                    for value in values.iter() {
                        self.writes.push((self.pointer, *value));
                        self.registers[usize::from(self.pointer)] = *value;
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
                Operation::Read(buffer) => {
                    self.check(self.pointer)?;
                    for byte in buffer.iter_mut() {
                        let scripted = if self.pointer == REG_STATUS {
                            self.status_script.pop_front()
                        } else {
                            None
                        };
                        *byte = scripted.unwrap_or(self.registers[usize::from(self.pointer)]);
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}
