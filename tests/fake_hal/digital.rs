use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};
use env_node_sensors::io::IoPin;

#[derive(Debug, PartialEq)]
pub enum Error {
    Broken,
}

impl embedded_hal::digital::Error for Error {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    Input,
    Output(bool),
}

/// A scripted single-wire line.
///
/// Every read returns the next sample of the script. Once the script runs out the line stays at
/// `idle`, which defaults to high like a line with a pull-up.
#[derive(Debug)]
pub struct Pin {
    samples: Vec<bool>,
    index: usize,
    idle: bool,
    fail_reads: bool,
    events: Vec<Event>,
}

impl Pin {
    pub fn new(samples: Vec<bool>) -> Pin {
        Pin {
            samples,
            index: 0,
            idle: true,
            fail_reads: false,
            events: Vec::new(),
        }
    }

    pub fn silent() -> Pin {
        Pin::new(Vec::new())
    }

    pub fn with_idle(mut self, idle: bool) -> Pin {
        self.idle = idle;
        self
    }

    pub fn with_failing_reads(mut self) -> Pin {
        self.fail_reads = true;
        self
    }

    pub fn events(&self) -> &[Event] {
        self.events.as_slice()
    }

    pub fn samples_read(&self) -> usize {
        self.index
    }

    fn next_sample(&mut self) -> Result<bool, Error> {
        if self.fail_reads {
            return Err(Error::Broken);
        }
        let sample = self.samples.get(self.index).copied().unwrap_or(self.idle);
        self.index += 1;
        Ok(sample)
    }
}

impl ErrorType for Pin {
    type Error = Error;
}

impl InputPin for Pin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.next_sample()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.next_sample().map(|high| !high)
    }
}

impl OutputPin for Pin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.events.push(Event::Output(false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.events.push(Event::Output(true));
        Ok(())
    }
}

impl IoPin for Pin {
    fn set_as_input(&mut self) -> Result<(), Self::Error> {
        self.events.push(Event::Input);
        Ok(())
    }

    fn set_as_output(&mut self, state: PinState) -> Result<(), Self::Error> {
        self.events.push(Event::Output(state == PinState::High));
        Ok(())
    }
}

/// Builds the samples a DHT22 sends for the given frame, one sample per microsecond.
///
/// Zeros are sent as 27us high pulses and ones as 70us high pulses, each after a 50us low.
pub fn frame_samples(bytes: [u8; 5]) -> Vec<bool> {
    bit_samples(&frame_bits(bytes))
}

/// Splits a frame into its 40 bits, most significant first.
pub fn frame_bits(bytes: [u8; 5]) -> Vec<u8> {
    (0..40).map(|i| (bytes[i / 8] >> (7 - i % 8)) & 1).collect()
}

/// Builds the acknowledgement followed by the given bits and the closing low pulse.
pub fn bit_samples(bits: &[u8]) -> Vec<bool> {
    let mut samples = ack_samples();
    for bit in bits.iter() {
        match bit {
            0 => push_bit(&mut samples, 27),
            1 => push_bit(&mut samples, 70),
            _ => panic!("Must provide bits as 0s and 1s."),
        }
    }
    samples.extend(std::iter::repeat(false).take(50));
    samples
}

pub fn ack_samples() -> Vec<bool> {
    let mut samples = vec![false; 80];
    samples.extend(std::iter::repeat(true).take(80));
    samples
}

pub fn push_bit(samples: &mut Vec<bool>, high_us: usize) {
    samples.extend(std::iter::repeat(false).take(50));
    samples.extend(std::iter::repeat(true).take(high_us));
}
