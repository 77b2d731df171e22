use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};

/// A pin that can switch between driving a line and sampling it.
///
/// Single-wire sensors share one line for the host request and the sensor response, so the
/// driver needs to hand the line over to the sensor mid-transaction. Both methods must be fast
/// enough to be called between microsecond-scale pulses.
pub trait IoPin: InputPin + OutputPin {
    /// Stops driving the line so it floats to the pull-up and can be sampled.
    fn set_as_input(&mut self) -> Result<(), Self::Error>;

    /// Drives the line at the given level.
    fn set_as_output(&mut self, state: PinState) -> Result<(), Self::Error>;
}

/// Adapts an open-drain pin that can also be read into an [`IoPin`].
///
/// An open-drain output driven high does not drive the line at all, so "input mode" is simply
/// the released state.
#[derive(Debug)]
pub struct OpenDrain<TPin>(TPin);

impl<TPin> OpenDrain<TPin> {
    pub fn new(pin: TPin) -> OpenDrain<TPin> {
        OpenDrain(pin)
    }

    pub fn into_inner(self) -> TPin {
        self.0
    }
}

impl<TPin: ErrorType> ErrorType for OpenDrain<TPin> {
    type Error = TPin::Error;
}

impl<TPin: InputPin> InputPin for OpenDrain<TPin> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }
}

impl<TPin: OutputPin> OutputPin for OpenDrain<TPin> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }
}

impl<TPin: InputPin + OutputPin> IoPin for OpenDrain<TPin> {
    fn set_as_input(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_as_output(&mut self, state: PinState) -> Result<(), Self::Error> {
        self.0.set_state(state)
    }
}
