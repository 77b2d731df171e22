/// A linear correction for one physical channel: `corrected = raw * factor + offset`.
///
/// Used to compensate for placement bias of a particular deployment, such as a sensor that reads
/// warm because it sits next to the radio.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationParams {
    pub offset: f32,
    pub factor: f32,
}

impl CalibrationParams {
    /// Leaves values unchanged.
    pub const IDENTITY: CalibrationParams = CalibrationParams {
        offset: 0.0,
        factor: 1.0,
    };

    pub const fn new(offset: f32, factor: f32) -> CalibrationParams {
        CalibrationParams { offset, factor }
    }

    /// A pure offset correction, keeping the unit factor.
    pub const fn with_offset(offset: f32) -> CalibrationParams {
        CalibrationParams {
            offset,
            factor: 1.0,
        }
    }

    pub fn apply(&self, raw: f32) -> f32 {
        raw * self.factor + self.offset
    }
}

impl Default for CalibrationParams {
    fn default() -> CalibrationParams {
        CalibrationParams::IDENTITY
    }
}
