use embedded_hal::delay::DelayNs;

/// Returns immediately. The fake pin advances one sample per poll instead of per microsecond.
#[derive(Debug, Default)]
pub struct NoopDelay {
    pub total_ns: u64,
}

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}
