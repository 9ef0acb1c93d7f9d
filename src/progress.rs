use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives overall completion as a fraction in `0.0..=1.0`.
pub trait ProgressSink {
    fn report(&mut self, fraction: f64);
}

impl<F: FnMut(f64)> ProgressSink for F {
    fn report(&mut self, fraction: f64) {
        self(fraction)
    }
}

/// Progress shared across threads - stores the fraction as `f64` bits.
#[derive(Clone, Default)]
pub struct SharedProgress {
    bits: Arc<AtomicU64>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(0.0_f64.to_bits())),
        }
    }

    pub fn set(&self, fraction: f64) {
        self.bits
            .store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn fraction(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl ProgressSink for SharedProgress {
    fn report(&mut self, fraction: f64) {
        self.set(fraction);
    }
}

/// Logs progress each time another tenth of the work completes.
pub struct LogProgress {
    label: String,
    last_decile: i32,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_decile: -1,
        }
    }
}

impl ProgressSink for LogProgress {
    fn report(&mut self, fraction: f64) {
        let decile = (fraction * 10.0).floor() as i32;
        if decile > self.last_decile {
            self.last_decile = decile;
            log::info!("{}: {:.0}%", self.label, fraction * 100.0);
        }
    }
}
