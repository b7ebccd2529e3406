use bitaxe_logger_model::{ProbeId, TempReading};
use log::{debug, warn};

use crate::error::SensorError;

/// Value a DS18B20 driver reports for a probe that did not answer.
pub const DEVICE_DISCONNECTED_C: f32 = -127.0;

/// A single temperature transducer.
pub trait TemperatureProbe {
    /// Raw reading in degrees Celsius. [`DEVICE_DISCONNECTED_C`] when the
    /// probe is not there.
    fn read_celsius(&mut self) -> f32;
}

impl<P: TemperatureProbe + ?Sized> TemperatureProbe for Box<P> {
    fn read_celsius(&mut self) -> f32 {
        (**self).read_celsius()
    }
}

/// Reads the Q1, Q2 and L probes into one [`TempReading`].
pub struct SensorAggregator<P> {
    probes: [P; 3],
}

impl<P: TemperatureProbe> SensorAggregator<P> {
    /// Probes in [`ProbeId::ALL`] order.
    pub fn new(probes: [P; 3]) -> Self {
        Self { probes }
    }

    /// Reads one probe.
    pub fn probe(&mut self, id: ProbeId) -> Result<f32, SensorError> {
        let raw = self.probes[Self::index(id)].read_celsius();
        if raw == DEVICE_DISCONNECTED_C || !raw.is_finite() {
            return Err(SensorError::ProbeDisconnected(id));
        }
        debug!("{id}: {raw:.2}°C");
        Ok(raw)
    }

    /// Reads every probe. A disconnected probe reads NaN and does not affect
    /// the others.
    pub fn read(&mut self) -> TempReading {
        let mut reading = TempReading::default();
        for id in ProbeId::ALL {
            let value = self.probe(id).unwrap_or_else(|e| {
                warn!("{e}");
                f32::NAN
            });
            reading.set(id, value);
        }
        reading
    }

    fn index(id: ProbeId) -> usize {
        match id {
            ProbeId::Q1 => 0,
            ProbeId::Q2 => 1,
            ProbeId::L => 2,
        }
    }
}
