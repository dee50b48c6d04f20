use crate::codec::TelemetrySnapshot;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

// Readings this close to zero count as "never sampled" for cumulative signals
const RESEED_THRESHOLD: f64 = 0.1;

pub const ENGINE_SPEED_UPDATE_MS: u64 = 25;
pub const ENGINE_TEMPERATURE_UPDATE_MS: u64 = 2_000;
pub const VEHICLE_SPEED_UPDATE_MS: u64 = 1_000;
pub const DISTANCE_UPDATE_MS: u64 = 10_000;
pub const FUEL_LEVEL_UPDATE_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    /// Sine wave between the bounds plus uniform jitter.
    Oscillating,
    /// Random walk with a step of fixed sign.
    Cumulative(Trend),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedSignal {
    kind: SignalKind,
    value: f64,
    min: f64,
    max: f64,
    phase_time: f64,
    phase_step: f64,
    jitter: u32,
    update_interval_ms: u64,
    next_update_ms: u64,
}

impl SimulatedSignal {
    pub fn oscillating(min: f64, max: f64, phase_step: f64, jitter: u32, update_interval_ms: u64) -> Self {
        Self::with_kind(SignalKind::Oscillating, min, max, phase_step, jitter, update_interval_ms)
    }

    pub fn cumulative(min: f64, max: f64, trend: Trend, jitter: u32, update_interval_ms: u64) -> Self {
        Self::with_kind(SignalKind::Cumulative(trend), min, max, 0.0, jitter, update_interval_ms)
    }

    fn with_kind(
        kind: SignalKind,
        min: f64,
        max: f64,
        phase_step: f64,
        jitter: u32,
        update_interval_ms: u64,
    ) -> Self {
        // Reversed bounds are swapped rather than rejected
        let (min, max) = if min <= max { (min, max) } else { (max, min) };

        Self {
            kind,
            value: 0.0,
            min,
            max,
            phase_time: 0.0,
            phase_step,
            jitter,
            update_interval_ms,
            next_update_ms: 0,
        }
    }

    /// Start the waveform at a given phase instead of zero.
    pub fn with_phase(mut self, phase_time: f64) -> Self {
        self.phase_time = phase_time;
        self
    }

    /// Start a cumulative signal from a known reading instead of a random reseed.
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value.clamp(self.min, self.max);
        self
    }

    pub fn sample(&self) -> f64 {
        self.value
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    pub fn next_update(&self) -> u64 {
        self.next_update_ms
    }

    pub fn is_due(&self, now: u64) -> bool {
        now >= self.next_update_ms
    }

    /// Produce the next sample and schedule the following update.
    pub fn advance<R: RngCore>(&mut self, now: u64, rng: &mut R) {
        match self.kind {
            SignalKind::Oscillating => self.advance_oscillating(rng),
            SignalKind::Cumulative(trend) => self.advance_cumulative(trend, rng),
        }

        self.next_update_ms = now + self.update_interval_ms;

        debug_assert!(
            self.value >= self.min && self.value <= self.max,
            "Signal value {} outside [{}, {}]",
            self.value,
            self.min,
            self.max
        );
    }

    fn advance_oscillating<R: RngCore>(&mut self, rng: &mut R) {
        let base = self.min + (self.max - self.min) * 0.5 * (1.0 + self.phase_time.sin());
        let jitter = i64::from(self.jitter);
        let offset = rng.gen_range(-jitter..=jitter) as f64;

        self.value = (base + offset).clamp(self.min, self.max);
        self.phase_time += self.phase_step;
    }

    fn advance_cumulative<R: RngCore>(&mut self, trend: Trend, rng: &mut R) {
        if self.value.abs() < RESEED_THRESHOLD {
            self.value = rng.gen_range(self.min..=self.max);
        }

        let magnitude = f64::from(rng.gen_range(0..=self.jitter));
        let step = match trend {
            Trend::Rising => magnitude,
            Trend::Falling => -magnitude,
        };

        self.value = (self.value + step).clamp(self.min, self.max);
    }
}

/// The vehicle quantities published by the producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSimulator {
    pub engine_speed: SimulatedSignal,
    pub engine_temperature: SimulatedSignal,
    pub vehicle_speed: SimulatedSignal,
    pub distance: SimulatedSignal,
    pub fuel_level: SimulatedSignal,
}

impl SignalSimulator {
    pub fn new() -> Self {
        Self {
            engine_speed: SimulatedSignal::oscillating(800.0, 7000.0, 0.01, 100, ENGINE_SPEED_UPDATE_MS),
            engine_temperature: SimulatedSignal::oscillating(60.0, 100.0, 0.01, 3, ENGINE_TEMPERATURE_UPDATE_MS),
            vehicle_speed: SimulatedSignal::oscillating(0.0, 120.0, 0.01, 7, VEHICLE_SPEED_UPDATE_MS),
            distance: SimulatedSignal::cumulative(0.0, 1_000_000_000.0, Trend::Rising, 150, DISTANCE_UPDATE_MS),
            fuel_level: SimulatedSignal::cumulative(20.0, 100.0, Trend::Falling, 1, FUEL_LEVEL_UPDATE_MS),
        }
    }

    /// Advance every signal whose own update interval has elapsed.
    /// Returns the number of signals updated.
    pub fn advance_due<R: RngCore>(&mut self, now: u64, rng: &mut R) -> u8 {
        let mut updated = 0;
        for signal in self.signals_mut() {
            if signal.is_due(now) {
                signal.advance(now, rng);
                updated += 1;
            }
        }
        updated
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            engine_speed: self.engine_speed.sample(),
            engine_temperature: self.engine_temperature.sample(),
            vehicle_speed: self.vehicle_speed.sample(),
            distance: self.distance.sample(),
            fuel_level: self.fuel_level.sample(),
        }
    }

    fn signals_mut(&mut self) -> [&mut SimulatedSignal; 5] {
        [
            &mut self.engine_speed,
            &mut self.engine_temperature,
            &mut self.vehicle_speed,
            &mut self.distance,
            &mut self.fuel_level,
        ]
    }
}

impl Default for SignalSimulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_oscillating_zero_jitter_follows_sine() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut signal = SimulatedSignal::oscillating(0.0, 100.0, core::f64::consts::FRAC_PI_2, 0, 10);

        signal.advance(0, &mut rng);
        assert!((signal.sample() - 50.0).abs() < 1e-9);
        signal.advance(10, &mut rng);
        assert!((signal.sample() - 100.0).abs() < 1e-9);
        assert_eq!(signal.next_update(), 20);
    }

    #[test]
    fn test_cumulative_reseeds_from_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut fuel = SimulatedSignal::cumulative(20.0, 100.0, Trend::Falling, 1, 60_000);
        assert_eq!(fuel.sample(), 0.0);

        fuel.advance(0, &mut rng);
        assert!(fuel.sample() >= 20.0 && fuel.sample() <= 100.0);
    }

    #[test]
    fn test_cumulative_direction() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut distance = SimulatedSignal::cumulative(0.0, 1e9, Trend::Rising, 150, 10).with_value(1000.0);
        let mut fuel = SimulatedSignal::cumulative(20.0, 100.0, Trend::Falling, 1, 10).with_value(80.0);

        for step in 0..50 {
            let (d, f) = (distance.sample(), fuel.sample());
            distance.advance(step * 10, &mut rng);
            fuel.advance(step * 10, &mut rng);
            assert!(distance.sample() >= d);
            assert!(fuel.sample() <= f);
        }
    }

    #[test]
    fn test_negative_reading_steps_without_reseed() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut signal = SimulatedSignal::cumulative(-100.0, 100.0, Trend::Falling, 1, 10).with_value(-50.0);

        signal.advance(0, &mut rng);
        assert!(signal.sample() <= -50.0 && signal.sample() >= -51.0);
    }

    #[test]
    fn test_falling_signal_settles_at_min() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut fuel = SimulatedSignal::cumulative(20.0, 100.0, Trend::Falling, 5, 10).with_value(21.0);
        for step in 0..100 {
            fuel.advance(step, &mut rng);
        }
        assert_eq!(fuel.sample(), 20.0);
    }

    #[test]
    fn test_advance_due_respects_intervals() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut simulator = SignalSimulator::new();

        assert_eq!(simulator.advance_due(0, &mut rng), 5);
        assert_eq!(simulator.advance_due(10, &mut rng), 0);
        assert_eq!(simulator.advance_due(25, &mut rng), 1);
        assert_eq!(simulator.advance_due(1_000, &mut rng), 2);
    }

    #[test]
    fn test_reversed_bounds_are_swapped() {
        let signal = SimulatedSignal::oscillating(10.0, -10.0, 0.1, 1, 10);
        assert_eq!(signal.bounds(), (-10.0, 10.0));
    }
}
