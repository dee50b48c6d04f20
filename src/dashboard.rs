use crate::codec::{DashboardUpdate, FrameCodec, FrameError, MessageId};
use crate::secure::AuthenticatedPayload;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Last authenticated value of every telemetry field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub engine_speed: f64,
    pub engine_temperature: f64,
    pub vehicle_speed: f64,
    pub distance: f64,
    pub fuel_level: f64,
    /// Number of updates applied so far, saturating at `u32::MAX`.
    pub sequence: u32,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn apply(&mut self, update: DashboardUpdate) {
        match update {
            DashboardUpdate::EngineSpeed(v) => self.engine_speed = v,
            DashboardUpdate::EngineTemperature(v) => self.engine_temperature = v,
            DashboardUpdate::VehicleSpeed(v) => self.vehicle_speed = v,
            DashboardUpdate::Distance(v) => self.distance = v,
            DashboardUpdate::FuelLevel(v) => self.fuel_level = v,
        }
        self.sequence = self.sequence.saturating_add(1);
    }

    /// Multi-line operator view.
    pub fn render(&self) -> String {
        format!(
            "{} {}\n  {:<20} {:>10.0} rpm\n  {:<20} {:>10.0} km/h\n  {:<20} {:>10.0} °C\n  {:<20} {:>10.1} %\n  {:<20} {:>10.0} m",
            "Dashboard".bold().cyan(),
            format!("#{}", self.sequence).dimmed(),
            "Engine speed",
            self.engine_speed,
            "Vehicle speed",
            self.vehicle_speed,
            "Engine temperature",
            self.engine_temperature,
            "Fuel level",
            self.fuel_level,
            "Distance",
            self.distance,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Updated(MessageId),
    Ignored(u32),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct DispatchStats {
    pub updates_applied: u32,
    pub ignored_identifiers: u32,
}

/// Single writer of the [`Dashboard`]. Accepts only payloads that already
/// passed tag verification.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    codec: FrameCodec,
    dashboard: Dashboard,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            codec,
            dashboard: Dashboard::new(),
            stats: DispatchStats::default(),
        }
    }

    pub fn on_frame(&mut self, raw_id: u32, payload: &AuthenticatedPayload) -> Result<DispatchOutcome, FrameError> {
        match self.codec.decode(raw_id, payload.as_bytes())? {
            Some(update) => {
                self.dashboard.apply(update);
                self.stats.updates_applied = self.stats.updates_applied.wrapping_add(1);
                debug!("Dashboard update {:?} from 0x{:03X}", update, raw_id);
                // decode() only yields updates for known identifiers
                Ok(MessageId::from_raw(raw_id).map_or(DispatchOutcome::Ignored(raw_id), DispatchOutcome::Updated))
            }
            None => {
                self.stats.ignored_identifiers = self.stats.ignored_identifiers.wrapping_add(1);
                Ok(DispatchOutcome::Ignored(raw_id))
            }
        }
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub fn get_stats(&self) -> &DispatchStats {
        &self.stats
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(FrameCodec::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_bumps_sequence() {
        let mut dashboard = Dashboard::new();
        dashboard.apply(DashboardUpdate::EngineSpeed(1600.0));
        dashboard.apply(DashboardUpdate::FuelLevel(40.0));

        assert_eq!(dashboard.engine_speed, 1600.0);
        assert_eq!(dashboard.fuel_level, 40.0);
        assert_eq!(dashboard.vehicle_speed, 0.0);
        assert_eq!(dashboard.sequence, 2);
    }

    #[test]
    fn test_sequence_saturates() {
        let mut dashboard = Dashboard {
            sequence: u32::MAX,
            ..Dashboard::default()
        };
        dashboard.apply(DashboardUpdate::EngineSpeed(800.0));

        assert_eq!(dashboard.sequence, u32::MAX);
        assert_eq!(dashboard.engine_speed, 800.0);
    }

    #[test]
    fn test_render_lists_every_field() {
        let mut dashboard = Dashboard::new();
        dashboard.apply(DashboardUpdate::VehicleSpeed(88.0));
        let text = dashboard.render();

        for label in ["Engine speed", "Vehicle speed", "Engine temperature", "Fuel level", "Distance"] {
            assert!(text.contains(label));
        }
        assert!(text.contains("88"));
    }
}
