//! Power-cut detection from the ECM channel bus voltage.
//!
//! While the relay is energized the ECM bus should sit at supply voltage.
//! A run of low readings means the supply was cut upstream; the monitor then
//! disarms the relay and stops the pump. Nothing is latched, so the operator
//! may re-arm. A failed ECM channel carries no evidence either way and leaves
//! the counter untouched; a pump channel fault is irrelevant here.

use ecm_common::rig::types::PowerSnapshot;
use tracing::debug;

/// Verdict for one observed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerVerdict {
    /// Bus voltage at or above threshold.
    Present,
    /// Below threshold, `n` consecutive samples so far.
    Low(u32),
    /// Below threshold for the required run of samples.
    Cut,
    /// ECM channel unreadable; ignored.
    NoEvidence,
}

/// Consecutive-sample bus voltage watchdog.
#[derive(Debug, Clone)]
pub struct PowerCutDetector {
    threshold_v: f64,
    required: u32,
    low_run: u32,
}

impl PowerCutDetector {
    /// Detector declaring a cut after `required` samples below `threshold_v`.
    pub fn new(threshold_v: f64, required: u32) -> Self {
        Self {
            threshold_v,
            required: required.max(1),
            low_run: 0,
        }
    }

    /// Feed one snapshot.
    pub fn observe(&mut self, snapshot: &PowerSnapshot) -> PowerVerdict {
        if snapshot.ecm_fault {
            return PowerVerdict::NoEvidence;
        }

        let bus_v = snapshot.ecm.bus_voltage_v;
        if bus_v >= self.threshold_v {
            self.low_run = 0;
            return PowerVerdict::Present;
        }

        self.low_run = self.low_run.saturating_add(1);
        debug!(bus_v, run = self.low_run, "ECM bus below threshold");
        if self.low_run >= self.required {
            PowerVerdict::Cut
        } else {
            PowerVerdict::Low(self.low_run)
        }
    }

    /// Forget the current low run (e.g. after disarming).
    pub fn reset(&mut self) {
        self.low_run = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecm_common::rig::types::ChannelReading;

    fn snap(bus_voltage_v: f64) -> PowerSnapshot {
        PowerSnapshot {
            ecm: ChannelReading {
                bus_voltage_v,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn cut_needs_consecutive_low_samples() {
        let mut det = PowerCutDetector::new(5.0, 3);
        assert_eq!(det.observe(&snap(12.0)), PowerVerdict::Present);
        assert_eq!(det.observe(&snap(0.4)), PowerVerdict::Low(1));
        assert_eq!(det.observe(&snap(0.3)), PowerVerdict::Low(2));
        assert_eq!(det.observe(&snap(0.2)), PowerVerdict::Cut);
    }

    #[test]
    fn recovery_resets_the_run() {
        let mut det = PowerCutDetector::new(5.0, 2);
        det.observe(&snap(0.0));
        assert_eq!(det.observe(&snap(12.0)), PowerVerdict::Present);
        assert_eq!(det.observe(&snap(0.0)), PowerVerdict::Low(1));
    }

    #[test]
    fn degraded_snapshot_is_not_a_cut() {
        let mut det = PowerCutDetector::new(5.0, 1);
        let degraded = PowerSnapshot {
            degraded: true,
            ecm_fault: true,
            ..Default::default()
        };
        for _ in 0..10 {
            assert_eq!(det.observe(&degraded), PowerVerdict::NoEvidence);
        }
        assert_eq!(det.observe(&snap(0.0)), PowerVerdict::Cut);
    }

    #[test]
    fn pump_channel_fault_does_not_mask_ecm_cut() {
        let mut det = PowerCutDetector::new(5.0, 2);
        let pump_failed = PowerSnapshot {
            degraded: true,
            pump: Some(ChannelReading::default()),
            note: Some("pump: read failed".into()),
            ..snap(0.0)
        };
        assert_eq!(det.observe(&pump_failed), PowerVerdict::Low(1));
        assert_eq!(det.observe(&pump_failed), PowerVerdict::Cut);
    }
}
