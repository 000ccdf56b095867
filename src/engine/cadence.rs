use crate::config::EngineSettings;
use std::time::Duration;

/// How long a virtual user waits between finishing one request and sending the next.
#[derive(Debug, Clone, PartialEq)]
pub enum Cadence {
    /// Fixed base interval plus a small per-user offset, so users do not fire in lockstep
    Staggered {
        base: Duration,
        step: Duration,
        buckets: u32,
    },
    /// Spread a requests-per-second target evenly over the population
    TargetRps { rps: u32, users: u32 },
}

impl Cadence {
    pub fn from_settings(settings: &EngineSettings, users: u32) -> Self {
        match settings.target_rps {
            Some(rps) if rps > 0 => Cadence::TargetRps { rps, users },
            _ => Cadence::Staggered {
                base: settings.cadence,
                step: settings.stagger_step,
                buckets: settings.stagger_buckets,
            },
        }
    }

    pub fn interval_for(&self, user_id: u32) -> Duration {
        match *self {
            Cadence::Staggered {
                base,
                step,
                buckets,
            } => {
                if buckets == 0 {
                    base
                } else {
                    base + step * (user_id % buckets)
                }
            }
            Cadence::TargetRps { rps, users } => {
                // latency is ignored, so the achieved rate is an upper bound
                Duration::from_secs_f64(users.max(1) as f64 / rps.max(1) as f64)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Cadence::Staggered { base, .. } => {
                format!("1 request every ~{:?} per user", base)
            }
            Cadence::TargetRps { rps, .. } => format!("~{} requests/sec overall", rps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_use_staggered_heuristic() {
        let cadence = Cadence::from_settings(&EngineSettings::default(), 10);
        assert_eq!(cadence.interval_for(0), Duration::from_secs(1));
        assert_eq!(cadence.interval_for(1), Duration::from_millis(1025));
        assert_eq!(cadence.interval_for(7), Duration::from_millis(1175));
        // wraps around the bucket count
        assert_eq!(cadence.interval_for(8), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_buckets_means_no_stagger() {
        let cadence = Cadence::Staggered {
            base: Duration::from_millis(300),
            step: Duration::from_millis(50),
            buckets: 0,
        };
        assert_eq!(cadence.interval_for(5), Duration::from_millis(300));
    }

    #[test]
    fn test_target_rps_spreads_over_users() {
        let settings = EngineSettings {
            target_rps: Some(100),
            ..EngineSettings::default()
        };
        let cadence = Cadence::from_settings(&settings, 10);
        assert_eq!(cadence, Cadence::TargetRps { rps: 100, users: 10 });
        // 10 users at 10 requests/sec each
        assert_eq!(cadence.interval_for(3), Duration::from_millis(100));
        assert!(cadence.describe().contains("100"));
    }

    #[test]
    fn test_zero_rps_falls_back_to_stagger() {
        let settings = EngineSettings {
            target_rps: Some(0),
            ..EngineSettings::default()
        };
        assert!(matches!(
            Cadence::from_settings(&settings, 4),
            Cadence::Staggered { .. }
        ));
    }
}
