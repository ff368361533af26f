// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use lanegrid_app::{CellValue, Entity, LaneValues};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::api::{DeviceApi, DeviceError, LaneReply, LaneTarget, require_direction};

pub const DEFAULT_LATENCY: Duration = Duration::from_secs(1);

const DRIVER_PROP_6: &str = "1,2,3,4,5,6,7,8,9,10";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedConfig {
    pub latency: Duration,
    /// Probability in `0.0..=1.0` that a call reports failure.
    pub failure_rate: f64,
    pub seed: Option<u64>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            latency: DEFAULT_LATENCY,
            failure_rate: 0.0,
            seed: None,
        }
    }
}

/// Stand-in for the hardware API: sleeps, then answers with random values.
pub struct SimulatedDevice {
    config: SimulatedConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedDevice {
    pub fn new(config: SimulatedConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> SimulatedConfig {
        self.config
    }

    fn should_fail(&self, rng: &mut StdRng) -> bool {
        let rate = self.config.failure_rate;
        if rate <= 0.0 {
            return false;
        }
        rate >= 1.0 || rng.r#gen::<f64>() < rate
    }

    fn call(&self, target: &LaneTarget, reply: impl FnOnce(&mut StdRng) -> LaneValues) -> LaneReply {
        if !self.config.latency.is_zero() {
            std::thread::sleep(self.config.latency);
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if self.should_fail(&mut *rng) {
            debug!(%target, "simulated failure");
            return LaneReply::refused();
        }
        LaneReply::ok(reply(&mut *rng))
    }
}

impl std::fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DeviceApi for SimulatedDevice {
    fn get(&self, target: &LaneTarget) -> Result<LaneReply, DeviceError> {
        require_direction(target)?;
        Ok(self.call(target, |rng| sample(rng, target)))
    }

    fn set(&self, target: &LaneTarget, data: &LaneValues) -> Result<LaneReply, DeviceError> {
        require_direction(target)?;
        Ok(self.call(target, |_| data.clone()))
    }
}

fn sample(rng: &mut StdRng, target: &LaneTarget) -> LaneValues {
    let mut values = LaneValues::new();
    let mut int = |key: &str, low: i64, high: i64| {
        values.insert(key.to_owned(), CellValue::Int(rng.gen_range(low..=high)));
    };

    match target.entity {
        Entity::Driver => {
            int("prop_1", 0, 5);
            int("prop_2ls", 0, 10);
            int("prop_2hs", 0, 10);
            int("prop_6666666666666666666666663", 8, 15);
            int("prop_4", 10, 20);
            int("prop_5", 0, 10);
            int("prop_777777777777abadafddasfadsfadsfadsf", 0, 10);
            for key in ["prop_8", "prop_9", "prop_10", "prop_11", "prop_12"] {
                int(key, 0, 10);
            }
            values.insert(
                "driver_mode".to_owned(),
                CellValue::Int(i64::from(target.lane.get())),
            );
            values.insert("prop_6".to_owned(), CellValue::text(DRIVER_PROP_6));
        }
        Entity::Afe => {
            int("afe_mode", 0, 2);
            int("afe_1", 0, 5);
            int("afe_2", 0, 1);
            int("afe_6666666666666666666666663", 8, 15);
            int("afe_4", 10, 20);
            int("afe_5", 0, 3);
            for key in ["afe_6", "afe_77", "afe_8"] {
                int(key, 0, 2);
            }
            for key in ["lane0", "lane1", "lane2", "lane3"] {
                int(key, 0, 1);
            }
        }
        Entity::TableOne => {
            int("driver_mode", 1, 3);
            int("prop_4", 10, 20);
            int("prop_1", 0, 1);
            int("prop_8", 0, 1);
            int("prop_9", 0, 10);
            values.insert("prop_6".to_owned(), CellValue::text(DRIVER_PROP_6));
        }
    }
    values
}
