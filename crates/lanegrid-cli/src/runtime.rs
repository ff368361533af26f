// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use lanegrid_device::{DeviceApi, SimulatedDevice, TableController};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// One controller per configured table, all sharing a single device.
pub fn build_tables(config: &Config) -> Result<Vec<TableController>> {
    let device_config = config.device_config()?;
    info!(
        latency = ?device_config.latency,
        failure_rate = device_config.failure_rate,
        seeded = device_config.seed.is_some(),
        "simulated device"
    );
    let device: Arc<dyn DeviceApi> = Arc::new(SimulatedDevice::new(device_config));

    config
        .tables()?
        .into_iter()
        .map(|definition| {
            let name = definition.name.clone();
            TableController::new(definition, Arc::clone(&device))
                .with_context(|| format!("open table {name:?}"))
        })
        .collect()
}
