// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod api;
mod controller;
mod simulated;
mod task;

pub use api::{DeviceApi, DeviceError, LaneReply, LaneTarget};
pub use controller::{HostCallbacks, TableController, TaskState};
pub use simulated::{DEFAULT_LATENCY, SimulatedConfig, SimulatedDevice};
pub use task::{
    DeviceOperationTask, LaneOperations, Operation, RunningTask, TaskMessage, TaskOutcome,
    TaskRequest,
};
