// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use lanegrid_app::{
    CellValue, ColumnKind, ColumnSpec, EditabilityRule, Entity, EnumOption, LaneId, LaneValues,
    Orientation, Side, TableDefinition,
};
use lanegrid_device::{DeviceApi, DeviceError, HostCallbacks, LaneReply, LaneTarget};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Get,
    Set,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub target: LaneTarget,
    pub data: Option<LaneValues>,
}

#[derive(Debug, Default)]
struct GateState {
    closed: bool,
    permits: usize,
    entered: usize,
}

/// Deterministic device for tests. Replies come from per-lane scripts,
/// lanes can be marked as failing, and a closed gate holds every call until
/// the test releases it.
#[derive(Debug, Default)]
pub struct ScriptedDevice {
    replies: BTreeMap<LaneId, LaneValues>,
    fallback: LaneValues,
    failing: BTreeSet<LaneId>,
    calls: Mutex<Vec<RecordedCall>>,
    gate: Mutex<GateState>,
    signal: Condvar,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls block until `release` or `open` lets them through.
    pub fn gated() -> Self {
        let device = Self::default();
        lock(&device.gate).closed = true;
        device
    }

    pub fn with_lane(mut self, lane: u32, values: LaneValues) -> Self {
        self.replies.insert(LaneId::new(lane), values);
        self
    }

    pub fn with_fallback(mut self, values: LaneValues) -> Self {
        self.fallback = values;
        self
    }

    pub fn failing(mut self, lane: u32) -> Self {
        self.failing.insert(LaneId::new(lane));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn called_lanes(&self) -> Vec<u32> {
        lock(&self.calls)
            .iter()
            .map(|call| call.target.lane.get())
            .collect()
    }

    pub fn release(&self, permits: usize) {
        lock(&self.gate).permits += permits;
        self.signal.notify_all();
    }

    pub fn open(&self) {
        lock(&self.gate).closed = false;
        self.signal.notify_all();
    }

    /// Waits until `count` calls have entered the device.
    pub fn wait_for_calls(&self, count: usize, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut gate = lock(&self.gate);
        while gate.entered < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                bail!("only {} of {count} device calls arrived", gate.entered);
            }
            gate = self
                .signal
                .wait_timeout(gate, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Ok(())
    }

    fn enter(&self, call: RecordedCall) -> bool {
        let lane = call.target.lane;
        lock(&self.calls).push(call);

        let mut gate = lock(&self.gate);
        gate.entered += 1;
        self.signal.notify_all();
        while gate.closed && gate.permits == 0 {
            gate = self
                .signal
                .wait(gate)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if gate.closed {
            gate.permits -= 1;
        }
        !self.failing.contains(&lane)
    }
}

impl DeviceApi for ScriptedDevice {
    fn get(&self, target: &LaneTarget) -> Result<LaneReply, DeviceError> {
        let ok = self.enter(RecordedCall {
            kind: CallKind::Get,
            target: *target,
            data: None,
        });
        if !ok {
            return Ok(LaneReply::refused());
        }
        let values = self
            .replies
            .get(&target.lane)
            .unwrap_or(&self.fallback)
            .clone();
        Ok(LaneReply::ok(values))
    }

    fn set(&self, target: &LaneTarget, data: &LaneValues) -> Result<LaneReply, DeviceError> {
        let ok = self.enter(RecordedCall {
            kind: CallKind::Set,
            target: *target,
            data: Some(data.clone()),
        });
        if !ok {
            return Ok(LaneReply::refused());
        }
        Ok(LaneReply::ok(data.clone()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records every host callback in arrival order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordingHost {
    pub rows: Vec<(LaneId, LaneValues)>,
    pub log: Vec<String>,
    pub loading: Vec<bool>,
    pub finished: usize,
    pub console_clears: usize,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_lanes(&self) -> Vec<u32> {
        self.rows.iter().map(|(lane, _)| lane.get()).collect()
    }
}

impl HostCallbacks for RecordingHost {
    fn on_row_updated(&mut self, lane: LaneId, values: &LaneValues) {
        self.rows.push((lane, values.clone()));
    }

    fn on_log_line(&mut self, line: &str) {
        self.log.push(line.to_owned());
    }

    fn on_operation_finished(&mut self) {
        self.finished += 1;
    }

    fn on_loading_state_changed(&mut self, loading: bool) {
        self.loading.push(loading);
    }

    fn on_console_cleared(&mut self) {
        self.console_clears += 1;
    }
}

pub fn values(entries: &[(&str, CellValue)]) -> LaneValues {
    entries
        .iter()
        .map(|(key, value)| ((*key).to_owned(), value.clone()))
        .collect()
}

/// Small Driver-style table with a dependency-gated column.
pub fn fixture_table(lane_count: u32) -> TableDefinition {
    TableDefinition {
        name: "Fixture".to_owned(),
        entity: Entity::Driver,
        direction: None,
        lane_count,
        side: Side::Line,
        stretch: false,
        orientation: Orientation::RowsAreLanes,
        columns: vec![
            ColumnSpec::new("lane", ColumnKind::RowLabel),
            ColumnSpec::new("driver_mode", ColumnKind::Enum)
                .editable(true)
                .options(vec![
                    EnumOption::new("Normal", 1),
                    EnumOption::new("Debug", 2),
                    EnumOption::new("Test", 3),
                ]),
            ColumnSpec::new("prop_4", ColumnKind::Number)
                .rule(EditabilityRule::depends_on([("driver_mode", [2_i64, 3])])),
            ColumnSpec::new("prop_1", ColumnKind::Checkbox).editable(true),
            ColumnSpec::new("prop_9", ColumnKind::Number),
            ColumnSpec::new("Operation", ColumnKind::ActionButtons),
        ],
    }
}

/// Reply matching `fixture_table` for one lane.
pub fn fixture_values(lane: u32) -> LaneValues {
    values(&[
        ("driver_mode", CellValue::Int(1)),
        ("prop_4", CellValue::Int(10 + i64::from(lane))),
        ("prop_1", CellValue::Int(0)),
        ("prop_9", CellValue::Int(i64::from(lane))),
    ])
}
