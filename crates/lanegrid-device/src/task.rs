// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use lanegrid_app::{Direction, Entity, LaneId, LaneUpdate, LaneValues, Side, TaskId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::api::{DeviceApi, LaneReply, LaneTarget};

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Get,
    Set(LaneValues),
}

impl Operation {
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set(_) => "set",
        }
    }
}

/// Everything a worker needs for one run. Consumed when the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub operation: Operation,
    pub entity: Entity,
    pub side: Side,
    pub direction: Option<Direction>,
    pub lanes: Vec<LaneId>,
}

impl TaskRequest {
    /// Operator-facing name such as `getDriver`.
    pub fn command(&self) -> String {
        format!("{}{}", self.operation.verb(), self.entity)
    }

    pub fn into_operations(self, device: Arc<dyn DeviceApi>) -> LaneOperations {
        LaneOperations {
            device,
            request: self,
            next: 0,
        }
    }

    fn target(&self, lane: LaneId) -> LaneTarget {
        LaneTarget {
            entity: self.entity,
            side: self.side,
            lane,
            direction: self.direction,
        }
    }
}

/// Lazy, finite sequence of lane results in request order. Each `next` makes
/// exactly one blocking device call.
pub struct LaneOperations {
    device: Arc<dyn DeviceApi>,
    request: TaskRequest,
    next: usize,
}

impl LaneOperations {
    pub fn peek_lane(&self) -> Option<LaneId> {
        self.request.lanes.get(self.next).copied()
    }
}

impl Iterator for LaneOperations {
    type Item = LaneUpdate;

    fn next(&mut self) -> Option<Self::Item> {
        let lane = self.peek_lane()?;
        self.next += 1;

        let target = self.request.target(lane);
        let reply = match &self.request.operation {
            Operation::Get => self.device.get(&target),
            Operation::Set(data) => self.device.set(&target, data),
        };
        let LaneReply { success, values } = reply.unwrap_or_else(|error| {
            warn!(%target, %error, "device call failed");
            LaneReply::refused()
        });
        Some(LaneUpdate {
            success,
            lane,
            values,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.request.lanes.len() - self.next;
        (remaining, Some(remaining))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskMessage {
    Log { task: TaskId, line: String },
    Lane { task: TaskId, update: LaneUpdate },
    Finished { task: TaskId, outcome: TaskOutcome },
}

impl TaskMessage {
    pub fn task(&self) -> TaskId {
        match self {
            Self::Log { task, .. } | Self::Lane { task, .. } | Self::Finished { task, .. } => *task,
        }
    }
}

pub struct DeviceOperationTask;

impl DeviceOperationTask {
    /// Spawns a dedicated worker for `request`. Results arrive on `sender`
    /// tagged with `id`.
    pub fn start(
        id: TaskId,
        request: TaskRequest,
        device: Arc<dyn DeviceApi>,
        sender: Sender<TaskMessage>,
    ) -> Result<RunningTask> {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let command = request.command();
        info!(task = %id, %command, lanes = request.lanes.len(), "starting device task");

        let handle = thread::Builder::new()
            .name(format!("lanegrid-{command}-{id}"))
            .spawn(move || run(id, request.into_operations(device), &flag, &sender))
            .with_context(|| format!("spawn worker for {command}"))?;

        Ok(RunningTask {
            id,
            cancel,
            handle: Some(handle),
        })
    }
}

fn run(id: TaskId, mut operations: LaneOperations, cancel: &AtomicBool, sender: &Sender<TaskMessage>) {
    let log = |line: String| {
        sender
            .send(TaskMessage::Log { task: id, line })
            .is_ok()
    };

    let outcome = loop {
        if cancel.load(Ordering::Acquire) {
            break TaskOutcome::Cancelled;
        }
        let Some(lane) = operations.peek_lane() else {
            break TaskOutcome::Completed;
        };
        if !log(format!("begin:{lane}")) {
            return;
        }
        let Some(update) = operations.next() else {
            break TaskOutcome::Completed;
        };
        if !log(format!("end:{lane}")) {
            return;
        }
        if cancel.load(Ordering::Acquire) {
            debug!(task = %id, %lane, "discarding result of cancelled task");
            break TaskOutcome::Cancelled;
        }
        if sender.send(TaskMessage::Lane { task: id, update }).is_err() {
            return;
        }
    };

    info!(task = %id, ?outcome, "device task finished");
    // The receiver may already be gone on shutdown.
    let _ = sender.send(TaskMessage::Finished { task: id, outcome });
}

/// Handle to a live worker. Dropping it requests cancellation without waiting.
#[derive(Debug)]
pub struct RunningTask {
    id: TaskId,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RunningTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Requests cancellation and blocks until the in-flight lane call returns
    /// and the worker exits.
    pub fn cancel_and_join(mut self) -> Result<()> {
        self.cancel();
        self.wait()
    }

    pub fn join(mut self) -> Result<()> {
        self.wait()
    }

    fn wait(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("device worker for task {} panicked", self.id)),
            None => Ok(()),
        }
    }
}

impl Drop for RunningTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Operation, TaskRequest};
    use crate::api::{DeviceApi, DeviceError, LaneReply, LaneTarget};
    use lanegrid_app::{CellValue, Entity, LaneId, LaneValues, Side};
    use std::sync::Arc;

    struct Echo;

    impl DeviceApi for Echo {
        fn get(&self, target: &LaneTarget) -> Result<LaneReply, DeviceError> {
            if target.lane == LaneId::new(2) {
                return Err(DeviceError::Unavailable("link down".to_owned()));
            }
            Ok(LaneReply::ok(
                [("lane".to_owned(), CellValue::Int(i64::from(target.lane.get())))].into(),
            ))
        }

        fn set(&self, _target: &LaneTarget, data: &LaneValues) -> Result<LaneReply, DeviceError> {
            Ok(LaneReply::ok(data.clone()))
        }
    }

    fn request(operation: Operation, lanes: &[u32]) -> TaskRequest {
        TaskRequest {
            operation,
            entity: Entity::Driver,
            side: Side::Host,
            direction: None,
            lanes: lanes.iter().copied().map(LaneId::new).collect(),
        }
    }

    #[test]
    fn operations_yield_one_update_per_lane_in_order() {
        let updates: Vec<_> = request(Operation::Get, &[3, 0, 1])
            .into_operations(Arc::new(Echo))
            .collect();
        let lanes: Vec<_> = updates.iter().map(|update| update.lane.get()).collect();
        assert_eq!(lanes, vec![3, 0, 1]);
        assert!(updates.iter().all(|update| update.success));
        assert_eq!(updates[0].values.get("lane"), Some(&CellValue::Int(3)));
    }

    #[test]
    fn device_errors_become_failed_updates() {
        let mut operations = request(Operation::Get, &[2]).into_operations(Arc::new(Echo));
        assert_eq!(operations.size_hint(), (1, Some(1)));
        let update = operations.next().expect("one lane");
        assert!(!update.success);
        assert!(update.values.is_empty());
        assert!(operations.next().is_none());
    }

    #[test]
    fn set_carries_payload_and_names_command() {
        let payload: LaneValues = [("prop_6".to_owned(), CellValue::text("x"))].into();
        let request = request(Operation::Set(payload.clone()), &[1]);
        assert_eq!(request.command(), "setDriver");
        let updates: Vec<_> = request.into_operations(Arc::new(Echo)).collect();
        assert_eq!(updates[0].values, payload);
    }
}
