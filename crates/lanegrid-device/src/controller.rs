// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use lanegrid_app::{
    ButtonKind, CatalogError, EditOutcome, EditorInput, LaneId, LaneValues, TableDefinition,
    TableViewModel, TaskId, ViewEvent,
};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::api::DeviceApi;
use crate::task::{
    DeviceOperationTask, Operation, RunningTask, TaskMessage, TaskOutcome, TaskRequest,
};

/// Surrounding chrome notified by a controller. All calls happen on the
/// thread that owns the controller.
pub trait HostCallbacks {
    fn on_row_updated(&mut self, lane: LaneId, values: &LaneValues);

    fn on_log_line(&mut self, line: &str);

    fn on_operation_finished(&mut self);

    fn on_loading_state_changed(&mut self, loading: bool);

    fn on_console_cleared(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Owns one table's view model and its single background operation.
pub struct TableController {
    definition: TableDefinition,
    view: TableViewModel,
    device: Arc<dyn DeviceApi>,
    sender: Sender<TaskMessage>,
    receiver: Receiver<TaskMessage>,
    active: Option<RunningTask>,
    last_task: TaskId,
    state: TaskState,
}

impl TableController {
    pub fn new(definition: TableDefinition, device: Arc<dyn DeviceApi>) -> Result<Self, CatalogError> {
        definition.validate()?;
        let view = TableViewModel::new(definition.schema()?);
        let (sender, receiver) = mpsc::channel();
        Ok(Self {
            definition,
            view,
            device,
            sender,
            receiver,
            active: None,
            last_task: TaskId::new(0),
            state: TaskState::Idle,
        })
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    pub fn title(&self) -> String {
        self.definition.title()
    }

    pub fn view(&self) -> &TableViewModel {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut TableViewModel {
        &mut self.view
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == TaskState::Running
    }

    pub fn active_task(&self) -> Option<TaskId> {
        self.active.as_ref().map(RunningTask::id)
    }

    /// Full reload: stops any running task, clears the table and reads every
    /// lane again.
    pub fn load_data(&mut self, host: &mut dyn HostCallbacks) -> Result<TaskId> {
        self.stop_active()?;
        self.view.reset();
        self.view.take_events();
        host.on_console_cleared();
        let lanes = self.definition.lanes();
        self.start(Operation::Get, lanes, host)
    }

    pub fn get_lane(&mut self, lane: LaneId, host: &mut dyn HostCallbacks) -> Result<TaskId> {
        self.start(Operation::Get, vec![lane], host)
    }

    /// Writes the row's editable values for `lane` back to the device.
    pub fn set_lane(&mut self, lane: LaneId, host: &mut dyn HostCallbacks) -> Result<TaskId> {
        let payload = self
            .view
            .set_payload(lane)
            .with_context(|| format!("collect set payload for lane {lane}"))?;
        for column in &payload.skipped {
            warn!(table = %self.definition.name, %lane, %column, "value does not match column type, not sent");
            host.on_log_line(&format!("skip:{lane} {column}"));
        }
        debug!(
            table = %self.definition.name,
            %lane,
            payload = %serde_json::to_string(&payload.values).unwrap_or_default(),
            "set payload"
        );
        self.start(Operation::Set(payload.values), vec![lane], host)
    }

    pub fn handle_action(
        &mut self,
        lane: LaneId,
        button: ButtonKind,
        host: &mut dyn HostCallbacks,
    ) -> Result<TaskId> {
        match button {
            ButtonKind::Get => self.get_lane(lane, host),
            ButtonKind::Set => self.set_lane(lane, host),
        }
    }

    /// Routes operator input into the view model. Button presses start the
    /// matching lane operation.
    pub fn edit_cell(
        &mut self,
        lane: LaneId,
        column: &str,
        input: EditorInput,
        host: &mut dyn HostCallbacks,
    ) -> Result<EditOutcome> {
        if self.is_loading() {
            bail!("{} is busy", self.title());
        }
        let outcome = self.view.edit_cell(lane, column, input)?;
        match &outcome {
            EditOutcome::Requested(button) => {
                self.handle_action(lane, *button, host)?;
            }
            EditOutcome::Rejected(error) => {
                warn!(table = %self.definition.name, %lane, column, %error, "edit rejected");
            }
            EditOutcome::Committed(_) => self.forward_view_events(host),
            EditOutcome::Unchanged => {}
        }
        Ok(outcome)
    }

    /// Applies every queued worker message without blocking. Returns how
    /// many messages belonged to the current task.
    pub fn pump(&mut self, host: &mut dyn HostCallbacks) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.receiver.try_recv() {
            if self.handle_message(message, host) {
                applied += 1;
            }
        }
        applied
    }

    /// Blocks until the current task finishes, applying its messages.
    pub fn run_until_idle(&mut self, host: &mut dyn HostCallbacks, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while self.is_loading() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(message) => {
                    self.handle_message(message, host);
                }
                Err(RecvTimeoutError::Timeout) => {
                    bail!("{} still busy after {timeout:?}", self.title());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    bail!("worker channel for {} closed", self.title());
                }
            }
        }
        Ok(())
    }

    /// Cancels and joins the running task, if any.
    pub fn shutdown(&mut self) -> Result<()> {
        self.stop_active()
    }

    fn start(
        &mut self,
        operation: Operation,
        lanes: Vec<LaneId>,
        host: &mut dyn HostCallbacks,
    ) -> Result<TaskId> {
        self.stop_active()?;
        let id = self.last_task.next();
        let request = TaskRequest {
            operation,
            entity: self.definition.entity,
            side: self.definition.side,
            direction: self.definition.direction,
            lanes,
        };
        let running =
            DeviceOperationTask::start(id, request, Arc::clone(&self.device), self.sender.clone())?;
        self.last_task = id;
        self.active = Some(running);
        self.state = TaskState::Running;
        host.on_loading_state_changed(true);
        Ok(id)
    }

    fn stop_active(&mut self) -> Result<()> {
        if let Some(running) = self.active.take() {
            let id = running.id();
            let was_running = self.state == TaskState::Running;
            running.cancel_and_join()?;
            if was_running {
                info!(table = %self.definition.name, task = %id, "cancelled running task");
                self.state = TaskState::Cancelled;
            }
        }
        // Anything still queued came from a task that is now gone.
        let stale = self.receiver.try_iter().count();
        if stale > 0 {
            debug!(table = %self.definition.name, stale, "dropped stale worker messages");
        }
        Ok(())
    }

    fn handle_message(&mut self, message: TaskMessage, host: &mut dyn HostCallbacks) -> bool {
        if self.active_task() != Some(message.task()) {
            debug!(table = %self.definition.name, task = %message.task(), "ignoring message from superseded task");
            return false;
        }

        match message {
            TaskMessage::Log { line, .. } => host.on_log_line(&line),
            TaskMessage::Lane { update, .. } => match self.view.apply_update(&update) {
                Ok(_) => self.forward_view_events(host),
                Err(failure) => {
                    warn!(table = %self.definition.name, lane = %failure.lane, "lane operation failed");
                    host.on_log_line(&format!("error:{} {failure}", failure.lane));
                }
            },
            TaskMessage::Finished { task, outcome } => {
                if let Some(running) = self.active.take() {
                    if let Err(error) = running.join() {
                        warn!(task = %task, %error, "device worker did not exit cleanly");
                    }
                }
                self.state = match outcome {
                    TaskOutcome::Completed => TaskState::Completed,
                    TaskOutcome::Cancelled => TaskState::Cancelled,
                };
                host.on_loading_state_changed(false);
                host.on_operation_finished();
            }
        }
        true
    }

    fn forward_view_events(&mut self, host: &mut dyn HostCallbacks) {
        for event in self.view.take_events() {
            if let ViewEvent::RowChanged { lane, values } = event {
                host.on_row_updated(lane, &values);
            }
        }
    }
}

impl Drop for TableController {
    fn drop(&mut self) {
        if let Err(error) = self.stop_active() {
            warn!(table = %self.definition.name, %error, "failed to stop device task");
        }
    }
}
