// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use lanegrid_app::{Direction, Entity, LaneId, LaneValues, Side};
use std::fmt;

/// Addresses one lane of one device entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaneTarget {
    pub entity: Entity,
    pub side: Side,
    pub lane: LaneId,
    pub direction: Option<Direction>,
}

impl fmt::Display for LaneTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} lane {}", self.entity, self.side.as_str(), self.lane)?;
        if let Some(direction) = self.direction {
            write!(f, " ({direction})")?;
        }
        Ok(())
    }
}

/// What the device reported for one lane call. `success == false` is a
/// device-level refusal; transport problems surface as `DeviceError`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LaneReply {
    pub success: bool,
    pub values: LaneValues,
}

impl LaneReply {
    pub fn ok(values: LaneValues) -> Self {
        Self {
            success: true,
            values,
        }
    }

    pub fn refused() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("{0} calls need a direction")]
    MissingDirection(Entity),
    #[error("device unavailable: {0}")]
    Unavailable(String),
}

/// Blocking, per-lane device access. Implementations are called from worker
/// threads, one call at a time per table.
pub trait DeviceApi: Send + Sync {
    fn get(&self, target: &LaneTarget) -> Result<LaneReply, DeviceError>;

    fn set(&self, target: &LaneTarget, data: &LaneValues) -> Result<LaneReply, DeviceError>;
}

pub(crate) fn require_direction(target: &LaneTarget) -> Result<(), DeviceError> {
    if target.entity.needs_direction() && target.direction.is_none() {
        return Err(DeviceError::MissingDirection(target.entity));
    }
    Ok(())
}
