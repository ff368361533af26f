// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    ButtonKind, CellEditor, CellValue, CoercionError, ColumnKind, EditabilityError,
    EditabilityEvaluator, EditorInput, EditorResponse, LaneId, LaneValues, Orientation,
    RenderedCell, TableSchema,
};

/// One per-lane result produced by a device operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneUpdate {
    pub success: bool,
    pub lane: LaneId,
    pub values: LaneValues,
}

impl LaneUpdate {
    pub fn ok(lane: LaneId, values: LaneValues) -> Self {
        Self {
            success: true,
            lane,
            values,
        }
    }

    pub fn failed(lane: LaneId) -> Self {
        Self {
            success: false,
            lane,
            values: LaneValues::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("device reported failure for lane {lane}")]
pub struct LaneOperationFailure {
    pub lane: LaneId,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("lane {0} has no row")]
    UnknownLane(LaneId),
    #[error("unknown column {0:?}")]
    UnknownColumn(String),
    #[error("lane {lane} has no editor for column {column:?} yet")]
    NoEditor { lane: LaneId, column: String },
    #[error(transparent)]
    NotEditable(#[from] EditabilityError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Committed(CellValue),
    Rejected(CoercionError),
    Requested(ButtonKind),
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    RowCreated { lane: LaneId, index: usize },
    RowChanged { lane: LaneId, values: LaneValues },
    EditabilityChanged {
        lane: LaneId,
        column: String,
        editable: bool,
    },
    Reset,
}

/// Resolves only while the view model has not been reset since it was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowHandle {
    lane: LaneId,
    generation: u64,
}

impl RowHandle {
    pub fn lane(self) -> LaneId {
        self.lane
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EditorHandle {
    lane: LaneId,
    column: usize,
    generation: u64,
}

/// Values snapshot sent with a Set operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetPayload {
    pub values: LaneValues,
    /// Editable columns whose value did not convert to the column type.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridRow {
    pub label: String,
    pub selected: bool,
    pub cells: Vec<RenderedCell>,
}

/// Orientation-aware projection of the table for drawing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridView {
    pub headers: Vec<String>,
    pub rows: Vec<GridRow>,
}

#[derive(Debug, Clone)]
struct Row {
    lane: LaneId,
    label: String,
    values: LaneValues,
    editors: Vec<Option<CellEditor>>,
}

#[derive(Debug, Clone)]
pub struct TableViewModel {
    schema: TableSchema,
    rows: Vec<Row>,
    index: BTreeMap<LaneId, usize>,
    generation: u64,
    selected: Option<usize>,
    events: Vec<ViewEvent>,
}

impl TableViewModel {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            index: BTreeMap::new(),
            generation: 0,
            selected: None,
            events: Vec::new(),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Lanes in row order.
    pub fn lanes(&self) -> Vec<LaneId> {
        self.rows.iter().map(|row| row.lane).collect()
    }

    pub fn lane_at(&self, row: usize) -> Option<LaneId> {
        self.rows.get(row).map(|row| row.lane)
    }

    pub fn row_of(&self, lane: LaneId) -> Option<usize> {
        self.index.get(&lane).copied()
    }

    pub fn values(&self, lane: LaneId) -> Option<&LaneValues> {
        self.row_of(lane).map(|index| &self.rows[index].values)
    }

    pub fn value(&self, lane: LaneId, column: &str) -> Option<&CellValue> {
        self.values(lane).and_then(|values| values.get(column))
    }

    pub fn find_or_create_row(&mut self, lane: LaneId) -> RowHandle {
        self.row_index_or_insert(lane);
        RowHandle {
            lane,
            generation: self.generation,
        }
    }

    pub fn resolve(&self, handle: RowHandle) -> Option<&LaneValues> {
        if handle.generation != self.generation {
            return None;
        }
        self.values(handle.lane)
    }

    /// Stores every known column present in `values`, binds the editors and
    /// re-evaluates editability for the whole row. Unknown keys are ignored.
    pub fn apply_values(&mut self, lane: LaneId, values: &LaneValues) -> RowHandle {
        let handle = self.find_or_create_row(lane);
        let index = self.row_index_or_insert(lane);
        let row = &mut self.rows[index];

        for (position, column) in self.schema.columns().iter().enumerate() {
            match column.kind {
                ColumnKind::RowLabel => continue,
                ColumnKind::ActionButtons => {
                    if row.editors[position].is_none() {
                        row.editors[position] = CellEditor::for_column(column);
                    }
                    continue;
                }
                _ => {}
            }
            let Some(raw) = values.get(&column.key) else {
                continue;
            };
            let stored = column.storage_value(raw);
            let slot = &mut row.editors[position];
            if slot.is_none() {
                *slot = CellEditor::for_column(column);
            }
            if let Some(editor) = slot.as_mut() {
                editor.bind(&stored);
            }
            row.values.insert(column.key.clone(), stored);
        }

        self.events.push(ViewEvent::RowChanged {
            lane,
            values: row.values.clone(),
        });
        self.refresh_row(index);
        handle
    }

    /// Applies a device result. Failed lanes leave the table untouched.
    pub fn apply_update(&mut self, update: &LaneUpdate) -> Result<RowHandle, LaneOperationFailure> {
        if !update.success {
            return Err(LaneOperationFailure { lane: update.lane });
        }
        Ok(self.apply_values(update.lane, &update.values))
    }

    pub fn reset(&mut self) {
        self.rows.clear();
        self.index.clear();
        self.selected = None;
        self.generation = self.generation.wrapping_add(1);
        self.events.push(ViewEvent::Reset);
    }

    pub fn editor_handle(&self, lane: LaneId, column: &str) -> Option<EditorHandle> {
        let row = self.row_of(lane)?;
        let column = self.schema.column_index(column)?;
        self.rows[row].editors[column].as_ref()?;
        Some(EditorHandle {
            lane,
            column,
            generation: self.generation,
        })
    }

    pub fn editor(&self, handle: EditorHandle) -> Option<&CellEditor> {
        if handle.generation != self.generation {
            return None;
        }
        let row = self.row_of(handle.lane)?;
        self.rows[row].editors.get(handle.column)?.as_ref()
    }

    pub fn is_editable(&self, lane: LaneId, column: &str) -> bool {
        self.values(lane).is_some_and(|values| {
            EditabilityEvaluator::new(&self.schema).is_editable(column, values)
        })
    }

    /// Routes operator input to one cell. Data cells must currently be
    /// editable; the action column always accepts presses.
    pub fn edit_cell(
        &mut self,
        lane: LaneId,
        column: &str,
        input: EditorInput,
    ) -> Result<EditOutcome, EditError> {
        let index = self.row_of(lane).ok_or(EditError::UnknownLane(lane))?;
        let position = self
            .schema
            .column_index(column)
            .ok_or_else(|| EditError::UnknownColumn(column.to_owned()))?;
        let kind = self.schema.columns()[position].kind;
        if kind != ColumnKind::ActionButtons {
            EditabilityEvaluator::new(&self.schema).check(column, &self.rows[index].values)?;
        }

        let editor = self.rows[index].editors[position]
            .as_mut()
            .ok_or_else(|| EditError::NoEditor {
                lane,
                column: column.to_owned(),
            })?;
        let outcome = match editor.handle(input) {
            EditorResponse::Ignored => EditOutcome::Unchanged,
            EditorResponse::Rejected(error) => EditOutcome::Rejected(error),
            EditorResponse::Action(button) => EditOutcome::Requested(button),
            EditorResponse::Commit(value) => {
                let row = &mut self.rows[index];
                row.values.insert(column.to_owned(), value.clone());
                self.events.push(ViewEvent::RowChanged {
                    lane,
                    values: row.values.clone(),
                });
                self.refresh_row(index);
                EditOutcome::Committed(value)
            }
        };
        Ok(outcome)
    }

    /// Snapshot of the row's currently editable columns, converted to each
    /// column's value type.
    pub fn set_payload(&self, lane: LaneId) -> Result<SetPayload, EditError> {
        let values = self.values(lane).ok_or(EditError::UnknownLane(lane))?;
        let evaluator = EditabilityEvaluator::new(&self.schema);
        let mut payload = SetPayload::default();
        for column in self.schema.data_columns() {
            if !evaluator.is_editable(&column.key, values) {
                continue;
            }
            let Some(value) = values.get(&column.key) else {
                continue;
            };
            match value.coerce(column.effective_value_type()) {
                Ok(converted) => {
                    payload.values.insert(column.key.clone(), converted);
                }
                Err(_) => payload.skipped.push(column.key.clone()),
            }
        }
        Ok(payload)
    }

    pub fn selected_row(&self) -> Option<usize> {
        self.selected
    }

    pub fn select_row(&mut self, row: Option<usize>) {
        let row = row.filter(|index| *index < self.rows.len());
        if row == self.selected {
            return;
        }
        let previous = std::mem::replace(&mut self.selected, row);
        for index in previous.into_iter().chain(row) {
            let selected = self.selected == Some(index);
            for editor in self.rows[index].editors.iter_mut().flatten() {
                editor.set_selected(selected);
            }
        }
    }

    pub fn take_events(&mut self) -> Vec<ViewEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn grid(&self) -> GridView {
        let columns: Vec<_> = self
            .schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| column.kind != ColumnKind::RowLabel)
            .collect();
        let cell = |row: &Row, position: usize| {
            row.editors[position]
                .as_ref()
                .map(CellEditor::render)
                .unwrap_or_else(|| RenderedCell {
                    read_only: true,
                    ..RenderedCell::default()
                })
        };

        match self.schema.orientation() {
            Orientation::RowsAreLanes => GridView {
                headers: columns
                    .iter()
                    .map(|(_, column)| column.key.clone())
                    .collect(),
                rows: self
                    .rows
                    .iter()
                    .enumerate()
                    .map(|(index, row)| GridRow {
                        label: row.label.clone(),
                        selected: self.selected == Some(index),
                        cells: columns
                            .iter()
                            .map(|(position, _)| cell(row, *position))
                            .collect(),
                    })
                    .collect(),
            },
            Orientation::ColumnsAreLanes => GridView {
                headers: self.rows.iter().map(|row| row.label.clone()).collect(),
                rows: columns
                    .iter()
                    .map(|(position, column)| GridRow {
                        label: column.key.clone(),
                        selected: false,
                        cells: self.rows.iter().map(|row| cell(row, *position)).collect(),
                    })
                    .collect(),
            },
        }
    }

    fn row_index_or_insert(&mut self, lane: LaneId) -> usize {
        if let Some(index) = self.index.get(&lane) {
            return *index;
        }
        let index = self.rows.len();
        self.rows.push(Row {
            lane,
            label: self.schema.lane_label(lane),
            values: LaneValues::new(),
            editors: vec![None; self.schema.columns().len()],
        });
        self.index.insert(lane, index);
        self.events.push(ViewEvent::RowCreated { lane, index });
        index
    }

    fn refresh_row(&mut self, index: usize) {
        let evaluator = EditabilityEvaluator::new(&self.schema);
        let selected = self.selected == Some(index);
        let row = &mut self.rows[index];

        for (key, editable) in evaluator.evaluate_row(&row.values) {
            let Some(position) = self.schema.column_index(key) else {
                continue;
            };
            let Some(editor) = row.editors[position].as_mut() else {
                continue;
            };
            let was_editable = !editor.is_read_only();
            editor.set_read_only(!editable);
            if was_editable != editable {
                self.events.push(ViewEvent::EditabilityChanged {
                    lane: row.lane,
                    column: key.to_owned(),
                    editable,
                });
            }
        }
        for editor in row.editors.iter_mut().flatten() {
            editor.set_selected(selected);
        }
    }
}
