// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{CellValue, LaneId, ValueType};

pub const DEFAULT_LANE_PREFIX: &str = "lane";
pub const MIN_COLUMN_WIDTH: u16 = 8;
pub const HEADER_PADDING: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "Line Side", alias = "line")]
    Line,
    #[serde(rename = "Host Side", alias = "host")]
    Host,
}

impl Side {
    pub const ALL: [Self; 2] = [Self::Line, Self::Host];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Line => "Line Side",
            Self::Host => "Host Side",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "line side" | "line" => Some(Self::Line),
            "host side" | "host" => Some(Self::Host),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    #[default]
    Text,
    Number,
    Checkbox,
    #[serde(alias = "switch")]
    Boolean,
    #[serde(alias = "select")]
    Enum,
    #[serde(alias = "btn", alias = "buttons")]
    ActionButtons,
    #[serde(alias = "vertical_header")]
    RowLabel,
}

impl ColumnKind {
    pub const fn carries_data(self) -> bool {
        !matches!(self, Self::ActionButtons | Self::RowLabel)
    }
}

/// Per-column editability policy.
///
/// `DependsOn` is a conjunction: the cell is editable only when every listed
/// column currently holds one of its permitted values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EditabilityRule {
    Literal(bool),
    DependsOn(BTreeMap<String, Vec<CellValue>>),
}

impl Default for EditabilityRule {
    fn default() -> Self {
        Self::Literal(false)
    }
}

impl EditabilityRule {
    pub fn depends_on<K, I, V>(entries: impl IntoIterator<Item = (K, I)>) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        Self::DependsOn(
            entries
                .into_iter()
                .map(|(key, allowed)| (key.into(), allowed.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }

    pub fn is_dependency_gated(&self) -> bool {
        matches!(self, Self::DependsOn(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumOption {
    pub label: String,
    pub value: CellValue,
}

impl EnumOption {
    pub fn new(label: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolFlags {
    pub checked_label: String,
    pub unchecked_label: String,
}

impl BoolFlags {
    pub fn new(checked: impl Into<String>, unchecked: impl Into<String>) -> Self {
        Self {
            checked_label: checked.into(),
            unchecked_label: unchecked.into(),
        }
    }
}

impl Default for BoolFlags {
    fn default() -> Self {
        Self::new("", "")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonKind {
    Get,
    Set,
}

impl ButtonKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Get => "Get",
            Self::Set => "Set",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub key: String,
    #[serde(default)]
    pub kind: ColumnKind,
    #[serde(default)]
    pub editable: EditabilityRule,
    #[serde(default)]
    pub width: Option<u16>,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub enum_options: Vec<EnumOption>,
    #[serde(default)]
    pub bool_flags: Option<BoolFlags>,
    #[serde(default)]
    pub buttons: Vec<ButtonKind>,
}

impl ColumnSpec {
    pub fn new(key: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            key: key.into(),
            kind,
            editable: EditabilityRule::default(),
            width: None,
            side: None,
            value_type: None,
            enum_options: Vec::new(),
            bool_flags: None,
            buttons: Vec::new(),
        }
    }

    pub fn editable(mut self, editable: bool) -> Self {
        self.editable = EditabilityRule::Literal(editable);
        self
    }

    pub fn rule(mut self, rule: EditabilityRule) -> Self {
        self.editable = rule;
        self
    }

    pub fn width(mut self, width: u16) -> Self {
        self.width = Some(width);
        self
    }

    pub fn side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn options(mut self, options: Vec<EnumOption>) -> Self {
        self.enum_options = options;
        self
    }

    pub fn flags(mut self, flags: BoolFlags) -> Self {
        self.bool_flags = Some(flags);
        self
    }

    pub fn buttons(mut self, buttons: Vec<ButtonKind>) -> Self {
        self.buttons = buttons;
        self
    }

    /// Type a committed or snapshotted value of this column is converted to.
    pub fn effective_value_type(&self) -> ValueType {
        match self.kind {
            ColumnKind::Text | ColumnKind::Checkbox => self.value_type.unwrap_or(ValueType::Int),
            ColumnKind::Number => match self.value_type {
                Some(ValueType::Float) => ValueType::Float,
                _ => ValueType::Int,
            },
            ColumnKind::Boolean => self.value_type.unwrap_or(ValueType::Boolean),
            ColumnKind::Enum => self.value_type.unwrap_or_else(|| {
                self.enum_options
                    .first()
                    .map_or(ValueType::Int, |option| ValueType::of(&option.value))
            }),
            ColumnKind::ActionButtons | ColumnKind::RowLabel => ValueType::Str,
        }
    }

    pub fn effective_buttons(&self) -> Vec<ButtonKind> {
        if self.buttons.is_empty() {
            vec![ButtonKind::Set, ButtonKind::Get]
        } else {
            self.buttons.clone()
        }
    }

    /// Converts a device-reported value to this column's storage form. Values
    /// that do not fit the declared type are stored as reported.
    pub fn storage_value(&self, raw: &CellValue) -> CellValue {
        match self.kind {
            ColumnKind::Checkbox | ColumnKind::Boolean => raw.clone(),
            _ => raw
                .coerce(self.effective_value_type())
                .unwrap_or_else(|_| raw.clone()),
        }
    }

    fn applies_to(&self, side: Side) -> bool {
        self.side.is_none_or(|tag| tag == side)
    }
}

/// Keeps untagged columns and columns tagged with `side`, in order.
pub fn filter_for_side(columns: &[ColumnSpec], side: Side) -> Vec<ColumnSpec> {
    columns
        .iter()
        .filter(|column| column.applies_to(side))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    RowsAreLanes,
    ColumnsAreLanes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnWidth {
    Fixed(u16),
    Stretch,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("table has no columns")]
    Empty,
    #[error("column key must not be empty")]
    EmptyKey,
    #[error("duplicate column key {0:?}")]
    DuplicateKey(String),
    #[error("table needs a trailing action column")]
    MissingActionColumn,
    #[error("action column {0:?} must be the last column")]
    ActionColumnNotLast(String),
    #[error("only one row label column is allowed")]
    MultipleRowLabels,
    #[error("enum column {0:?} has no options")]
    MissingEnumOptions(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    columns: Vec<ColumnSpec>,
    row_label: Option<usize>,
    orientation: Orientation,
    stretch: bool,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut seen = BTreeSet::new();
        let mut row_label = None;
        for (index, column) in columns.iter().enumerate() {
            if column.key.trim().is_empty() {
                return Err(SchemaError::EmptyKey);
            }
            if !seen.insert(column.key.as_str()) {
                return Err(SchemaError::DuplicateKey(column.key.clone()));
            }
            match column.kind {
                ColumnKind::RowLabel if row_label.is_some() => {
                    return Err(SchemaError::MultipleRowLabels);
                }
                ColumnKind::RowLabel => row_label = Some(index),
                ColumnKind::ActionButtons if index + 1 != columns.len() => {
                    return Err(SchemaError::ActionColumnNotLast(column.key.clone()));
                }
                ColumnKind::Enum if column.enum_options.is_empty() => {
                    return Err(SchemaError::MissingEnumOptions(column.key.clone()));
                }
                _ => {}
            }
        }

        if columns.last().map(|column| column.kind) != Some(ColumnKind::ActionButtons) {
            return Err(SchemaError::MissingActionColumn);
        }

        Ok(Self {
            columns,
            row_label,
            orientation: Orientation::default(),
            stretch: false,
        })
    }

    /// Builds the schema for one side from a superset column list.
    pub fn for_side(columns: &[ColumnSpec], side: Side) -> Result<Self, SchemaError> {
        Self::new(filter_for_side(columns, side))
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_stretch(mut self, stretch: bool) -> Self {
        self.stretch = stretch;
        self
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn stretch(&self) -> bool {
        self.stretch
    }

    pub fn column(&self, key: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.key == key)
    }

    pub fn column_index(&self, key: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.key == key)
    }

    /// Columns that hold lane values (no row label, no action column).
    pub fn data_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|column| column.kind.carries_data())
    }

    /// Columns shown in the grid body; the row label becomes the lane header.
    pub fn grid_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns
            .iter()
            .filter(|column| column.kind != ColumnKind::RowLabel)
    }

    pub fn action_column(&self) -> &ColumnSpec {
        // `new` guarantees a trailing action column.
        &self.columns[self.columns.len() - 1]
    }

    pub fn lane_prefix(&self) -> &str {
        self.row_label
            .map_or(DEFAULT_LANE_PREFIX, |index| self.columns[index].key.as_str())
    }

    pub fn lane_label(&self, lane: LaneId) -> String {
        format!("{}{}", self.lane_prefix(), lane)
    }

    /// Parses a lane header label back into its lane.
    pub fn lane_from_label(&self, label: &str) -> Option<LaneId> {
        label
            .strip_prefix(self.lane_prefix())
            .and_then(|rest| rest.parse::<u32>().ok())
            .map(LaneId::new)
    }

    pub fn column_widths(&self) -> Vec<ColumnWidth> {
        self.grid_columns()
            .map(|column| match column.width {
                Some(width) => ColumnWidth::Fixed(width.max(MIN_COLUMN_WIDTH)),
                None if self.stretch => ColumnWidth::Stretch,
                None => {
                    let header = column.key.chars().count() as u16;
                    ColumnWidth::Fixed((header + HEADER_PADDING).max(MIN_COLUMN_WIDTH))
                }
            })
            .collect()
    }
}
