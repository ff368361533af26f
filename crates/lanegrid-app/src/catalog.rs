// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    BoolFlags, ColumnKind, ColumnSpec, EditabilityRule, EnumOption, LaneId,
    Orientation, SchemaError, Side, TableSchema, ValueType,
};

/// Width of the default `[Set] [Get]` button pair plus padding.
const OPERATION_WIDTH: u16 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Driver,
    Afe,
    TableOne,
}

impl Entity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Driver => "Driver",
            Self::Afe => "Afe",
            Self::TableOne => "TableOne",
        }
    }

    pub const fn needs_direction(self) -> bool {
        matches!(self, Self::Afe)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Tx,
    Rx,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tx => "tx",
            Self::Rx => "rx",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("table {table:?} ({side}): {source}")]
    Schema {
        table: String,
        side: &'static str,
        #[source]
        source: SchemaError,
    },
    #[error("table {0:?} talks to the Afe entity and needs a direction (tx or rx)")]
    MissingDirection(String),
    #[error("table {0:?} must have at least one lane")]
    NoLanes(String),
    #[error("table name must not be empty")]
    EmptyName,
    #[error("unknown table {0:?}")]
    UnknownTable(String),
}

fn default_side() -> Side {
    Side::Line
}

/// Declarative description of one table: its superset columns and the device
/// entity it reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub entity: Entity,
    #[serde(default)]
    pub direction: Option<Direction>,
    pub lane_count: u32,
    #[serde(default = "default_side")]
    pub side: Side,
    #[serde(default)]
    pub stretch: bool,
    #[serde(default)]
    pub orientation: Orientation,
    pub columns: Vec<ColumnSpec>,
}

impl TableDefinition {
    pub fn title(&self) -> String {
        format!("{} - {}", self.side.as_str(), self.name)
    }

    pub fn lanes(&self) -> Vec<LaneId> {
        LaneId::range(self.lane_count)
    }

    /// Side-filtered schema for this table's side.
    pub fn schema(&self) -> Result<TableSchema, CatalogError> {
        TableSchema::for_side(&self.columns, self.side)
            .map(|schema| {
                schema
                    .with_orientation(self.orientation)
                    .with_stretch(self.stretch)
            })
            .map_err(|source| CatalogError::Schema {
                table: self.name.clone(),
                side: self.side.as_str(),
                source,
            })
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if self.lane_count == 0 {
            return Err(CatalogError::NoLanes(self.name.clone()));
        }
        if self.entity.needs_direction() && self.direction.is_none() {
            return Err(CatalogError::MissingDirection(self.name.clone()));
        }
        // Both sides must build so the table can be reopened on the other.
        for side in Side::ALL {
            TableSchema::for_side(&self.columns, side).map_err(|source| CatalogError::Schema {
                table: self.name.clone(),
                side: side.as_str(),
                source,
            })?;
        }
        Ok(())
    }
}

pub const BUILT_IN_TABLES: [&str; 3] = ["TableOne", "Driver", "TableThree"];

pub fn built_in(name: &str) -> Option<TableDefinition> {
    match name {
        "TableOne" => Some(table_one()),
        "Driver" => Some(driver()),
        "TableThree" => Some(table_three()),
        _ => None,
    }
}

pub fn built_in_tables() -> Vec<TableDefinition> {
    vec![table_one(), driver(), table_three()]
}

fn operation() -> ColumnSpec {
    ColumnSpec::new("Operation", ColumnKind::ActionButtons).width(OPERATION_WIDTH)
}

fn modes() -> Vec<EnumOption> {
    vec![
        EnumOption::new("Normal", 1),
        EnumOption::new("Debug", 2),
        EnumOption::new("Test", 3),
    ]
}

fn table_one() -> TableDefinition {
    TableDefinition {
        name: "TableOne".to_owned(),
        entity: Entity::TableOne,
        direction: None,
        lane_count: 8,
        side: Side::Line,
        stretch: true,
        orientation: Orientation::RowsAreLanes,
        columns: vec![
            ColumnSpec::new("row", ColumnKind::RowLabel),
            ColumnSpec::new("driver_mode", ColumnKind::Enum)
                .editable(true)
                .options(modes()),
            ColumnSpec::new("prop_4", ColumnKind::Text)
                .rule(EditabilityRule::depends_on([("driver_mode", [2_i64, 3])])),
            ColumnSpec::new("prop_1", ColumnKind::Checkbox).editable(true),
            ColumnSpec::new("prop_6", ColumnKind::Text)
                .editable(true)
                .value_type(ValueType::Str),
            ColumnSpec::new("prop_8", ColumnKind::Boolean)
                .rule(EditabilityRule::depends_on([("driver_mode", [1_i64])])),
            ColumnSpec::new("prop_9", ColumnKind::Text),
            operation(),
        ],
    }
}

fn driver() -> TableDefinition {
    TableDefinition {
        name: "Driver".to_owned(),
        entity: Entity::Driver,
        direction: None,
        lane_count: 4,
        side: Side::Host,
        stretch: false,
        orientation: Orientation::RowsAreLanes,
        columns: vec![
            ColumnSpec::new("lane", ColumnKind::RowLabel),
            ColumnSpec::new("driver_mode", ColumnKind::Text).editable(true),
            ColumnSpec::new("prop_1", ColumnKind::Checkbox).editable(true),
            ColumnSpec::new("prop_2ls", ColumnKind::Text)
                .editable(true)
                .side(Side::Line),
            ColumnSpec::new("prop_2hs", ColumnKind::Text)
                .editable(true)
                .side(Side::Host),
            ColumnSpec::new("prop_6666666666666666666666663", ColumnKind::Text)
                .value_type(ValueType::Str),
            ColumnSpec::new("prop_4", ColumnKind::Checkbox),
            ColumnSpec::new("prop_5", ColumnKind::Text).side(Side::Line),
            ColumnSpec::new("prop_6", ColumnKind::Text)
                .editable(true)
                .value_type(ValueType::Str),
            ColumnSpec::new("prop_777777777777abadafddasfadsfadsfadsf", ColumnKind::Text),
            ColumnSpec::new("prop_8", ColumnKind::Boolean)
                .width(14)
                .flags(BoolFlags::new("Enabled", "Disabled"))
                .editable(true),
            ColumnSpec::new("prop_9", ColumnKind::Boolean)
                .width(12)
                .flags(BoolFlags::new("ON", "OFF")),
            ColumnSpec::new("prop_10", ColumnKind::Boolean)
                .width(12)
                .editable(true),
            ColumnSpec::new("prop_11", ColumnKind::Text),
            ColumnSpec::new("prop_12", ColumnKind::Text),
            operation(),
        ],
    }
}

fn table_three() -> TableDefinition {
    TableDefinition {
        name: "TableThree".to_owned(),
        entity: Entity::Afe,
        direction: Some(Direction::Tx),
        lane_count: 1,
        side: Side::Line,
        stretch: true,
        orientation: Orientation::RowsAreLanes,
        columns: vec![
            ColumnSpec::new("lane0", ColumnKind::Checkbox).editable(true),
            ColumnSpec::new("lane1", ColumnKind::Checkbox).editable(true),
            ColumnSpec::new("lane2", ColumnKind::Checkbox),
            ColumnSpec::new("lane3", ColumnKind::Checkbox),
            operation(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::{BUILT_IN_TABLES, CatalogError, Direction, Entity, TableDefinition, built_in};
    use crate::{
        CellValue, ColumnKind, ColumnSpec, EditError, EditabilityError, EditorInput, LaneId,
        LaneValues, SchemaError, Side, TableViewModel,
    };

    #[test]
    fn built_in_tables_validate() -> anyhow::Result<()> {
        for name in BUILT_IN_TABLES {
            let table = built_in(name).expect("built-in table");
            table.validate()?;
            table.schema()?;
        }
        assert!(built_in("TableNine").is_none());
        Ok(())
    }

    #[test]
    fn driver_columns_follow_the_table_side() -> anyhow::Result<()> {
        let mut driver = built_in("Driver").expect("driver table");
        assert_eq!(driver.title(), "Host Side - Driver");
        let host: Vec<_> = driver
            .schema()?
            .columns()
            .iter()
            .map(|column| column.key.clone())
            .collect();
        assert!(host.contains(&"prop_2hs".to_owned()));
        assert!(!host.contains(&"prop_2ls".to_owned()));
        assert!(!host.contains(&"prop_5".to_owned()));

        driver.side = Side::Line;
        let line = driver.schema()?;
        assert!(line.column("prop_2ls").is_some());
        assert!(line.column("prop_5").is_some());
        assert!(line.column("prop_2hs").is_none());
        Ok(())
    }

    #[test]
    fn table_three_rejects_edits_to_untagged_lanes() -> anyhow::Result<()> {
        let table = built_in("TableThree").expect("table three");
        assert_eq!(table.entity, Entity::Afe);
        assert_eq!(table.direction, Some(Direction::Tx));

        let mut model = TableViewModel::new(table.schema()?);
        let values: LaneValues = ["lane0", "lane1", "lane2", "lane3"]
            .into_iter()
            .map(|key| (key.to_owned(), CellValue::Int(0)))
            .collect();
        model.apply_values(LaneId::new(0), &values);

        assert!(model.edit_cell(LaneId::new(0), "lane0", EditorInput::Toggle).is_ok());
        assert_eq!(
            model.edit_cell(LaneId::new(0), "lane2", EditorInput::Toggle),
            Err(EditError::NotEditable(EditabilityError::ReadOnly(
                "lane2".to_owned()
            )))
        );
        assert_eq!(model.value(LaneId::new(0), "lane2"), Some(&CellValue::Int(0)));
        Ok(())
    }

    #[test]
    fn validate_reports_structural_problems() {
        let mut table = built_in("TableThree").expect("table three");
        table.direction = None;
        assert_eq!(
            table.validate(),
            Err(CatalogError::MissingDirection("TableThree".to_owned()))
        );

        let mut table = built_in("TableOne").expect("table one");
        table.lane_count = 0;
        assert_eq!(
            table.validate(),
            Err(CatalogError::NoLanes("TableOne".to_owned()))
        );

        let mut table = built_in("TableOne").expect("table one");
        table.columns.push(ColumnSpec::new("late", ColumnKind::Number));
        assert!(matches!(
            table.validate(),
            Err(CatalogError::Schema {
                source: SchemaError::ActionColumnNotLast(_),
                ..
            })
        ));
    }

    #[test]
    fn definitions_deserialize_from_toml() -> anyhow::Result<()> {
        let table: TableDefinition = toml::from_str(
            r#"
            name = "AfeRx"
            entity = "afe"
            direction = "rx"
            lane_count = 2
            side = "host"
            orientation = "columns_are_lanes"

            [[columns]]
            key = "afe_mode"
            editable = true

            [[columns]]
            key = "Operation"
            kind = "buttons"
            buttons = ["get"]
            "#,
        )?;
        table.validate()?;
        assert_eq!(table.title(), "Host Side - AfeRx");
        assert_eq!(table.lanes(), vec![LaneId::new(0), LaneId::new(1)]);
        assert!(!table.stretch);
        Ok(())
    }
}
