// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{CellValue, EditabilityRule, LaneValues, TableSchema, ValueType};

/// Why a dependency-gated cell is closed. Every variant fails closed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DependencyError {
    #[error("dependency column {0:?} is not in the schema")]
    UnknownColumn(String),
    #[error("dependency column {0:?} has no value yet")]
    MissingValue(String),
    #[error("dependency {column:?} value {value} is not a valid {expected}")]
    Uncoercible {
        column: String,
        value: CellValue,
        expected: ValueType,
    },
    #[error("dependency {column:?} value {value} is not permitted")]
    NotPermitted { column: String, value: CellValue },
    #[error("dependency column {0:?} permits no values")]
    EmptyAllowedSet(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditabilityError {
    #[error("unknown column {0:?}")]
    UnknownColumn(String),
    #[error("column {0:?} does not hold lane data")]
    NotDataColumn(String),
    #[error("column {0:?} is read-only")]
    ReadOnly(String),
    #[error("column {column:?} is locked: {source}")]
    Dependency {
        column: String,
        #[source]
        source: DependencyError,
    },
}

/// Decides per-cell editability from the schema and the row's live values.
#[derive(Debug, Clone, Copy)]
pub struct EditabilityEvaluator<'a> {
    schema: &'a TableSchema,
}

impl<'a> EditabilityEvaluator<'a> {
    pub fn new(schema: &'a TableSchema) -> Self {
        Self { schema }
    }

    pub fn is_editable(&self, column_key: &str, row: &LaneValues) -> bool {
        self.check(column_key, row).is_ok()
    }

    pub fn check(&self, column_key: &str, row: &LaneValues) -> Result<(), EditabilityError> {
        let column = self
            .schema
            .column(column_key)
            .ok_or_else(|| EditabilityError::UnknownColumn(column_key.to_owned()))?;
        if !column.kind.carries_data() {
            return Err(EditabilityError::NotDataColumn(column_key.to_owned()));
        }

        match &column.editable {
            EditabilityRule::Literal(true) => Ok(()),
            EditabilityRule::Literal(false) => {
                Err(EditabilityError::ReadOnly(column_key.to_owned()))
            }
            EditabilityRule::DependsOn(dependencies) => {
                for (dependency, allowed) in dependencies {
                    self.check_dependency(dependency, allowed, row)
                        .map_err(|source| EditabilityError::Dependency {
                            column: column_key.to_owned(),
                            source,
                        })?;
                }
                Ok(())
            }
        }
    }

    /// Editability of every data column of one row, in schema order.
    pub fn evaluate_row(&self, row: &LaneValues) -> Vec<(&'a str, bool)> {
        self.schema
            .data_columns()
            .map(|column| (column.key.as_str(), self.is_editable(&column.key, row)))
            .collect()
    }

    fn check_dependency(
        &self,
        dependency: &str,
        allowed: &[CellValue],
        row: &LaneValues,
    ) -> Result<(), DependencyError> {
        if self.schema.column(dependency).is_none() {
            return Err(DependencyError::UnknownColumn(dependency.to_owned()));
        }
        let Some(sample) = allowed.first() else {
            return Err(DependencyError::EmptyAllowedSet(dependency.to_owned()));
        };
        let current = row
            .get(dependency)
            .ok_or_else(|| DependencyError::MissingValue(dependency.to_owned()))?;

        let expected = ValueType::of(sample);
        let coerced = current
            .coerce(expected)
            .map_err(|_| DependencyError::Uncoercible {
                column: dependency.to_owned(),
                value: current.clone(),
                expected,
            })?;

        if allowed.contains(&coerced) {
            Ok(())
        } else {
            Err(DependencyError::NotPermitted {
                column: dependency.to_owned(),
                value: coerced,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DependencyError, EditabilityError, EditabilityEvaluator};
    use crate::{
        CellValue, ColumnKind, ColumnSpec, EditabilityRule, EnumOption, LaneValues, TableSchema,
    };

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnSpec::new("row", ColumnKind::RowLabel),
            ColumnSpec::new("driver_mode", ColumnKind::Enum)
                .editable(true)
                .options(vec![
                    EnumOption::new("Normal", 1),
                    EnumOption::new("Debug", 2),
                    EnumOption::new("Test", 3),
                ]),
            ColumnSpec::new("prop_4", ColumnKind::Number)
                .rule(EditabilityRule::depends_on([("driver_mode", [2_i64, 3])])),
            ColumnSpec::new("prop_8", ColumnKind::Boolean)
                .rule(EditabilityRule::depends_on([("driver_mode", [1_i64])])),
            ColumnSpec::new("scale", ColumnKind::Number)
                .rule(EditabilityRule::depends_on([("gain", [0.5_f64, 1.5])])),
            ColumnSpec::new("gain", ColumnKind::Text),
            ColumnSpec::new("orphan", ColumnKind::Number)
                .rule(EditabilityRule::depends_on([("missing_column", [1_i64])])),
            ColumnSpec::new("never", ColumnKind::Number)
                .rule(EditabilityRule::DependsOn([("driver_mode".to_owned(), Vec::new())].into())),
            ColumnSpec::new("prop_9", ColumnKind::Number),
            ColumnSpec::new("Operation", ColumnKind::ActionButtons),
        ])
        .expect("valid schema")
    }

    fn row(entries: &[(&str, CellValue)]) -> LaneValues {
        entries
            .iter()
            .map(|(key, value)| ((*key).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn literal_rules_are_returned_directly() {
        let schema = schema();
        let evaluator = EditabilityEvaluator::new(&schema);
        let empty = LaneValues::new();
        assert!(evaluator.is_editable("driver_mode", &empty));
        assert_eq!(
            evaluator.check("prop_9", &empty),
            Err(EditabilityError::ReadOnly("prop_9".to_owned()))
        );
    }

    #[test]
    fn dependency_gate_follows_live_row_value() {
        let schema = schema();
        let evaluator = EditabilityEvaluator::new(&schema);

        let mut state = row(&[("driver_mode", CellValue::Int(1))]);
        assert!(!evaluator.is_editable("prop_4", &state));
        assert!(evaluator.is_editable("prop_8", &state));

        state.insert("driver_mode".to_owned(), CellValue::Int(3));
        assert!(evaluator.is_editable("prop_4", &state));
        assert!(!evaluator.is_editable("prop_8", &state));
    }

    #[test]
    fn dependency_values_are_coerced_to_the_allowed_type() {
        let schema = schema();
        let evaluator = EditabilityEvaluator::new(&schema);

        assert!(evaluator.is_editable("prop_4", &row(&[("driver_mode", CellValue::text("2"))])));
        assert!(evaluator.is_editable("scale", &row(&[("gain", CellValue::text("1.5"))])));
        assert!(evaluator.is_editable("scale", &row(&[("gain", CellValue::Float(0.5))])));
        assert!(!evaluator.is_editable("scale", &row(&[("gain", CellValue::Int(1))])));
    }

    #[test]
    fn uncoercible_dependency_fails_closed() {
        let schema = schema();
        let evaluator = EditabilityEvaluator::new(&schema);

        for value in [
            CellValue::text("debug"),
            CellValue::text(""),
            CellValue::Float(2.5),
            CellValue::text("2.0"),
        ] {
            let state = row(&[("driver_mode", value.clone())]);
            assert!(
                matches!(
                    evaluator.check("prop_4", &state),
                    Err(EditabilityError::Dependency {
                        source: DependencyError::Uncoercible { .. },
                        ..
                    })
                ),
                "{value:?} should fail to coerce"
            );
        }
    }

    #[test]
    fn unresolvable_dependencies_fail_closed() {
        let schema = schema();
        let evaluator = EditabilityEvaluator::new(&schema);
        let state = row(&[("driver_mode", CellValue::Int(1))]);

        assert!(matches!(
            evaluator.check("orphan", &state),
            Err(EditabilityError::Dependency {
                source: DependencyError::UnknownColumn(_),
                ..
            })
        ));
        assert!(matches!(
            evaluator.check("never", &state),
            Err(EditabilityError::Dependency {
                source: DependencyError::EmptyAllowedSet(_),
                ..
            })
        ));
        assert!(matches!(
            evaluator.check("prop_4", &LaneValues::new()),
            Err(EditabilityError::Dependency {
                source: DependencyError::MissingValue(_),
                ..
            })
        ));
    }

    #[test]
    fn non_data_columns_are_never_editable() {
        let schema = schema();
        let evaluator = EditabilityEvaluator::new(&schema);
        let empty = LaneValues::new();
        assert_eq!(
            evaluator.check("Operation", &empty),
            Err(EditabilityError::NotDataColumn("Operation".to_owned()))
        );
        assert_eq!(
            evaluator.check("row", &empty),
            Err(EditabilityError::NotDataColumn("row".to_owned()))
        );
        assert_eq!(
            evaluator.check("nope", &empty),
            Err(EditabilityError::UnknownColumn("nope".to_owned()))
        );
    }

    #[test]
    fn evaluate_row_covers_every_data_column() {
        let schema = schema();
        let evaluator = EditabilityEvaluator::new(&schema);
        let states = evaluator.evaluate_row(&row(&[("driver_mode", CellValue::Int(2))]));
        let keys: Vec<_> = states.iter().map(|(key, _)| *key).collect();
        assert_eq!(
            keys,
            vec!["driver_mode", "prop_4", "prop_8", "scale", "gain", "orphan", "never", "prop_9"]
        );
        assert!(states.contains(&("prop_4", true)));
        assert!(states.contains(&("prop_8", false)));
    }
}
