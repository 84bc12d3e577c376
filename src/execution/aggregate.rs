use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::common::{DbError, Result};
use crate::tuple::{Column, DataType, Field, Schema, Tuple};

use super::Operator;

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl AggregateOp {
    /// COUNT accepts any field type; everything else needs integers.
    pub fn supports(&self, data_type: &DataType) -> bool {
        matches!(self, AggregateOp::Count) || *data_type == DataType::Int
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregateOp::Min => "MIN",
            AggregateOp::Max => "MAX",
            AggregateOp::Sum => "SUM",
            AggregateOp::Avg => "AVG",
            AggregateOp::Count => "COUNT",
        };
        f.write_str(s)
    }
}

/// Running state for one group.
#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    count: i64,
    sum: i64,
    min: Option<i32>,
    max: Option<i32>,
}

impl Accumulator {
    fn add(&mut self, field: &Field) -> Result<()> {
        self.count += 1;
        if let Some(v) = field.as_int() {
            self.sum = self
                .sum
                .checked_add(v as i64)
                .ok_or(DbError::ArithmeticOverflow)?;
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        }
        Ok(())
    }

    /// Final value, or None if the group produced no value (empty MIN/MAX/AVG).
    fn finish(&self, op: AggregateOp) -> Result<Option<i32>> {
        let value = match op {
            AggregateOp::Count => self.count,
            AggregateOp::Sum => self.sum,
            AggregateOp::Avg if self.count == 0 => return Ok(None),
            AggregateOp::Avg => self.sum / self.count,
            AggregateOp::Min => return Ok(self.min),
            AggregateOp::Max => return Ok(self.max),
        };
        i32::try_from(value)
            .map(Some)
            .map_err(|_| DbError::ArithmeticOverflow)
    }
}

/// Computes one aggregate over the child's tuples, optionally grouped by a field.
///
/// The child is drained on `open`. Output tuples are `(group, value)` with
/// groups in ascending order, or a single `(value)` when ungrouped. The value
/// column is always an integer named `OP(field)`; AVG uses integer division.
/// Over empty input an ungrouped COUNT or SUM yields 0, while MIN, MAX and AVG
/// yield no row.
pub struct Aggregate {
    child: Box<Operator>,
    agg_field: usize,
    group_field: Option<usize>,
    op: AggregateOp,
    schema: Arc<Schema>,
    results: Vec<Tuple>,
    position: usize,
}

impl Aggregate {
    pub fn new(
        child: Operator,
        agg_field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self> {
        let schema = Self::output_schema(child.schema(), agg_field, group_field, op)?;

        Ok(Self {
            child: Box::new(child),
            agg_field,
            group_field,
            op,
            schema,
            results: Vec::new(),
            position: 0,
        })
    }

    /// Checks the aggregate against the child's schema and builds the output
    /// schema: the group column, if any, then `OP(field)`.
    fn output_schema(
        child_schema: &Schema,
        agg_field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Arc<Schema>> {
        let agg_type = child_schema.data_type(agg_field)?;
        if !op.supports(&agg_type) {
            return Err(DbError::UnsupportedAggregate {
                op: op.to_string(),
                data_type: agg_type.to_string(),
            });
        }

        let agg_name = child_schema.field_name(agg_field)?.unwrap_or("null");
        let mut columns = Vec::with_capacity(2);
        if let Some(g) = group_field {
            let group_column = child_schema
                .column(g)
                .cloned()
                .ok_or(DbError::FieldIndexOutOfBounds(g))?;
            columns.push(group_column);
        }
        columns.push(Column::new(format!("{}({})", op, agg_name), DataType::Int));
        Ok(Arc::new(Schema::new(columns)))
    }

    pub fn op(&self) -> AggregateOp {
        self.op
    }

    pub fn agg_field(&self) -> usize {
        self.agg_field
    }

    pub fn group_field(&self) -> Option<usize> {
        self.group_field
    }

    pub(crate) fn child(&self) -> &Operator {
        &self.child
    }

    /// Replaces the child, re-checking the aggregate against its schema. On
    /// error the current child is kept.
    pub(crate) fn set_child(&mut self, child: Operator) -> Result<()> {
        self.schema =
            Self::output_schema(child.schema(), self.agg_field, self.group_field, self.op)?;
        self.child = Box::new(child);
        self.results.clear();
        self.position = 0;
        Ok(())
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        self.child.open()?;

        let mut groups: BTreeMap<Option<Field>, Accumulator> = BTreeMap::new();
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            let key = match self.group_field {
                Some(g) => Some(tuple.field(g)?.clone()),
                None => None,
            };
            groups.entry(key).or_default().add(tuple.field(self.agg_field)?)?;
        }
        if self.group_field.is_none() && groups.is_empty() {
            groups.insert(None, Accumulator::default());
        }

        self.results.clear();
        for (key, acc) in groups {
            let Some(value) = acc.finish(self.op)? else {
                continue;
            };
            let mut fields = Vec::with_capacity(2);
            fields.extend(key);
            fields.push(Field::Int(value));
            self.results.push(Tuple::new(Arc::clone(&self.schema), fields)?);
        }
        self.position = 0;
        Ok(())
    }

    pub(crate) fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        let tuple = self.results.get(self.position).cloned();
        if tuple.is_some() {
            self.position += 1;
        }
        Ok(tuple)
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        self.child.close();
        self.results.clear();
        self.position = 0;
    }

    pub(crate) fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(rows: &[(&str, i32)]) -> Operator {
        let schema = Schema::builder()
            .column("g", DataType::Str(8))
            .column("v", DataType::Int)
            .build_arc();
        let tuples = rows
            .iter()
            .map(|&(g, v)| Tuple::new(schema.clone(), vec![Field::from(g), Field::Int(v)]).unwrap())
            .collect();
        Operator::values(schema, tuples).unwrap()
    }

    fn run(child: Operator, group: Option<usize>, op: AggregateOp) -> Vec<Vec<Field>> {
        let mut agg = Operator::aggregate(child, 1, group, op).unwrap();
        agg.open().unwrap();
        agg.fetch_all()
            .unwrap()
            .into_iter()
            .map(|t| t.fields().to_vec())
            .collect()
    }

    #[test]
    fn test_ungrouped_ops() {
        let rows = [("a", 1), ("a", 2), ("b", 4)];
        assert_eq!(run(source(&rows), None, AggregateOp::Sum), vec![vec![Field::Int(7)]]);
        assert_eq!(run(source(&rows), None, AggregateOp::Min), vec![vec![Field::Int(1)]]);
        assert_eq!(run(source(&rows), None, AggregateOp::Max), vec![vec![Field::Int(4)]]);
        assert_eq!(run(source(&rows), None, AggregateOp::Count), vec![vec![Field::Int(3)]]);
        // 7 / 3 truncates
        assert_eq!(run(source(&rows), None, AggregateOp::Avg), vec![vec![Field::Int(2)]]);
    }

    #[test]
    fn test_grouped_sum() {
        let rows = [("b", 10), ("a", 1), ("b", 5), ("a", 2)];
        assert_eq!(
            run(source(&rows), Some(0), AggregateOp::Sum),
            vec![
                vec![Field::from("a"), Field::Int(3)],
                vec![Field::from("b"), Field::Int(15)],
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(run(source(&[]), None, AggregateOp::Count), vec![vec![Field::Int(0)]]);
        assert_eq!(run(source(&[]), None, AggregateOp::Sum), vec![vec![Field::Int(0)]]);
        assert!(run(source(&[]), None, AggregateOp::Avg).is_empty());
        assert!(run(source(&[]), None, AggregateOp::Min).is_empty());
        assert!(run(source(&[]), Some(0), AggregateOp::Count).is_empty());
    }

    #[test]
    fn test_string_fields_only_count() {
        let mut count =
            Operator::aggregate(source(&[("x", 1), ("y", 1)]), 0, None, AggregateOp::Count)
                .unwrap();
        count.open().unwrap();
        assert_eq!(count.next().unwrap().field(0).unwrap(), &Field::Int(2));

        assert!(matches!(
            Operator::aggregate(source(&[]), 0, None, AggregateOp::Sum),
            Err(DbError::UnsupportedAggregate { .. })
        ));
    }

    #[test]
    fn test_output_schema() {
        let agg = Operator::aggregate(source(&[]), 1, Some(0), AggregateOp::Max).unwrap();
        assert_eq!(agg.schema().column_count(), 2);
        assert_eq!(agg.schema().field_name_to_index("MAX(v)").unwrap(), 1);
        assert_eq!(agg.schema().data_type(0).unwrap(), DataType::Str(8));
    }

    #[test]
    fn test_replaced_child_is_rechecked() {
        let mut sum =
            Operator::aggregate(source(&[("a", 1)]), 1, Some(0), AggregateOp::Sum).unwrap();

        // SUM over a string column
        let swapped = Schema::builder()
            .column("k", DataType::Int)
            .column("label", DataType::Str(8))
            .build_arc();
        let bad = Operator::values(swapped, Vec::new()).unwrap();
        assert!(matches!(
            sum.set_children(vec![bad]),
            Err(DbError::UnsupportedAggregate { .. })
        ));
        assert_eq!(sum.schema().field_name(1).unwrap(), Some("SUM(v)"));

        let renamed = Schema::builder()
            .column("team", DataType::Str(4))
            .column("points", DataType::Int)
            .build_arc();
        let tuples = vec![
            Tuple::new(renamed.clone(), vec!["red".into(), 3.into()]).unwrap(),
            Tuple::new(renamed.clone(), vec!["red".into(), 4.into()]).unwrap(),
        ];
        sum.set_children(vec![Operator::values(renamed, tuples).unwrap()]).unwrap();
        assert_eq!(sum.schema().field_name(1).unwrap(), Some("SUM(points)"));
        assert_eq!(sum.schema().data_type(0).unwrap(), DataType::Str(4));

        sum.open().unwrap();
        let rows = sum.fetch_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields(), &[Field::from("red"), Field::Int(7)]);
    }

    #[test]
    fn test_sum_overflow() {
        let rows = [("a", i32::MAX), ("a", 1)];
        let mut agg = Operator::aggregate(source(&rows), 1, None, AggregateOp::Sum).unwrap();
        assert!(matches!(agg.open(), Err(DbError::ArithmeticOverflow)));
    }
}
