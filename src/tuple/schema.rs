use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::common::{DbError, Result};

use super::DataType;

/// A single column of a schema. Names are optional; derived schemas such as
/// anonymous projections may leave them unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: Option<String>,
    data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: Some(name.into()),
            data_type,
        }
    }

    pub fn unnamed(data_type: DataType) -> Self {
        Self {
            name: None,
            data_type,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }
}

/// Describes the layout of a tuple: an ordered list of typed, optionally named columns.
///
/// Equality only looks at the column types. Two schemas with the same types in
/// the same order are interchangeable regardless of their column names.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
    /// First index for each column name
    name_to_index: HashMap<String, usize>,
    /// Sum of all column widths
    byte_size: usize,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        let mut name_to_index = HashMap::new();
        for (i, col) in columns.iter().enumerate() {
            if let Some(name) = &col.name {
                name_to_index.entry(name.clone()).or_insert(i);
            }
        }
        let byte_size = columns.iter().map(|c| c.data_type.byte_len()).sum();

        Self {
            columns,
            name_to_index,
            byte_size,
        }
    }

    /// Creates an unnamed schema from a list of types.
    pub fn from_types(types: &[DataType]) -> Self {
        Self::new(types.iter().copied().map(Column::unnamed).collect())
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Concatenates two schemas, `left` columns first.
    pub fn merge(left: &Schema, right: &Schema) -> Schema {
        let columns = left
            .columns
            .iter()
            .chain(right.columns.iter())
            .cloned()
            .collect();
        Schema::new(columns)
    }

    /// Returns a copy of this schema with every column name prefixed by `alias.`.
    /// Unnamed columns become `alias.null`.
    pub fn with_prefix(&self, alias: &str) -> Schema {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let name = format!("{}.{}", alias, c.name().unwrap_or("null"));
                Column::new(name, c.data_type)
            })
            .collect();
        Schema::new(columns)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Returns the type of the column at `index`.
    pub fn data_type(&self, index: usize) -> Result<DataType> {
        self.columns
            .get(index)
            .map(|c| c.data_type)
            .ok_or(DbError::FieldIndexOutOfBounds(index))
    }

    /// Returns the name of the column at `index`, if it has one.
    pub fn field_name(&self, index: usize) -> Result<Option<&str>> {
        self.columns
            .get(index)
            .map(|c| c.name())
            .ok_or(DbError::FieldIndexOutOfBounds(index))
    }

    /// Finds the first column with the given name.
    pub fn field_name_to_index(&self, name: &str) -> Result<usize> {
        self.name_to_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::NoSuchField(name.to_string()))
    }

    /// Size in bytes of a tuple with this schema.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(a, b)| a.data_type == b.data_type)
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}({})", col.data_type.name(), col.name().unwrap_or("null"))?;
        }
        Ok(())
    }
}

/// Builder for constructing schemas fluently.
pub struct SchemaBuilder {
    columns: Vec<Column>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Adds a named column.
    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type));
        self
    }

    /// Adds a column without a name.
    pub fn unnamed_column(mut self, data_type: DataType) -> Self {
        self.columns.push(Column::unnamed(data_type));
        self
    }

    pub fn build(self) -> Schema {
        Schema::new(self.columns)
    }

    /// Builds the schema wrapped in an Arc for shared ownership.
    pub fn build_arc(self) -> Arc<Schema> {
        Arc::new(self.build())
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Schema {
        Schema::builder()
            .column("id", DataType::Int)
            .column("name", DataType::Str(16))
            .column("age", DataType::Int)
            .build()
    }

    #[test]
    fn test_schema_creation() {
        let schema = people();
        assert_eq!(schema.column_count(), 3);
        assert_eq!(schema.field_name(1).unwrap(), Some("name"));
        assert_eq!(schema.data_type(2).unwrap(), DataType::Int);
        assert_eq!(schema.byte_size(), 4 + 20 + 4);
        assert!(matches!(
            schema.data_type(3),
            Err(DbError::FieldIndexOutOfBounds(3))
        ));
    }

    #[test]
    fn test_name_lookup() {
        let schema = people();
        assert_eq!(schema.field_name_to_index("age").unwrap(), 2);
        assert!(matches!(
            schema.field_name_to_index("email"),
            Err(DbError::NoSuchField(_))
        ));
    }

    #[test]
    fn test_duplicate_names_resolve_to_first() {
        let schema = Schema::merge(&people(), &people());
        assert_eq!(schema.field_name_to_index("id").unwrap(), 0);
    }

    #[test]
    fn test_equality_ignores_names() {
        let named = people();
        let anonymous = Schema::from_types(&[DataType::Int, DataType::Str(16), DataType::Int]);
        assert_eq!(named, anonymous);

        let wider = Schema::from_types(&[DataType::Int, DataType::Str(32), DataType::Int]);
        assert_ne!(named, wider);
    }

    #[test]
    fn test_merge_and_prefix() {
        let merged = Schema::merge(&people(), &Schema::from_types(&[DataType::Int]));
        assert_eq!(merged.column_count(), 4);
        assert_eq!(merged.byte_size(), people().byte_size() + 4);

        let aliased = people().with_prefix("p");
        assert_eq!(aliased.field_name_to_index("p.name").unwrap(), 1);
        assert_eq!(aliased.to_string(), "INT(p.id), STRING(p.name), INT(p.age)");
    }
}
