use std::fmt;
use std::sync::Arc;

use bytes::BufMut;

use crate::common::{DbError, RecordId, Result};

use super::{Field, Schema};

/// A single row.
///
/// A tuple holds one field per schema column and, once it has been read from
/// or written to a heap page, the [`RecordId`] of the slot it lives in.
///
/// ## Binary Format
///
/// Fields are written back to back in schema order with no header:
///
/// ```text
/// +-----------+-----------+-----+-----------+
/// | field 0   | field 1   | ... | field n-1 |
/// +-----------+-----------+-----+-----------+
/// ```
///
/// Every field has a fixed width (see [`DataType::byte_len`](super::DataType::byte_len)),
/// so an encoded tuple is always exactly `schema.byte_size()` bytes.
#[derive(Debug, Clone)]
pub struct Tuple {
    schema: Arc<Schema>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a tuple, checking that `fields` matches the schema's arity and types.
    pub fn new(schema: Arc<Schema>, fields: Vec<Field>) -> Result<Self> {
        if fields.len() != schema.column_count() {
            return Err(DbError::SchemaMismatch {
                expected: schema.to_string(),
                found: format!("{} fields", fields.len()),
            });
        }
        let fields = fields
            .into_iter()
            .enumerate()
            .map(|(i, f)| f.fit(&schema.data_type(i)?))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema,
            fields,
            record_id: None,
        })
    }

    /// Concatenates two tuples under an already merged schema.
    pub fn concat(schema: Arc<Schema>, left: &Tuple, right: &Tuple) -> Tuple {
        let fields = left
            .fields
            .iter()
            .chain(right.fields.iter())
            .cloned()
            .collect();
        Tuple {
            schema,
            fields,
            record_id: None,
        }
    }

    /// Decodes a tuple from exactly `schema.byte_size()` bytes.
    pub fn decode(schema: Arc<Schema>, data: &[u8]) -> Option<Self> {
        if data.len() != schema.byte_size() {
            return None;
        }
        let mut buf = data;
        let fields = schema
            .columns()
            .map(|c| Field::decode(c.data_type(), &mut buf))
            .collect::<Option<Vec<_>>>()?;

        Some(Self {
            schema,
            fields,
            record_id: None,
        })
    }

    /// Appends the fixed-width encoding of this tuple to `buf`.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        for (field, col) in self.fields.iter().zip(self.schema.columns()) {
            field.encode(col.data_type(), buf)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.schema.byte_size());
        self.encode(&mut buf)?;
        Ok(buf)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn field(&self, index: usize) -> Result<&Field> {
        self.fields
            .get(index)
            .ok_or(DbError::FieldIndexOutOfBounds(index))
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Replaces the field at `index`, checking it against the column type.
    pub fn set_field(&mut self, index: usize, field: Field) -> Result<()> {
        let data_type = self.schema.data_type(index)?;
        self.fields[index] = field.fit(&data_type)?;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    pub(crate) fn with_record_id(mut self, record_id: RecordId) -> Self {
        self.record_id = Some(record_id);
        self
    }

    /// Swaps in a schema with the same column types, e.g. one with aliased names.
    pub(crate) fn with_schema(mut self, schema: Arc<Schema>) -> Result<Self> {
        if *schema != *self.schema {
            return Err(DbError::SchemaMismatch {
                expected: schema.to_string(),
                found: self.schema.to_string(),
            });
        }
        self.schema = schema;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.fields == other.fields
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}

/// Builder for constructing tuples fluently.
pub struct TupleBuilder {
    schema: Arc<Schema>,
    fields: Vec<Field>,
}

impl TupleBuilder {
    pub fn new(schema: Arc<Schema>) -> Self {
        let count = schema.column_count();
        Self {
            schema,
            fields: Vec::with_capacity(count),
        }
    }

    /// Appends the next field in column order.
    pub fn field(mut self, field: impl Into<Field>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Builds the tuple, validating it against the schema.
    pub fn build(self) -> Result<Tuple> {
        Tuple::new(self.schema, self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageId, SlotId, TableId};
    use crate::tuple::DataType;

    fn schema() -> Arc<Schema> {
        Schema::builder()
            .column("id", DataType::Int)
            .column("name", DataType::Str(8))
            .build_arc()
    }

    #[test]
    fn test_tuple_creation() {
        let tuple = TupleBuilder::new(schema())
            .field(1)
            .field("alice")
            .build()
            .unwrap();
        assert_eq!(tuple.len(), 2);
        assert_eq!(tuple.field(0).unwrap(), &Field::Int(1));
        assert_eq!(tuple.record_id(), None);
        assert_eq!(tuple.to_string(), "1\talice");
    }

    #[test]
    fn test_arity_and_type_checks() {
        assert!(matches!(
            Tuple::new(schema(), vec![Field::Int(1)]),
            Err(DbError::SchemaMismatch { .. })
        ));
        assert!(matches!(
            Tuple::new(schema(), vec![Field::from("x"), Field::from("y")]),
            Err(DbError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_with_schema_keeps_types() {
        let tuple = Tuple::new(schema(), vec![Field::Int(1), Field::from("a")]).unwrap();
        let aliased = schema().with_prefix("t");
        let renamed = tuple.clone().with_schema(Arc::new(aliased)).unwrap();
        assert_eq!(renamed.schema().field_name(0).unwrap(), Some("t.id"));

        let ints = Schema::builder()
            .column("a", DataType::Int)
            .column("b", DataType::Int)
            .build_arc();
        assert!(matches!(
            tuple.with_schema(ints),
            Err(DbError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_set_field() {
        let mut tuple = Tuple::new(schema(), vec![Field::Int(1), Field::from("a")]).unwrap();
        tuple.set_field(0, Field::Int(7)).unwrap();
        assert_eq!(tuple.field(0).unwrap().as_int(), Some(7));
        assert!(tuple.set_field(0, Field::from("no")).is_err());
        assert!(matches!(
            tuple.set_field(5, Field::Int(0)),
            Err(DbError::FieldIndexOutOfBounds(5))
        ));
    }

    #[test]
    fn test_encode_decode() {
        let tuple = Tuple::new(schema(), vec![Field::Int(-5), Field::from("bob")]).unwrap();
        let bytes = tuple.to_bytes().unwrap();
        assert_eq!(bytes.len(), schema().byte_size());

        let decoded = Tuple::decode(schema(), &bytes).unwrap();
        assert_eq!(decoded, tuple);
        assert!(Tuple::decode(schema(), &bytes[1..]).is_none());
    }

    #[test]
    fn test_equality_ignores_record_id() {
        let a = Tuple::new(schema(), vec![Field::Int(1), Field::from("a")]).unwrap();
        let rid = RecordId::new(PageId::new(TableId::new(1), 0), SlotId::new(3));
        let b = a.clone().with_record_id(rid);
        assert_eq!(a, b);
        assert_eq!(b.record_id(), Some(rid));
    }

    #[test]
    fn test_long_strings_are_truncated() {
        let tuple = Tuple::new(schema(), vec![Field::Int(1), Field::from("abcdefghijk")]).unwrap();
        assert_eq!(tuple.field(1).unwrap().as_str(), Some("abcdefgh"));
    }
}
