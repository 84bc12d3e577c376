use std::fmt;

use crate::common::STRING_LEN;

/// Field types a heap tuple can hold. Every type has a fixed on-disk width so
/// that a page can be laid out as an array of equally sized slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit signed integer: 4 bytes, little-endian
    Int,

    /// String of at most n bytes.
    /// Stored as: length (4 bytes, little-endian) + n bytes, zero padded
    Str(usize),
}

impl DataType {
    /// A string type with the default width.
    pub fn string() -> Self {
        DataType::Str(STRING_LEN)
    }

    /// Returns the number of bytes a field of this type occupies on disk.
    pub fn byte_len(&self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Str(n) => 4 + n,
        }
    }

    /// Short name used when rendering schemas.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int => "INT",
            DataType::Str(_) => "STRING",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Str(n) => write!(f, "STRING({})", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_len() {
        assert_eq!(DataType::Int.byte_len(), 4);
        assert_eq!(DataType::Str(10).byte_len(), 14);
        assert_eq!(DataType::string().byte_len(), 4 + STRING_LEN);
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::Int.to_string(), "INT");
        assert_eq!(DataType::Str(16).to_string(), "STRING(16)");
        assert_eq!(DataType::Str(16).name(), "STRING");
    }
}
