use std::fmt;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field as ArrowField, Fields as ArrowFields, Schema as ArrowSchema};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::types::ColumnId;

/// Name of the child field of a vector column.
const VECTOR_ITEM_FIELD_NAME: &str = "item";

/// Estimated in-memory width of a variable-length value, used for buffer accounting.
const VARLEN_ESTIMATED_WIDTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    /// Fixed-dimension embedding of 32-bit floats.
    Vector(u32),
}

impl LogicalType {
    #[inline]
    pub fn to_arrow_data_type(&self) -> DataType {
        match self {
            LogicalType::Boolean => DataType::Boolean,
            LogicalType::Int8 => DataType::Int8,
            LogicalType::Int16 => DataType::Int16,
            LogicalType::Int32 => DataType::Int32,
            LogicalType::Int64 => DataType::Int64,
            LogicalType::UInt8 => DataType::UInt8,
            LogicalType::UInt16 => DataType::UInt16,
            LogicalType::UInt32 => DataType::UInt32,
            LogicalType::UInt64 => DataType::UInt64,
            LogicalType::Float32 => DataType::Float32,
            LogicalType::Float64 => DataType::Float64,
            LogicalType::String => DataType::Utf8,
            LogicalType::Vector(dim) => {
                let item = ArrowField::new(VECTOR_ITEM_FIELD_NAME, DataType::Float32, false);
                DataType::FixedSizeList(Arc::new(item), *dim as i32)
            }
        }
    }

    /// Returns the number of bytes a single value of this type is expected to occupy.
    #[inline]
    pub fn estimated_width(&self) -> usize {
        match self {
            LogicalType::Boolean | LogicalType::Int8 | LogicalType::UInt8 => 1,
            LogicalType::Int16 | LogicalType::UInt16 => 2,
            LogicalType::Int32 | LogicalType::UInt32 | LogicalType::Float32 => 4,
            LogicalType::Int64 | LogicalType::UInt64 | LogicalType::Float64 => 8,
            LogicalType::String => VARLEN_ESTIMATED_WIDTH,
            LogicalType::Vector(dim) => *dim as usize * 4,
        }
    }
}

impl fmt::Display for LogicalType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Boolean => write!(f, "boolean"),
            LogicalType::Int8 => write!(f, "int8"),
            LogicalType::Int16 => write!(f, "int16"),
            LogicalType::Int32 => write!(f, "int32"),
            LogicalType::Int64 => write!(f, "int64"),
            LogicalType::UInt8 => write!(f, "uint8"),
            LogicalType::UInt16 => write!(f, "uint16"),
            LogicalType::UInt32 => write!(f, "uint32"),
            LogicalType::UInt64 => write!(f, "uint64"),
            LogicalType::Float32 => write!(f, "float32"),
            LogicalType::Float64 => write!(f, "float64"),
            LogicalType::String => write!(f, "string"),
            LogicalType::Vector(dim) => write!(f, "vector({dim})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    name: SmolStr,
    ty: LogicalType,
    nullable: bool,
}

impl ColumnDef {
    #[inline]
    pub fn new(name: impl Into<SmolStr>, ty: LogicalType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ty(&self) -> &LogicalType {
        &self.ty
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[inline]
    pub fn to_arrow_field(&self) -> ArrowField {
        ArrowField::new(
            self.name.as_str(),
            self.ty.to_arrow_data_type(),
            self.nullable,
        )
    }
}

impl fmt::Display for ColumnDef {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.name, self.ty)
    }
}

pub type TableDefRef = Arc<TableDef>;

/// Definition of a table supplied at creation time: its name and ordered column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    table_name: SmolStr,
    columns: Vec<ColumnDef>,
}

impl TableDef {
    #[inline]
    pub fn new(table_name: impl Into<SmolStr>, columns: Vec<ColumnDef>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
        }
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    #[inline]
    pub fn column(&self, id: ColumnId) -> Option<&ColumnDef> {
        self.columns.get(id)
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_id_by_name(&self, name: &str) -> Option<ColumnId> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Sum of the estimated widths of all columns.
    pub fn estimated_row_width(&self) -> usize {
        self.columns.iter().map(|c| c.ty().estimated_width()).sum()
    }

    #[inline]
    pub fn to_arrow_schema(&self) -> ArrowSchema {
        let fields: ArrowFields = self.columns.iter().map(ColumnDef::to_arrow_field).collect();
        ArrowSchema::new(fields)
    }
}

impl fmt::Display for TableDef {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.table_name, self.columns.iter().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> TableDef {
        TableDef::new("person", vec![
            ColumnDef::new("id", LogicalType::Int64, false),
            ColumnDef::new("name", LogicalType::String, true),
            ColumnDef::new("embedding", LogicalType::Vector(4), false),
        ])
    }

    #[test]
    fn test_table_def_lookup() {
        let def = person();
        assert_eq!(def.num_columns(), 3);
        assert_eq!(def.column_id_by_name("name"), Some(1));
        assert_eq!(def.column_id_by_name("age"), None);
        assert_eq!(def.column(2).unwrap().ty(), &LogicalType::Vector(4));
    }

    #[test]
    fn test_estimated_row_width() {
        assert_eq!(person().estimated_row_width(), 8 + 16 + 16);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            person().to_string(),
            "person (id::int64, name::string, embedding::vector(4))"
        );
    }

    #[test]
    fn test_serde() {
        let def = person();
        let json = serde_json::to_string(&def).unwrap();
        let back: TableDef = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }
}
