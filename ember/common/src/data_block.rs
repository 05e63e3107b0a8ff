use arrow::array::{Array, ArrayRef, BooleanArray, new_empty_array};
use arrow::compute;
use arrow::datatypes::DataType;
use itertools::Itertools;

use crate::data_type::TableDef;
use crate::types::ColumnId;

/// A horizontal block of rows in columnar layout, the unit handed between the execution layer
/// and storage.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    columns: Vec<ArrayRef>,
    filter: Option<BooleanArray>,
}

impl DataBlock {
    #[inline]
    pub fn new(columns: Vec<ArrayRef>) -> Self {
        assert!(!columns.is_empty(), "columns must not be empty");
        assert!(
            columns.iter().map(|c| c.len()).all_equal(),
            "all columns must have the same length"
        );
        Self {
            columns,
            filter: None,
        }
    }

    #[inline]
    pub fn new_empty(def: &TableDef) -> Self {
        let columns = def
            .columns()
            .iter()
            .map(|c| new_empty_array(&c.ty().to_arrow_data_type()))
            .collect();
        Self::new(columns)
    }

    #[inline]
    pub fn with_filter(self, filter: BooleanArray) -> Self {
        assert_eq!(
            self.len(),
            filter.len(),
            "filter must have the same length as the data block"
        );
        Self {
            filter: Some(filter),
            ..self
        }
    }

    #[inline]
    pub fn filter(&self) -> Option<&BooleanArray> {
        self.filter.as_ref()
    }

    /// Number of rows selected by the filter, or all rows if there is none.
    #[inline]
    pub fn cardinality(&self) -> usize {
        if let Some(filter) = &self.filter {
            filter.true_count()
        } else {
            self.len()
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.columns[0].len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn columns(&self) -> &[ArrayRef] {
        &self.columns
    }

    #[inline]
    pub fn column(&self, id: ColumnId) -> &ArrayRef {
        &self.columns[id]
    }

    #[inline]
    pub fn data_types(&self) -> impl Iterator<Item = &DataType> {
        self.columns.iter().map(|c| c.data_type())
    }

    /// Eagerly applies the filter to each column.
    ///
    /// # Panics
    ///
    /// Panics if the filter is not applied successfully.
    pub fn compact(&mut self) {
        if let Some(filter) = self.filter.take() {
            self.columns = self
                .columns
                .iter()
                .map(|column| {
                    compute::kernels::filter::filter(column, &filter)
                        .expect("filter should be applied successfully")
                })
                .collect();
        }
    }

    /// Returns a zero-copy slice of this block with the indicated offset and length.
    ///
    /// # Panics
    ///
    /// Panics if the offset and length are out of bounds.
    pub fn slice(&self, offset: usize, length: usize) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| c.slice(offset, length))
            .collect();
        let filter = self.filter.as_ref().map(|f| f.slice(offset, length));
        Self { columns, filter }
    }

    /// Keeps only the given columns, in the given order.
    ///
    /// # Panics
    ///
    /// Panics if `column_ids` is empty or any id is out of bounds.
    pub fn project(&self, column_ids: &[ColumnId]) -> Self {
        let columns = column_ids.iter().map(|id| self.columns[*id].clone()).collect();
        Self {
            filter: self.filter.clone(),
            ..Self::new(columns)
        }
    }

    /// Concatenates multiple blocks vertically into a single block.
    ///
    /// Every input block is compacted first, so the result is always unfiltered.
    pub fn concat<I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = DataBlock>,
    {
        let mut blocks = blocks.into_iter().collect_vec();
        assert!(!blocks.is_empty(), "blocks must not be empty");
        assert!(
            blocks.iter().map(|b| b.columns.len()).all_equal(),
            "all blocks must have the same number of columns"
        );
        blocks.iter_mut().for_each(|block| block.compact());
        if blocks.len() == 1 {
            return blocks.swap_remove(0);
        }
        let num_columns = blocks[0].columns.len();
        let columns = (0..num_columns)
            .map(|i| {
                compute::kernels::concat::concat(
                    &blocks
                        .iter()
                        .map(|block| block.columns[i].as_ref())
                        .collect_vec(),
                )
                .expect("concatenation should be successful")
            })
            .collect();
        Self {
            columns,
            filter: None,
        }
    }
}

impl FromIterator<DataBlock> for DataBlock {
    #[inline]
    fn from_iter<T: IntoIterator<Item = DataBlock>>(iter: T) -> Self {
        DataBlock::concat(iter)
    }
}

#[macro_export]
macro_rules! data_block {
    ($(($type:ident, [$($values:expr),*])),*) => {
        {
            let columns: Vec<arrow::array::ArrayRef> = vec![$(
                arrow::array::create_array!($type, [$($values),*]),
            )*];
            $crate::data_block::DataBlock::new(columns)
        }
    };
    ({ $($filter_values:expr),* }, $(($type:ident, [$($values:expr),*])),*) => {
        {
            let columns: Vec<arrow::array::ArrayRef> = vec![$(
                arrow::array::create_array!($type, [$($values),*]),
            )*];
            let filter = arrow::buffer::BooleanBuffer::from_iter([$($filter_values),*]);
            $crate::data_block::DataBlock::new(columns).with_filter(filter.into())
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::{ColumnDef, LogicalType};

    #[test]
    fn test_slice() {
        let block = data_block!(
            { true, false, true },
            (Int32, [1, 2, 3]),
            (Utf8, ["abc", "def", "ghi"])
        );
        let sliced = block.slice(1, 1);
        let expected = data_block!({ false }, (Int32, [2]), (Utf8, ["def"]));
        assert_eq!(sliced, expected);
    }

    #[test]
    #[should_panic]
    fn test_slice_out_of_bounds() {
        let block = data_block!((Int32, [1, 2, 3]));
        let _sliced = block.slice(2, 2);
    }

    #[test]
    fn test_compact() {
        let mut block = data_block!(
            { false, true, false },
            (Int32, [1, 2, 3]),
            (Utf8, ["abc", "def", "ghi"])
        );
        assert_eq!(block.cardinality(), 1);
        block.compact();
        let expected = data_block!((Int32, [2]), (Utf8, ["def"]));
        assert_eq!(block, expected);
    }

    #[test]
    fn test_project() {
        let block = data_block!((Int32, [1, 2]), (Utf8, ["a", "b"]), (Int64, [7, 8]));
        let projected = block.project(&[2, 0]);
        assert_eq!(projected, data_block!((Int64, [7, 8]), (Int32, [1, 2])));
    }

    #[test]
    fn test_concat() {
        let block1 =
            data_block!({ false, true, true }, (Int32, [1, 2, 3]), (Utf8, ["aaa", "bbb", "ccc"]));
        let block2 = data_block!((Int32, [4, 5, 6]), (Utf8, ["ddd", "eee", "fff"]));
        let expected = data_block!(
            (Int32, [2, 3, 4, 5, 6]),
            (Utf8, ["bbb", "ccc", "ddd", "eee", "fff"])
        );
        assert_eq!(DataBlock::concat([block1, block2]), expected);
    }

    #[test]
    fn test_new_empty_matches_definition() {
        let def = TableDef::new("t", vec![
            ColumnDef::new("a", LogicalType::Int32, false),
            ColumnDef::new("b", LogicalType::String, true),
        ]);
        let block = DataBlock::new_empty(&def);
        assert!(block.is_empty());
        assert_eq!(block.num_columns(), 2);
        assert_eq!(block.data_types().collect_vec(), vec![
            &DataType::Int32,
            &DataType::Utf8
        ]);
    }
}
