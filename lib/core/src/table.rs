use crate::refs::{self, RefId, REF_COLUMN};
use crate::{Error, Result};
use ahash::AHashMap;
use std::str::FromStr;

/// Rows read from one input file, in file order.
///
/// `columns[c][r]` is the cell of payload column `c` at row `r`; every
/// column has exactly `refs.len()` cells.
#[derive(Debug, Clone, Default)]
pub struct RowChunk {
    pub refs: Vec<RefId>,
    pub columns: Vec<Vec<String>>,
}

impl RowChunk {
    pub fn new(column_count: usize) -> Self {
        Self {
            refs: Vec::new(),
            columns: vec![Vec::new(); column_count],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// A table of rows ordered ascending by `_ref`.
///
/// `_ref` is the lookup key and is also exposed as the last regular
/// column, so callers can address it by name or by position.
#[derive(Debug, Clone)]
pub struct KeyedRowTable {
    refs: Vec<RefId>,
    columns: Vec<String>,
    column_index: AHashMap<String, usize>,
    // column-major, `_ref` column included
    data: Vec<Vec<String>>,
}

impl KeyedRowTable {
    /// Concatenate chunks in the given order and stable-sort by `_ref`.
    ///
    /// `payload_columns` names the columns carried by every chunk, in chunk
    /// column order, and must not include `_ref`.
    pub fn from_chunks(payload_columns: Vec<String>, chunks: Vec<RowChunk>) -> Result<Self> {
        let total: usize = chunks.iter().map(RowChunk::len).sum();
        let mut all_refs = Vec::with_capacity(total);
        let mut unsorted: Vec<Vec<String>> = payload_columns
            .iter()
            .map(|_| Vec::with_capacity(total))
            .collect();

        for chunk in chunks {
            if chunk.columns.len() != payload_columns.len()
                || chunk.columns.iter().any(|c| c.len() != chunk.refs.len())
            {
                return Err(Error::ShapeMismatch(format!(
                    "row chunk with {} refs does not match {} payload columns",
                    chunk.refs.len(),
                    payload_columns.len()
                )));
            }
            all_refs.extend(chunk.refs);
            for (dst, src) in unsorted.iter_mut().zip(chunk.columns) {
                dst.extend(src);
            }
        }

        let perm = refs::sort_permutation(&all_refs);
        let sorted_refs: Vec<RefId> = perm.iter().map(|&i| all_refs[i]).collect();

        let mut data: Vec<Vec<String>> = unsorted
            .into_iter()
            .map(|mut col| {
                perm.iter()
                    .map(|&i| std::mem::take(&mut col[i]))
                    .collect::<Vec<String>>()
            })
            .collect();
        data.push(sorted_refs.iter().map(|r| r.to_string()).collect());

        let mut columns = payload_columns;
        columns.push(REF_COLUMN.to_string());
        let column_index = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        Ok(Self {
            refs: sorted_refs,
            columns,
            column_index,
            data,
        })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// The sorted `_ref` index
    #[inline]
    #[must_use]
    pub fn refs(&self) -> &[RefId] {
        &self.refs
    }

    #[inline]
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.column_index
            .get(name)
            .map(|&i| self.data[i].as_slice())
    }

    /// Parse every cell of a column.
    pub fn column_as<T: FromStr>(&self, name: &str) -> Result<Vec<T>> {
        let cells = self
            .column(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
        cells
            .iter()
            .enumerate()
            .map(|(row, cell)| {
                cell.trim().parse::<T>().map_err(|_| {
                    Error::Serialization(format!(
                        "cannot parse '{}' in column '{}' at row {}",
                        cell, name, row
                    ))
                })
            })
            .collect()
    }

    /// Row position of `ref_id`; with duplicates the last one wins.
    pub fn position(&self, ref_id: RefId) -> Option<usize> {
        let end = self.refs.partition_point(|&r| r <= ref_id);
        (end > 0 && self.refs[end - 1] == ref_id).then(|| end - 1)
    }

    pub fn get(&self, ref_id: RefId) -> Option<Row<'_>> {
        self.position(ref_id).map(|index| Row { table: self, index })
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.len()).then_some(Row { table: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.len()).map(move |index| Row { table: self, index })
    }
}

/// Borrowed view of one table row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a KeyedRowTable,
    index: usize,
}

impl<'a> Row<'a> {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn ref_id(&self) -> RefId {
        self.table.refs[self.index]
    }

    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.table
            .column(column)
            .map(|cells| cells[self.index].as_str())
    }
}
