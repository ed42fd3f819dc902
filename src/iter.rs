use std::iter::FusedIterator;

use crate::ast::EventSelectExpression;
use crate::error::{Result, XcdfError};
use crate::file::XcdfFile;
use crate::select::FieldsByNameSelector;
use crate::visitor::Tuple;

/// Traversal state over the records of one file, independent of the borrow
/// on the file itself. `advance` reads forward until a record passes the
/// filter; at the end of the data the file is rewound and the cursor stays
/// exhausted.
#[derive(Debug)]
pub struct RecordCursor {
    selector: Option<FieldsByNameSelector>,
    filter: Option<EventSelectExpression>,
    current: u64,
    total: u64,
    exhausted: bool,
}

impl RecordCursor {
    /// Compiles the filter and field list against the file's catalog. Nothing
    /// is read until the first `advance`.
    pub fn new(file: &mut XcdfFile, select: Option<&str>, fields: Option<&str>) -> Result<RecordCursor> {
        file.ensure_read()?;
        let selector = match fields {
            Some(list) => Some(FieldsByNameSelector::new(list, file.catalog())?),
            None => None,
        };
        let filter = match select {
            Some(expr) => Some(EventSelectExpression::new(expr, file.catalog())?),
            None => None,
        };
        let total = file.record_count()?;
        file.rewind();

        Ok(RecordCursor {
            selector,
            filter,
            current: 0,
            total,
            exhausted: false,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Number of records consumed so far, accepted or not.
    pub fn position(&self) -> u64 {
        self.current
    }

    pub fn selector(&self) -> Option<&FieldsByNameSelector> {
        self.selector.as_ref()
    }

    pub fn advance(&mut self, file: &mut XcdfFile) -> Option<Result<Tuple>> {
        if self.exhausted {
            return None;
        }
        loop {
            if self.current >= self.total {
                return self.finish(file, None);
            }
            match file.read() {
                Ok(true) => {}
                Ok(false) => return self.finish(file, None),
                Err(e) => return self.finish(file, Some(e)),
            }
            self.current = file.current_record().map_or(self.total, |n| n + 1);

            if let Some(filter) = &self.filter {
                if !filter.select_event(file.current_values()) {
                    continue;
                }
            }
            return match file.current_tuple(self.selector.as_ref()) {
                Ok(t) => Some(Ok(t)),
                Err(e) => self.finish(file, Some(e)),
            };
        }
    }

    fn finish(&mut self, file: &mut XcdfFile, err: Option<XcdfError>) -> Option<Result<Tuple>> {
        file.rewind();
        self.exhausted = true;
        err.map(Err)
    }
}

/// Filtered record traversal, borrowing the file for its whole lifetime.
pub struct RecordIter<'f> {
    file: &'f mut XcdfFile,
    cursor: RecordCursor,
}

impl<'f> RecordIter<'f> {
    pub fn new(file: &'f mut XcdfFile, select: Option<&str>, fields: Option<&str>) -> Result<RecordIter<'f>> {
        let cursor = RecordCursor::new(file, select, fields)?;
        Ok(RecordIter { file, cursor })
    }
}

impl<'f> Iterator for RecordIter<'f> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Result<Tuple>> {
        self.cursor.advance(self.file)
    }
}

impl<'f> FusedIterator for RecordIter<'f> {}

/// Unfiltered traversal yielding only the named fields.
#[derive(Debug)]
pub struct FieldCursor {
    inner: RecordCursor,
}

impl FieldCursor {
    pub fn new(file: &mut XcdfFile, names: &str) -> Result<FieldCursor> {
        Ok(FieldCursor {
            inner: RecordCursor::new(file, None, Some(names))?,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.inner.is_exhausted()
    }

    pub fn advance(&mut self, file: &mut XcdfFile) -> Option<Result<Tuple>> {
        self.inner.advance(file)
    }
}

pub struct FieldIter<'f> {
    file: &'f mut XcdfFile,
    cursor: FieldCursor,
}

impl<'f> FieldIter<'f> {
    pub fn new(file: &'f mut XcdfFile, names: &str) -> Result<FieldIter<'f>> {
        let cursor = FieldCursor::new(file, names)?;
        Ok(FieldIter { file, cursor })
    }
}

impl<'f> Iterator for FieldIter<'f> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Result<Tuple>> {
        self.cursor.advance(self.file)
    }
}

impl<'f> FusedIterator for FieldIter<'f> {}
