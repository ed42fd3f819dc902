use std::ops::Index;

use crate::catalog::FieldDescriptor;
use crate::error::{Result, XcdfError};
use crate::types::{Datum, FieldData};

/// Called once per field, in catalog order, for the current record.
pub trait FieldVisitor {
    fn visit(&mut self, field: &FieldDescriptor, data: &FieldData) -> Result<()>;
}

/// Fixed-arity output record. Owned by whoever retrieved it.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuple {
    items: Vec<Datum>,
}

impl Tuple {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, n: usize) -> Option<&Datum> {
        self.items.get(n)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Datum> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Datum> {
        self.items
    }
}

impl Index<usize> for Tuple {
    type Output = Datum;

    fn index(&self, n: usize) -> &Datum {
        &self.items[n]
    }
}

impl IntoIterator for Tuple {
    type Item = Datum;
    type IntoIter = std::vec::IntoIter<Datum>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Field visitor that fills the slots of one tuple. The tuple is handed out
/// by `into_tuple`, which consumes the setter.
pub struct TupleSetter {
    nfields: usize,
    ifield: usize,
    items: Vec<Datum>,
}

impl TupleSetter {
    pub fn new(nfields: usize) -> TupleSetter {
        TupleSetter {
            nfields,
            ifield: 0,
            items: vec![Datum::Missing; nfields],
        }
    }

    pub fn nfields(&self) -> usize {
        self.nfields
    }

    /// Writes the next slot. Visiting more fields than the tuple holds is a
    /// bug in the caller.
    pub fn set(&mut self, datum: Datum) -> Result<()> {
        if self.ifield >= self.nfields {
            return Err(XcdfError::TupleOverflow {
                capacity: self.nfields,
            });
        }
        self.items[self.ifield] = datum;
        self.ifield += 1;
        Ok(())
    }

    pub fn into_tuple(self) -> Tuple {
        Tuple { items: self.items }
    }
}

impl FieldVisitor for TupleSetter {
    fn visit(&mut self, field: &FieldDescriptor, data: &FieldData) -> Result<()> {
        self.set(data.to_datum(field.is_vector()))
    }
}
