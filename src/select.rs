use crate::catalog::Catalog;
use crate::error::{Result, XcdfError};
use crate::types::FieldData;
use crate::visitor::{FieldVisitor, Tuple, TupleSetter};

/// Fixed list of fields, resolved against a catalog once, that projects each
/// record onto a tuple in the listed order.
#[derive(Clone, Debug)]
pub struct FieldsByNameSelector {
    names: Vec<String>,
    colmap: Vec<usize>,
}

impl FieldsByNameSelector {
    /// Parses a comma-separated list of names. Every name must exist in
    /// `catalog`; the same name may appear more than once.
    pub fn new(list: &str, catalog: &Catalog) -> Result<Self> {
        let mut names = Vec::new();
        let mut colmap = Vec::new();

        for name in list.split(',').map(str::trim) {
            if name.is_empty() {
                return Err(XcdfError::InvalidFieldList(list.to_owned()));
            }
            let index = catalog
                .index_of(name)
                .ok_or_else(|| XcdfError::UnknownField(name.to_owned()))?;
            names.push(name.to_owned());
            colmap.push(index);
        }

        Ok(FieldsByNameSelector { names, colmap })
    }

    pub fn len(&self) -> usize {
        self.colmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colmap.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Catalog indices of the selected fields, in selection order.
    pub fn indices(&self) -> &[usize] {
        &self.colmap
    }

    /// Builds the tuple for the record whose values are `values`.
    pub fn get_tuple(&self, catalog: &Catalog, values: &[FieldData]) -> Result<Tuple> {
        let mut setter = TupleSetter::new(self.colmap.len());
        for &n in &self.colmap {
            setter.visit(catalog.field(n), &values[n])?;
        }
        Ok(setter.into_tuple())
    }
}
