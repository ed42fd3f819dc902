//! Field descriptors and the per-file catalog that orders them.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, XcdfError};
use crate::types::{FieldData, FieldType, Value};
use crate::visitor::FieldVisitor;

/// Describes one field: name, numeric kind, quantization step and, for vector
/// fields, the field whose value gives the element count.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ftype: FieldType,
    pub resolution: Value,
    pub parent: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: &str, ftype: FieldType, resolution: Value, parent: Option<&str>) -> Self {
        FieldDescriptor {
            name: name.to_owned(),
            ftype,
            resolution: resolution.coerce(ftype),
            parent: parent.filter(|p| !p.is_empty()).map(str::to_owned),
        }
    }

    pub fn is_vector(&self) -> bool {
        self.parent.is_some()
    }
}

fn name_pattern() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("field name pattern"))
}

/// Ordered, name-unique list of field descriptors.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    fields: Vec<FieldDescriptor>,
    parents: Vec<Option<usize>>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, n: usize) -> &FieldDescriptor {
        &self.fields[n]
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index_of(name).map(|n| &self.fields[n])
    }

    /// Catalog index of the parent of field `n`, if `n` is a vector field.
    pub fn parent_index(&self, n: usize) -> Option<usize> {
        self.parents[n]
    }

    /// Fresh, empty value holders for every field, in catalog order.
    pub fn empty_values(&self) -> Vec<FieldData> {
        self.fields.iter().map(|f| FieldData::empty(f.ftype)).collect()
    }

    /// Validates and appends a descriptor, returning its index.
    pub fn add(&mut self, field: FieldDescriptor) -> Result<usize> {
        // names must read back as a single identifier in expressions
        if !name_pattern().is_match(&field.name) || field.name == "true" || field.name == "false" {
            return Err(XcdfError::InvalidFieldName(field.name));
        }
        if self.by_name.contains_key(&field.name) {
            return Err(XcdfError::DuplicateField(field.name));
        }
        let valid_resolution = match field.resolution.coerce(field.ftype) {
            Value::Unsigned(r) => r >= 1,
            Value::Signed(r) => r >= 1,
            Value::Float(r) => r.is_finite() && r >= 0.0,
        };
        if !valid_resolution {
            return Err(XcdfError::InvalidResolution {
                field: field.name,
                resolution: field.resolution.to_string(),
            });
        }

        let parent = match &field.parent {
            None => None,
            Some(pname) => {
                let invalid = |reason: &str| XcdfError::InvalidParent {
                    field: field.name.clone(),
                    parent: pname.clone(),
                    reason: reason.to_owned(),
                };
                let p = self.index_of(pname).ok_or_else(|| invalid("no such field"))?;
                let pf = &self.fields[p];
                if pf.ftype != FieldType::UnsignedInteger {
                    return Err(invalid("parent must be an unsigned integer field"));
                }
                if pf.is_vector() {
                    return Err(invalid("parent must not be a vector field"));
                }
                if pf.resolution.as_u64() != 1 {
                    return Err(invalid("parent resolution must be 1"));
                }
                Some(p)
            }
        };

        let n = self.fields.len();
        self.by_name.insert(field.name.clone(), n);
        self.fields.push(field);
        self.parents.push(parent);
        Ok(n)
    }

    /// Parses the `field <name> <type> <resolution> [parent]` text produced by
    /// a header dump. `#` starts a comment.
    pub fn parse_string(s: &str) -> Result<Catalog> {
        let mut catalog = Catalog::new();

        for (i, line) in s.lines().enumerate() {
            let comment_start = line.find('#').unwrap_or(line.len());
            let (lnu, _) = line.split_at(comment_start);
            let mut parts = lnu.split_whitespace();
            let err = |message: String| XcdfError::SchemaParse {
                line: i + 1,
                message,
            };

            match parts.next() {
                None => continue,
                Some("field") => {}
                Some(other) => return Err(err(format!("unknown keyword '{}'", other))),
            }
            let name = parts.next().ok_or_else(|| err("missing field name".to_owned()))?;
            let type_string = parts.next().ok_or_else(|| err("missing field type".to_owned()))?;
            let ftype = FieldType::from_name(type_string)
                .ok_or_else(|| err(format!("unknown field type '{}'", type_string)))?;
            let res_string = parts.next().ok_or_else(|| err("missing resolution".to_owned()))?;
            let resolution = match ftype {
                FieldType::UnsignedInteger => res_string.parse::<u64>().map(Value::Unsigned).ok(),
                FieldType::SignedInteger => res_string.parse::<i64>().map(Value::Signed).ok(),
                FieldType::FloatingPoint => res_string.parse::<f64>().map(Value::Float).ok(),
            }
            .ok_or_else(|| err(format!("bad resolution '{}'", res_string)))?;
            let parent = parts.next();
            if let Some(extra) = parts.next() {
                return Err(err(format!("unexpected '{}'", extra)));
            }
            catalog.add(FieldDescriptor::new(name, ftype, resolution, parent))?;
        }

        Ok(catalog)
    }
}

/// Field visitor that renders one `field` line per visited descriptor.
pub struct HeaderVisitor<'a> {
    out: &'a mut String,
}

impl<'a> HeaderVisitor<'a> {
    pub fn new(out: &'a mut String) -> Self {
        HeaderVisitor { out }
    }
}

impl<'a> FieldVisitor for HeaderVisitor<'a> {
    fn visit(&mut self, field: &FieldDescriptor, _data: &FieldData) -> Result<()> {
        let _ = write!(self.out, "field {} {} {}", field.name, field.ftype, field.resolution);
        if let Some(parent) = &field.parent {
            let _ = write!(self.out, " {}", parent);
        }
        self.out.push('\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Catalog {
        let mut c = Catalog::new();
        c.add(FieldDescriptor::new("nhit", FieldType::UnsignedInteger, Value::Unsigned(1), None))
            .unwrap();
        c.add(FieldDescriptor::new("rec.zenith", FieldType::FloatingPoint, Value::Float(0.001), None))
            .unwrap();
        c.add(FieldDescriptor::new("hit.t", FieldType::SignedInteger, Value::Signed(2), Some("nhit")))
            .unwrap();
        c
    }

    #[test]
    fn test_lookup() {
        let c = sample();
        assert_eq!(c.len(), 3);
        assert_eq!(c.index_of("rec.zenith"), Some(1));
        assert_eq!(c.index_of("zenith"), None);
        assert_eq!(c.parent_index(2), Some(0));
        assert_eq!(c.parent_index(0), None);
        assert!(c.get("hit.t").unwrap().is_vector());
    }

    #[test]
    fn test_rejects_bad_fields() {
        let mut c = sample();
        let dup = FieldDescriptor::new("nhit", FieldType::UnsignedInteger, Value::Unsigned(1), None);
        assert!(matches!(c.add(dup), Err(XcdfError::DuplicateField(_))));

        for bad in &["a,b", "a-b", "a#b", "a b", "1x", ".x", "", "true", "false"] {
            let field = FieldDescriptor::new(bad, FieldType::UnsignedInteger, Value::Unsigned(1), None);
            assert!(matches!(c.add(field), Err(XcdfError::InvalidFieldName(_))), "{:?}", bad);
        }
        let dotted = FieldDescriptor::new("_rec.x2", FieldType::UnsignedInteger, Value::Unsigned(1), None);
        assert!(c.add(dotted).is_ok());
        c = sample();

        let zero = FieldDescriptor::new("z", FieldType::SignedInteger, Value::Signed(0), None);
        assert!(matches!(c.add(zero), Err(XcdfError::InvalidResolution { .. })));

        let orphan = FieldDescriptor::new("x", FieldType::FloatingPoint, Value::Float(0.1), Some("nope"));
        assert!(matches!(c.add(orphan), Err(XcdfError::InvalidParent { .. })));

        let float_parent =
            FieldDescriptor::new("y", FieldType::FloatingPoint, Value::Float(0.1), Some("rec.zenith"));
        assert!(matches!(c.add(float_parent), Err(XcdfError::InvalidParent { .. })));

        let nested = FieldDescriptor::new("w", FieldType::FloatingPoint, Value::Float(0.1), Some("hit.t"));
        assert!(matches!(c.add(nested), Err(XcdfError::InvalidParent { .. })));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_header_text_round_trip() {
        let c = sample();
        let mut text = String::from("# a comment line\n\n");
        let mut hv = HeaderVisitor::new(&mut text);
        for (field, data) in c.fields().iter().zip(c.empty_values().iter()) {
            hv.visit(field, data).unwrap();
        }
        assert!(text.contains("field hit.t int 2 nhit\n"));
        let parsed = Catalog::parse_string(&text).unwrap();
        assert_eq!(parsed.fields(), c.fields());
    }

    #[test]
    fn test_parse_errors() {
        match Catalog::parse_string("field a uint 1\ncolumn b uint 1\n") {
            Err(XcdfError::SchemaParse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(Catalog::parse_string("field a complex 1").is_err());
        assert!(Catalog::parse_string("field a uint x").is_err());
        assert!(Catalog::parse_string("field a uint 1 b c").is_err());
    }
}
