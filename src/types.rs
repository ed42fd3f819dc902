use std::fmt;

/// Numeric kind of a field. The tags are the values foreign callers pass to
/// `add_field`.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum FieldType {
    UnsignedInteger,
    SignedInteger,
    FloatingPoint,
}

impl FieldType {
    pub fn from_tag(tag: i64) -> Option<FieldType> {
        match tag {
            0 => Some(FieldType::UnsignedInteger),
            1 => Some(FieldType::SignedInteger),
            2 => Some(FieldType::FloatingPoint),
            _ => None,
        }
    }

    pub fn tag(self) -> i64 {
        match self {
            FieldType::UnsignedInteger => 0,
            FieldType::SignedInteger => 1,
            FieldType::FloatingPoint => 2,
        }
    }

    /// Short name used in header dumps.
    pub fn name(self) -> &'static str {
        match self {
            FieldType::UnsignedInteger => "uint",
            FieldType::SignedInteger => "int",
            FieldType::FloatingPoint => "float",
        }
    }

    pub fn from_name(s: &str) -> Option<FieldType> {
        match s {
            "uint" => Some(FieldType::UnsignedInteger),
            "int" => Some(FieldType::SignedInteger),
            "float" => Some(FieldType::FloatingPoint),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChecksumType {
    None,
    Adler32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CompressionType {
    None,
    Lz4,
    Zstd,
    // lz4 below 4k, zstd above, raw when neither helps
    Auto,
}

/// A single numeric value of one of the three field kinds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Unsigned(_) => FieldType::UnsignedInteger,
            Value::Signed(_) => FieldType::SignedInteger,
            Value::Float(_) => FieldType::FloatingPoint,
        }
    }

    /// Reinterprets the value as u64, wrapping negatives the way a C cast does.
    pub fn as_u64(&self) -> u64 {
        match *self {
            Value::Unsigned(v) => v,
            Value::Signed(v) => v as u64,
            Value::Float(v) => v as u64,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match *self {
            Value::Unsigned(v) => v as i64,
            Value::Signed(v) => v,
            Value::Float(v) => v as i64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Unsigned(v) => v as f64,
            Value::Signed(v) => v as f64,
            Value::Float(v) => v,
        }
    }

    pub fn coerce(&self, ftype: FieldType) -> Value {
        match ftype {
            FieldType::UnsignedInteger => Value::Unsigned(self.as_u64()),
            FieldType::SignedInteger => Value::Signed(self.as_i64()),
            FieldType::FloatingPoint => Value::Float(self.as_f64()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Unsigned(v) => write!(f, "{}", v),
            Value::Signed(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Value {
        Value::Unsigned(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Signed(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Float(v)
    }
}

/// Values held by one field for the current record. An empty vector means the
/// field is absent from the record.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldData {
    Unsigned(Vec<u64>),
    Signed(Vec<i64>),
    Float(Vec<f64>),
}

impl FieldData {
    pub fn empty(ftype: FieldType) -> FieldData {
        match ftype {
            FieldType::UnsignedInteger => FieldData::Unsigned(Vec::new()),
            FieldType::SignedInteger => FieldData::Signed(Vec::new()),
            FieldType::FloatingPoint => FieldData::Float(Vec::new()),
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            FieldData::Unsigned(_) => FieldType::UnsignedInteger,
            FieldData::Signed(_) => FieldType::SignedInteger,
            FieldData::Float(_) => FieldType::FloatingPoint,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FieldData::Unsigned(v) => v.len(),
            FieldData::Signed(v) => v.len(),
            FieldData::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, n: usize) -> Option<Value> {
        match self {
            FieldData::Unsigned(v) => v.get(n).map(|x| Value::Unsigned(*x)),
            FieldData::Signed(v) => v.get(n).map(|x| Value::Signed(*x)),
            FieldData::Float(v) => v.get(n).map(|x| Value::Float(*x)),
        }
    }

    pub fn values(&self) -> Vec<Value> {
        (0..self.len()).filter_map(|n| self.get(n)).collect()
    }

    pub fn clear(&mut self) {
        match self {
            FieldData::Unsigned(v) => v.clear(),
            FieldData::Signed(v) => v.clear(),
            FieldData::Float(v) => v.clear(),
        }
    }

    /// Appends a value, converting it to this field's kind.
    pub fn push(&mut self, value: Value) {
        match self {
            FieldData::Unsigned(v) => v.push(value.as_u64()),
            FieldData::Signed(v) => v.push(value.as_i64()),
            FieldData::Float(v) => v.push(value.as_f64()),
        }
    }

    /// Converts the field to its tuple representation. Vector fields keep the
    /// list shape even when they hold a single element.
    pub fn to_datum(&self, vector: bool) -> Datum {
        match self.len() {
            0 => Datum::Missing,
            1 if !vector => match self.get(0) {
                Some(v) => Datum::Scalar(v),
                None => Datum::Missing,
            },
            _ => Datum::Vector(self.values()),
        }
    }
}

/// One position of an output tuple.
#[derive(Clone, Debug, PartialEq)]
pub enum Datum {
    Missing,
    Scalar(Value),
    Vector(Vec<Value>),
}

impl Datum {
    pub fn is_missing(&self) -> bool {
        matches!(self, Datum::Missing)
    }

    pub fn as_scalar(&self) -> Option<Value> {
        match self {
            Datum::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Value]> {
        match self {
            Datum::Vector(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Number of elements: 0 when missing, 1 for a scalar.
    pub fn len(&self) -> usize {
        match self {
            Datum::Missing => 0,
            Datum::Scalar(_) => 1,
            Datum::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, n: usize) -> Option<Value> {
        match self {
            Datum::Missing => None,
            Datum::Scalar(v) if n == 0 => Some(*v),
            Datum::Scalar(_) => None,
            Datum::Vector(v) => v.get(n).copied(),
        }
    }
}

#[test]
fn test_type_tags() {
    for t in &[FieldType::UnsignedInteger, FieldType::SignedInteger, FieldType::FloatingPoint] {
        assert_eq!(FieldType::from_tag(t.tag()), Some(*t));
        assert_eq!(FieldType::from_name(t.name()), Some(*t));
    }
    assert_eq!(FieldType::from_tag(7), None);
    assert_eq!(FieldType::from_tag(-1), None);
}

#[test]
fn test_datum_shapes() {
    let mut d = FieldData::empty(FieldType::UnsignedInteger);
    assert_eq!(d.to_datum(false), Datum::Missing);
    d.push(Value::Unsigned(0));
    assert_eq!(d.to_datum(false), Datum::Scalar(Value::Unsigned(0)));
    assert_eq!(d.to_datum(true), Datum::Vector(vec![Value::Unsigned(0)]));
    d.push(Value::Float(2.7));
    assert_eq!(d.to_datum(false), Datum::Vector(vec![Value::Unsigned(0), Value::Unsigned(2)]));
}

#[test]
fn test_coerce() {
    assert_eq!(Value::Signed(-1).coerce(FieldType::UnsignedInteger), Value::Unsigned(u64::MAX));
    assert_eq!(Value::Float(-2.9).coerce(FieldType::SignedInteger), Value::Signed(-2));
    assert_eq!(Value::Unsigned(3).coerce(FieldType::FloatingPoint), Value::Float(3.0));
}
