//! Common types used throughout qspec
//!
//! Entities describe themselves through a static [`EntitySchema`]. The schema
//! is the whitelist every externally supplied field name is checked against,
//! so nothing ever reaches a field that was not declared here.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Nested object fields are followed at most this deep
pub const MAX_NESTING_DEPTH: usize = 4;

/// A dynamically typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    #[default]
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Uuid(Uuid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Compare two values of compatible kinds.
    ///
    /// Returns `None` when either side is null or the kinds cannot be
    /// compared; integers and floats compare numerically.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Equality with numeric cross-comparison; null equals only null
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (a, b) => a.compare(b) == Some(Ordering::Equal),
        }
    }

    /// Total order used for sorting: nulls first, then by kind, then by value.
    ///
    /// Floats use `f64::total_cmp`, so a positive NaN sorts after every number.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
            _ => self
                .compare(other)
                .unwrap_or_else(|| self.kind_rank().cmp(&other.kind_rank())),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Date(_) => 4,
            Value::DateTime(_) => 5,
            Value::Uuid(_) => 6,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Uuid(u) => write!(f, "{}", u),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Declared type of an entity field
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Date,
    Uuid,
    /// String-backed enumeration with its variant names
    Enum(&'static [&'static str]),
    /// Nested object navigated with dotted paths
    Object(fn() -> &'static EntitySchema),
}

impl FieldType {
    pub fn is_string(&self) -> bool {
        matches!(self, FieldType::String)
    }

    /// Reference kinds can hold null regardless of the `nullable` flag
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::String | FieldType::Object(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "datetime",
            FieldType::Date => "date",
            FieldType::Uuid => "uuid",
            FieldType::Enum(_) => "enum",
            FieldType::Object(_) => "object",
        }
    }
}

/// A declared entity field
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl FieldDescriptor {
    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            nullable: false,
        }
    }

    pub const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            nullable: true,
        }
    }

    /// Whether `is-null` can ever match this field
    pub fn can_be_null(&self) -> bool {
        self.nullable || self.field_type.is_reference()
    }
}

/// Cardinality of a navigation link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkShape {
    /// Single related entity
    Reference,
    /// Many related entities
    Collection,
}

impl LinkShape {
    pub fn is_collection(&self) -> bool {
        matches!(self, LinkShape::Collection)
    }

    /// The return type of a link yielding `element`
    pub fn return_type(&self, element: &str) -> String {
        match self {
            LinkShape::Reference => element.to_string(),
            LinkShape::Collection => format!("Vec<{}>", element),
        }
    }
}

/// A declared navigation to related entities
#[derive(Debug, Clone, Copy)]
pub struct RelationDescriptor {
    pub name: &'static str,
    pub shape: LinkShape,
    pub target: fn() -> &'static EntitySchema,
}

impl RelationDescriptor {
    pub const fn reference(name: &'static str, target: fn() -> &'static EntitySchema) -> Self {
        Self {
            name,
            shape: LinkShape::Reference,
            target,
        }
    }

    pub const fn collection(name: &'static str, target: fn() -> &'static EntitySchema) -> Self {
        Self {
            name,
            shape: LinkShape::Collection,
            target,
        }
    }

    pub fn target_schema(&self) -> &'static EntitySchema {
        (self.target)()
    }
}

/// A field resolved from a (possibly dotted) path
#[derive(Debug, Clone)]
pub struct ResolvedField {
    /// Path with the declared casing of every segment
    pub path: String,
    pub descriptor: &'static FieldDescriptor,
    /// True when any segment, including intermediate objects, may be null
    pub nullable: bool,
}

/// Static description of an entity type
#[derive(Debug)]
pub struct EntitySchema {
    pub name: &'static str,
    pub fields: &'static [FieldDescriptor],
    pub relations: &'static [RelationDescriptor],
}

impl EntitySchema {
    /// Case-insensitive field lookup
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Case-insensitive relation lookup
    pub fn relation(&self, name: &str) -> Option<&'static RelationDescriptor> {
        self.relations
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Resolve a dotted field path, walking nested object fields
    pub fn resolve_path(&'static self, path: &str) -> Option<ResolvedField> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.is_empty() || segments.len() > MAX_NESTING_DEPTH + 1 {
            return None;
        }

        let mut schema = self;
        let mut canonical = Vec::with_capacity(segments.len());
        let mut nullable = false;

        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return None;
            }
            let descriptor = schema.field(segment)?;
            canonical.push(descriptor.name);
            nullable |= descriptor.can_be_null();

            if i + 1 == segments.len() {
                return Some(ResolvedField {
                    path: canonical.join("."),
                    descriptor,
                    nullable,
                });
            }

            match descriptor.field_type {
                FieldType::Object(next) => schema = next(),
                _ => return None,
            }
        }

        None
    }

    /// Every string field reachable from this schema, as canonical paths
    pub fn string_fields(&'static self) -> Vec<String> {
        let mut out = Vec::new();
        collect_string_fields(self, "", 0, &mut out);
        out
    }

    /// Resolve a dotted navigation path such as `Items.Product`
    pub fn resolve_relations(&'static self, path: &str) -> Option<Vec<&'static RelationDescriptor>> {
        let mut schema = self;
        let mut links = Vec::new();
        for segment in path.split('.') {
            if segment.is_empty() {
                return None;
            }
            let relation = schema.relation(segment)?;
            links.push(relation);
            schema = relation.target_schema();
        }
        if links.is_empty() {
            None
        } else {
            Some(links)
        }
    }
}

fn collect_string_fields(
    schema: &'static EntitySchema,
    prefix: &str,
    depth: usize,
    out: &mut Vec<String>,
) {
    for field in schema.fields {
        let path = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{}.{}", prefix, field.name)
        };
        match field.field_type {
            FieldType::String => out.push(path),
            FieldType::Object(next) if depth < MAX_NESTING_DEPTH => {
                collect_string_fields(next(), &path, depth + 1, out)
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ADDRESS: EntitySchema = EntitySchema {
        name: "Address",
        fields: &[
            FieldDescriptor::required("City", FieldType::String),
            FieldDescriptor::required("Zip", FieldType::Integer),
        ],
        relations: &[],
    };

    fn address() -> &'static EntitySchema {
        &ADDRESS
    }

    static PERSON: EntitySchema = EntitySchema {
        name: "Person",
        fields: &[
            FieldDescriptor::required("Name", FieldType::String),
            FieldDescriptor::required("Age", FieldType::Integer),
            FieldDescriptor::optional("Address", FieldType::Object(address)),
        ],
        relations: &[],
    };

    #[test]
    fn test_resolve_path_case_insensitive() {
        let resolved = PERSON.resolve_path("address.city").unwrap();
        assert_eq!(resolved.path, "Address.City");
        assert!(resolved.nullable);

        let age = PERSON.resolve_path("AGE").unwrap();
        assert_eq!(age.path, "Age");
        assert!(!age.nullable);
    }

    #[test]
    fn test_resolve_path_rejects_bad_segments() {
        assert!(PERSON.resolve_path("Address..City").is_none());
        assert!(PERSON.resolve_path("Age.Something").is_none());
        assert!(PERSON.resolve_path("Missing").is_none());
    }

    #[test]
    fn test_string_fields_include_nested() {
        assert_eq!(PERSON.string_fields(), vec!["Name", "Address.City"]);
    }

    #[test]
    fn test_value_comparison() {
        assert_eq!(
            Value::Integer(100).compare(&Value::Float(99.5)),
            Some(Ordering::Greater)
        );
        assert!(Value::Integer(2).loosely_equals(&Value::Float(2.0)));
        assert!(!Value::Null.loosely_equals(&Value::Integer(0)));
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert_eq!(Value::Null.sort_cmp(&Value::Integer(1)), Ordering::Less);
    }

    #[test]
    fn test_sort_cmp_orders_nan_after_numbers() {
        let mut values: Vec<Value> = (0..40)
            .map(|i| {
                if i % 3 == 0 {
                    Value::Float(f64::NAN.abs())
                } else if i % 2 == 0 {
                    Value::Integer(40 - i)
                } else {
                    Value::Float(i as f64 / 2.0)
                }
            })
            .chain([Value::Null, Value::String("x".into())])
            .collect();
        values.sort_by(Value::sort_cmp);

        assert_eq!(values[0], Value::Null);
        assert_eq!(values.last(), Some(&Value::String("x".into())));
        let numbers = &values[1..values.len() - 1];
        let first_nan = numbers
            .iter()
            .position(|v| matches!(v, Value::Float(f) if f.is_nan()))
            .unwrap();
        assert_eq!(first_nan, 26);
        assert!(numbers[first_nan..]
            .iter()
            .all(|v| matches!(v, Value::Float(f) if f.is_nan())));
        assert!(numbers[..first_nan]
            .windows(2)
            .all(|w| w[0].sort_cmp(&w[1]) != Ordering::Greater));
        assert_eq!(
            Value::Integer(2).sort_cmp(&Value::Float(2.5)),
            Ordering::Less
        );
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Float(100.0).to_string(), "100");
        assert_eq!(Value::Float(4.5).to_string(), "4.5");
        assert_eq!(Value::from("abc").to_string(), "\"abc\"");
        assert_eq!(Value::from(Some(true)).to_string(), "true");
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_link_shape_return_type() {
        assert_eq!(LinkShape::Collection.return_type("OrderItem"), "Vec<OrderItem>");
        assert_eq!(LinkShape::Reference.return_type("Product"), "Product");
    }
}
