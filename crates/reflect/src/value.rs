//! Field types and dynamically typed field values

use crate::instance::Instance;
use std::fmt;

/// Declared type of a field
///
/// Primitive variants mirror the host's numeric and boolean types. Every
/// other variant is a reference type and may hold [`Value::Null`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    Bytes,
    /// Host enum, by class name
    Enum(String),
    /// Host object, by class name
    Object(String),
    List(Box<ValueType>),
    Optional(Box<ValueType>),
    /// Untyped reference; as a filter, matches every field
    Any,
}

impl ValueType {
    pub fn object(class: impl Into<String>) -> Self {
        Self::Object(class.into())
    }

    pub fn enumeration(class: impl Into<String>) -> Self {
        Self::Enum(class.into())
    }

    pub fn list(element: ValueType) -> Self {
        Self::List(Box::new(element))
    }

    pub fn optional(inner: ValueType) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Bool | Self::Byte | Self::Short | Self::Int | Self::Long | Self::Float | Self::Double
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Int | Self::Long)
    }

    /// Value a freshly allocated field of this type holds
    pub fn zero_value(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Byte => Value::Byte(0),
            Self::Short => Value::Short(0),
            Self::Int => Value::Int(0),
            Self::Long => Value::Long(0),
            Self::Float => Value::Float(0.0),
            Self::Double => Value::Double(0.0),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("boolean"),
            Self::Byte => f.write_str("byte"),
            Self::Short => f.write_str("short"),
            Self::Int => f.write_str("int"),
            Self::Long => f.write_str("long"),
            Self::Float => f.write_str("float"),
            Self::Double => f.write_str("double"),
            Self::String => f.write_str("String"),
            Self::Bytes => f.write_str("byte[]"),
            Self::Enum(class) | Self::Object(class) => f.write_str(class),
            Self::List(inner) => write!(f, "List<{}>", inner),
            Self::Optional(inner) => write!(f, "Optional<{}>", inner),
            Self::Any => f.write_str("Object"),
        }
    }
}

/// A field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Enum { class: String, constant: String },
    Object(Box<Instance>),
    List(Vec<Value>),
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn enum_constant(class: impl Into<String>, constant: impl Into<String>) -> Self {
        Self::Enum {
            class: class.into(),
            constant: constant.into(),
        }
    }

    pub fn object(instance: Instance) -> Self {
        Self::Object(Box::new(instance))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integral payload widened to `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(*v as i64),
            Self::Short(v) => Some(*v as i64),
            Self::Int(v) => Some(*v as i64),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Self::Object(instance) => Some(instance),
            _ => None,
        }
    }

    /// Human readable type name, used in error messages
    pub fn type_name(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(_) => "boolean".to_string(),
            Self::Byte(_) => "byte".to_string(),
            Self::Short(_) => "short".to_string(),
            Self::Int(_) => "int".to_string(),
            Self::Long(_) => "long".to_string(),
            Self::Float(_) => "float".to_string(),
            Self::Double(_) => "double".to_string(),
            Self::String(_) => "String".to_string(),
            Self::Bytes(_) => "byte[]".to_string(),
            Self::Enum { class, .. } => class.clone(),
            Self::Object(instance) => instance.class_name().to_string(),
            Self::List(_) => "List".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Short(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{:?}", v),
            Self::Bytes(v) => write!(f, "byte[{}]", v.len()),
            Self::Enum { constant, .. } => f.write_str(constant),
            Self::Object(instance) => write!(f, "{}{{..}}", instance.class_name()),
            Self::List(items) => write!(f, "[{} items]", items.len()),
        }
    }
}
