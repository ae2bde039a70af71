//! # Equivalent Converters
//!
//! Converters translate between a host field value and a public Rust type.
//! [`Primitive`] covers the built-in value types, [`EnumConverter`] maps a
//! server-internal enum onto a Rust enum and [`IdConverter`] maps a wrapper
//! object that carries a single integer id.
//!
//! Each converter also names the field type it applies to, which a
//! [`StructureModifier`](crate::StructureModifier) uses as its filter.

use crate::accessor::{AccessLevel, FieldAccessor};
use crate::class::ClassHandle;
use crate::instance::Instance;
use crate::value::{Value, ValueType};
use packettap_core::AccessError;
use std::marker::PhantomData;

/// Two-way conversion between a host value and a public type
pub trait EquivalentConverter {
    type Target;

    /// Field type this converter reads and writes
    fn value_type(&self) -> ValueType;

    /// Public value to host value
    fn to_generic(&self, specific: Self::Target) -> Result<Value, AccessError>;

    /// Host value to public value
    fn to_specific(&self, generic: &Value) -> Result<Self::Target, AccessError>;
}

/// Rust types that correspond to one host value type
pub trait Primitive: Sized {
    fn value_type() -> ValueType;

    fn into_value(self) -> Value;

    /// Extract from a stored value, widening where lossless
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! primitive {
    ($ty:ty, $value_type:ident, $variant:ident $(, $wider:ident)*) => {
        impl Primitive for $ty {
            fn value_type() -> ValueType {
                ValueType::$value_type
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    $(Value::$wider(v) => Some(<$ty>::from(*v)),)*
                    _ => None,
                }
            }
        }
    };
}

primitive!(bool, Bool, Bool);
primitive!(i8, Byte, Byte);
primitive!(i16, Short, Short, Byte);
primitive!(i32, Int, Int, Byte, Short);
primitive!(i64, Long, Long, Byte, Short, Int);
primitive!(f32, Float, Float);
primitive!(f64, Double, Double, Float);
primitive!(String, String, String);
primitive!(Vec<u8>, Bytes, Bytes);

/// Fields declared optional, with `None` standing for an absent value
impl<T: Primitive> Primitive for Option<T> {
    fn value_type() -> ValueType {
        ValueType::optional(T::value_type())
    }

    fn into_value(self) -> Value {
        match self {
            Some(value) => value.into_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Converter for any [`Primitive`]
pub struct PrimitiveConverter<T>(PhantomData<fn() -> T>);

impl<T> PrimitiveConverter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for PrimitiveConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Primitive> EquivalentConverter for PrimitiveConverter<T> {
    type Target = T;

    fn value_type(&self) -> ValueType {
        T::value_type()
    }

    fn to_generic(&self, specific: T) -> Result<Value, AccessError> {
        Ok(specific.into_value())
    }

    fn to_specific(&self, generic: &Value) -> Result<T, AccessError> {
        T::from_value(generic).ok_or_else(|| AccessError::IncompatibleType {
            field: String::new(),
            expected: T::value_type().to_string(),
            found: generic.type_name(),
        })
    }
}

/// Maps constants of a host enum onto a Rust enum
///
/// Host constants without a mapping fail to convert instead of being guessed.
pub struct EnumConverter<E> {
    class: String,
    mapping: Vec<(String, E)>,
}

impl<E: Copy + PartialEq> EnumConverter<E> {
    /// # Arguments
    /// * `class` - Host enum class name
    /// * `mapping` - Pairs of host constant name and Rust value
    pub fn new(class: impl Into<String>, mapping: &[(&str, E)]) -> Self {
        Self {
            class: class.into(),
            mapping: mapping
                .iter()
                .map(|(constant, value)| (constant.to_string(), *value))
                .collect(),
        }
    }
}

impl<E: Copy + PartialEq + std::fmt::Debug> EquivalentConverter for EnumConverter<E> {
    type Target = E;

    fn value_type(&self) -> ValueType {
        ValueType::Enum(self.class.clone())
    }

    fn to_generic(&self, specific: E) -> Result<Value, AccessError> {
        self.mapping
            .iter()
            .find(|(_, value)| *value == specific)
            .map(|(constant, _)| Value::enum_constant(self.class.clone(), constant.clone()))
            .ok_or_else(|| AccessError::IncompatibleType {
                field: self.class.clone(),
                expected: self.class.clone(),
                found: format!("{:?}", specific),
            })
    }

    fn to_specific(&self, generic: &Value) -> Result<E, AccessError> {
        if let Value::Enum { class, constant } = generic {
            if class == &self.class {
                if let Some((_, value)) = self.mapping.iter().find(|(name, _)| name == constant) {
                    return Ok(*value);
                }
            }
        }
        Err(AccessError::IncompatibleType {
            field: self.class.clone(),
            expected: self.class.clone(),
            found: generic.to_string(),
        })
    }
}

/// Maps a wrapper object carrying one integer id onto a public type
///
/// Typical wrappers are registry holders and resource keys, where the host
/// stores `Holder { id: int }` but plugins want a typed value.
pub struct IdConverter<T> {
    class: ClassHandle,
    id: FieldAccessor,
    from_id: fn(i32) -> Option<T>,
    to_id: fn(&T) -> i32,
}

impl<T> IdConverter<T> {
    /// # Arguments
    /// * `class` - Wrapper class
    /// * `id_field` - Name of the integer field holding the id
    /// * `from_id` / `to_id` - Mapping between ids and public values
    pub fn new(
        class: &ClassHandle,
        id_field: &str,
        from_id: fn(i32) -> Option<T>,
        to_id: fn(&T) -> i32,
    ) -> Result<Self, AccessError> {
        let id = FieldAccessor::find(class, id_field, AccessLevel::Privileged)?;
        if !id.value_type().is_integral() {
            return Err(AccessError::IncompatibleType {
                field: id_field.to_string(),
                expected: ValueType::Int.to_string(),
                found: id.value_type().to_string(),
            });
        }
        Ok(Self {
            class: class.clone(),
            id,
            from_id,
            to_id,
        })
    }
}

impl<T> EquivalentConverter for IdConverter<T> {
    type Target = T;

    fn value_type(&self) -> ValueType {
        ValueType::Object(self.class.name().to_string())
    }

    fn to_generic(&self, specific: T) -> Result<Value, AccessError> {
        let mut wrapper = Instance::new(&self.class);
        self.id.set(&mut wrapper, Value::Int((self.to_id)(&specific)))?;
        Ok(Value::object(wrapper))
    }

    fn to_specific(&self, generic: &Value) -> Result<T, AccessError> {
        let wrapper = generic.as_instance().ok_or_else(|| AccessError::IncompatibleType {
            field: self.id.name().to_string(),
            expected: self.class.name().to_string(),
            found: generic.type_name(),
        })?;
        let raw = self.id.get(wrapper)?;
        raw.as_i64()
            .and_then(|id| i32::try_from(id).ok())
            .and_then(self.from_id)
            .ok_or_else(|| AccessError::IncompatibleType {
                field: self.id.name().to_string(),
                expected: self.class.name().to_string(),
                found: raw.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClassDef;
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum ChatKind {
        Chat,
        System,
    }

    #[derive(Debug, PartialEq)]
    enum EntityKind {
        Zombie,
        Pig,
    }

    #[test]
    fn test_primitive_widening_on_read() {
        assert_eq!(i64::from_value(&Value::Int(5)), Some(5));
        assert_eq!(f64::from_value(&Value::Float(0.5)), Some(0.5));
        assert_eq!(i8::from_value(&Value::Int(5)), None);
        assert_eq!(Option::<String>::from_value(&Value::Null), Some(None));
        assert_eq!(Option::<String>::value_type(), ValueType::optional(ValueType::String));
        assert_eq!(String::from_value(&Value::Null), None);
    }

    #[test]
    fn test_enum_converter() {
        let converter = EnumConverter::new("ChatType", &[("CHAT", ChatKind::Chat), ("SYSTEM", ChatKind::System)]);
        let generic = converter.to_generic(ChatKind::System).unwrap();
        assert_eq!(generic, Value::enum_constant("ChatType", "SYSTEM"));
        assert_eq!(converter.to_specific(&generic).unwrap(), ChatKind::System);

        let unknown = Value::enum_constant("ChatType", "GAME_INFO");
        assert!(converter.to_specific(&unknown).is_err());
    }

    #[test]
    fn test_id_converter() {
        let holder = Arc::new(
            ClassDef::builder("EntityTypeHolder")
                .field("id", ValueType::Int)
                .build(),
        );
        let converter = IdConverter::new(
            &holder,
            "id",
            |id| match id {
                54 => Some(EntityKind::Zombie),
                90 => Some(EntityKind::Pig),
                _ => None,
            },
            |kind| match kind {
                EntityKind::Zombie => 54,
                EntityKind::Pig => 90,
            },
        )
        .unwrap();

        let generic = converter.to_generic(EntityKind::Pig).unwrap();
        assert_eq!(generic.as_instance().unwrap().slots()[0], Value::Int(90));
        assert_eq!(converter.to_specific(&generic).unwrap(), EntityKind::Pig);
        assert_eq!(converter.value_type(), ValueType::object("EntityTypeHolder"));
    }

    #[test]
    fn test_id_converter_requires_integral_field() {
        let holder = Arc::new(
            ClassDef::builder("Named")
                .field("name", ValueType::String)
                .build(),
        );
        let result = IdConverter::<i32>::new(&holder, "name", Some, |v| *v);
        assert!(result.is_err());
    }
}
