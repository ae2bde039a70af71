//! # Field Accessors
//!
//! A [`FieldAccessor`] is a compiled handle to one instance field: the field
//! definition, the class that declares it and its slot offset. Reads return
//! the stored value; writes go through [`convert`], which implements the
//! supported conversion pairs:
//!
//! | From                 | To                            | Rule            |
//! |----------------------|-------------------------------|-----------------|
//! | byte/short/int/long  | wider integral, float, double | widening        |
//! | float                | double                        | widening        |
//! | long/int/short       | narrower integral             | checked         |
//! | double               | float                         | checked, finite |
//! | null                 | any reference type            | allowed         |
//! | object of class C    | object field of C or a parent | allowed         |
//! | list                 | list                          | element-wise    |
//!
//! Anything else is an [`AccessError`].

use crate::class::{ClassHandle, FieldDef};
use crate::instance::Instance;
use crate::value::{Value, ValueType};
use packettap_core::AccessError;

/// Capability an accessor was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessLevel {
    /// Only public, non-final fields may be written and only public fields read
    Public,
    /// Bypasses visibility and finality
    #[default]
    Privileged,
}

/// Compiled access path to one instance field
#[derive(Debug, Clone)]
pub struct FieldAccessor {
    field: FieldDef,
    declaring: ClassHandle,
    offset: usize,
    access: AccessLevel,
}

impl FieldAccessor {
    pub(crate) fn new(field: FieldDef, declaring: ClassHandle, offset: usize, access: AccessLevel) -> Self {
        Self {
            field,
            declaring,
            offset,
            access,
        }
    }

    /// Find a field by name on `class` or any of its superclasses
    ///
    /// # Arguments
    /// * `class` - Class to search, the most derived one first
    /// * `name` - Declared field name
    /// * `access` - Capability of the returned accessor
    ///
    /// # Returns
    /// * `NoSuchField` if no instance field has that name
    /// * `Inaccessible` if the field is private and `access` is `Public`
    pub fn find(class: &ClassHandle, name: &str, access: AccessLevel) -> Result<Self, AccessError> {
        let mut current = Some(class);
        while let Some(declaring) = current {
            let mut offset = declaring.own_slot_offset();
            for field in declaring.own_instance_fields() {
                if field.name == name {
                    if access == AccessLevel::Public && field.modifiers.is_private {
                        return Err(AccessError::Inaccessible {
                            field: qualified(declaring, field),
                        });
                    }
                    return Ok(Self::new(field.clone(), declaring.clone(), offset, access));
                }
                offset += 1;
            }
            current = declaring.superclass();
        }

        Err(AccessError::NoSuchField {
            class: class.name().to_string(),
            field: name.to_string(),
        })
    }

    pub fn field(&self) -> &FieldDef {
        &self.field
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.field.ty
    }

    pub fn declaring_class(&self) -> &ClassHandle {
        &self.declaring
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn access(&self) -> AccessLevel {
        self.access
    }

    /// Read the field, cloning the stored value
    pub fn get(&self, target: &Instance) -> Result<Value, AccessError> {
        self.get_ref(target).cloned()
    }

    pub fn get_ref<'a>(&self, target: &'a Instance) -> Result<&'a Value, AccessError> {
        self.check_target(target)?;
        self.check_readable()?;
        target.slot(self.offset).ok_or_else(|| self.wrong_target(target))
    }

    /// Mutable access to the raw slot, bypassing conversion
    pub fn get_mut<'a>(&self, target: &'a mut Instance) -> Result<&'a mut Value, AccessError> {
        self.check_target(target)?;
        self.check_writable()?;
        let class = target.class().clone();
        target
            .slot_mut(self.offset)
            .ok_or_else(|| AccessError::WrongTarget {
                expected: self.declaring.name().to_string(),
                found: class.name().to_string(),
            })
    }

    /// Convert `value` to the field type and store it
    pub fn set(&self, target: &mut Instance, value: Value) -> Result<(), AccessError> {
        let converted = convert(&self.field.ty, &self.field.name, value)?;
        *self.get_mut(target)? = converted;
        Ok(())
    }

    fn check_target(&self, target: &Instance) -> Result<(), AccessError> {
        if target.class().is_subclass_of(self.declaring.name()) {
            Ok(())
        } else {
            Err(self.wrong_target(target))
        }
    }

    fn check_readable(&self) -> Result<(), AccessError> {
        if self.access == AccessLevel::Public && self.field.modifiers.is_private {
            return Err(AccessError::Inaccessible {
                field: qualified(&self.declaring, &self.field),
            });
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), AccessError> {
        let modifiers = self.field.modifiers;
        if self.access == AccessLevel::Public && (modifiers.is_private || modifiers.is_final) {
            return Err(AccessError::Inaccessible {
                field: qualified(&self.declaring, &self.field),
            });
        }
        Ok(())
    }

    fn wrong_target(&self, target: &Instance) -> AccessError {
        AccessError::WrongTarget {
            expected: self.declaring.name().to_string(),
            found: target.class_name().to_string(),
        }
    }
}

fn qualified(class: &ClassHandle, field: &FieldDef) -> String {
    format!("{}.{}", class.name(), field.name)
}

/// Convert `value` so it can be stored in a field of type `ty`
///
/// `field` is only used for error messages.
pub fn convert(ty: &ValueType, field: &str, value: Value) -> Result<Value, AccessError> {
    let incompatible = |value: &Value| AccessError::IncompatibleType {
        field: field.to_string(),
        expected: ty.to_string(),
        found: value.type_name(),
    };

    if value.is_null() {
        return if ty.is_primitive() {
            Err(AccessError::NullPrimitive {
                field: field.to_string(),
            })
        } else {
            Ok(Value::Null)
        };
    }

    match ty {
        ValueType::Any => Ok(value),
        ValueType::Optional(inner) => convert(inner, field, value),
        ValueType::Bool => match value {
            Value::Bool(_) => Ok(value),
            other => Err(incompatible(&other)),
        },
        ValueType::Byte | ValueType::Short | ValueType::Int | ValueType::Long => {
            let Some(wide) = value.as_i64() else {
                return Err(incompatible(&value));
            };
            narrow_integral(ty, field, wide)
        }
        ValueType::Float => match value {
            Value::Float(_) => Ok(value),
            Value::Double(d) => {
                let narrowed = d as f32;
                if d.is_finite() && !narrowed.is_finite() {
                    Err(AccessError::Overflow {
                        field: field.to_string(),
                        value: d.to_string(),
                        target: ty.to_string(),
                    })
                } else {
                    Ok(Value::Float(narrowed))
                }
            }
            other => match other.as_i64() {
                Some(wide) => Ok(Value::Float(wide as f32)),
                None => Err(incompatible(&other)),
            },
        },
        ValueType::Double => match value {
            Value::Double(_) => Ok(value),
            Value::Float(f) => Ok(Value::Double(f as f64)),
            other => match other.as_i64() {
                Some(wide) => Ok(Value::Double(wide as f64)),
                None => Err(incompatible(&other)),
            },
        },
        ValueType::String => match value {
            Value::String(_) => Ok(value),
            other => Err(incompatible(&other)),
        },
        ValueType::Bytes => match value {
            Value::Bytes(_) => Ok(value),
            other => Err(incompatible(&other)),
        },
        ValueType::Enum(class) => {
            if matches!(&value, Value::Enum { class: found, .. } if found == class) {
                Ok(value)
            } else {
                Err(incompatible(&value))
            }
        }
        ValueType::Object(class) => {
            if matches!(&value, Value::Object(instance) if instance.class().is_subclass_of(class)) {
                Ok(value)
            } else {
                Err(incompatible(&value))
            }
        }
        ValueType::List(element) => match value {
            Value::List(items) => items
                .into_iter()
                .map(|item| convert(element, field, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            other => Err(incompatible(&other)),
        },
    }
}

fn narrow_integral(ty: &ValueType, field: &str, wide: i64) -> Result<Value, AccessError> {
    let overflow = || AccessError::Overflow {
        field: field.to_string(),
        value: wide.to_string(),
        target: ty.to_string(),
    };
    match ty {
        ValueType::Byte => i8::try_from(wide).map(Value::Byte).map_err(|_| overflow()),
        ValueType::Short => i16::try_from(wide).map(Value::Short).map_err(|_| overflow()),
        ValueType::Int => i32::try_from(wide).map(Value::Int).map_err(|_| overflow()),
        _ => Ok(Value::Long(wide)),
    }
}
