//! Plausible default values for freshly created packets
//!
//! A new instance has null references everywhere, which most host encoders
//! reject. These helpers fill them with empty strings, empty collections, the
//! first enum constant and default nested objects.

use crate::class::ClassTable;
use crate::instance::Instance;
use crate::value::{Value, ValueType};

/// Nested objects deeper than this are left null
pub const MAX_DEFAULT_DEPTH: usize = 4;

/// Default value for a field of type `ty`
///
/// # Arguments
/// * `ty` - Declared field type
/// * `classes` - Host class table, used to resolve enum and object classes
/// * `depth` - Current nesting depth; objects are only created below [`MAX_DEFAULT_DEPTH`]
pub fn default_value(ty: &ValueType, classes: &ClassTable, depth: usize) -> Value {
    match ty {
        ValueType::String => Value::String(String::new()),
        ValueType::Bytes => Value::Bytes(Vec::new()),
        ValueType::List(_) => Value::List(Vec::new()),
        ValueType::Enum(name) => classes
            .get(name)
            .and_then(|class| class.enum_constants().first().cloned())
            .map(|constant| Value::enum_constant(name.clone(), constant))
            .unwrap_or(Value::Null),
        ValueType::Object(name) if depth < MAX_DEFAULT_DEPTH => match classes.get(name) {
            Some(class) if !class.is_enum() => {
                let mut nested = Instance::new(&class);
                populate_defaults(&mut nested, classes, depth + 1);
                Value::object(nested)
            }
            _ => Value::Null,
        },
        // Optional fields default to absent
        other => other.zero_value(),
    }
}

/// Replace every null slot of `instance` with a default value
pub fn populate_defaults(instance: &mut Instance, classes: &ClassTable, depth: usize) {
    let types: Vec<ValueType> = instance
        .class()
        .slot_fields()
        .into_iter()
        .map(|field| field.ty.clone())
        .collect();

    for (slot, ty) in instance.slots_mut().iter_mut().zip(types.iter()) {
        if slot.is_null() {
            *slot = default_value(ty, classes, depth);
        }
    }
}
