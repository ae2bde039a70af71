//! # Structure Modifier
//!
//! Index-based read/write access to the fields of one instance, without
//! knowing their names.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut modifier = StructureModifier::new(&mut packet, template)?;
//! let message: String = modifier.with_type::<String>().read(0)?;
//! modifier.with_type::<String>().write(0, message.to_uppercase())?;
//! modifier.structure_at(2)?.with_type::<i32>().write(0, 7)?;
//! ```
//!
//! Index `i` of `with_type::<T>()` is the i-th field of type `T` in
//! declaration order. The order comes from a cached [`StructureTemplate`],
//! so it is the same for every instance of the class.

use crate::accessor::FieldAccessor;
use crate::class::FieldDef;
use crate::converter::{EquivalentConverter, Primitive, PrimitiveConverter};
use crate::defaults::default_value;
use crate::instance::Instance;
use crate::template::StructureTemplate;
use crate::value::{Value, ValueType};
use packettap_core::{AccessError, Result, TapError};
use std::sync::Arc;

/// Mutable, index-based view over an instance
pub struct StructureModifier<'a> {
    target: &'a mut Instance,
    template: Arc<StructureTemplate>,
}

impl<'a> StructureModifier<'a> {
    /// Bind `template` to `target`
    ///
    /// Fails with `WrongTarget` when the instance is not of the template's
    /// class or a subclass of it.
    pub fn new(target: &'a mut Instance, template: Arc<StructureTemplate>) -> Result<Self> {
        if !target.class().is_subclass_of(template.class().name()) {
            return Err(AccessError::WrongTarget {
                expected: template.class().name().to_string(),
                found: target.class_name().to_string(),
            }
            .into());
        }
        Ok(Self { target, template })
    }

    pub fn template(&self) -> &Arc<StructureTemplate> {
        &self.template
    }

    pub fn target(&self) -> &Instance {
        self.target
    }

    /// Number of fields visible through this view
    pub fn size(&self) -> usize {
        self.template.size()
    }

    /// Metadata of the field at `index`
    pub fn field(&self, index: usize) -> Result<&FieldDef> {
        self.accessor(index).map(FieldAccessor::field)
    }

    pub fn read_value(&self, index: usize) -> Result<Value> {
        Ok(self.accessor(index)?.get(self.target)?)
    }

    /// Write `value`, converting it to the field type
    pub fn write_value(&mut self, index: usize, value: Value) -> Result<()> {
        let accessor = field_at(&self.template, index)?;
        accessor.set(self.target, value)?;
        Ok(())
    }

    /// Read, transform and write back one field
    pub fn modify<F>(&mut self, index: usize, f: F) -> Result<()>
    where
        F: FnOnce(Value) -> Value,
    {
        let current = self.read_value(index)?;
        self.write_value(index, f(current))
    }

    /// Every visible field value, in index order
    pub fn values(&self) -> Result<Vec<Value>> {
        self.template
            .fields()
            .iter()
            .map(|accessor| accessor.get(self.target).map_err(TapError::from))
            .collect()
    }

    /// View restricted to fields assignable to `filter`
    pub fn with_filter(&mut self, filter: ValueType) -> StructureModifier<'_> {
        StructureModifier {
            target: &mut *self.target,
            template: self.template.with_filter(filter),
        }
    }

    /// Typed view over every field of primitive type `T`
    pub fn with_type<T: Primitive>(&mut self) -> TypedView<'_, PrimitiveConverter<T>> {
        self.with_converter(PrimitiveConverter::new())
    }

    /// Typed view through a custom converter
    pub fn with_converter<C: EquivalentConverter>(&mut self, converter: C) -> TypedView<'_, C> {
        let modifier = self.with_filter(converter.value_type());
        TypedView { modifier, converter }
    }

    /// View over the nested object stored at `index`
    ///
    /// The nested view uses the root template of the object's own class and
    /// leaves this view's field order untouched.
    pub fn structure_at(&mut self, index: usize) -> Result<StructureModifier<'_>> {
        let accessor = self.accessor(index)?.clone();
        let template = match accessor.get_ref(self.target)? {
            Value::Object(nested) => self.template.nested(nested.class()),
            other => {
                return Err(AccessError::IncompatibleType {
                    field: accessor.name().to_string(),
                    expected: "object".to_string(),
                    found: other.type_name(),
                }
                .into())
            }
        };

        match accessor.get_mut(self.target)? {
            Value::Object(nested) => Ok(StructureModifier {
                target: nested.as_mut(),
                template,
            }),
            other => Err(AccessError::IncompatibleType {
                field: accessor.name().to_string(),
                expected: "object".to_string(),
                found: other.type_name(),
            }
            .into()),
        }
    }

    /// Fill every null field of this view with a plausible default
    pub fn write_defaults(&mut self) -> Result<()> {
        let classes = self.template.layouts().classes().clone();
        for accessor in self.template.fields() {
            if accessor.get_ref(self.target)?.is_null() {
                let value = default_value(accessor.value_type(), &classes, 0);
                accessor.set(self.target, value)?;
            }
        }
        Ok(())
    }

    fn accessor(&self, index: usize) -> Result<&FieldAccessor> {
        field_at(&self.template, index)
    }
}

fn field_at(template: &StructureTemplate, index: usize) -> Result<&FieldAccessor> {
    template.fields().get(index).ok_or(TapError::IndexOutOfRange {
        index,
        len: template.size(),
    })
}

/// Typed view produced by [`StructureModifier::with_type`] and
/// [`StructureModifier::with_converter`]
pub struct TypedView<'a, C: EquivalentConverter> {
    modifier: StructureModifier<'a>,
    converter: C,
}

impl<'a, C: EquivalentConverter> TypedView<'a, C> {
    pub fn size(&self) -> usize {
        self.modifier.size()
    }

    pub fn read(&self, index: usize) -> Result<C::Target> {
        let value = self.modifier.read_value(index)?;
        self.converter.to_specific(&value).map_err(|err| self.name_field(index, err))
    }

    pub fn write(&mut self, index: usize, value: C::Target) -> Result<()> {
        let generic = self.converter.to_generic(value)?;
        self.modifier.write_value(index, generic)
    }

    pub fn modify<F>(&mut self, index: usize, f: F) -> Result<()>
    where
        F: FnOnce(C::Target) -> C::Target,
    {
        let current = self.read(index)?;
        self.write(index, f(current))
    }

    /// Every field value, in index order
    pub fn values(&self) -> Result<Vec<C::Target>> {
        (0..self.size()).map(|index| self.read(index)).collect()
    }

    pub fn field(&self, index: usize) -> Result<&FieldDef> {
        self.modifier.field(index)
    }

    fn name_field(&self, index: usize, err: AccessError) -> TapError {
        match (err, self.modifier.field(index)) {
            (AccessError::IncompatibleType { expected, found, .. }, Ok(field)) => {
                AccessError::IncompatibleType {
                    field: field.name.clone(),
                    expected,
                    found,
                }
                .into()
            }
            (err, _) => err.into(),
        }
    }
}
