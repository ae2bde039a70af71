//! Packet container: one packet instance with its type and field template

use packettap_core::{AccessError, Result, TapError};
use packettap_protocol::PacketType;
use packettap_reflect::{Instance, Primitive, StructureModifier, StructureTemplate, Value};
use std::fmt;
use std::sync::Arc;

/// A packet instance tagged with the packet type it implements
///
/// # Purpose
/// What listeners and API callers hold instead of a bare instance. The
/// container carries the root template of the packet class, so reading and
/// writing fields never needs a registry lookup.
#[derive(Clone)]
pub struct PacketContainer {
    packet_type: PacketType,
    handle: Instance,
    template: Arc<StructureTemplate>,
}

impl PacketContainer {
    /// Wrap `handle` as a packet of `packet_type`
    ///
    /// Fails with `WrongTarget` when the instance is not of the template's
    /// class or a subclass of it.
    pub fn new(packet_type: PacketType, handle: Instance, template: Arc<StructureTemplate>) -> Result<Self> {
        let expected = template.class().name().to_string();
        Self::try_wrap(packet_type, handle, template).map_err(|handle| {
            AccessError::WrongTarget {
                expected,
                found: handle.class_name().to_string(),
            }
            .into()
        })
    }

    /// Same as [`new`](Self::new), but hands the instance back on mismatch
    pub fn try_wrap(
        packet_type: PacketType,
        handle: Instance,
        template: Arc<StructureTemplate>,
    ) -> std::result::Result<Self, Instance> {
        if !handle.class().is_subclass_of(template.class().name()) {
            return Err(handle);
        }
        Ok(Self {
            packet_type,
            handle,
            template,
        })
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn handle(&self) -> &Instance {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut Instance {
        &mut self.handle
    }

    pub fn into_handle(self) -> Instance {
        self.handle
    }

    pub fn template(&self) -> &Arc<StructureTemplate> {
        &self.template
    }

    /// Index-based view over every field of the packet
    pub fn modifier(&mut self) -> Result<StructureModifier<'_>> {
        StructureModifier::new(&mut self.handle, self.template.clone())
    }

    /// Read the `index`-th field of type `T`
    pub fn read<T: Primitive>(&self, index: usize) -> Result<T> {
        let typed = self.template.with_filter(T::value_type());
        let accessor = typed.fields().get(index).ok_or(TapError::IndexOutOfRange {
            index,
            len: typed.size(),
        })?;
        let value = accessor.get_ref(&self.handle)?;
        T::from_value(value).ok_or_else(|| {
            AccessError::IncompatibleType {
                field: accessor.name().to_string(),
                expected: T::value_type().to_string(),
                found: value.type_name(),
            }
            .into()
        })
    }

    /// Write the `index`-th field of type `T`
    pub fn write<T: Primitive>(&mut self, index: usize, value: T) -> Result<()> {
        let mut modifier = self.modifier()?;
        let mut view = modifier.with_type::<T>();
        view.write(index, value)
    }

    /// Every field value in declaration order
    pub fn values(&self) -> Result<Vec<Value>> {
        self.template
            .fields()
            .iter()
            .map(|accessor| accessor.get(&self.handle).map_err(Into::into))
            .collect()
    }
}

impl fmt::Debug for PacketContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketContainer")
            .field("type", &self.packet_type)
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_read_and_write() {
        let mut container = testing::chat("hello");
        assert_eq!(container.read::<String>(0).unwrap(), "hello");

        container.write(0, "bye".to_string()).unwrap();
        assert_eq!(container.read::<String>(0).unwrap(), "bye");
        assert_eq!(container.read::<i32>(0).unwrap(), 0);

        assert!(matches!(
            container.read::<String>(1),
            Err(TapError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_rejects_foreign_instance() {
        let fixture = testing::Fixture::new();
        let instance = Instance::new(&fixture.kick);
        let result = PacketContainer::new(testing::CHAT, instance, fixture.chat_template());
        assert!(matches!(result, Err(TapError::Access(AccessError::WrongTarget { .. }))));
    }

    #[test]
    fn test_values_in_declaration_order() {
        let container = testing::chat("hi");
        let values = container.values().unwrap();
        assert_eq!(values[0], Value::string("hi"));
        assert_eq!(values[1], Value::Int(0));
    }
}
