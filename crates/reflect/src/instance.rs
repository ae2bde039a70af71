//! Packet instances

use crate::class::ClassHandle;
use crate::value::Value;
use std::fmt;

/// An object of a host class
///
/// Slots follow [`ClassDef::slot_fields`](crate::ClassDef::slot_fields):
/// superclass fields first, so an accessor compiled for a superclass is valid
/// on every subclass instance.
#[derive(Clone)]
pub struct Instance {
    class: ClassHandle,
    slots: Vec<Value>,
}

impl Instance {
    /// Allocate an instance with zeroed primitives and null references
    pub fn new(class: &ClassHandle) -> Self {
        let slots = class
            .slot_fields()
            .into_iter()
            .map(|field| field.ty.zero_value())
            .collect();
        Self {
            class: class.clone(),
            slots,
        }
    }

    pub fn class(&self) -> &ClassHandle {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    /// Raw slot storage, for the host that owns the class
    pub fn slots(&self) -> &[Value] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [Value] {
        &mut self.slots
    }

    pub(crate) fn slot(&self, offset: usize) -> Option<&Value> {
        self.slots.get(offset)
    }

    pub(crate) fn slot_mut(&mut self, offset: usize) -> Option<&mut Value> {
        self.slots.get_mut(offset)
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.class.name() == other.class.name() && self.slots == other.slots
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.class.name())
            .field("slots", &self.slots)
            .finish()
    }
}
