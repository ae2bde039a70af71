//! # Host Class Model
//!
//! Describes the classes a host server uses for its packets: their fields in
//! declaration order, field modifiers, superclass chain and, for enums, their
//! constants. Class definitions are immutable once built and shared through
//! [`ClassHandle`].

use crate::value::ValueType;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Shared handle to an immutable class definition
pub type ClassHandle = Arc<ClassDef>;

/// Field modifiers relevant to access control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub is_static: bool,
    pub is_final: bool,
    pub is_private: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        is_static: false,
        is_final: false,
        is_private: false,
    };

    /// `private final`, the shape of almost every packet field
    pub const PRIVATE_FINAL: Modifiers = Modifiers {
        is_static: false,
        is_final: true,
        is_private: true,
    };
}

/// One declared field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: ValueType,
    pub modifiers: Modifiers,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: ValueType, modifiers: Modifiers) -> Self {
        Self {
            name: name.into(),
            ty,
            modifiers,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassKind {
    Struct,
    Enum { constants: Vec<String> },
}

/// A host class definition
pub struct ClassDef {
    name: String,
    superclass: Option<ClassHandle>,
    fields: Vec<FieldDef>,
    kind: ClassKind,
}

impl ClassDef {
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder::new(name)
    }

    /// Define an enum class with the given constants, in ordinal order
    pub fn enumeration<S: Into<String>>(name: impl Into<String>, constants: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            fields: Vec::new(),
            kind: ClassKind::Enum {
                constants: constants.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Option<&ClassHandle> {
        self.superclass.as_ref()
    }

    /// Fields declared by this class itself, statics included
    pub fn declared_fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn kind(&self) -> &ClassKind {
        &self.kind
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, ClassKind::Enum { .. })
    }

    pub fn enum_constants(&self) -> &[String] {
        match &self.kind {
            ClassKind::Enum { constants } => constants,
            ClassKind::Struct => &[],
        }
    }

    /// Whether this class is `name` or inherits from it
    pub fn is_subclass_of(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        match &self.superclass {
            Some(parent) => parent.is_subclass_of(name),
            None => false,
        }
    }

    /// Number of instance slots, superclasses included
    pub fn slot_count(&self) -> usize {
        let inherited = self.superclass.as_ref().map_or(0, |parent| parent.slot_count());
        inherited + self.own_instance_fields().count()
    }

    /// Slot index of this class's first own field
    pub fn own_slot_offset(&self) -> usize {
        self.superclass.as_ref().map_or(0, |parent| parent.slot_count())
    }

    /// Non-static fields declared by this class
    pub fn own_instance_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|field| !field.modifiers.is_static)
    }

    /// Instance fields in slot order: superclass fields first
    pub fn slot_fields(&self) -> Vec<&FieldDef> {
        let mut fields = match &self.superclass {
            Some(parent) => parent.slot_fields(),
            None => Vec::new(),
        };
        fields.extend(self.own_instance_fields());
        fields
    }

    /// Field types of this class only, in declaration order
    pub fn own_signature(&self) -> Vec<ValueType> {
        self.own_instance_fields().map(|field| field.ty.clone()).collect()
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|parent| parent.name()))
            .field("fields", &self.fields.len())
            .finish()
    }
}

/// Builder for [`ClassDef`]
pub struct ClassBuilder {
    name: String,
    superclass: Option<ClassHandle>,
    fields: Vec<FieldDef>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            fields: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: &ClassHandle) -> Self {
        self.superclass = Some(parent.clone());
        self
    }

    /// Add a `private final` field
    pub fn field(self, name: impl Into<String>, ty: ValueType) -> Self {
        self.field_with(name, ty, Modifiers::PRIVATE_FINAL)
    }

    /// Add a public, mutable field
    pub fn public_field(self, name: impl Into<String>, ty: ValueType) -> Self {
        self.field_with(name, ty, Modifiers::NONE)
    }

    pub fn static_field(self, name: impl Into<String>, ty: ValueType) -> Self {
        self.field_with(
            name,
            ty,
            Modifiers {
                is_static: true,
                is_final: true,
                is_private: true,
            },
        )
    }

    pub fn field_with(mut self, name: impl Into<String>, ty: ValueType, modifiers: Modifiers) -> Self {
        self.fields.push(FieldDef::new(name, ty, modifiers));
        self
    }

    pub fn build(self) -> ClassDef {
        ClassDef {
            name: self.name,
            superclass: self.superclass,
            fields: self.fields,
            kind: ClassKind::Struct,
        }
    }
}

/// Name-indexed table of every class a host defines
#[derive(Default)]
pub struct ClassTable {
    classes: RwLock<HashMap<String, ClassHandle>>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class, replacing any previous class with the same name
    pub fn register(&self, class: ClassDef) -> ClassHandle {
        let handle = Arc::new(class);
        self.classes
            .write()
            .insert(handle.name().to_string(), handle.clone());
        handle
    }

    pub fn get(&self, name: &str) -> Option<ClassHandle> {
        self.classes.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }

    /// Every registered class that is `base` or inherits from it, sorted by name
    pub fn subclasses_of(&self, base: &str) -> Vec<ClassHandle> {
        let mut found: Vec<_> = self
            .classes
            .read()
            .values()
            .filter(|class| class.is_subclass_of(base))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name().cmp(b.name()));
        found
    }

    /// Whether a value of class `sub` can be stored where `target` is declared
    pub fn is_assignable(&self, sub: &str, target: &str) -> bool {
        sub == target || self.get(sub).is_some_and(|class| class.is_subclass_of(target))
    }
}
