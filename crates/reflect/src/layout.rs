//! # Structure Layouts
//!
//! A [`StructureLayout`] is the compiled descriptor table of a class: one
//! [`FieldAccessor`] per instance field, in declaration order. The class's
//! own fields come first, then each superclass's fields, walking up until the
//! optional excluded base class (usually the host's packet base class).
//!
//! Layouts are built once per class by a [`LayoutCache`] and shared
//! afterwards.

use crate::accessor::{AccessLevel, FieldAccessor};
use crate::class::{ClassHandle, ClassTable};
use dashmap::DashMap;
use std::sync::Arc;

/// Compiled descriptor table of one class
#[derive(Debug)]
pub struct StructureLayout {
    class: ClassHandle,
    accessors: Vec<FieldAccessor>,
}

impl StructureLayout {
    /// Compile the layout of `class`
    ///
    /// # Arguments
    /// * `class` - Class to compile
    /// * `exclude` - Base class whose fields (and whose ancestors' fields) are left out
    /// * `access` - Capability every accessor in the layout carries
    pub fn build(class: &ClassHandle, exclude: Option<&str>, access: AccessLevel) -> Self {
        let mut accessors = Vec::new();
        let mut current = Some(class);

        while let Some(declaring) = current {
            if exclude == Some(declaring.name()) {
                break;
            }
            let base = declaring.own_slot_offset();
            for (index, field) in declaring.own_instance_fields().enumerate() {
                accessors.push(FieldAccessor::new(
                    field.clone(),
                    declaring.clone(),
                    base + index,
                    access,
                ));
            }
            current = declaring.superclass();
        }

        Self {
            class: class.clone(),
            accessors,
        }
    }

    pub fn class(&self) -> &ClassHandle {
        &self.class
    }

    pub fn accessors(&self) -> &[FieldAccessor] {
        &self.accessors
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

/// Write-once cache of layouts for one host
///
/// Also carries what every template built on top of it needs: the host's
/// class table, the access level and the excluded base class.
pub struct LayoutCache {
    classes: Arc<ClassTable>,
    access: AccessLevel,
    exclude: Option<String>,
    layouts: DashMap<String, Arc<StructureLayout>>,
}

impl LayoutCache {
    pub fn new(classes: Arc<ClassTable>, access: AccessLevel, exclude: Option<String>) -> Self {
        Self {
            classes,
            access,
            exclude,
            layouts: DashMap::new(),
        }
    }

    pub fn classes(&self) -> &Arc<ClassTable> {
        &self.classes
    }

    pub fn access(&self) -> AccessLevel {
        self.access
    }

    pub fn excluded_base(&self) -> Option<&str> {
        self.exclude.as_deref()
    }

    /// Layout of `class`, compiled on first request
    pub fn layout(&self, class: &ClassHandle) -> Arc<StructureLayout> {
        self.layouts
            .entry(class.name().to_string())
            .or_insert_with(|| {
                tracing::trace!("Compiling layout for {}", class.name());
                Arc::new(StructureLayout::build(class, self.exclude.as_deref(), self.access))
            })
            .clone()
    }

    /// Number of compiled layouts
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}
