//! # Structure Templates
//!
//! A [`StructureTemplate`] is the per-class half of a structure modifier: the
//! ordered list of fields that pass a type filter. It is derived once and
//! shared by every instance of the class, which is what keeps field indices
//! stable across instances.
//!
//! ## Caching
//!
//! - Root templates (filter [`ValueType::Any`]) are cached per class in a
//!   [`TemplateCache`].
//! - Filtered sub-templates are cached on the template they were derived
//!   from, keyed by filter.
//! - Templates for nested objects are cached on the parent template, keyed
//!   by the nested class name.

use crate::accessor::FieldAccessor;
use crate::class::{ClassHandle, ClassTable};
use crate::layout::{LayoutCache, StructureLayout};
use crate::value::ValueType;
use dashmap::DashMap;
use std::sync::Arc;

/// Ordered, filtered view over a class layout
pub struct StructureTemplate {
    class: ClassHandle,
    layout: Arc<StructureLayout>,
    filter: ValueType,
    fields: Vec<FieldAccessor>,
    layouts: Arc<LayoutCache>,
    by_filter: DashMap<ValueType, Arc<StructureTemplate>>,
    nested: DashMap<String, Arc<StructureTemplate>>,
}

impl StructureTemplate {
    /// Root template of `class`: every field, declaration order
    pub fn root(class: &ClassHandle, layouts: Arc<LayoutCache>) -> Self {
        Self::derive(class, ValueType::Any, layouts)
    }

    fn derive(class: &ClassHandle, filter: ValueType, layouts: Arc<LayoutCache>) -> Self {
        let layout = layouts.layout(class);
        let fields = layout
            .accessors()
            .iter()
            .filter(|accessor| matches_filter(layouts.classes(), accessor.value_type(), &filter))
            .cloned()
            .collect();

        Self {
            class: class.clone(),
            layout,
            filter,
            fields,
            layouts,
            by_filter: DashMap::new(),
            nested: DashMap::new(),
        }
    }

    pub fn class(&self) -> &ClassHandle {
        &self.class
    }

    pub fn filter(&self) -> &ValueType {
        &self.filter
    }

    pub fn fields(&self) -> &[FieldAccessor] {
        &self.fields
    }

    pub fn size(&self) -> usize {
        self.fields.len()
    }

    pub fn layout(&self) -> &Arc<StructureLayout> {
        &self.layout
    }

    pub fn layouts(&self) -> &Arc<LayoutCache> {
        &self.layouts
    }

    /// Template restricted to fields assignable to `filter`
    pub fn with_filter(self: &Arc<Self>, filter: ValueType) -> Arc<StructureTemplate> {
        if filter == self.filter {
            return self.clone();
        }
        self.by_filter
            .entry(filter.clone())
            .or_insert_with(|| {
                tracing::trace!("Deriving {} template for {}", filter, self.class.name());
                Arc::new(Self::derive(&self.class, filter, self.layouts.clone()))
            })
            .clone()
    }

    /// Root template for a nested object of `class`
    pub fn nested(&self, class: &ClassHandle) -> Arc<StructureTemplate> {
        self.nested
            .entry(class.name().to_string())
            .or_insert_with(|| Arc::new(Self::root(class, self.layouts.clone())))
            .clone()
    }

    /// Number of cached filtered templates
    pub fn cached_filters(&self) -> usize {
        self.by_filter.len()
    }
}

/// Whether a field declared as `field` passes `filter`
///
/// Primitives and containers match exactly. Object filters also match fields
/// whose declared class inherits from the filter class. [`ValueType::Any`]
/// matches everything.
pub fn matches_filter(classes: &ClassTable, field: &ValueType, filter: &ValueType) -> bool {
    match (filter, field) {
        (ValueType::Any, _) => true,
        (ValueType::Object(wanted), ValueType::Object(declared)) => classes.is_assignable(declared, wanted),
        _ => field == filter,
    }
}

/// Per-class cache of root templates for one host
pub struct TemplateCache {
    layouts: Arc<LayoutCache>,
    roots: DashMap<String, Arc<StructureTemplate>>,
}

impl TemplateCache {
    pub fn new(layouts: Arc<LayoutCache>) -> Self {
        Self {
            layouts,
            roots: DashMap::new(),
        }
    }

    pub fn layouts(&self) -> &Arc<LayoutCache> {
        &self.layouts
    }

    /// Root template of `class`, derived on first request
    pub fn root(&self, class: &ClassHandle) -> Arc<StructureTemplate> {
        self.roots
            .entry(class.name().to_string())
            .or_insert_with(|| Arc::new(StructureTemplate::root(class, self.layouts.clone())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccessLevel, ClassDef};

    fn cache() -> (TemplateCache, ClassHandle) {
        let table = ClassTable::new();
        let component = table.register(ClassDef::builder("Component").build());
        table.register(ClassDef::builder("TextComponent").extends(&component).build());
        let packet = table.register(
            ClassDef::builder("ChatPacket")
                .field("message", ValueType::String)
                .field("sender", ValueType::Int)
                .field("body", ValueType::object("TextComponent"))
                .field("signature", ValueType::String)
                .field("overlay", ValueType::object("Component"))
                .build(),
        );
        let layouts = Arc::new(LayoutCache::new(Arc::new(table), AccessLevel::Privileged, None));
        (TemplateCache::new(layouts), packet)
    }

    #[test]
    fn test_filter_keeps_declaration_order() {
        let (cache, packet) = cache();
        let root = cache.root(&packet);
        assert_eq!(root.size(), 5);

        let strings = root.with_filter(ValueType::String);
        let names: Vec<_> = strings.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["message", "signature"]);
    }

    #[test]
    fn test_object_filter_matches_subclasses() {
        let (cache, packet) = cache();
        let components = cache.root(&packet).with_filter(ValueType::object("Component"));
        let names: Vec<_> = components.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["body", "overlay"]);

        let text = cache.root(&packet).with_filter(ValueType::object("TextComponent"));
        assert_eq!(text.size(), 1);
    }

    #[test]
    fn test_templates_are_cached() {
        let (cache, packet) = cache();
        let root = cache.root(&packet);
        assert!(Arc::ptr_eq(&root, &cache.root(&packet)));

        let first = root.with_filter(ValueType::Int);
        let second = root.with_filter(ValueType::Int);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&root, &root.with_filter(ValueType::Any)));
        assert_eq!(root.cached_filters(), 1);
    }
}
