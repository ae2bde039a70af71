//! Per packet type structure templates and packet construction

use crate::registry::PacketRegistry;
use dashmap::DashMap;
use packettap_core::Result;
use packettap_protocol::PacketType;
use packettap_reflect::{
    populate_defaults, AccessLevel, ClassHandle, Instance, LayoutCache, StructureTemplate, TemplateCache,
};
use std::sync::Arc;

/// Root templates for every resolved packet type
///
/// Templates are privileged and leave out the fields of the host packet
/// base class, so index 0 is always the first field of the packet itself.
pub struct StructureCache {
    registry: Arc<PacketRegistry>,
    templates: TemplateCache,
    by_type: DashMap<PacketType, Arc<StructureTemplate>>,
}

impl StructureCache {
    pub fn new(registry: Arc<PacketRegistry>) -> Self {
        let layouts = LayoutCache::new(
            registry.classes().clone(),
            AccessLevel::Privileged,
            Some(registry.shim().packet_base_class().to_string()),
        );
        Self {
            registry,
            templates: TemplateCache::new(Arc::new(layouts)),
            by_type: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    /// Root template of the class implementing `packet`
    pub fn template(&self, packet: PacketType) -> Result<Arc<StructureTemplate>> {
        if let Some(template) = self.by_type.get(&packet) {
            return Ok(template.clone());
        }
        let class = self.registry.resolve(packet)?;
        let template = self.template_for_class(&class);
        self.by_type.insert(packet, template.clone());
        Ok(template)
    }

    /// Root template of an arbitrary class
    pub fn template_for_class(&self, class: &ClassHandle) -> Arc<StructureTemplate> {
        self.templates.root(class)
    }

    /// Create an instance of the class implementing `packet`, with every
    /// reference field set to a plausible default
    pub fn new_packet(&self, packet: PacketType) -> Result<Instance> {
        let class = self.registry.resolve(packet)?;
        let mut instance = Instance::new(&class);
        populate_defaults(&mut instance, self.registry.classes(), 0);
        Ok(instance)
    }
}
