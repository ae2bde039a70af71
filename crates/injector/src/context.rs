//! Everything an injector needs from the engine

use packettap_events::Dispatcher;
use packettap_registry::{PacketRegistry, StructureCache, VersionShim};
use std::sync::Arc;

/// Shared engine state handed to every injector
pub struct InterceptionContext {
    structures: Arc<StructureCache>,
    dispatcher: Arc<Dispatcher>,
}

impl InterceptionContext {
    pub fn new(structures: Arc<StructureCache>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { structures, dispatcher }
    }

    pub fn structures(&self) -> &Arc<StructureCache> {
        &self.structures
    }

    pub fn registry(&self) -> &Arc<PacketRegistry> {
        self.structures.registry()
    }

    pub fn shim(&self) -> &Arc<dyn VersionShim> {
        self.registry().shim()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}
