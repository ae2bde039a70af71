//! Shared fixtures for this crate's tests

use crate::container::PacketContainer;
use packettap_protocol::{packets, PacketType};
use packettap_reflect::{
    AccessLevel, ClassDef, ClassHandle, ClassTable, Instance, LayoutCache, StructureTemplate, TemplateCache, Value,
    ValueType,
};
use std::sync::Arc;

pub const CHAT: PacketType = packets::play::server::CHAT;

pub struct Fixture {
    pub chat: ClassHandle,
    pub kick: ClassHandle,
    templates: TemplateCache,
}

impl Fixture {
    pub fn new() -> Self {
        let classes = Arc::new(ClassTable::new());
        let base = classes.register(ClassDef::builder("Packet").build());
        let chat = classes.register(
            ClassDef::builder("ClientboundPlayerChatPacket")
                .extends(&base)
                .field("message", ValueType::String)
                .field("sequence", ValueType::Int)
                .build(),
        );
        let kick = classes.register(
            ClassDef::builder("ClientboundDisconnectPacket")
                .extends(&base)
                .field("reason", ValueType::String)
                .build(),
        );
        let layouts = LayoutCache::new(classes, AccessLevel::Privileged, Some("Packet".to_string()));
        Self {
            chat,
            kick,
            templates: TemplateCache::new(Arc::new(layouts)),
        }
    }

    pub fn chat_template(&self) -> Arc<StructureTemplate> {
        self.templates.root(&self.chat)
    }

    pub fn chat(&self, message: &str) -> PacketContainer {
        let mut instance = Instance::new(&self.chat);
        instance.slots_mut()[0] = Value::string(message);
        PacketContainer::new(CHAT, instance, self.chat_template()).unwrap()
    }
}

pub fn chat(message: &str) -> PacketContainer {
    Fixture::new().chat(message)
}
