//! # Injection Factory
//!
//! One [`ChannelInjector`] per connection, also reachable by player name
//! once the login sniffer has seen it.
//!
//! Detached injectors stay cached until their channel closes, so synthetic
//! packets still reach a connection whose injection failed or was undone.
//! Asking for the channel again replaces a detached injector with a fresh
//! one.
//!
//! After [`InjectionFactory::close`] no new injectors are handed out and
//! every live one has been detached.

use crate::context::InterceptionContext;
use crate::injector::ChannelInjector;
use crate::state::InjectionState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use packettap_core::{ConnectionId, Result, TapError};
use packettap_network::Channel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub struct InjectionFactory {
    context: Arc<InterceptionContext>,
    by_connection: DashMap<ConnectionId, Arc<ChannelInjector>>,
    by_player: DashMap<String, Weak<ChannelInjector>>,
    closed: AtomicBool,
}

impl InjectionFactory {
    pub fn new(context: Arc<InterceptionContext>) -> Arc<Self> {
        Arc::new(Self {
            context,
            by_connection: DashMap::new(),
            by_player: DashMap::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn context(&self) -> &Arc<InterceptionContext> {
        &self.context
    }

    /// Injector for `channel`, created on first use or when the cached one
    /// is detached
    ///
    /// # Errors
    /// `InjectionFailure` once the factory is closed
    pub fn from_channel(self: &Arc<Self>, channel: &Arc<Channel>) -> Result<Arc<ChannelInjector>> {
        if self.is_closed() {
            return Err(TapError::InjectionFailure {
                connection: channel.id().get(),
                reason: "injection factory is closed".to_string(),
            });
        }

        let mut first = false;
        let mut replaced = None;
        let injector = match self.by_connection.entry(channel.id()) {
            Entry::Occupied(mut entry) if entry.get().state() == InjectionState::Detached => {
                let fresh = self.create(channel);
                replaced = Some(entry.insert(fresh.clone()));
                fresh
            }
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                first = true;
                entry.insert(self.create(channel)).clone()
            }
        };

        if let Some(old) = replaced {
            self.forget_player(&old);
            tracing::trace!("Replaced detached injector for channel {}", channel.id());
        }
        if first {
            tracing::trace!("Created injector for channel {}", channel.id());
            let factory = Arc::downgrade(self);
            let id = channel.id();
            channel.on_close(Box::new(move |_| {
                if let Some(factory) = factory.upgrade() {
                    factory.forget_connection(id);
                }
            }));
        }
        Ok(injector)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ChannelInjector>> {
        self.by_connection.get(&id).map(|injector| injector.clone())
    }

    /// Injector of the connection `name` logged in on
    pub fn by_player(&self, name: &str) -> Option<Arc<ChannelInjector>> {
        self.by_player.get(name).and_then(|injector| injector.upgrade())
    }

    pub fn injectors(&self) -> Vec<Arc<ChannelInjector>> {
        self.by_connection.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_connection.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refuse new injectors and detach every live one
    ///
    /// # Returns
    /// Number of channels that were injected and are now detached
    pub async fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);

        let mut detached = 0;
        for injector in self.injectors() {
            if injector.uninject_and_wait().await {
                detached += 1;
            }
        }
        self.by_connection.clear();
        self.by_player.clear();

        tracing::info!("Injection factory closed, {} channel(s) detached", detached);
        detached
    }

    pub(crate) fn register_player(&self, name: &str, injector: &Arc<ChannelInjector>) {
        self.by_player.insert(name.to_string(), Arc::downgrade(injector));
    }

    fn create(self: &Arc<Self>, channel: &Arc<Channel>) -> Arc<ChannelInjector> {
        ChannelInjector::with_factory(channel.clone(), self.context.clone(), Arc::downgrade(self))
    }

    fn forget_player(&self, injector: &Arc<ChannelInjector>) {
        if let Some(player) = injector.player() {
            self.by_player
                .remove_if(&player, |_, cached| std::ptr::eq(cached.as_ptr(), Arc::as_ptr(injector)));
        }
    }

    fn forget_connection(&self, id: ConnectionId) {
        if let Some((_, injector)) = self.by_connection.remove(&id) {
            if let Some(player) = injector.player() {
                self.by_player.remove(&player);
            }
        }
    }
}
