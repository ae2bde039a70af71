//! # Listener Registry
//!
//! Listeners are kept per packet type in copy-on-write lists sorted by
//! priority (highest first, registration order among equals).
//!
//! # Thread Safety
//!
//! Registration replaces a list with a new `Arc`; a dispatch works on the
//! `Arc` it cloned when it started. A listener removed during a pass still
//! runs in that pass and is gone from the next one.

use crate::event::{ListenerPriority, PacketEvent};
use dashmap::DashMap;
use packettap_core::{IdGenerator, ListenerId, Result, TapError};
use packettap_protocol::PacketType;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Listener callback; an `Err` is reported as a listener fault
pub type ListenerCallback = Arc<dyn Fn(&mut PacketEvent) -> anyhow::Result<()> + Send + Sync>;

/// How a listener is registered
#[derive(Debug, Clone, Default)]
pub struct ListenerOptions {
    pub priority: ListenerPriority,
    /// Run even when an earlier listener cancelled the event
    pub ignore_cancelled: bool,
    /// Name used in logs and timings
    pub name: Option<String>,
}

impl ListenerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: impl Into<ListenerPriority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn ignore_cancelled(mut self) -> Self {
        self.ignore_cancelled = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A registered listener
pub struct Listener {
    id: ListenerId,
    name: String,
    priority: ListenerPriority,
    ignore_cancelled: bool,
    callback: ListenerCallback,
}

impl Listener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> ListenerPriority {
        self.priority
    }

    pub fn ignores_cancelled(&self) -> bool {
        self.ignore_cancelled
    }

    pub(crate) fn invoke(&self, event: &mut PacketEvent) -> anyhow::Result<()> {
        (self.callback)(event)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("ignore_cancelled", &self.ignore_cancelled)
            .finish()
    }
}

/// Returned by registration; pass it back to unregister
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerHandle {
    id: ListenerId,
    packet_types: Vec<PacketType>,
}

impl ListenerHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn packet_types(&self) -> &[PacketType] {
        &self.packet_types
    }
}

type ListenerList = Arc<Vec<Arc<Listener>>>;

/// Sorted listener lists keyed by packet type
pub struct ListenerRegistry {
    lists: DashMap<PacketType, RwLock<ListenerList>>,
    ids: IdGenerator<ListenerId>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            lists: DashMap::new(),
            ids: IdGenerator::new(),
        }
    }

    /// Register `callback` for every packet type in `packet_types`
    ///
    /// # Arguments
    /// * `packet_types` - Packet types to observe; must not be empty
    /// * `options` - Priority, cancellation handling and name
    /// * `callback` - Called once per event of a matching type
    ///
    /// # Returns
    /// A handle identifying this registration
    pub fn register<F>(&self, packet_types: &[PacketType], options: ListenerOptions, callback: F) -> Result<ListenerHandle>
    where
        F: Fn(&mut PacketEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_callback(packet_types, options, Arc::new(callback))
    }

    /// Same as [`register`](Self::register) for an already shared callback
    pub fn register_callback(
        &self,
        packet_types: &[PacketType],
        options: ListenerOptions,
        callback: ListenerCallback,
    ) -> Result<ListenerHandle> {
        if packet_types.is_empty() {
            return Err(TapError::InvalidData("listener has no packet types".to_string()));
        }

        let id: ListenerId = self.ids.next_id();
        let listener = Arc::new(Listener {
            id,
            name: options.name.unwrap_or_else(|| id.to_string()),
            priority: options.priority,
            ignore_cancelled: options.ignore_cancelled,
            callback,
        });

        let mut registered = Vec::with_capacity(packet_types.len());
        for packet in packet_types {
            if registered.contains(packet) {
                continue;
            }
            let entry = self.lists.entry(*packet).or_default();
            let mut list = entry.write();
            let mut next = Vec::clone(&list);
            let position = next.partition_point(|other| other.priority >= listener.priority);
            next.insert(position, listener.clone());
            *list = Arc::new(next);
            registered.push(*packet);
        }

        tracing::debug!(
            "Registered {} at priority {} for {} packet type(s)",
            listener.name,
            listener.priority,
            registered.len()
        );
        Ok(ListenerHandle {
            id,
            packet_types: registered,
        })
    }

    /// Remove a registration from every list it is in
    ///
    /// Returns `false` if it was already removed.
    pub fn unregister(&self, handle: &ListenerHandle) -> bool {
        let mut removed = false;
        for packet in &handle.packet_types {
            if let Some(entry) = self.lists.get(packet) {
                let mut list = entry.write();
                if list.iter().any(|listener| listener.id == handle.id) {
                    let next: Vec<_> = list.iter().filter(|listener| listener.id != handle.id).cloned().collect();
                    *list = Arc::new(next);
                    removed = true;
                }
            }
            self.lists.remove_if(packet, |_, list| list.read().is_empty());
        }
        if removed {
            tracing::debug!("Unregistered {}", handle.id);
        }
        removed
    }

    /// Current listeners of `packet`, in dispatch order
    pub fn snapshot(&self, packet: PacketType) -> ListenerList {
        self.lists
            .get(&packet)
            .map(|entry| entry.read().clone())
            .unwrap_or_default()
    }

    pub fn has_listeners(&self, packet: PacketType) -> bool {
        self.lists.get(&packet).is_some_and(|entry| !entry.read().is_empty())
    }

    /// Packet types with at least one listener
    pub fn packet_types(&self) -> Vec<PacketType> {
        self.lists
            .iter()
            .filter(|entry| !entry.value().read().is_empty())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Number of (listener, packet type) registrations
    pub fn len(&self) -> usize {
        self.lists.iter().map(|entry| entry.value().read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lists.clear();
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
