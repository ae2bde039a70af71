//! # Packet Registry
//!
//! Memoized mapping from [`PacketType`] to the host class implementing it.
//!
//! ## Cache discipline
//!
//! Each packet type owns a once cell. The first caller runs the resolvers;
//! concurrent callers block on the same cell and read its result. Results,
//! failures included, are never invalidated for the lifetime of the
//! registry.
//!
//! Successful resolutions also feed a reverse index from
//! `(stage, direction, class name)` back to the packet type, which the
//! injector uses to classify packet objects it sees in the pipeline.

use crate::host::HostIntrospection;
use crate::resolver::{ClassResolver, ResolutionPolicy, ResolveContext, ResolverKind};
use crate::shim::VersionShim;
use dashmap::DashMap;
use packettap_core::{Result, TapError};
use packettap_protocol::{Direction, PacketType, ProtocolStage};
use packettap_reflect::{ClassHandle, ClassTable};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Why a packet type could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveFailure {
    pub attempts: Vec<(ResolverKind, String)>,
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return f.write_str("no resolvers configured");
        }
        for (index, (kind, reason)) in self.attempts.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", kind, reason)?;
        }
        Ok(())
    }
}

type ResolveCell = Arc<OnceLock<std::result::Result<ClassHandle, ResolveFailure>>>;

/// Version-tolerant, memoized class registry
pub struct PacketRegistry {
    shim: Arc<dyn VersionShim>,
    host: Arc<dyn HostIntrospection>,
    classes: Arc<ClassTable>,
    policy: ResolutionPolicy,
    resolvers: Vec<Box<dyn ClassResolver>>,
    resolved: DashMap<PacketType, ResolveCell>,
    reverse: DashMap<(ProtocolStage, Direction, String), PacketType>,
    indexed: DashMap<(ProtocolStage, Direction), Arc<OnceLock<()>>>,
    resolutions: AtomicUsize,
}

impl PacketRegistry {
    pub fn new(shim: Arc<dyn VersionShim>, host: Arc<dyn HostIntrospection>, policy: ResolutionPolicy) -> Self {
        let resolvers = policy.build_resolvers();
        Self::with_resolvers(shim, host, policy, resolvers)
    }

    /// Create a registry with a custom resolver chain
    pub fn with_resolvers(
        shim: Arc<dyn VersionShim>,
        host: Arc<dyn HostIntrospection>,
        policy: ResolutionPolicy,
        resolvers: Vec<Box<dyn ClassResolver>>,
    ) -> Self {
        let classes = host.class_table();
        tracing::debug!(
            "Packet registry for {} ({} shim, {} classes, order {:?})",
            shim.version(),
            shim.name(),
            classes.len(),
            policy.order
        );
        Self {
            shim,
            host,
            classes,
            policy,
            resolvers,
            resolved: DashMap::new(),
            reverse: DashMap::new(),
            indexed: DashMap::new(),
            resolutions: AtomicUsize::new(0),
        }
    }

    pub fn shim(&self) -> &Arc<dyn VersionShim> {
        &self.shim
    }

    pub fn classes(&self) -> &Arc<ClassTable> {
        &self.classes
    }

    pub fn policy(&self) -> &ResolutionPolicy {
        &self.policy
    }

    /// Class implementing `packet` on this server
    ///
    /// # Returns
    /// * `Ok(class)` - The same handle for every call
    /// * `Err(UnsupportedPacket)` - No resolver found a valid class; also cached
    pub fn resolve(&self, packet: PacketType) -> Result<ClassHandle> {
        // Clone the cell out so the shard lock is not held while resolving
        let cell = self.resolved.entry(packet).or_default().clone();
        let result = cell.get_or_init(|| {
            self.resolutions.fetch_add(1, Ordering::Relaxed);
            self.compute(packet)
        });

        match result {
            Ok(class) => Ok(class.clone()),
            Err(failure) => Err(TapError::UnsupportedPacket {
                packet: packet.to_string(),
                reason: failure.to_string(),
            }),
        }
    }

    pub fn is_supported(&self, packet: PacketType) -> bool {
        self.resolve(packet).is_ok()
    }

    /// Number of resolutions actually computed, cache hits excluded
    pub fn resolution_count(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }

    /// Packet type implemented by `class_name` in the given stage and direction
    ///
    /// The first lookup for a stage and direction resolves every catalogued
    /// packet type of that pair.
    pub fn packet_type_of(&self, stage: ProtocolStage, direction: Direction, class_name: &str) -> Option<PacketType> {
        let cell = self.indexed.entry((stage, direction)).or_default().clone();
        cell.get_or_init(|| {
            for packet in PacketType::of(stage, direction) {
                let _ = self.resolve(packet);
            }
        });

        self.reverse
            .get(&(stage, direction, class_name.to_string()))
            .map(|entry| *entry.value())
    }

    fn compute(&self, packet: PacketType) -> std::result::Result<ClassHandle, ResolveFailure> {
        let ctx = ResolveContext {
            shim: self.shim.as_ref(),
            host: self.host.as_ref(),
            classes: &self.classes,
        };
        let expected = self.shim.expected_signature(&packet);
        let mut attempts = Vec::new();

        for resolver in &self.resolvers {
            let candidate = match resolver.resolve(&packet, &ctx) {
                Ok(candidate) => candidate,
                Err(reason) => {
                    tracing::debug!("{} resolver missed {}: {}", resolver.kind(), packet, reason);
                    attempts.push((resolver.kind(), reason));
                    continue;
                }
            };

            if self.policy.require_signature && resolver.needs_validation() {
                if let Some(expected) = &expected {
                    let actual = ctx.signature_of(&candidate);
                    if !expected.is_subsequence_of(&actual) {
                        let reason = format!(
                            "candidate {} has signature {}, expected {}",
                            candidate.name(),
                            actual,
                            expected
                        );
                        tracing::debug!("{} resolver rejected for {}: {}", resolver.kind(), packet, reason);
                        attempts.push((resolver.kind(), reason));
                        continue;
                    }
                }
            }

            tracing::debug!("Resolved {} to {} via {} resolver", packet, candidate.name(), resolver.kind());
            self.reverse.insert(
                (packet.stage(), packet.direction(), candidate.name().to_string()),
                packet,
            );
            return Ok(candidate);
        }

        tracing::debug!("Unable to resolve {}", packet);
        Err(ResolveFailure { attempts })
    }
}
