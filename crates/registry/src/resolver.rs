//! # Class Resolvers
//!
//! A resolver maps a [`PacketType`] to the host class that implements it on
//! the running server. The registry tries resolvers in the order given by a
//! [`ResolutionPolicy`] until one succeeds.
//!
//! - [`DeclaredResolver`]: the host's own packet mapping, when it exposes one
//! - [`NamingResolver`]: class names built by the version shim
//! - [`SignatureResolver`]: the unique packet class whose field types match
//!   the expected signature exactly
//!
//! Candidates from the first two are validated against the expected
//! signature (as an ordered subsequence) before they are accepted.

use crate::host::HostIntrospection;
use crate::shim::VersionShim;
use crate::signature::StructuralSignature;
use packettap_core::TapError;
use packettap_protocol::PacketType;
use packettap_reflect::{ClassHandle, ClassTable};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolverKind {
    Declared,
    Naming,
    Signature,
}

impl ResolverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Declared => "declared",
            Self::Naming => "naming",
            Self::Signature => "signature",
        }
    }
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolverKind {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "declared" => Ok(Self::Declared),
            "naming" => Ok(Self::Naming),
            "signature" => Ok(Self::Signature),
            other => Err(TapError::Config(format!("Unknown resolver '{}'", other))),
        }
    }
}

/// Which resolvers run, in which order, and whether candidates are validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPolicy {
    pub order: Vec<ResolverKind>,
    /// Validate declared and naming candidates against the expected signature
    pub require_signature: bool,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            order: vec![ResolverKind::Declared, ResolverKind::Naming, ResolverKind::Signature],
            require_signature: true,
        }
    }
}

impl ResolutionPolicy {
    /// Parse a comma separated resolver list such as `naming, signature`
    pub fn parse_order(list: &str) -> Result<Vec<ResolverKind>, TapError> {
        let mut order = Vec::new();
        for item in list.split(',').filter(|item| !item.trim().is_empty()) {
            let kind: ResolverKind = item.parse()?;
            if !order.contains(&kind) {
                order.push(kind);
            }
        }
        if order.is_empty() {
            return Err(TapError::Config("resolution_order is empty".to_string()));
        }
        Ok(order)
    }

    pub fn build_resolvers(&self) -> Vec<Box<dyn ClassResolver>> {
        self.order
            .iter()
            .map(|kind| -> Box<dyn ClassResolver> {
                match kind {
                    ResolverKind::Declared => Box::new(DeclaredResolver),
                    ResolverKind::Naming => Box::new(NamingResolver),
                    ResolverKind::Signature => Box::new(SignatureResolver),
                }
            })
            .collect()
    }
}

/// What a resolver may look at
pub struct ResolveContext<'a> {
    pub shim: &'a dyn VersionShim,
    pub host: &'a dyn HostIntrospection,
    pub classes: &'a ClassTable,
}

impl ResolveContext<'_> {
    /// Signature of `class`, ignoring the packet base class
    pub fn signature_of(&self, class: &ClassHandle) -> StructuralSignature {
        StructuralSignature::of_class(class, Some(self.shim.packet_base_class()))
    }

    fn is_packet_class(&self, class: &ClassHandle) -> bool {
        class.name() != self.shim.packet_base_class()
            && class.is_subclass_of(self.shim.packet_base_class())
    }
}

/// One strategy for finding the class of a packet type
pub trait ClassResolver: Send + Sync {
    fn kind(&self) -> ResolverKind;

    /// Find a candidate, or explain why there is none
    fn resolve(&self, packet: &PacketType, ctx: &ResolveContext<'_>) -> Result<ClassHandle, String>;

    /// Whether candidates from this resolver are checked against the
    /// expected signature
    fn needs_validation(&self) -> bool {
        true
    }
}

pub struct DeclaredResolver;

impl ClassResolver for DeclaredResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Declared
    }

    fn resolve(&self, packet: &PacketType, ctx: &ResolveContext<'_>) -> Result<ClassHandle, String> {
        let name = ctx
            .host
            .declared_class(packet)
            .ok_or_else(|| "host declares no class".to_string())?;
        ctx.classes
            .get(&name)
            .ok_or_else(|| format!("declared class {} does not exist", name))
    }
}

pub struct NamingResolver;

impl ClassResolver for NamingResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Naming
    }

    fn resolve(&self, packet: &PacketType, ctx: &ResolveContext<'_>) -> Result<ClassHandle, String> {
        let candidates = ctx.shim.candidate_class_names(packet);
        candidates
            .iter()
            .filter_map(|name| ctx.classes.get(name))
            .find(|class| ctx.is_packet_class(class))
            .ok_or_else(|| format!("none of [{}] exist", candidates.join(", ")))
    }
}

pub struct SignatureResolver;

impl ClassResolver for SignatureResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Signature
    }

    fn resolve(&self, packet: &PacketType, ctx: &ResolveContext<'_>) -> Result<ClassHandle, String> {
        let expected = ctx
            .shim
            .expected_signature(packet)
            .ok_or_else(|| "no expected signature".to_string())?;

        let matches: Vec<ClassHandle> = ctx
            .classes
            .subclasses_of(ctx.shim.packet_base_class())
            .into_iter()
            .filter(|class| ctx.is_packet_class(class))
            .filter(|class| ctx.signature_of(class) == expected)
            .collect();

        match matches.as_slice() {
            [single] => Ok(single.clone()),
            [] => Err(format!("no class has signature {}", expected)),
            many => Err(format!(
                "signature {} is ambiguous: {}",
                expected,
                many.iter().map(|c| c.name()).collect::<Vec<_>>().join(", ")
            )),
        }
    }

    fn needs_validation(&self) -> bool {
        false
    }
}
