//! # PacketTap Registry
//!
//! Resolves logical packet types to the classes a running server actually
//! uses, through a version shim selected once at start-up.
//!
//! ```text
//! PacketType ──> [declared] ──> [naming] ──> [signature] ──> ClassHandle
//!                     │             │
//!                     └── validated against the expected signature
//! ```

pub mod host;
pub mod registry;
pub mod resolver;
pub mod shim;
pub mod signature;
pub mod structure;

pub use host::HostIntrospection;
pub use registry::{PacketRegistry, ResolveFailure};
pub use resolver::{
    ClassResolver, DeclaredResolver, NamingResolver, ResolutionPolicy, ResolveContext, ResolverKind,
    SignatureResolver,
};
pub use shim::{select_shim, LegacyShim, ModernShim, VersionShim};
pub use signature::{minimum_signature, StructuralSignature};
pub use structure::StructureCache;
