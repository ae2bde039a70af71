//! # PacketTap Reflection Layer
//!
//! Structural access to host objects whose layout is only known at runtime.
//!
//! ## Layers
//!
//! 1. [`class`]: host class definitions, superclass chains and the class table
//! 2. [`accessor`]: compiled per-field accessors with checked conversions
//! 3. [`layout`]: per-class descriptor tables, compiled once
//! 4. [`template`]: filtered, cached field orderings
//! 5. [`modifier`]: index-based read/write views bound to one instance
//!
//! [`converter`] adds typed views over domain wrapper types and [`defaults`]
//! fills freshly created instances with plausible values.

pub mod accessor;
pub mod class;
pub mod converter;
pub mod defaults;
pub mod instance;
pub mod layout;
pub mod modifier;
pub mod template;
pub mod value;

pub use accessor::{convert, AccessLevel, FieldAccessor};
pub use class::{ClassBuilder, ClassDef, ClassHandle, ClassKind, ClassTable, FieldDef, Modifiers};
pub use converter::{EnumConverter, EquivalentConverter, IdConverter, Primitive, PrimitiveConverter};
pub use defaults::{default_value, populate_defaults, MAX_DEFAULT_DEPTH};
pub use instance::Instance;
pub use layout::{LayoutCache, StructureLayout};
pub use modifier::{StructureModifier, TypedView};
pub use template::{matches_filter, StructureTemplate, TemplateCache};
pub use value::{Value, ValueType};
