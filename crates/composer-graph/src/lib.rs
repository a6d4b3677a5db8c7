//! Composer Graph
//!
//! This crate provides the validated, immutable graph representation of an
//! application. A loaded [`Application`] is what the engine walks.
//!
//! Key differences from `composer-config`:
//! - Components live in an arena and are addressed by [`ComponentId`]
//! - Wires are resolved to component ids at load time; a wire that cannot be
//!   resolved is a [`GraphError`], never a run-time surprise
//! - Component types are checked against a [`TypeCatalog`]
//! - The single entry point (the component with no inbound wire) is known

mod application;
mod component;
mod error;

pub use application::{Application, Composite, TypeCatalog};
pub use component::{Component, ComponentId, ComponentRef, PropertyError};
pub use error::GraphError;

/// Label of the default success wire.
pub const NEXT: &str = "next";

/// Label of the alternate wire used by fall-back style components.
pub const SECOND: &str = "second";
