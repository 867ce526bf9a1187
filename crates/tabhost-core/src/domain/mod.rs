//! Domain entities for tabhost.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of the system is the **domain**.  Domain code:
//!
//! - Contains the core rules of the application: how a slot is split into
//!   tiles, which window classes may be embedded, when a release is still
//!   being debounced.
//! - Has **no** imports from OS APIs or threading primitives.
//! - Can be unit-tested on any platform without a running desktop.
//!
//! Code in outer layers (the engine's application and infrastructure layers)
//! depends on the domain, but the domain never depends on them.

pub mod geometry;
pub mod policy;
pub mod process;
pub mod session;
pub mod suppression;
pub mod sync_gate;
pub mod tiling;
pub mod window;
