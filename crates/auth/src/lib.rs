//! `supplyline-auth`: role-based authorization boundary.
//!
//! Authentication happens elsewhere. Every engine call receives an explicit,
//! already-authenticated `Actor`; this crate only answers "may this role do
//! that?". Ambient identity is never read.

pub mod actor;
pub mod authorize;
pub mod permissions;
pub mod roles;

pub use actor::Actor;
pub use authorize::{authorize, role_permissions, AuthzError};
pub use permissions::Permission;
pub use roles::Role;
