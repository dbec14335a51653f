//! Schema reconciliation: introspect the live store, diff it against the
//! declared models, then migrate, verify or provision access.

pub mod acl;
pub mod diff;
pub mod introspect;
pub mod migrate;
pub mod verify;
