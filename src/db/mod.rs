//! Persistence for identities and their refresh-token slot.
//!
//! `IdentityRepository` is the seam; `DbOperations` talks to Postgres and
//! `MemoryIdentityStore` keeps everything in process.

pub mod memory;
pub mod models;
pub mod operations;
pub mod repository;

pub use memory::MemoryIdentityStore;
pub use models::{Identity, PublicIdentity, Role};
pub use operations::{DbOperations, DbPoolStatus};
pub use repository::{IdentityDetails, IdentityRepository};
