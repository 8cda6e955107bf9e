//! Access-control metadata for an age + sops encryption workflow: the
//! `.sops.yaml` document model, scope/key reconciliation, and the key
//! directory layout. Encryption itself lives in external binaries driven
//! by the `age-sops-tools` crate.

pub mod config;
pub mod error;
pub mod keydir;
pub mod scopes;

pub use config::{Config, CreationRule, KeyEntry, KeyGroup, DEFAULT_SCOPE};
pub use error::{Error, Result};
