//! Custom attribute overlay for attributable record types: runtime-defined
//! definitions, value reconciliation, legacy imports, eager loading and
//! snapshot logging.

pub mod attributable;
pub mod eager;
pub mod error;
pub mod import;
pub mod store;
pub mod wire;

pub use attributable::AttributableRecord;
pub use error::AttributeError;
pub use import::{ImportRequest, LegacyImporter};
pub use store::{cascade_delete, load_record, log_json, DefinitionStore, ValueStore};
pub use wire::{ValueInput, WireValue};
