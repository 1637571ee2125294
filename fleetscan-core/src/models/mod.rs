//! Records exchanged with the remote state store.
//!
//! Fields use the store's camelCase wire names and are optional wherever the
//! store allows them to be unset, so each record type can also be serialized
//! as a partial document for merge-patch updates.

pub mod asset;
pub mod asset_scan;
pub mod family;
pub mod finding;
pub mod ids;
pub mod scan;
pub mod scan_config;

pub use asset::*;
pub use asset_scan::*;
pub use family::*;
pub use finding::*;
pub use ids::*;
pub use scan::*;
pub use scan_config::*;
