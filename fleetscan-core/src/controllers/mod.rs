//! Controllers built on the generic orchestration engine.

pub mod asset_scan_processor;
pub mod scan_config_watcher;
pub mod scan_watcher;

pub use asset_scan_processor::{AssetScanProcessor, AssetScanReconcileEvent};
pub use scan_config_watcher::{
    ScanConfigReconcileEvent, ScanConfigWatcher, has_running_or_completed_scan,
};
pub use scan_watcher::{ScanReconcileEvent, ScanWatcher};
