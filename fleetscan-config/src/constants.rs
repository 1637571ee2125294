pub const ENV_CONFIG_PATH: &str = "FLEETSCAN_CONFIG_PATH";
pub const ENV_CONFIG_JSON: &str = "FLEETSCAN_CONFIG_JSON";
pub const ENV_BACKEND_ADDRESS: &str = "FLEETSCAN_BACKEND_ADDRESS";
pub const ENV_LOG: &str = "FLEETSCAN_LOG";

/// Searched in order, relative to the working directory.
pub const DEFAULT_CONFIG_LOCATIONS: [&str; 3] =
    ["fleetscan.toml", "fleetscan.json", "config/fleetscan.toml"];

pub const DEFAULT_BACKEND_ADDRESS: &str = "http://localhost:8888/api";
pub const DEFAULT_LOG_FILTER: &str = "info";
