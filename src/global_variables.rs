// Persisted log locations
pub const DEFAULT_CSV_LOG_FILE: &str = "logs/traffic_data.csv";
pub const DEFAULT_CONFIG_FILE: &str = "config/intersection.json";

// Event types written to the CSV log
pub const EVENT_SIGNAL_CHANGE: &str = "SIGNAL_CHANGE";
pub const EVENT_VEHICLE_COUNT: &str = "VEHICLE_COUNT";
pub const EVENT_EMERGENCY: &str = "EMERGENCY";
pub const EVENT_SYSTEM: &str = "SYSTEM";

// License plate alphabet
pub const LICENSE_PLATE_STATES: [&str; 10] = ["UP", "DL", "MH", "KA", "TN", "HR", "RJ", "GJ", "MP", "WB"];
pub const LICENSE_PLATE_LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// Number of transition events kept by the controller
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;
