//! Device monitoring: enumeration, change detection and the monitor thread

pub mod monitor;

pub use monitor::{
    count_discrepancies, enumerate_with_retry, DeviceMonitor, MonitorThread, ENUMERATION_ATTEMPTS,
};
