pub mod orders_monitor;
pub mod wallet;

pub use orders_monitor::{OrdersMonitor, OrdersMonitorConfig, OrdersMonitorHandle};
pub use wallet::Wallet;
