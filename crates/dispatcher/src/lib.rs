//! 到期扫描
//!
//! [`DueItemScanner`] 每个周期查询一次到期用户并逐个投递到分发队列，
//! [`DispatcherService`] 按固定间隔驱动扫描直到收到关闭信号。

pub mod scanner;
pub mod service;

pub use scanner::{DueItemScanner, ScanReport};
pub use service::DispatcherService;
