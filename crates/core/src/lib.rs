//! 生日提醒系统核心
//!
//! 包含数据模型、错误类型、各外部协作方的trait接口、时区解析、
//! 下一次生日计算以及用户管理服务。

pub mod clock;
pub mod config;
pub mod errors;
pub mod models;
pub mod occurrence;
pub mod services;
pub mod timezone;
pub mod traits;

pub use clock::{Clock, FixedClock, SystemClock};
pub use errors::*;
pub use models::{
    BirthDate, CreatePersonRequest, Location, Message, Person, UpdatePersonRequest, WorkItem,
};
pub use occurrence::{current_year, LeapDayPolicy, OccurrenceCalculator};
pub use services::PersonService;
pub use timezone::TimezoneResolver;
pub use traits::{IdempotencyStore, MessageQueue, NotificationSink, PersonRepository};
