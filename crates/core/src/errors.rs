use thiserror::Error;

/// 通知服务错误类型定义
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("用户未找到: {id}")]
    PersonNotFound { id: String },

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("缓存错误: {0}")]
    Cache(String),

    #[error("通知发送失败: {0}")]
    Notification(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl NotifierError {
    /// 是否属于可通过消息重投递恢复的瞬时错误
    ///
    /// 不可重试的错误（记录缺失、输入非法）重投递也无法成功，应确认后丢弃。
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifierError::Database(_)
            | NotifierError::MessageQueue(_)
            | NotifierError::Cache(_)
            | NotifierError::Notification(_)
            | NotifierError::Internal(_) => true,
            NotifierError::PersonNotFound { .. }
            | NotifierError::Validation(_)
            | NotifierError::Serialization(_)
            | NotifierError::Configuration(_) => false,
        }
    }

    /// 用于日志和指标的错误分类
    pub fn category(&self) -> &'static str {
        match self {
            NotifierError::Database(_) => "database",
            NotifierError::PersonNotFound { .. } => "not_found",
            NotifierError::Validation(_) => "validation",
            NotifierError::MessageQueue(_) => "message_queue",
            NotifierError::Cache(_) => "cache",
            NotifierError::Notification(_) => "notification",
            NotifierError::Serialization(_) => "serialization",
            NotifierError::Configuration(_) => "configuration",
            NotifierError::Internal(_) => "internal",
        }
    }

    pub fn person_not_found(id: impl Into<String>) -> Self {
        NotifierError::PersonNotFound { id: id.into() }
    }
}

impl From<serde_json::Error> for NotifierError {
    fn from(err: serde_json::Error) -> Self {
        NotifierError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type NotifierResult<T> = std::result::Result<T, NotifierError>;
