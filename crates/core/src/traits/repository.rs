//! 用户存储接口
//!
//! 存储需要支持按主键读写，以及按生日时刻做升序范围查询（扫描器使用）。
//! 单条记录的更新必须是原子的。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{models::Person, NotifierResult};

#[async_trait]
pub trait PersonRepository: Send + Sync {
    /// 新建用户记录
    async fn create(&self, person: &Person) -> NotifierResult<Person>;

    /// 按ID查询，不存在时返回 `None`
    async fn get_by_id(&self, id: &str) -> NotifierResult<Option<Person>>;

    /// 整条替换用户记录
    async fn update(&self, person: &Person) -> NotifierResult<()>;

    /// 删除用户，返回是否确实删除了记录
    async fn delete(&self, id: &str) -> NotifierResult<bool>;

    /// 查询 `next_occurrence_utc <= threshold` 的用户，按生日时刻升序
    async fn find_due(&self, threshold: DateTime<Utc>) -> NotifierResult<Vec<Person>>;

    /// 原子提交一次成功通知
    ///
    /// 将 `last_notified_year` 推进到 `year`（不回退）并写入新的下一次生日时刻。
    /// 记录不存在时返回 `PersonNotFound`。
    async fn mark_notified(
        &self,
        id: &str,
        year: i32,
        next_occurrence_utc: DateTime<Utc>,
    ) -> NotifierResult<()>;
}
