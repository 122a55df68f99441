use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BirthDate, Location, Person};
use crate::{NotifierError, NotifierResult};

/// 分发通道上的消息信封
///
/// `body` 为序列化后的 [`WorkItem`]，通道本身不理解消息体内容。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    /// 已被重新投递的次数，首次投递为0
    pub retry_count: u32,
    pub correlation_id: Option<String>,
}

impl Message {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body: body.into(),
            timestamp: Utc::now(),
            retry_count: 0,
            correlation_id: None,
        }
    }

    /// 以用户快照构造待分发消息
    pub fn work_item(item: &WorkItem) -> NotifierResult<Self> {
        Ok(Self::new(item.to_body()?).with_correlation_id(item.person_id.clone()))
    }

    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    pub fn is_retry_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }

    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// 扫描时刻的用户快照
///
/// 快照可能已经过期，消费端只信任其中的 `person_id` 和被消费的生日时刻，
/// 其余状态以存储中的记录为准。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    #[serde(alias = "userId")]
    pub person_id: String,
    pub first_name: String,
    pub last_name: String,
    pub birthday: BirthDate,
    #[serde(flatten)]
    pub location: Location,
    pub next_occurrence_utc: DateTime<Utc>,
    pub last_notified_year: i32,
}

impl WorkItem {
    pub fn to_body(&self) -> NotifierResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 解析消息体，空消息体或缺少用户ID视为格式错误
    pub fn parse(body: &str) -> NotifierResult<Self> {
        if body.trim().is_empty() {
            return Err(NotifierError::Validation("消息体为空".to_string()));
        }
        let item: WorkItem = serde_json::from_str(body)?;
        if item.person_id.trim().is_empty() {
            return Err(NotifierError::Validation("消息缺少用户ID".to_string()));
        }
        Ok(item)
    }
}

impl From<&Person> for WorkItem {
    fn from(person: &Person) -> Self {
        Self {
            person_id: person.id.clone(),
            first_name: person.first_name.clone(),
            last_name: person.last_name.clone(),
            birthday: person.birthday,
            location: person.location.clone(),
            next_occurrence_utc: person.next_occurrence_utc,
            last_notified_year: person.last_notified_year,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_item() -> WorkItem {
        WorkItem {
            person_id: "4a4c4f1e-0000-4000-8000-000000000001".to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            birthday: BirthDate::parse("1990-05-15").unwrap(),
            location: Location::new("London", None, "UK"),
            next_occurrence_utc: Utc.with_ymd_and_hms(2024, 5, 15, 8, 0, 0).unwrap(),
            last_notified_year: 2023,
        }
    }

    #[test]
    fn test_work_item_message() {
        let item = sample_item();
        let message = Message::work_item(&item).unwrap();

        assert!(!message.id.is_empty());
        assert_eq!(message.retry_count, 0);
        assert_eq!(message.correlation_id.as_deref(), Some(item.person_id.as_str()));
        assert_eq!(WorkItem::parse(&message.body).unwrap(), item);
    }

    #[test]
    fn test_parse_rejects_empty_and_malformed() {
        assert!(matches!(WorkItem::parse(""), Err(NotifierError::Validation(_))));
        assert!(matches!(WorkItem::parse("   "), Err(NotifierError::Validation(_))));
        assert!(matches!(
            WorkItem::parse("{not json"),
            Err(NotifierError::Serialization(_))
        ));
        assert!(matches!(
            WorkItem::parse(r#"{"userId":"123","firstName":"John","lastName":"Doe","year":1990}"#),
            Err(NotifierError::Serialization(_))
        ));
    }

    #[test]
    fn test_parse_rejects_blank_person_id() {
        let mut item = sample_item();
        item.person_id = " ".to_string();
        let body = serde_json::to_string(&item).unwrap();
        assert!(matches!(WorkItem::parse(&body), Err(NotifierError::Validation(_))));
    }

    #[test]
    fn test_retry_exhaustion() {
        let mut message = Message::new("{}");
        assert!(!message.is_retry_exhausted(3));
        message.increment_retry();
        message.increment_retry();
        message.increment_retry();
        assert!(message.is_retry_exhausted(3));
    }
}
