use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::occurrence::current_year;
use crate::{NotifierError, NotifierResult};

/// 范围索引的分区键，所有用户共享同一分区以便按生日时间做范围查询
pub const REMINDER_PARTITION: &str = "BIRTHDAY_REMINDER";

/// 从未发送过通知时 `last_notified_year` 的取值
pub const NEVER_NOTIFIED: i32 = 0;

/// 出生日期，固定 `YYYY-MM-DD` 格式
///
/// 出生年份只做记录，生日计算只使用月和日。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BirthDate {
    year: i32,
    month: u32,
    day: u32,
}

impl BirthDate {
    pub fn new(year: i32, month: u32, day: u32) -> NotifierResult<Self> {
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(NotifierError::Validation(format!(
                "无效的出生日期: {year:04}-{month:02}-{day:02}"
            )));
        }
        Ok(Self { year, month, day })
    }

    /// 严格解析 `YYYY-MM-DD`，并校验是否为真实存在的日期
    pub fn parse(value: &str) -> NotifierResult<Self> {
        let bytes = value.as_bytes();
        let shape_ok = bytes.len() == 10
            && bytes[4] == b'-'
            && bytes[7] == b'-'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
        if !shape_ok {
            return Err(NotifierError::Validation(format!(
                "生日格式必须为 YYYY-MM-DD: {value}"
            )));
        }

        let parse_part = |range: std::ops::Range<usize>| -> NotifierResult<u32> {
            value[range]
                .parse::<u32>()
                .map_err(|e| NotifierError::Validation(format!("生日解析失败: {value} ({e})")))
        };
        let year = parse_part(0..4)? as i32;
        let month = parse_part(5..7)?;
        let day = parse_part(8..10)?;

        Self::new(year, month, day)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// 是否为2月29日
    pub fn is_leap_day(&self) -> bool {
        self.month == 2 && self.day == 29
    }
}

impl fmt::Display for BirthDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for BirthDate {
    type Err = NotifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BirthDate {
    type Error = NotifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BirthDate> for String {
    fn from(value: BirthDate) -> Self {
        value.to_string()
    }
}

/// 用户所在地，自由文本，仅用于时区解析
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    #[serde(default, alias = "state", skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub country: String,
}

impl Location {
    pub fn new(city: impl Into<String>, region: Option<&str>, country: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            region: region.map(str::to_string),
            country: country.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}, {}, {}", self.city, region, self.country),
            None => write!(f, "{}, {}", self.city, self.country),
        }
    }
}

/// 用户记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(rename = "personId", alias = "userId")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub birthday: BirthDate,
    #[serde(flatten)]
    pub location: Location,
    /// 下一次本地时间9点生日对应的UTC时刻
    pub next_occurrence_utc: DateTime<Utc>,
    /// 最近一次成功通知的年份，0表示从未通知
    pub last_notified_year: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    /// 判断用户在参考时刻是否到期
    ///
    /// 两个条件缺一不可：生日时刻已到（含缓冲窗口），且本年度尚未通知。
    pub fn is_due(&self, reference: DateTime<Utc>, buffer: Duration) -> bool {
        self.next_occurrence_utc <= reference + buffer
            && self.last_notified_year < current_year(reference)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// 推送给webhook的生日祝福文本
    pub fn birthday_message(&self) -> String {
        format!("Hey, {} it's your birthday", self.full_name())
    }

    /// 提交一次成功通知后的状态转换
    pub fn mark_notified(&mut self, year: i32, next_occurrence_utc: DateTime<Utc>, now: DateTime<Utc>) {
        self.last_notified_year = self.last_notified_year.max(year);
        self.next_occurrence_utc = next_occurrence_utc;
        self.updated_at = now;
    }
}

/// 创建用户请求
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePersonRequest {
    pub first_name: String,
    pub last_name: String,
    pub birthday: String,
    pub city: String,
    #[serde(default, alias = "state")]
    pub region: Option<String>,
    pub country: String,
}

impl CreatePersonRequest {
    /// 校验请求并返回解析后的生日与所在地
    pub fn validate(&self) -> NotifierResult<(BirthDate, Location)> {
        require_non_empty(&self.first_name, "firstName")?;
        require_non_empty(&self.last_name, "lastName")?;
        require_non_empty(&self.city, "city")?;
        require_non_empty(&self.country, "country")?;
        let birthday = BirthDate::parse(self.birthday.trim())?;
        let location = Location {
            city: self.city.trim().to_string(),
            region: normalize_optional(self.region.as_deref()),
            country: self.country.trim().to_string(),
        };
        Ok((birthday, location))
    }
}

/// 更新用户请求，所有字段可选
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePersonRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birthday: Option<String>,
    pub city: Option<String>,
    #[serde(default, alias = "state")]
    pub region: Option<String>,
    pub country: Option<String>,
}

impl UpdatePersonRequest {
    /// 生日或所在地是否发生变化，变化时需要重新计算下一次生日
    pub fn affects_occurrence(&self) -> bool {
        self.birthday.is_some() || self.city.is_some() || self.region.is_some() || self.country.is_some()
    }

    pub fn validate(&self) -> NotifierResult<()> {
        let fields = [
            (&self.first_name, "firstName"),
            (&self.last_name, "lastName"),
            (&self.city, "city"),
            (&self.country, "country"),
        ];
        for (value, field) in fields {
            if let Some(value) = value {
                require_non_empty(value, field)?;
            }
        }
        if let Some(birthday) = &self.birthday {
            BirthDate::parse(birthday.trim())?;
        }
        Ok(())
    }
}

fn require_non_empty(value: &str, field: &str) -> NotifierResult<()> {
    if value.trim().is_empty() {
        return Err(NotifierError::Validation(format!("{field} 不能为空")));
    }
    Ok(())
}

pub(crate) fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_person(next: DateTime<Utc>, last_notified_year: i32) -> Person {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Person {
            id: "p-1".to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            birthday: BirthDate::parse("1990-06-01").unwrap(),
            location: Location::new("New York", Some("New York"), "USA"),
            next_occurrence_utc: next,
            last_notified_year,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_birth_date_parse() {
        let date = BirthDate::parse("1990-12-25").unwrap();
        assert_eq!(date.year(), 1990);
        assert_eq!(date.month(), 12);
        assert_eq!(date.day(), 25);
        assert_eq!(date.to_string(), "1990-12-25");
    }

    #[test]
    fn test_birth_date_rejects_bad_shape() {
        assert!(BirthDate::parse("1990-1-25").is_err());
        assert!(BirthDate::parse("25-12-1990").is_err());
        assert!(BirthDate::parse("1990/12/25").is_err());
        assert!(BirthDate::parse("").is_err());
    }

    #[test]
    fn test_birth_date_rejects_impossible_dates() {
        assert!(BirthDate::parse("1990-02-30").is_err());
        assert!(BirthDate::parse("1990-13-01").is_err());
        assert!(BirthDate::parse("1991-02-29").is_err());
        assert!(BirthDate::parse("1992-02-29").unwrap().is_leap_day());
    }

    #[test]
    fn test_is_due_requires_both_conditions() {
        let next = Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap();
        let reference = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let buffer = Duration::seconds(60);

        assert!(sample_person(next, 2023).is_due(reference, buffer));
        assert!(!sample_person(next, 2024).is_due(reference, buffer));

        let future = Utc.with_ymd_and_hms(2024, 12, 1, 14, 0, 0).unwrap();
        assert!(!sample_person(future, 2023).is_due(reference, buffer));
    }

    #[test]
    fn test_is_due_within_buffer() {
        let reference = Utc.with_ymd_and_hms(2024, 6, 1, 13, 59, 30).unwrap();
        let next = Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap();
        let person = sample_person(next, 0);
        assert!(person.is_due(reference, Duration::seconds(60)));
        assert!(!person.is_due(reference, Duration::seconds(10)));
    }

    #[test]
    fn test_birthday_message() {
        let person = sample_person(Utc::now(), 0);
        assert_eq!(person.birthday_message(), "Hey, John Doe it's your birthday");
    }

    #[test]
    fn test_person_json_shape() {
        let next = Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap();
        let person = sample_person(next, 0);
        let json = serde_json::to_value(&person).unwrap();
        assert_eq!(json["personId"], "p-1");
        assert_eq!(json["birthday"], "1990-06-01");
        assert_eq!(json["city"], "New York");
        assert_eq!(json["region"], "New York");
        assert_eq!(json["lastNotifiedYear"], 0);
    }

    #[test]
    fn test_create_request_accepts_state_alias() {
        let request: CreatePersonRequest = serde_json::from_str(
            r#"{"firstName":"Ann","lastName":"Lee","birthday":"1985-03-15","city":"Los Angeles","state":"California","country":"USA"}"#,
        )
        .unwrap();
        let (birthday, location) = request.validate().unwrap();
        assert_eq!(birthday.month(), 3);
        assert_eq!(location.region.as_deref(), Some("California"));
    }

    #[test]
    fn test_create_request_validation_errors() {
        let request = CreatePersonRequest {
            first_name: " ".to_string(),
            last_name: "Lee".to_string(),
            birthday: "1985-03-15".to_string(),
            city: "Paris".to_string(),
            region: None,
            country: "France".to_string(),
        };
        assert!(matches!(request.validate(), Err(NotifierError::Validation(_))));
    }

    #[test]
    fn test_update_request_affects_occurrence() {
        let request = UpdatePersonRequest {
            first_name: Some("New".to_string()),
            ..Default::default()
        };
        assert!(!request.affects_occurrence());

        let request = UpdatePersonRequest {
            city: Some("Tokyo".to_string()),
            ..Default::default()
        };
        assert!(request.affects_occurrence());
    }
}
