//! 用户管理服务
//!
//! 负责用户的增删改查。新建用户和修改生日或所在地时，
//! 通过 [`OccurrenceCalculator`] 计算下一次生日时刻。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    person::normalize_optional, BirthDate, CreatePersonRequest, Person, UpdatePersonRequest,
    NEVER_NOTIFIED,
};
use crate::occurrence::OccurrenceCalculator;
use crate::traits::PersonRepository;
use crate::{NotifierError, NotifierResult};

pub struct PersonService {
    repository: Arc<dyn PersonRepository>,
    calculator: OccurrenceCalculator,
}

impl PersonService {
    pub fn new(repository: Arc<dyn PersonRepository>, calculator: OccurrenceCalculator) -> Self {
        Self {
            repository,
            calculator,
        }
    }

    /// 创建用户，`reference` 为计算首个生日时刻的参考时间
    pub async fn create(
        &self,
        request: CreatePersonRequest,
        reference: DateTime<Utc>,
    ) -> NotifierResult<Person> {
        let (birthday, location) = request.validate()?;
        let next_occurrence_utc = self
            .calculator
            .next_occurrence_for(&birthday, &location, reference);

        let person = Person {
            id: Uuid::new_v4().to_string(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            birthday,
            location,
            next_occurrence_utc,
            last_notified_year: NEVER_NOTIFIED,
            created_at: reference,
            updated_at: reference,
        };

        let created = self.repository.create(&person).await?;
        info!(
            person_id = %created.id,
            next_occurrence = %created.next_occurrence_utc,
            "创建用户"
        );
        Ok(created)
    }

    pub async fn get(&self, id: &str) -> NotifierResult<Person> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| NotifierError::person_not_found(id))
    }

    /// 部分更新用户
    ///
    /// 生日或所在地变化时重新计算下一次生日时刻，`last_notified_year` 保持不变。
    pub async fn update(
        &self,
        id: &str,
        request: UpdatePersonRequest,
        reference: DateTime<Utc>,
    ) -> NotifierResult<Person> {
        request.validate()?;
        let mut person = self.get(id).await?;

        if let Some(first_name) = &request.first_name {
            person.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = &request.last_name {
            person.last_name = last_name.trim().to_string();
        }
        if let Some(birthday) = &request.birthday {
            person.birthday = BirthDate::parse(birthday.trim())?;
        }
        if let Some(city) = &request.city {
            person.location.city = city.trim().to_string();
        }
        if request.region.is_some() {
            person.location.region = normalize_optional(request.region.as_deref());
        }
        if let Some(country) = &request.country {
            person.location.country = country.trim().to_string();
        }

        if request.affects_occurrence() {
            person.next_occurrence_utc =
                self.calculator
                    .next_occurrence_for(&person.birthday, &person.location, reference);
            debug!(
                person_id = %person.id,
                next_occurrence = %person.next_occurrence_utc,
                "生日或所在地变更，重新计算下一次生日"
            );
        }
        person.updated_at = reference;

        self.repository.update(&person).await?;
        info!(person_id = %person.id, "更新用户");
        Ok(person)
    }

    /// 删除用户并返回被删除的记录
    pub async fn delete(&self, id: &str) -> NotifierResult<Person> {
        let person = self.get(id).await?;
        if !self.repository.delete(id).await? {
            return Err(NotifierError::person_not_found(id));
        }
        info!(person_id = %id, "删除用户");
        Ok(person)
    }
}
