use async_trait::async_trait;
use birthday_core::models::{BirthDate, Location, Person, REMINDER_PARTITION};
use birthday_core::traits::PersonRepository;
use birthday_core::{NotifierError, NotifierResult};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument, warn};

const PERSON_COLUMNS: &str = "id, first_name, last_name, birthday, city, region, country, \
     next_occurrence_ms, last_notified_year, created_at, updated_at";

/// SQLite用户存储
///
/// `next_occurrence_ms` 以毫秒时间戳保存，配合 `(reminder_partition, next_occurrence_ms)`
/// 索引完成扫描器的范围查询。
pub struct SqlitePersonRepository {
    pool: SqlitePool,
}

impl SqlitePersonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 运行数据库迁移
    pub async fn run_migrations(pool: &SqlitePool) -> NotifierResult<()> {
        debug!("Running SQLite database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS persons (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                birthday TEXT NOT NULL,
                city TEXT NOT NULL,
                region TEXT,
                country TEXT NOT NULL,
                reminder_partition TEXT NOT NULL DEFAULT 'BIRTHDAY_REMINDER',
                next_occurrence_ms INTEGER NOT NULL,
                last_notified_year INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_persons_reminder \
             ON persons(reminder_partition, next_occurrence_ms)",
        )
        .execute(pool)
        .await?;

        debug!("Successfully completed SQLite database migrations");
        Ok(())
    }

    fn row_to_person(row: &SqliteRow) -> NotifierResult<Person> {
        let birthday: String = row.try_get("birthday")?;
        let next_occurrence_ms: i64 = row.try_get("next_occurrence_ms")?;
        let next_occurrence_utc = DateTime::from_timestamp_millis(next_occurrence_ms).ok_or_else(
            || NotifierError::Internal(format!("无效的生日时间戳: {next_occurrence_ms}")),
        )?;

        Ok(Person {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            birthday: BirthDate::parse(&birthday)?,
            location: Location {
                city: row.try_get("city")?,
                region: row.try_get("region")?,
                country: row.try_get("country")?,
            },
            next_occurrence_utc,
            last_notified_year: row.try_get("last_notified_year")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl PersonRepository for SqlitePersonRepository {
    #[instrument(skip(self, person), fields(person_id = %person.id))]
    async fn create(&self, person: &Person) -> NotifierResult<Person> {
        sqlx::query(
            r#"
            INSERT INTO persons (id, first_name, last_name, birthday, city, region, country,
                                 reminder_partition, next_occurrence_ms, last_notified_year,
                                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&person.id)
        .bind(&person.first_name)
        .bind(&person.last_name)
        .bind(person.birthday.to_string())
        .bind(&person.location.city)
        .bind(&person.location.region)
        .bind(&person.location.country)
        .bind(REMINDER_PARTITION)
        .bind(person.next_occurrence_utc.timestamp_millis())
        .bind(person.last_notified_year)
        .bind(person.created_at)
        .bind(person.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE constraint failed") => {
                NotifierError::Validation(format!("用户ID已存在: {}", person.id))
            }
            other => NotifierError::Database(other),
        })?;

        debug!("创建用户记录: {}", person.id);
        Ok(person.clone())
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: &str) -> NotifierResult<Option<Person>> {
        let sql = format!("SELECT {PERSON_COLUMNS} FROM persons WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_person).transpose()
    }

    #[instrument(skip(self, person), fields(person_id = %person.id))]
    async fn update(&self, person: &Person) -> NotifierResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE persons
            SET first_name = $1, last_name = $2, birthday = $3, city = $4, region = $5,
                country = $6, next_occurrence_ms = $7, last_notified_year = $8, updated_at = $9
            WHERE id = $10
            "#,
        )
        .bind(&person.first_name)
        .bind(&person.last_name)
        .bind(person.birthday.to_string())
        .bind(&person.location.city)
        .bind(&person.location.region)
        .bind(&person.location.country)
        .bind(person.next_occurrence_utc.timestamp_millis())
        .bind(person.last_notified_year)
        .bind(person.updated_at)
        .bind(&person.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotifierError::person_not_found(&person.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> NotifierResult<bool> {
        let result = sqlx::query("DELETE FROM persons WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn find_due(&self, threshold: DateTime<Utc>) -> NotifierResult<Vec<Person>> {
        let sql = format!(
            "SELECT {PERSON_COLUMNS} FROM persons \
             WHERE reminder_partition = $1 AND next_occurrence_ms <= $2 \
             ORDER BY next_occurrence_ms ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(REMINDER_PARTITION)
            .bind(threshold.timestamp_millis())
            .fetch_all(&self.pool)
            .await?;

        debug!("范围查询返回 {} 条记录", rows.len());
        // 单条损坏的记录只跳过自身，不影响其他用户的扫描
        let persons = rows
            .iter()
            .filter_map(|row| match Self::row_to_person(row) {
                Ok(person) => Some(person),
                Err(e) => {
                    let id: String = row.try_get("id").unwrap_or_default();
                    warn!("跳过无法解析的用户记录 {}: {}", id, e);
                    None
                }
            })
            .collect();
        Ok(persons)
    }

    #[instrument(skip(self))]
    async fn mark_notified(
        &self,
        id: &str,
        year: i32,
        next_occurrence_utc: DateTime<Utc>,
    ) -> NotifierResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE persons
            SET last_notified_year = MAX(last_notified_year, $1),
                next_occurrence_ms = $2,
                updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(year)
        .bind(next_occurrence_utc.timestamp_millis())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotifierError::person_not_found(id));
        }
        Ok(())
    }
}
