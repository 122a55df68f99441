//! 下一次生日时刻的计算
//!
//! 生日提醒固定在用户本地时间上午9点发送。给定出生日期、时区和参考时刻，
//! 计算严格晚于参考时刻的最近一次本地9点生日，并换算为UTC。

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::models::{BirthDate, Location};
use crate::timezone::TimezoneResolver;

/// 本地通知时刻（小时）
pub const NOTIFY_HOUR: u32 = 9;

const NOTIFY_TIME: NaiveTime = match NaiveTime::from_hms_opt(NOTIFY_HOUR, 0, 0) {
    Some(time) => time,
    None => panic!("NOTIFY_HOUR 必须是合法的小时"),
};

/// 本地时间落入夏令时跳变区间时，向后试探的步长与次数
const GAP_STEP_MINUTES: i64 = 15;
const GAP_MAX_STEPS: i64 = 12;

/// 2月29日出生的用户在平年的替代日期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeapDayPolicy {
    /// 平年取2月28日，保证提醒仍在出生月份内
    #[default]
    Feb28,
    /// 平年取3月1日
    Mar1,
}

/// 参考时钟下的当前年份
///
/// "本年度是否已通知"的判断和状态提交都必须使用同一个参考时刻得到的年份。
pub fn current_year(reference: DateTime<Utc>) -> i32 {
    reference.year()
}

#[derive(Debug, Clone, Default)]
pub struct OccurrenceCalculator {
    resolver: TimezoneResolver,
    leap_day_policy: LeapDayPolicy,
}

impl OccurrenceCalculator {
    pub fn new(leap_day_policy: LeapDayPolicy) -> Self {
        Self {
            resolver: TimezoneResolver::new(),
            leap_day_policy,
        }
    }

    pub fn leap_day_policy(&self) -> LeapDayPolicy {
        self.leap_day_policy
    }

    pub fn resolver(&self) -> &TimezoneResolver {
        &self.resolver
    }

    /// 计算下一次本地9点生日对应的UTC时刻
    ///
    /// 候选年份取参考时刻在该时区下的年份；候选时刻不晚于参考时刻时顺延一年。
    pub fn next_occurrence(
        &self,
        birthday: &BirthDate,
        timezone: Tz,
        reference: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let reference_local = reference.with_timezone(&timezone);
        let year = reference_local.year();

        let mut candidate = self.local_occurrence(birthday, timezone, year);
        if candidate <= reference_local {
            candidate = self.local_occurrence(birthday, timezone, year + 1);
        }

        candidate.with_timezone(&Utc)
    }

    /// 先解析所在地时区，再计算下一次生日
    pub fn next_occurrence_for(
        &self,
        birthday: &BirthDate,
        location: &Location,
        reference: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let timezone = self.resolver.resolve_tz(location);
        self.next_occurrence(birthday, timezone, reference)
    }

    /// 指定年份的本地9点生日
    pub fn local_occurrence(&self, birthday: &BirthDate, timezone: Tz, year: i32) -> DateTime<Tz> {
        let date = self.birthday_in_year(birthday, year);
        let naive = date.and_time(NOTIFY_TIME);
        resolve_local(timezone, naive)
    }

    fn birthday_in_year(&self, birthday: &BirthDate, year: i32) -> NaiveDate {
        if let Some(date) = NaiveDate::from_ymd_opt(year, birthday.month(), birthday.day()) {
            return date;
        }
        // 只有2月29日会在平年落空
        let (month, day) = match self.leap_day_policy {
            LeapDayPolicy::Feb28 => (2, 28),
            LeapDayPolicy::Mar1 => (3, 1),
        };
        NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
    }
}

/// 本地时间转换为带时区时刻
///
/// 重复的本地时间取较早的一个；不存在的本地时间（夏令时跳变）取跳变后的第一个合法时刻。
fn resolve_local(timezone: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => (1..=GAP_MAX_STEPS)
            .map(|step| naive + Duration::minutes(step * GAP_STEP_MINUTES))
            .find_map(|shifted| timezone.from_local_datetime(&shifted).earliest())
            .unwrap_or_else(|| timezone.from_utc_datetime(&naive)),
    }
}
