//! 所在地到IANA时区的解析
//!
//! 所在地是未经校验的自由文本，解析必须是全函数：任何输入都返回一个确定的时区，
//! 无法识别时退化到UTC并输出警告日志。查找按以下顺序进行，先命中者生效：
//!
//! 1. 国家为美国的各种写法：先按州匹配，再按城市子串匹配，最后默认东部时区
//! 2. 城市名（大小写不敏感，完整匹配）
//! 3. 国家名（大小写不敏感，完整匹配）
//! 4. UTC

use chrono_tz::Tz;
use tracing::warn;

use crate::models::Location;

/// 无法识别所在地时使用的时区
pub const FALLBACK_TIMEZONE: &str = "UTC";

const US_DEFAULT_TIMEZONE: &str = "America/New_York";

const US_COUNTRY_NAMES: &[&str] = &[
    "usa",
    "us",
    "u.s.",
    "u.s.a.",
    "united states",
    "united states of america",
];

const US_STATE_TIMEZONES: &[(&str, &str)] = &[
    ("new york", "America/New_York"),
    ("california", "America/Los_Angeles"),
    ("texas", "America/Chicago"),
    ("florida", "America/New_York"),
    ("illinois", "America/Chicago"),
    ("washington", "America/Los_Angeles"),
    ("colorado", "America/Denver"),
    ("arizona", "America/Phoenix"),
    ("hawaii", "Pacific/Honolulu"),
    ("alaska", "America/Anchorage"),
];

/// 按子串匹配，顺序即优先级
const US_CITY_TIMEZONES: &[(&str, &str)] = &[
    ("new york", "America/New_York"),
    ("los angeles", "America/Los_Angeles"),
    ("chicago", "America/Chicago"),
    ("houston", "America/Chicago"),
    ("phoenix", "America/Phoenix"),
    ("denver", "America/Denver"),
    ("seattle", "America/Los_Angeles"),
];

const CITY_TIMEZONES: &[(&str, &str)] = &[
    ("london", "Europe/London"),
    ("paris", "Europe/Paris"),
    ("berlin", "Europe/Berlin"),
    ("tokyo", "Asia/Tokyo"),
    ("sydney", "Australia/Sydney"),
    ("singapore", "Asia/Singapore"),
    ("dubai", "Asia/Dubai"),
    ("mumbai", "Asia/Kolkata"),
    ("hong kong", "Asia/Hong_Kong"),
    ("toronto", "America/Toronto"),
    ("vancouver", "America/Vancouver"),
    ("mexico city", "America/Mexico_City"),
    ("sao paulo", "America/Sao_Paulo"),
    ("buenos aires", "America/Argentina/Buenos_Aires"),
];

const COUNTRY_TIMEZONES: &[(&str, &str)] = &[
    ("uk", "Europe/London"),
    ("united kingdom", "Europe/London"),
    ("france", "Europe/Paris"),
    ("germany", "Europe/Berlin"),
    ("japan", "Asia/Tokyo"),
    ("australia", "Australia/Sydney"),
    ("singapore", "Asia/Singapore"),
    ("india", "Asia/Kolkata"),
    ("china", "Asia/Shanghai"),
    ("canada", "America/Toronto"),
    ("mexico", "America/Mexico_City"),
    ("brazil", "America/Sao_Paulo"),
    ("philippines", "Asia/Manila"),
];

/// 时区解析器，无状态
#[derive(Debug, Clone, Copy, Default)]
pub struct TimezoneResolver;

impl TimezoneResolver {
    pub fn new() -> Self {
        Self
    }

    /// 解析所在地对应的IANA时区标识
    pub fn resolve(&self, city: &str, region: Option<&str>, country: &str) -> &'static str {
        let city_lower = city.trim().to_lowercase();
        let region_lower = region.map(|r| r.trim().to_lowercase()).unwrap_or_default();
        let country_lower = country.trim().to_lowercase();

        if US_COUNTRY_NAMES.contains(&country_lower.as_str()) {
            if !region_lower.is_empty() {
                if let Some(tz) = lookup_exact(US_STATE_TIMEZONES, &region_lower) {
                    return tz;
                }
            }
            return US_CITY_TIMEZONES
                .iter()
                .find(|(name, _)| city_lower.contains(name))
                .map(|(_, tz)| *tz)
                .unwrap_or(US_DEFAULT_TIMEZONE);
        }

        if let Some(tz) = lookup_exact(CITY_TIMEZONES, &city_lower) {
            return tz;
        }

        if let Some(tz) = lookup_exact(COUNTRY_TIMEZONES, &country_lower) {
            return tz;
        }

        warn!(
            city = city,
            region = region.unwrap_or(""),
            country = country,
            "无法识别所在地的时区，使用UTC"
        );
        FALLBACK_TIMEZONE
    }

    pub fn resolve_location(&self, location: &Location) -> &'static str {
        self.resolve(&location.city, location.region.as_deref(), &location.country)
    }

    /// 解析为 `chrono_tz::Tz`，表中标识均为合法IANA名称
    pub fn resolve_tz(&self, location: &Location) -> Tz {
        self.resolve_location(location).parse().unwrap_or(Tz::UTC)
    }
}

fn lookup_exact(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, tz)| *tz)
}
