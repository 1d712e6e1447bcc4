//! Current time and date questions

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDateTime};

use crate::Result;
use crate::context::ContextStore;

use super::Handler;

const TIME_KEYWORDS: &[&str] = &["几点", "时间", "现在"];
const DATE_KEYWORDS: &[&str] = &["日期", "几号", "星期", "今天"];
const WEEKDAYS: [&str; 7] = ["星期一", "星期二", "星期三", "星期四", "星期五", "星期六", "星期日"];

/// Answers "what time / what day is it"
#[derive(Debug, Default)]
pub struct TimeHandler;

impl TimeHandler {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Answer `input` as of `now`
    #[must_use]
    pub fn answer(input: &str, now: NaiveDateTime) -> Option<String> {
        let input = input.to_lowercase();
        let weekday = WEEKDAYS[now.weekday().num_days_from_monday() as usize];

        if contains_any(&input, TIME_KEYWORDS) {
            return Some(format!("现在是 {}", now.format("%H:%M")));
        }
        if input.contains("星期") {
            return Some(format!("今天是 {weekday}"));
        }
        if contains_any(&input, DATE_KEYWORDS) {
            return Some(format!("今天是 {}，{weekday}", now.format("%Y年%m月%d日")));
        }
        None
    }
}

fn contains_any(input: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| input.contains(k))
}

#[async_trait]
impl Handler for TimeHandler {
    fn name(&self) -> &str {
        "time"
    }

    fn description(&self) -> &str {
        "回答当前时间和日期"
    }

    fn accepts(&self, input: &str, _context: &ContextStore) -> Result<bool> {
        let input = input.to_lowercase();
        Ok(contains_any(&input, TIME_KEYWORDS) || contains_any(&input, DATE_KEYWORDS))
    }

    async fn respond(&self, input: &str, _context: &mut ContextStore) -> Result<Option<String>> {
        Ok(Self::answer(input, Local::now().naive_local()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn wednesday() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 8)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap()
    }

    #[test]
    fn test_time_question() {
        assert_eq!(
            TimeHandler::answer("现在几点了", wednesday()).as_deref(),
            Some("现在是 09:05")
        );
    }

    #[test]
    fn test_weekday_question() {
        assert_eq!(
            TimeHandler::answer("星期几", wednesday()).as_deref(),
            Some("今天是 星期三")
        );
    }

    #[test]
    fn test_date_question() {
        assert_eq!(
            TimeHandler::answer("今天几号", wednesday()).as_deref(),
            Some("今天是 2024年05月08日，星期三")
        );
    }

    #[test]
    fn test_time_keywords_take_precedence() {
        // "现在" is a time keyword even alongside "星期"
        assert_eq!(
            TimeHandler::answer("现在是星期几", wednesday()).as_deref(),
            Some("现在是 09:05")
        );
    }

    #[test]
    fn test_unrelated_input() {
        let ctx = ContextStore::with_limits(std::time::Duration::from_secs(1), 1);
        assert!(!TimeHandler::new().accepts("讲个笑话", &ctx).unwrap());
        assert!(TimeHandler::answer("讲个笑话", wednesday()).is_none());
    }
}
