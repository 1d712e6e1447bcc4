//! Bounded turn log

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::ContextConfig;

/// One exchange with the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    input: String,
    response: Option<String>,
    created_at: DateTime<Utc>,
}

impl Turn {
    /// What the user said
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// What the assistant answered, if anything yet
    #[must_use]
    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    /// When the turn was recorded
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn age_at(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.created_at
    }
}

/// Time- and size-bounded conversation memory
#[derive(Debug, Clone)]
pub struct ContextStore {
    turns: VecDeque<Turn>,
    timeout: TimeDelta,
    max_turns: usize,
}

impl ContextStore {
    /// Create an empty store with the configured bounds
    #[must_use]
    pub fn new(config: &ContextConfig) -> Self {
        Self::with_limits(config.timeout, config.max_turns)
    }

    /// Create an empty store from raw bounds
    #[must_use]
    pub fn with_limits(timeout: Duration, max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns.saturating_add(1)),
            timeout: TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX),
            max_turns,
        }
    }

    /// Record a turn now
    pub fn append(&mut self, input: impl Into<String>, response: Option<String>) {
        self.append_at(input, response, Utc::now());
    }

    /// Record a turn at `now`
    ///
    /// A clock that stepped backwards is clamped to the newest stored turn so
    /// timestamps never decrease.
    pub fn append_at(
        &mut self,
        input: impl Into<String>,
        response: Option<String>,
        now: DateTime<Utc>,
    ) {
        let created_at = self
            .turns
            .back()
            .map_or(now, |last| now.max(last.created_at));

        self.turns.push_back(Turn {
            input: input.into(),
            response,
            created_at,
        });

        while self.turns.len() > self.max_turns {
            if let Some(evicted) = self.turns.pop_front() {
                tracing::trace!(input = %evicted.input, "evicted oldest turn");
            }
        }
    }

    /// Fill in the response of the newest turn if it has none
    ///
    /// Returns `false` when there is no turn or it already has a response.
    pub fn fill_last_response(&mut self, text: impl Into<String>) -> bool {
        match self.turns.back_mut() {
            Some(turn) if turn.response.is_none() => {
                turn.response = Some(text.into());
                true
            }
            _ => false,
        }
    }

    /// Unexpired turns, oldest first, at most the last `limit` of them
    #[must_use]
    pub fn active_turns(&self, limit: Option<usize>) -> Vec<&Turn> {
        self.active_turns_at(limit, Utc::now())
    }

    /// Unexpired turns as seen at `now`
    #[must_use]
    pub fn active_turns_at(&self, limit: Option<usize>, now: DateTime<Utc>) -> Vec<&Turn> {
        let active: Vec<&Turn> = self
            .turns
            .iter()
            .filter(|t| !self.is_expired(t, now))
            .collect();

        match limit {
            Some(n) if n < active.len() => active[active.len() - n..].to_vec(),
            _ => active,
        }
    }

    /// Active turns as prompt text
    #[must_use]
    pub fn render_text(&self) -> String {
        self.render_text_at(Utc::now())
    }

    /// Active turns at `now` as prompt text
    #[must_use]
    pub fn render_text_at(&self, now: DateTime<Utc>) -> String {
        let mut text = String::new();
        for turn in self.active_turns_at(None, now) {
            let _ = writeln!(text, "用户: {}", turn.input);
            if let Some(response) = &turn.response {
                let _ = writeln!(text, "助手: {response}");
            }
        }
        text
    }

    /// Drop expired turns; returns whether the store is now empty
    pub fn purge_expired(&mut self) -> bool {
        self.purge_expired_at(Utc::now())
    }

    /// Drop turns expired at `now`
    pub fn purge_expired_at(&mut self, now: DateTime<Utc>) -> bool {
        let before = self.turns.len();
        // Timestamps are non-decreasing, so expired turns form a prefix
        while self.turns.front().is_some_and(|t| self.is_expired(t, now)) {
            self.turns.pop_front();
        }

        let purged = before - self.turns.len();
        if purged > 0 {
            tracing::debug!(purged, "expired conversation turns");
        }
        self.turns.is_empty()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Number of stored turns, expired or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Stored turns in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    fn is_expired(&self, turn: &Turn, now: DateTime<Utc>) -> bool {
        turn.age_at(now) >= self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ContextStore {
        ContextStore::with_limits(Duration::from_secs(120), 10)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_age_boundary() {
        let mut ctx = store();
        ctx.append_at("old", Some("a".to_string()), at(0));
        ctx.append_at("recent", Some("b".to_string()), at(30));

        // 130s after the first turn, 100s after the second
        let active = ctx.active_turns_at(None, at(130));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].input(), "recent");

        // Exactly at the timeout counts as expired
        assert!(ctx.active_turns_at(None, at(150)).is_empty());
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let mut ctx = store();
        for i in 0..11 {
            ctx.append_at(format!("q{i}"), None, at(i));
        }

        assert_eq!(ctx.len(), 10);
        assert_eq!(ctx.iter().next().unwrap().input(), "q1");
        assert_eq!(ctx.iter().last().unwrap().input(), "q10");
    }

    #[test]
    fn test_active_turns_limit() {
        let mut ctx = store();
        for i in 0..5 {
            ctx.append_at(format!("q{i}"), None, at(i));
        }

        let inputs: Vec<&str> = ctx
            .active_turns_at(Some(2), at(10))
            .iter()
            .map(|t| t.input())
            .collect();
        assert_eq!(inputs, ["q3", "q4"]);
        assert_eq!(ctx.active_turns_at(Some(50), at(10)).len(), 5);
    }

    #[test]
    fn test_clock_step_back_is_clamped() {
        let mut ctx = store();
        ctx.append_at("first", None, at(100));
        ctx.append_at("second", None, at(50));

        let stamps: Vec<_> = ctx.iter().map(Turn::created_at).collect();
        assert_eq!(stamps, [at(100), at(100)]);
    }

    #[test]
    fn test_render_text() {
        let mut ctx = store();
        ctx.append_at("你好", Some("你好呀".to_string()), at(0));
        ctx.append_at("几点了", None, at(1));

        assert_eq!(ctx.render_text_at(at(2)), "用户: 你好\n助手: 你好呀\n用户: 几点了\n");
        assert_eq!(ctx.render_text_at(at(500)), "");
    }

    #[test]
    fn test_purge_expired() {
        let mut ctx = store();
        ctx.append_at("a", None, at(0));
        ctx.append_at("b", None, at(100));

        assert!(!ctx.purge_expired_at(at(150)));
        assert_eq!(ctx.len(), 1);
        assert!(ctx.purge_expired_at(at(300)));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_fill_last_response_once() {
        let mut ctx = store();
        assert!(!ctx.fill_last_response("nothing to fill"));

        ctx.append_at("q", None, at(0));
        assert!(ctx.fill_last_response("a"));
        assert!(!ctx.fill_last_response("b"));
        assert_eq!(ctx.iter().next().unwrap().response(), Some("a"));
    }

    #[test]
    fn test_clear() {
        let mut ctx = store();
        ctx.append("q", Some("a".to_string()));
        assert_eq!(ctx.active_turns(None).len(), 1);
        ctx.clear();
        assert!(ctx.is_empty());
    }
}
