//! Slow-Query Analyzer Module
//!
//! Normalizes queries into patterns so structurally identical executions
//! group together, and turns grouped slow-query records into advisory
//! optimization suggestions. Suggestions are strings for an operator to
//! read; nothing is ever applied automatically.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::store::SqliteStore;

// == Suggestion ==
/// Advisory finding for one slow-query pattern.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    /// Normalized pattern the finding applies to
    pub pattern: String,
    /// Recorded executions of the pattern
    pub occurrences: u64,
    /// Mean recorded duration
    pub avg_duration_ms: f64,
    /// Worst recorded duration
    pub max_duration_ms: u64,
    /// Heuristic advice, one line per smell
    pub advice: Vec<String>,
}

// == Query Analyzer ==
/// Aggregates persisted slow-query records into suggestions.
pub struct QueryAnalyzer {
    store: Arc<SqliteStore>,
}

impl QueryAnalyzer {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    // == Analyze ==
    /// Groups recorded slow queries and attaches advice, worst patterns
    /// first. Patterns with no recognizable smell still surface with a
    /// generic review hint so a hot query never disappears from the report.
    pub async fn analyze(&self, limit: usize) -> Result<Vec<Suggestion>> {
        let groups = self.store.slow_query_groups(limit).await?;
        Ok(groups
            .into_iter()
            .map(|group| {
                let advice = advice_for(&group.pattern, &group.sample);
                Suggestion {
                    pattern: group.pattern,
                    occurrences: group.occurrences,
                    avg_duration_ms: group.avg_duration_ms,
                    max_duration_ms: group.max_duration_ms,
                    advice,
                }
            })
            .collect())
    }
}

// == Normalization ==
/// Collapses a query to its structural pattern: string and numeric
/// literals become `?`, whitespace collapses, text lowercases.
///
/// Bound-parameter markers (`?1`) survive untouched so parameterized and
/// literal-bearing variants of the same query land in the same group.
pub fn normalize_query(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut last_space = true;

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                // Consume the quoted literal, honouring doubled-quote escapes
                let quote = c;
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next == quote {
                        if chars.peek() == Some(&quote) {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
                out.push('?');
                last_space = false;
            }
            '0'..='9' => {
                // A digit run continues an identifier or placeholder; a
                // standalone number becomes a placeholder
                let prev = out.chars().last();
                let keeps_digits = matches!(prev, Some(p) if p.is_ascii_alphanumeric() || p == '_' || p == '?');
                if keeps_digits {
                    out.push(c);
                } else {
                    while chars.peek().is_some_and(|n| n.is_ascii_digit() || *n == '.') {
                        chars.next();
                    }
                    out.push('?');
                }
                last_space = false;
            }
            c if c.is_whitespace() => {
                if !last_space {
                    out.push(' ');
                    last_space = true;
                }
            }
            c => {
                out.push(c.to_ascii_lowercase());
                last_space = false;
            }
        }
    }

    out.trim_end().to_string()
}

// == Heuristics ==
/// Pattern smells; literal-sensitive checks run against the raw sample
/// because normalization erases the literals they look for.
pub fn advice_for(pattern: &str, sample: &str) -> Vec<String> {
    let mut advice = Vec::new();

    if pattern.contains("select *") {
        advice.push(
            "wildcard projection: select only the columns the caller reads".to_string(),
        );
    }
    if pattern.contains(" where ") {
        advice.push(
            "recurring slow filter: check that an index covers the WHERE columns".to_string(),
        );
    }
    if pattern.contains(" order by ") && !pattern.contains(" limit ") {
        advice.push(
            "ORDER BY without LIMIT sorts the entire result set; bound it".to_string(),
        );
    }
    if pattern.contains("(select") || pattern.contains("( select") {
        advice.push("nested subquery: consider a JOIN or a CTE instead".to_string());
    }
    let lowered = sample.to_ascii_lowercase();
    if lowered.contains("like '%") {
        advice.push(
            "leading-wildcard LIKE cannot use an index range scan".to_string(),
        );
    }

    if advice.is_empty() {
        advice.push("no structural smell found; inspect the plan with EXPLAIN QUERY PLAN".to_string());
    }
    advice
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StorePool;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_replaces_string_literals() {
        assert_eq!(
            normalize_query("SELECT id FROM posts WHERE niche = 'fitness'"),
            "select id from posts where niche = ?"
        );
    }

    #[test]
    fn test_normalize_replaces_numbers_but_not_identifiers() {
        assert_eq!(
            normalize_query("SELECT c1 FROM t2 WHERE id = 42 AND score > 3.5"),
            "select c1 from t2 where id = ? and score > ?"
        );
    }

    #[test]
    fn test_normalize_preserves_bound_params() {
        assert_eq!(
            normalize_query("SELECT id FROM posts WHERE id = ?1"),
            "select id from posts where id = ?1"
        );
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(
            normalize_query("SELECT  id\n  FROM   posts"),
            "select id from posts"
        );
    }

    #[test]
    fn test_normalize_groups_equivalent_queries() {
        let a = normalize_query("SELECT * FROM posts WHERE id = 1");
        let b = normalize_query("select *  from posts\nwhere id = 99");
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_handles_escaped_quotes() {
        assert_eq!(
            normalize_query("SELECT 1 FROM t WHERE name = 'o''brien'"),
            "select ? from t where name = ?"
        );
    }

    #[test]
    fn test_advice_wildcard_projection() {
        let advice = advice_for("select * from posts", "SELECT * FROM posts");
        assert!(advice.iter().any(|a| a.contains("wildcard projection")));
    }

    #[test]
    fn test_advice_order_by_without_limit() {
        let advice = advice_for(
            "select id from posts order by created_at",
            "SELECT id FROM posts ORDER BY created_at",
        );
        assert!(advice.iter().any(|a| a.contains("ORDER BY without LIMIT")));
    }

    #[test]
    fn test_advice_order_by_with_limit_is_clean() {
        let advice = advice_for(
            "select id from posts order by created_at limit ?",
            "SELECT id FROM posts ORDER BY created_at LIMIT 10",
        );
        assert!(!advice.iter().any(|a| a.contains("ORDER BY without LIMIT")));
    }

    #[test]
    fn test_advice_leading_wildcard_uses_sample() {
        // The literal is erased in the pattern; only the sample reveals it
        let advice = advice_for(
            "select id from posts where caption like ?",
            "SELECT id FROM posts WHERE caption LIKE '%beach%'",
        );
        assert!(advice.iter().any(|a| a.contains("leading-wildcard")));
    }

    #[test]
    fn test_advice_nested_subquery() {
        let advice = advice_for(
            "select id from posts where niche_id in (select id from niches)",
            "",
        );
        assert!(advice.iter().any(|a| a.contains("nested subquery")));
    }

    #[test]
    fn test_advice_fallback_hint() {
        let advice = advice_for("pragma user_version", "PRAGMA user_version");
        assert_eq!(advice.len(), 1);
        assert!(advice[0].contains("EXPLAIN QUERY PLAN"));
    }

    #[tokio::test]
    async fn test_analyze_orders_worst_first() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(
            StorePool::open(dir.path().join("a.db"), 2, Duration::from_millis(500)).unwrap(),
        );
        let store = Arc::new(SqliteStore::new(pool).await.unwrap());

        for _ in 0..3 {
            store
                .record_slow_query("select * from posts", "SELECT * FROM posts", 200)
                .await
                .unwrap();
        }
        store
            .record_slow_query("select id from niches", "SELECT id FROM niches", 150)
            .await
            .unwrap();

        let analyzer = QueryAnalyzer::new(store);
        let suggestions = analyzer.analyze(10).await.unwrap();

        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].pattern, "select * from posts");
        assert_eq!(suggestions[0].occurrences, 3);
        assert!(suggestions[0]
            .advice
            .iter()
            .any(|a| a.contains("wildcard projection")));
    }
}
