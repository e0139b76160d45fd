use super::refine::RefinementState;
use crate::error::RagError;
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("identifier regex is valid")
});

/// Words inside an identifier: `parseHTTPConfig` -> `parse`, `HTTPConfig`
static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]+[a-z0-9]*|[a-z0-9]+").expect("word regex is valid"));

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "from", "are", "was", "not", "but", "you",
    "all", "can", "has", "have", "into", "how", "what", "where", "does", "use", "let", "mut",
    "pub", "self", "return", "const", "var", "function", "import", "export", "true", "false",
    "null", "none", "struct", "impl", "class", "def", "new", "string", "related", "focusing",
];

/// How a low-relevance query gets rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteStrategy {
    /// Results were barely related; widen the query
    Broaden,
    /// Results were partly related; steer toward their dominant terms
    Focus,
    /// Results were close; adjust slightly
    Tweak,
}

impl RewriteStrategy {
    /// `< 0.3` broaden, `< 0.7` focus, otherwise tweak
    pub fn for_score(score: f32) -> Self {
        if score < 0.3 {
            RewriteStrategy::Broaden
        } else if score < 0.7 {
            RewriteStrategy::Focus
        } else {
            RewriteStrategy::Tweak
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RewriteStrategy::Broaden => "broaden",
            RewriteStrategy::Focus => "focus",
            RewriteStrategy::Tweak => "tweak",
        }
    }
}

/// Produces the next query text from the current refinement state
///
/// Implementations build on `state.query`; the returned text replaces it.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    async fn rewrite(
        &self,
        strategy: RewriteStrategy,
        state: &RefinementState,
    ) -> Result<String, RagError>;
}

/// Rewrites queries from their own terms and the terms of the current results
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicRewriter;

impl HeuristicRewriter {
    pub fn new() -> Self {
        Self
    }

    fn broaden(&self, query: &str) -> String {
        let present = words_in(query);
        let extra: Vec<String> = split_terms(query)
            .into_iter()
            .filter(|t| !present.contains(t))
            .collect();

        if extra.is_empty() {
            format!("{} overview", query)
        } else {
            format!("{} related to {}", query, extra.join(" "))
        }
    }

    fn focus(&self, state: &RefinementState) -> String {
        let mut known = words_in(&state.query);
        known.extend(split_terms(&state.query));

        let mut counts: HashMap<String, usize> = HashMap::new();
        for hit in &state.results {
            for term in split_terms(&hit.content) {
                if !known.contains(&term) {
                    *counts.entry(term).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let top: Vec<String> = ranked.into_iter().take(3).map(|(t, _)| t).collect();

        if top.is_empty() {
            self.broaden(&state.query)
        } else {
            format!("{} focusing on {}", state.query, top.join(" "))
        }
    }

    fn tweak(&self, state: &RefinementState) -> String {
        let stem = state
            .results
            .iter()
            .filter_map(|hit| hit.filepath.as_deref())
            .find_map(|fp| Path::new(fp).file_stem().and_then(|s| s.to_str()));

        match stem {
            Some(stem) if !state.query.contains(&format!("in {}", stem)) => {
                format!("{} in {}", state.query, stem)
            }
            _ => format!("{} implementation", state.query),
        }
    }
}

#[async_trait]
impl QueryRewriter for HeuristicRewriter {
    async fn rewrite(
        &self,
        strategy: RewriteStrategy,
        state: &RefinementState,
    ) -> Result<String, RagError> {
        Ok(match strategy {
            RewriteStrategy::Broaden => self.broaden(&state.query),
            RewriteStrategy::Focus => self.focus(state),
            RewriteStrategy::Tweak => self.tweak(state),
        })
    }
}

/// Lower-cased whole identifiers appearing in `text`
fn words_in(text: &str) -> HashSet<String> {
    IDENTIFIER_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Identifier parts split on snake_case and camelCase boundaries, lower-cased, de-duplicated
/// in first-seen order, without stopwords or very short parts
pub(crate) fn split_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();

    for ident in IDENTIFIER_RE.find_iter(text) {
        for part in ident.as_str().split('_') {
            for word in WORD_RE.find_iter(part) {
                let term = word.as_str().to_lowercase();
                if term.len() < 3 || STOPWORDS.contains(&term.as_str()) {
                    continue;
                }
                if seen.insert(term.clone()) {
                    terms.push(term);
                }
            }
        }
    }

    terms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, SearchHit};

    fn hit(filepath: Option<&str>, content: &str, score: f32) -> SearchHit {
        SearchHit {
            id: format!("file:{}:chunk:0", filepath.unwrap_or("none")),
            score,
            data_type: DataType::FileChunk,
            filepath: filepath.map(str::to_string),
            commit_oid: None,
            chunk_index: Some(0),
            total_chunks: Some(1),
            content: content.to_string(),
        }
    }

    fn state(query: &str, results: Vec<SearchHit>) -> RefinementState {
        RefinementState {
            query: query.to_string(),
            iteration: 0,
            relevance_score: results.first().map_or(0.0, |h| h.score),
            results,
        }
    }

    #[test]
    fn test_strategy_bands() {
        assert_eq!(RewriteStrategy::for_score(0.1), RewriteStrategy::Broaden);
        assert_eq!(RewriteStrategy::for_score(0.5), RewriteStrategy::Focus);
        assert_eq!(RewriteStrategy::for_score(0.8), RewriteStrategy::Tweak);
        assert_eq!(RewriteStrategy::for_score(0.3), RewriteStrategy::Focus);
        assert_eq!(RewriteStrategy::for_score(0.7), RewriteStrategy::Tweak);
        assert_eq!(RewriteStrategy::for_score(-0.2), RewriteStrategy::Broaden);
    }

    #[test]
    fn test_split_terms() {
        assert_eq!(
            split_terms("parseConfig load_user_settings"),
            vec!["parse", "config", "load", "user", "settings"]
        );
        assert_eq!(split_terms("the fn of it"), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_broaden_appends_split_terms() {
        let rewriter = HeuristicRewriter::new();
        let query = rewriter
            .rewrite(RewriteStrategy::Broaden, &state("parseConfig", vec![]))
            .await
            .unwrap();
        assert_eq!(query, "parseConfig related to parse config");
    }

    #[tokio::test]
    async fn test_broaden_plain_words_falls_back() {
        let rewriter = HeuristicRewriter::new();
        let query = rewriter
            .rewrite(RewriteStrategy::Broaden, &state("authentication", vec![]))
            .await
            .unwrap();
        assert_eq!(query, "authentication overview");
    }

    #[tokio::test]
    async fn test_focus_uses_frequent_result_terms() {
        let rewriter = HeuristicRewriter::new();
        let results = vec![
            hit(Some("src/token.rs"), "fn refresh_token(session: Session)", 0.5),
            hit(Some("src/auth.rs"), "let token = session.token();", 0.4),
        ];
        let query = rewriter
            .rewrite(RewriteStrategy::Focus, &state("auth flow", results))
            .await
            .unwrap();
        assert_eq!(query, "auth flow focusing on session token refresh");
    }

    #[tokio::test]
    async fn test_focus_without_new_terms_broadens() {
        let rewriter = HeuristicRewriter::new();
        let results = vec![hit(Some("a.rs"), "login", 0.5)];
        let query = rewriter
            .rewrite(RewriteStrategy::Focus, &state("userLogin", results))
            .await
            .unwrap();
        assert_eq!(query, "userLogin related to user login");
    }

    #[tokio::test]
    async fn test_tweak_names_top_file() {
        let rewriter = HeuristicRewriter::new();
        let results = vec![hit(Some("src/retry_policy.rs"), "backoff", 0.72)];
        let query = rewriter
            .rewrite(RewriteStrategy::Tweak, &state("backoff delay", results))
            .await
            .unwrap();
        assert_eq!(query, "backoff delay in retry_policy");
    }

    #[tokio::test]
    async fn test_tweak_without_paths() {
        let rewriter = HeuristicRewriter::new();
        let results = vec![hit(None, "Fix retry", 0.72)];
        let query = rewriter
            .rewrite(RewriteStrategy::Tweak, &state("retry fix", results))
            .await
            .unwrap();
        assert_eq!(query, "retry fix implementation");
    }
}
