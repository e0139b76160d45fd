use super::SearchBackend;
use super::rewrite::{QueryRewriter, RewriteStrategy};
use crate::config::SearchConfig;
use crate::error::RagError;
use crate::types::SearchHit;

/// Knobs of one refining search
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementOptions {
    pub limit: usize,
    pub max_refinements: usize,
    pub relevance_threshold: f32,
    /// Return the highest-scoring iteration instead of the last one
    pub keep_best: bool,
    pub scope_files: Vec<String>,
}

impl RefinementOptions {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            limit: config.limit,
            max_refinements: config.max_refinements,
            relevance_threshold: config.relevance_threshold,
            keep_best: config.keep_best_iteration,
            scope_files: Vec::new(),
        }
    }
}

impl Default for RefinementOptions {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}

/// State of one iteration of the loop
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementState {
    pub query: String,
    /// 0 for the original query
    pub iteration: usize,
    /// Score of the top hit, 0 when there are none
    pub relevance_score: f32,
    pub results: Vec<SearchHit>,
}

impl RefinementState {
    fn new(query: String, iteration: usize, results: Vec<SearchHit>) -> Self {
        Self {
            relevance_score: results.first().map_or(0.0, |hit| hit.score),
            query,
            iteration,
            results,
        }
    }
}

/// What a refining search returns
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementOutcome {
    pub results: Vec<SearchHit>,
    pub refined_query: String,
    pub relevance_score: f32,
    /// Rewrites performed
    pub refinements: usize,
}

/// Search, and while the top score stays under the threshold, rewrite and search again.
///
/// At most `max_refinements` rewrites and `max_refinements + 1` searches. Each rewrite starts
/// from the previous query text.
pub async fn search_with_refinement(
    backend: &dyn SearchBackend,
    rewriter: &dyn QueryRewriter,
    query: &str,
    options: &RefinementOptions,
) -> Result<RefinementOutcome, RagError> {
    let results = backend
        .search(query, options.limit, &options.scope_files)
        .await?;
    let mut state = RefinementState::new(query.to_string(), 0, results);
    let mut best: Option<RefinementState> = None;

    tracing::debug!(
        "Initial search for '{}' scored {:.3}",
        query,
        state.relevance_score
    );

    while state.relevance_score < options.relevance_threshold
        && state.iteration < options.max_refinements
    {
        let strategy = RewriteStrategy::for_score(state.relevance_score);
        let next_query = rewriter.rewrite(strategy, &state).await?;
        let results = backend
            .search(&next_query, options.limit, &options.scope_files)
            .await?;
        let next = RefinementState::new(next_query, state.iteration + 1, results);

        tracing::debug!(
            "Refinement {} ({}) '{}' scored {:.3}",
            next.iteration,
            strategy.as_str(),
            next.query,
            next.relevance_score
        );

        if options.keep_best
            && best
                .as_ref()
                .is_none_or(|b| state.relevance_score > b.relevance_score)
        {
            best = Some(state);
        }
        state = next;
    }

    let refinements = state.iteration;
    let chosen = match best {
        Some(b) if b.relevance_score > state.relevance_score => b,
        _ => state,
    };

    Ok(RefinementOutcome {
        results: chosen.results,
        refined_query: chosen.query,
        relevance_score: chosen.relevance_score,
        refinements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::HeuristicRewriter;
    use crate::types::DataType;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns one hit per call with scripted scores and records every query it sees
    struct ScriptedBackend {
        scores: Vec<f32>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(scores: &[f32]) -> Self {
            Self {
                scores: scores.to_vec(),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        async fn search(
            &self,
            query: &str,
            _limit: usize,
            _scope_files: &[String],
        ) -> Result<Vec<SearchHit>, RagError> {
            let mut queries = self.queries.lock().unwrap();
            let call = queries.len();
            queries.push(query.to_string());
            Ok(match self.scores.get(call) {
                Some(&score) => vec![SearchHit {
                    id: format!("file:hit{}.rs:chunk:0", call),
                    score,
                    data_type: DataType::FileChunk,
                    filepath: Some(format!("src/hit{}.rs", call)),
                    commit_oid: None,
                    chunk_index: Some(0),
                    total_chunks: Some(1),
                    content: "fn validate_token(session: &Session)".to_string(),
                }],
                None => Vec::new(),
            })
        }
    }

    /// Appends the strategy name so tests can see which band was chosen
    struct TaggingRewriter;

    #[async_trait]
    impl QueryRewriter for TaggingRewriter {
        async fn rewrite(
            &self,
            strategy: RewriteStrategy,
            state: &RefinementState,
        ) -> Result<String, RagError> {
            Ok(format!("{} +{}", state.query, strategy.as_str()))
        }
    }

    fn options(max_refinements: usize, keep_best: bool) -> RefinementOptions {
        RefinementOptions {
            limit: 5,
            max_refinements,
            relevance_threshold: 0.75,
            keep_best,
            scope_files: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_no_refinement_when_threshold_met() {
        let backend = ScriptedBackend::new(&[0.9]);
        let outcome = search_with_refinement(&backend, &TaggingRewriter, "q", &options(2, false))
            .await
            .unwrap();

        assert_eq!(backend.queries(), vec!["q"]);
        assert_eq!(outcome.refinements, 0);
        assert_eq!(outcome.refined_query, "q");
        assert!((outcome.relevance_score - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_budget_bounds_searches() {
        let backend = ScriptedBackend::new(&[0.1, 0.1, 0.1, 0.1]);
        let outcome = search_with_refinement(&backend, &TaggingRewriter, "q", &options(2, false))
            .await
            .unwrap();

        assert_eq!(backend.queries().len(), 3);
        assert_eq!(outcome.refinements, 2);
        assert_eq!(outcome.refined_query, "q +broaden +broaden");
    }

    #[tokio::test]
    async fn test_strategy_follows_score_band() {
        let backend = ScriptedBackend::new(&[0.1, 0.5, 0.72, 0.74]);
        let outcome = search_with_refinement(&backend, &TaggingRewriter, "q", &options(3, false))
            .await
            .unwrap();

        assert_eq!(outcome.refined_query, "q +broaden +focus +tweak");
        assert!((outcome.relevance_score - 0.74).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_stops_once_threshold_met() {
        let backend = ScriptedBackend::new(&[0.2, 0.8, 0.1]);
        let outcome = search_with_refinement(&backend, &TaggingRewriter, "q", &options(5, false))
            .await
            .unwrap();

        assert_eq!(backend.queries().len(), 2);
        assert_eq!(outcome.refinements, 1);
        assert_eq!(outcome.results[0].id, "file:hit1.rs:chunk:0");
    }

    #[tokio::test]
    async fn test_last_iteration_returned_by_default() {
        let backend = ScriptedBackend::new(&[0.6, 0.2]);
        let outcome = search_with_refinement(&backend, &TaggingRewriter, "q", &options(1, false))
            .await
            .unwrap();

        assert!((outcome.relevance_score - 0.2).abs() < f32::EPSILON);
        assert_eq!(outcome.refined_query, "q +focus");
    }

    #[tokio::test]
    async fn test_keep_best_returns_highest_iteration() {
        let backend = ScriptedBackend::new(&[0.6, 0.2, 0.1]);
        let outcome = search_with_refinement(&backend, &TaggingRewriter, "q", &options(2, true))
            .await
            .unwrap();

        assert!((outcome.relevance_score - 0.6).abs() < f32::EPSILON);
        assert_eq!(outcome.refined_query, "q");
        assert_eq!(outcome.refinements, 2);
    }

    #[tokio::test]
    async fn test_zero_hits_scores_zero() {
        let backend = ScriptedBackend::new(&[]);
        let outcome = search_with_refinement(&backend, &TaggingRewriter, "q", &options(0, false))
            .await
            .unwrap();

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.relevance_score, 0.0);
        assert_eq!(backend.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_heuristic_rewrites_accumulate() {
        let backend = ScriptedBackend::new(&[0.1, 0.5, 0.5]);
        let outcome =
            search_with_refinement(&backend, &HeuristicRewriter::new(), "tokenCheck", &options(2, false))
                .await
                .unwrap();

        let queries = backend.queries();
        assert_eq!(queries[1], "tokenCheck related to token check");
        assert!(queries[2].starts_with(&queries[1]));
        assert!(queries[2].contains("focusing on"));
        assert_eq!(outcome.refined_query, queries[2]);
    }
}
