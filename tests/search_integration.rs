/// Search, refinement and diff summary through the public client API
use anyhow::Result;
use async_trait::async_trait;
use git2::{IndexAddOption, Repository, Signature};
use repo_rag::config::Config;
use repo_rag::embedding::HashingEmbedder;
use repo_rag::error::RagError;
use repo_rag::search::{QueryRewriter, RefinementState, RewriteStrategy};
use repo_rag::types::{DataType, Neighbor, SearchRequest};
use repo_rag::vector_db::MemoryVectorDB;
use repo_rag::RagClient;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const DIMENSION: usize = 1024;

fn write(root: &Path, rel: &str, content: &str) {
    std::fs::write(root.join(rel), content).unwrap();
}

fn commit_all(repo: &Repository, message: &str) {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Test Author", "author@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap();
}

/// Records which strategies were requested and appends a marker word
#[derive(Default)]
struct RecordingRewriter {
    calls: Mutex<Vec<RewriteStrategy>>,
}

#[async_trait]
impl QueryRewriter for RecordingRewriter {
    async fn rewrite(
        &self,
        strategy: RewriteStrategy,
        state: &RefinementState,
    ) -> Result<String, RagError> {
        self.calls.lock().unwrap().push(strategy);
        Ok(format!("{} again", state.query))
    }
}

struct Fixture {
    client: RagClient,
    rewriter: Arc<RecordingRewriter>,
    repo_dir: TempDir,
    _cache_dir: TempDir,
}

async fn indexed_fixture(history_depth: usize) -> Fixture {
    let cache_dir = TempDir::new().unwrap();
    let repo_dir = TempDir::new().unwrap();
    let repo = Repository::init(repo_dir.path()).unwrap();
    write(
        repo_dir.path(),
        "retry.rs",
        "exponential backoff retry delay doubles after each failed attempt",
    );
    write(
        repo_dir.path(),
        "limiter.rs",
        "sliding window rate limiter admits calls per minute",
    );
    commit_all(&repo, "Add retry with exponential backoff");
    write(
        repo_dir.path(),
        "limiter.rs",
        "sliding window rate limiter admits calls per minute and sleeps when full",
    );
    commit_all(&repo, "Sleep in the rate limiter when the window is full");

    let mut config = Config::default();
    config.vector_db.backend = "memory".to_string();
    config.embedding.provider = "hashing".to_string();
    config.embedding.dimension = DIMENSION;
    config.indexing.commit_history_depth = history_depth;
    config.git.max_diff_summary_chars = 40;
    config.cache.hash_cache_path = cache_dir.path().join("hash_cache.json");

    let rewriter = Arc::new(RecordingRewriter::default());
    let client = RagClient::with_components(
        config,
        Arc::new(HashingEmbedder::new(DIMENSION)),
        Arc::new(MemoryVectorDB::new()),
    )
    .unwrap()
    .with_rewriter(rewriter.clone());

    client.run_indexing(repo_dir.path()).await;

    Fixture {
        client,
        rewriter,
        repo_dir,
        _cache_dir: cache_dir,
    }
}

#[tokio::test]
async fn test_unreachable_threshold_spends_whole_budget() -> Result<()> {
    let fixture = indexed_fixture(0).await;

    let mut request = SearchRequest::new("rate limiter window");
    request.relevance_threshold = Some(1.0);
    request.max_refinements = Some(3);
    let response = fixture.client.search(request).await?;

    assert_eq!(response.refinements, 3);
    assert_eq!(fixture.rewriter.calls.lock().unwrap().len(), 3);
    assert_eq!(response.refined_query, "rate limiter window again again again");
    Ok(())
}

#[tokio::test]
async fn test_met_threshold_skips_rewriting() -> Result<()> {
    let fixture = indexed_fixture(0).await;

    let mut request = SearchRequest::new("rate limiter window");
    request.relevance_threshold = Some(0.1);
    let response = fixture.client.search(request).await?;

    assert_eq!(response.refinements, 0);
    assert!(fixture.rewriter.calls.lock().unwrap().is_empty());
    assert_eq!(response.refined_query, "rate limiter window");
    assert_eq!(response.results[0].id, "file:limiter.rs:chunk:0");
    assert!(response.relevance_score >= 0.1);
    Ok(())
}

#[tokio::test]
async fn test_low_scores_choose_broaden() -> Result<()> {
    let fixture = indexed_fixture(0).await;

    let mut request = SearchRequest::new("kubernetes helm chart");
    request.max_refinements = Some(1);
    let response = fixture.client.search(request).await?;

    assert!(response.relevance_score < 0.3);
    assert_eq!(
        *fixture.rewriter.calls.lock().unwrap(),
        vec![RewriteStrategy::Broaden]
    );
    Ok(())
}

#[tokio::test]
async fn test_commit_messages_are_searchable() -> Result<()> {
    let fixture = indexed_fixture(10).await;

    let mut request = SearchRequest::new("Sleep in the rate limiter when the window is full");
    request.relevance_threshold = Some(0.0);
    let response = fixture.client.search(request).await?;

    let top = &response.results[0];
    assert_eq!(top.data_type, DataType::CommitInfo);
    assert!(top.id.starts_with("commit:"));
    assert_eq!(
        top.content,
        "Sleep in the rate limiter when the window is full"
    );
    Ok(())
}

#[tokio::test]
async fn test_adjacent_chunks_of_single_chunk_file() -> Result<()> {
    let fixture = indexed_fixture(0).await;

    let adjacent = fixture.client.fetch_adjacent_chunks("retry.rs", 0).await?;
    assert_eq!(
        adjacent.previous,
        Neighbor::Missing {
            chunk_index: -1,
            reason: "start of file".to_string()
        }
    );
    assert!(matches!(adjacent.next, Neighbor::Missing { chunk_index: 1, .. }));
    Ok(())
}

#[tokio::test]
async fn test_diff_summary_is_bounded() -> Result<()> {
    let git_available = std::process::Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success());
    if !git_available {
        return Ok(());
    }

    let fixture = indexed_fixture(0).await;
    let summary = fixture.client.diff_summary(fixture.repo_dir.path()).await;

    assert!(summary.starts_with("diff --git"), "{summary}");
    assert!(summary.ends_with(repo_rag::git::diff_summary::TRUNCATION_MARKER));
    assert_eq!(
        summary.chars().count(),
        40 + repo_rag::git::diff_summary::TRUNCATION_MARKER.chars().count()
    );
    Ok(())
}
