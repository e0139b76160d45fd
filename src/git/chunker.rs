use crate::git::walker::{CommitRecord, FileChange, FileDiff};
use crate::indexer::TextChunker;
use crate::types::IndexableUnit;

/// Converts commits and their diffs into indexable units
#[derive(Debug, Clone, Copy)]
pub struct CommitChunker {
    chunker: TextChunker,
}

impl CommitChunker {
    pub fn new(chunker: TextChunker) -> Self {
        Self { chunker }
    }

    /// The `commit_info` unit of a commit; embedded through its message
    pub fn commit_unit(&self, commit: &CommitRecord, changes: &[FileChange]) -> IndexableUnit {
        IndexableUnit::CommitInfo {
            commit_oid: commit.oid.clone(),
            message: commit.message.trim_end().to_string(),
            author_name: commit.author_name.clone(),
            author_email: commit.author_email.clone(),
            date: commit.date.clone(),
            changed_files_summary: changes
                .iter()
                .map(|c| format!("{} {}", c.change_type, c.path))
                .collect(),
            parent_oids: commit.parent_oids.clone(),
        }
    }

    /// One `diff_chunk` unit per window of the file's patch text
    pub fn diff_units(&self, commit_oid: &str, diff: &FileDiff) -> Vec<IndexableUnit> {
        self.chunker
            .chunk(&diff.patch)
            .into_iter()
            .map(|chunk| IndexableUnit::DiffChunk {
                commit_oid: commit_oid.to_string(),
                filepath: diff.path.clone(),
                chunk_index: chunk.index,
                total_chunks: chunk.total,
                content: chunk.content,
                change_type: diff.change_type,
            })
            .collect()
    }
}
