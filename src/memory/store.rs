use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::embeddings::Embedder;
use crate::error::{MemchatError, Result};
use crate::memory::{cosine_similarity, ConversationRecord, ScoredRecord};
use crate::persist::{temp_path_for, write_atomic};

/// Append-only conversation memory backed by a single JSON file
///
/// The in-memory sequence is authoritative for the session. Every append rewrites
/// the whole file through an atomic temp-file rename.
pub struct ConversationStore {
    path: PathBuf,
    records: Vec<ConversationRecord>,
    embedder: Arc<dyn Embedder>,
}

impl ConversationStore {
    /// Open the store at `path`, loading any existing records.
    ///
    /// Never fails:
    /// - missing file: start empty and create the file holding `[]`
    /// - blank file: start empty
    /// - unparsable file or mixed embedding dimensions: log, start empty, overwrite with `[]`
    /// - unreadable file: log, start empty; the next save replaces the file
    pub fn open(path: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        let mut store = Self {
            path: path.into(),
            records: Vec::new(),
            embedder,
        };
        store.load();
        store
    }

    fn load(&mut self) {
        let tmp = temp_path_for(&self.path);
        if tmp.is_file() {
            log::warn!(
                "Discarding leftover temp file from an interrupted save: {}",
                tmp.display()
            );
            if let Err(e) = fs::remove_file(&tmp) {
                log::warn!("Could not remove {}: {}", tmp.display(), e);
            }
        }

        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No memory file at {}, starting fresh", self.path.display());
                self.reset_file();
                return;
            }
            Err(e) => {
                log::error!(
                    "Error loading memory from {}: {}; starting empty, the next save will replace the file",
                    self.path.display(),
                    e
                );
                return;
            }
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return;
        }

        match self.parse_records(&content) {
            Ok(records) => {
                log::info!(
                    "Loaded {} conversation records from {}",
                    records.len(),
                    self.path.display()
                );
                self.records = records;
            }
            Err(e) => {
                log::warn!(
                    "Corrupted memory file detected at {} ({}), resetting memory",
                    self.path.display(),
                    e
                );
                self.reset_file();
            }
        }
    }

    fn parse_records(&self, content: &[u8]) -> Result<Vec<ConversationRecord>> {
        let records: Vec<ConversationRecord> = serde_json::from_slice(content)?;

        let expected = self.embedder.dimensions();
        if let Some((index, bad)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| r.embedding.len() != expected)
        {
            return Err(MemchatError::StorageCorruption(format!(
                "record {} has {} embedding dimensions, expected {}",
                index,
                bad.embedding.len(),
                expected
            )));
        }

        Ok(records)
    }

    /// Write an empty sequence to the canonical file, logging failures
    fn reset_file(&self) {
        if let Err(e) = write_atomic(&self.path, b"[]") {
            log::error!("Could not initialise memory file {}: {}", self.path.display(), e);
        }
    }

    /// Embed `"{user} {bot}"`, append the record, and persist the full sequence.
    ///
    /// If embedding fails nothing changes. If persisting fails the record stays
    /// in memory and the error is returned; the next successful save catches the
    /// file up.
    pub async fn append(&mut self, user: &str, bot: &str) -> Result<()> {
        let embedding = self.embedder.embed(&format!("{} {}", user, bot)).await?;
        self.check_dimensions(&embedding)?;

        self.records.push(ConversationRecord {
            user: user.to_string(),
            bot: bot.to_string(),
            embedding,
        });

        self.save()
    }

    /// Return at most `top_k` records most similar to `query`, best first.
    ///
    /// Equal scores are ordered most-recent-first. An empty store or `top_k == 0`
    /// returns an empty list without calling the embedder.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ConversationRecord>> {
        Ok(self
            .retrieve_scored(query, top_k)
            .await?
            .into_iter()
            .map(|scored| scored.record)
            .collect())
    }

    /// Like [`retrieve`](Self::retrieve) but keeps the similarity scores
    pub async fn retrieve_scored(&self, query: &str, top_k: usize) -> Result<Vec<ScoredRecord>> {
        if top_k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query).await?;
        self.check_dimensions(&query_vec)?;

        // Newest first so the stable sort keeps recent records ahead on ties
        let mut scored: Vec<(f32, usize)> = self
            .records
            .iter()
            .enumerate()
            .rev()
            .map(|(index, record)| {
                let score = cosine_similarity(&query_vec, &record.embedding);
                (if score.is_nan() { f32::NEG_INFINITY } else { score }, index)
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, index)| ScoredRecord {
                record: self.records[index].clone(),
                score,
            })
            .collect())
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<()> {
        let expected = self.embedder.dimensions();
        if embedding.len() != expected {
            return Err(MemchatError::Embedding(format!(
                "Unexpected embedding dimension: expected {}, got {}",
                expected,
                embedding.len()
            )));
        }
        Ok(())
    }

    /// Persist the full sequence atomically
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.records)?;
        write_atomic(&self.path, &json)?;
        log::debug!("Saved {} records to {}", self.records.len(), self.path.display());
        Ok(())
    }

    /// Discard every record and reset the file to an empty sequence
    pub fn clear(&mut self) -> Result<()> {
        self.records.clear();
        write_atomic(&self.path, b"[]")
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ConversationRecord] {
        &self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dimensionality every stored embedding has
    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Same vector for every text, so every record ties
    struct ConstantEmbedder;

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0])
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(MemchatError::Embedding("model unavailable".to_string()))
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    fn hashing() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(384))
    }

    fn open_in(temp_dir: &TempDir) -> ConversationStore {
        ConversationStore::open(temp_dir.path().join("memory.json"), hashing())
    }

    #[test]
    fn test_open_missing_file_creates_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_in(&temp_dir);

        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[]");
    }

    #[test]
    fn test_open_blank_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.json");
        fs::write(&path, "   \n").unwrap();

        let store = ConversationStore::open(&path, hashing());
        assert!(store.is_empty());
    }

    #[test]
    fn test_open_corrupt_file_resets() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.json");
        fs::write(&path, "[{\"user\": \"hi\", \"bot\": ").unwrap();

        let store = ConversationStore::open(&path, hashing());
        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_open_non_utf8_file_resets() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.json");
        fs::write(&path, [0xff, 0xfe, b'[', b']']).unwrap();

        let store = ConversationStore::open(&path, hashing());
        assert!(store.is_empty());
        assert_eq!(fs::read(&path).unwrap(), b"[]");
    }

    #[test]
    fn test_open_wrong_dimensions_resets() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.json");
        fs::write(&path, r#"[{"user": "hi", "bot": "hello!", "embedding": [1.0, 2.0]}]"#).unwrap();

        let store = ConversationStore::open(&path, hashing());
        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_retrieve_on_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        // The failing embedder proves the empty path never embeds
        let store = ConversationStore::open(temp_dir.path().join("m.json"), Arc::new(FailingEmbedder));

        let related = store.retrieve("anything", 3).await.unwrap();
        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_first_of_two() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open_in(&temp_dir);

        store.append("hi", "hello!").await.unwrap();
        store.append("how are you", "good, thanks").await.unwrap();

        let related = store.retrieve("hi", 1).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].user, "hi");
        assert_eq!(related[0].bot, "hello!");
    }

    #[tokio::test]
    async fn test_just_appended_record_is_found() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open_in(&temp_dir);

        store.append("tell me about rust", "It is a systems language.").await.unwrap();
        store.append("what is the weather", "Sunny today.").await.unwrap();
        store.append("my cat is called Miso", "Lovely name!").await.unwrap();

        let related = store.retrieve("what is the weather", 3).await.unwrap();
        assert_eq!(related[0].user, "what is the weather");
    }

    #[tokio::test]
    async fn test_retrieve_respects_top_k_and_only_returns_appended() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open_in(&temp_dir);

        for i in 0..6 {
            store.append(&format!("question {}", i), &format!("answer {}", i)).await.unwrap();
        }

        for k in [0usize, 1, 3, 6, 10] {
            let related = store.retrieve("question 4", k).await.unwrap();
            assert_eq!(related.len(), k.min(6));
            for record in &related {
                assert!(store.records().contains(record));
            }
        }
    }

    #[tokio::test]
    async fn test_ties_are_most_recent_first() {
        let temp_dir = TempDir::new().unwrap();
        let mut store =
            ConversationStore::open(temp_dir.path().join("m.json"), Arc::new(ConstantEmbedder));

        store.append("first", "1").await.unwrap();
        store.append("second", "2").await.unwrap();
        store.append("third", "3").await.unwrap();

        let related = store.retrieve("anything", 2).await.unwrap();
        let users: Vec<&str> = related.iter().map(|r| r.user.as_str()).collect();
        assert_eq!(users, vec!["third", "second"]);
    }

    #[tokio::test]
    async fn test_scores_are_descending() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open_in(&temp_dir);

        store.append("paris france", "capital").await.unwrap();
        store.append("berlin germany", "capital").await.unwrap();
        store.append("paris", "city of light").await.unwrap();

        let scored = store.retrieve_scored("paris", 3).await.unwrap();
        assert!(scored.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.json");

        let original = {
            let mut store = ConversationStore::open(&path, hashing());
            store.append("hi", "hello!").await.unwrap();
            store.append("how are you", "good, thanks").await.unwrap();
            store.records().to_vec()
        };

        let reloaded = ConversationStore::open(&path, hashing());
        assert_eq!(reloaded.len(), original.len());
        for (a, b) in original.iter().zip(reloaded.records()) {
            assert_eq!(a.user, b.user);
            assert_eq!(a.bot, b.bot);
            assert_eq!(a.embedding.len(), b.embedding.len());
            for (x, y) in a.embedding.iter().zip(&b.embedding) {
                assert!((x - y).abs() < 1e-6);
            }
        }
    }

    #[tokio::test]
    async fn test_interrupted_write_keeps_canonical_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.json");

        {
            let mut store = ConversationStore::open(&path, hashing());
            store.append("hi", "hello!").await.unwrap();
        }

        // Simulate a crash after the temp file was written but before the rename
        let tmp = temp_path_for(&path);
        fs::write(&tmp, "[{\"user\": \"half-writ").unwrap();

        let reloaded = ConversationStore::open(&path, hashing());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.records()[0].user, "hi");
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn test_append_embedding_failure_changes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut store =
            ConversationStore::open(temp_dir.path().join("m.json"), Arc::new(FailingEmbedder));

        let err = store.append("hi", "hello!").await.unwrap_err();
        assert!(matches!(err, MemchatError::Embedding(_)));
        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_append_write_failure_keeps_record_in_memory() {
        let temp_dir = TempDir::new().unwrap();
        // A directory at the store path: reads and renames both fail
        let path = temp_dir.path().join("memory.json");
        fs::create_dir(&path).unwrap();

        let mut store = ConversationStore::open(&path, hashing());
        let err = store.append("hi", "hello!").await.unwrap_err();

        assert!(matches!(err, MemchatError::Io(_)));
        assert_eq!(store.len(), 1);
        assert!(!temp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn test_clear_resets_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open_in(&temp_dir);
        store.append("hi", "hello!").await.unwrap();

        store.clear().unwrap();
        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[]");

        let reloaded = open_in(&temp_dir);
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn test_file_deleted_between_sessions_starts_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.json");
        {
            let mut store = ConversationStore::open(&path, hashing());
            store.append("hi", "hello!").await.unwrap();
        }
        fs::remove_file(&path).unwrap();

        let store = ConversationStore::open(&path, hashing());
        assert!(store.is_empty());
        assert!(path.exists());
    }
}
