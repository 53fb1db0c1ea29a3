//! Conversation memory: every completed turn is stored with an embedding of its
//! text, and later turns retrieve the most similar past exchanges.
//!
//! Retrieval is a linear cosine-similarity scan over all records; there is no
//! approximate nearest-neighbour index.

mod store;

pub use store::ConversationStore;

use serde::{Deserialize, Serialize};

/// One completed exchange. The JSON field names are the persisted layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// What the user said
    pub user: String,
    /// What the bot answered
    pub bot: String,
    /// Embedding of `"{user} {bot}"`
    pub embedding: Vec<f32>,
}

/// A retrieved record with its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: ConversationRecord,
    pub score: f32,
}

/// Compute cosine similarity between two vectors
///
/// Returns a score in [-1.0, 1.0], or 0.0 if either vector has zero magnitude.
/// Callers check that both vectors have the same length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same length for cosine similarity");

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// Render records as the `User:/Bot:` context block handed to the generator
pub fn format_context(records: &[ConversationRecord]) -> String {
    records
        .iter()
        .map(|r| format!("User: {}\nBot: {}", r.user, r.bot))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_magnitude() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_record_json_layout() {
        let record = ConversationRecord {
            user: "hi".to_string(),
            bot: "hello!".to_string(),
            embedding: vec![0.5, -0.5],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["user"], "hi");
        assert_eq!(json["bot"], "hello!");
        assert_eq!(json["embedding"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_format_context() {
        let records = vec![
            ConversationRecord {
                user: "hi".to_string(),
                bot: "hello!".to_string(),
                embedding: vec![],
            },
            ConversationRecord {
                user: "how are you".to_string(),
                bot: "good, thanks".to_string(),
                embedding: vec![],
            },
        ];
        assert_eq!(
            format_context(&records),
            "User: hi\nBot: hello!\nUser: how are you\nBot: good, thanks"
        );
        assert_eq!(format_context(&[]), "");
    }
}
