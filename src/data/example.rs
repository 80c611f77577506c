use serde::{Deserialize, Serialize};

/// A tokenized single sentence. `label` is the sentiment class, absent on test splits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceExample {
    pub id: String,
    pub token_ids: Vec<u32>,
    #[serde(default)]
    pub label: Option<u8>,
}

/// A tokenized sentence pair. `label` is either a 0/1 paraphrase flag or a similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairExample {
    pub id: String,
    pub token_ids_1: Vec<u32>,
    pub token_ids_2: Vec<u32>,
    #[serde(default)]
    pub label: Option<f32>,
}
