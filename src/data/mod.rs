mod batch;
mod dataloader;
mod dataset;
mod example;

pub use batch::{Collate, PairBatch, SentenceBatch};
pub use dataloader::DataLoader;
pub use dataset::load_jsonl;
pub use example::{PairExample, SentenceExample};
