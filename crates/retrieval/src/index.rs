//! In-memory relevance indexes
//!
//! Provides two scoring modes:
//! - Dense (cosine similarity of embeddings, over arbitrary items)
//! - Lexical (BM25 from an in-memory tantivy index, keyed by unit id)
//!
//! Both return results best-first; equal scores keep insertion order.

use augment_common::errors::{AppError, Result};
use std::cmp::Ordering;
use tantivy::collector::TopDocs;
use tantivy::doc;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use uuid::Uuid;

/// Total order for best-first sorting; NaN ranks below every real score
pub fn by_score_desc(a: f32, b: f32) -> Ordering {
    let key = |s: f32| if s.is_nan() { f32::NEG_INFINITY } else { s };
    key(b).total_cmp(&key(a))
}

/// Descending by score, stable for ties
fn rank<T>(mut scored: Vec<(usize, f32)>, items: &[T], top_k: usize) -> Vec<(&T, f32)> {
    scored.sort_by(|a, b| by_score_desc(a.1, b.1));
    scored
        .into_iter()
        .take(top_k)
        .map(|(i, score)| (&items[i], score))
        .collect()
}

/// Cosine similarity; 0 when either side has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Dense vector index
#[derive(Debug)]
pub struct VectorIndex<T> {
    items: Vec<T>,
    embeddings: Vec<Vec<f32>>,
    dimension: Option<usize>,
}

impl<T> Default for VectorIndex<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            embeddings: Vec::new(),
            dimension: None,
        }
    }
}

impl<T> VectorIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item; every embedding must share the first one's dimension
    pub fn insert(&mut self, item: T, embedding: Vec<f32>) -> Result<()> {
        match self.dimension {
            Some(dim) if dim != embedding.len() => {
                return Err(AppError::IndexBuild {
                    message: format!(
                        "embedding dimension {} does not match index dimension {}",
                        embedding.len(),
                        dim
                    ),
                });
            }
            None => self.dimension = Some(embedding.len()),
            _ => {}
        }
        self.items.push(item);
        self.embeddings.push(embedding);
        Ok(())
    }

    /// Add items paired with their embeddings; nothing is added on error
    pub fn extend(&mut self, items: Vec<T>, embeddings: Vec<Vec<f32>>) -> Result<()> {
        if items.len() != embeddings.len() {
            return Err(AppError::IndexBuild {
                message: format!("{} items but {} embeddings", items.len(), embeddings.len()),
            });
        }
        let expected = self
            .dimension
            .or_else(|| embeddings.first().map(Vec::len));
        if let Some(dim) = expected {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
                return Err(AppError::IndexBuild {
                    message: format!(
                        "embedding dimension {} does not match index dimension {}",
                        bad.len(),
                        dim
                    ),
                });
            }
        }
        for (item, embedding) in items.into_iter().zip(embeddings) {
            self.insert(item, embedding)?;
        }
        Ok(())
    }

    /// The `top_k` most similar items
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<(&T, f32)> {
        let scored = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, e)))
            .collect();
        rank(scored, &self.items, top_k)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

/// Writer heap for the lexical index; tantivy's per-thread minimum
const WRITER_MEMORY_BYTES: usize = 15_000_000;

fn lexical_error(err: impl std::fmt::Display) -> AppError {
    AppError::IndexBuild {
        message: format!("lexical index: {}", err),
    }
}

/// Lexical index backed by an in-memory tantivy index
///
/// Documents are keyed by a unit id kept as a stored field, so hits can be
/// mapped back to the exact unit that was indexed. Scoring is tantivy's
/// BM25 over its default lower-casing tokenizer.
pub struct LexicalIndex {
    reader: IndexReader,
    parser: QueryParser,
    id: Field,
    len: usize,
}

impl LexicalIndex {
    /// Index every `(id, text)` pair in a single commit
    pub fn build<I, S>(docs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Uuid, S)>,
        S: AsRef<str>,
    {
        let mut builder = Schema::builder();
        let id = builder.add_text_field("id", STRING | STORED);
        let body = builder.add_text_field("body", TEXT);
        let index = Index::create_in_ram(builder.build());

        // One thread keeps document order equal to insertion order
        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_MEMORY_BYTES)
            .map_err(lexical_error)?;
        let mut len = 0;
        for (key, text) in docs {
            writer
                .add_document(doc!(id => key.to_string(), body => text.as_ref()))
                .map_err(lexical_error)?;
            len += 1;
        }
        writer.commit().map_err(lexical_error)?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(lexical_error)?;
        let parser = QueryParser::for_index(&index, vec![body]);

        Ok(Self {
            reader,
            parser,
            id,
            len,
        })
    }

    /// Ids of the `top_k` best matches; documents sharing no query term are left out
    ///
    /// Query text is parsed leniently, so stray query syntax in a question
    /// never fails the search.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<(Uuid, f32)>> {
        if top_k == 0 || self.len == 0 {
            return Ok(Vec::new());
        }

        let (query, _) = self.parser.parse_query_lenient(query);
        let searcher = self.reader.searcher();
        let hits = searcher
            .search(&query, &TopDocs::with_limit(top_k))
            .map_err(lexical_error)?;

        let mut ranked = Vec::with_capacity(hits.len());
        for (score, address) in hits {
            let doc: TantivyDocument = searcher.doc(address).map_err(lexical_error)?;
            let Some(raw) = doc.get_first(self.id).and_then(|v| v.as_str()) else {
                continue;
            };
            let id = Uuid::parse_str(raw).map_err(lexical_error)?;
            ranked.push((address, id, score));
        }
        ranked.sort_by(|a, b| by_score_desc(a.2, b.2).then(a.0.cmp(&b.0)));

        Ok(ranked.into_iter().map(|(_, id, score)| (id, score)).collect())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_vector_search_orders_best_first() {
        let mut index = VectorIndex::new();
        index.insert("east", vec![1.0, 0.0]).unwrap();
        index.insert("north", vec![0.0, 1.0]).unwrap();
        index.insert("north-east", vec![1.0, 1.0]).unwrap();

        let hits = index.search(&[0.0, 1.0], 2);
        let names: Vec<&str> = hits.iter().map(|(n, _)| **n).collect();
        assert_eq!(names, vec!["north", "north-east"]);
    }

    #[test]
    fn test_vector_ties_keep_insertion_order() {
        let mut index = VectorIndex::new();
        for name in ["a", "b", "c"] {
            index.insert(name, vec![1.0, 0.0]).unwrap();
        }
        let names: Vec<&str> = index.search(&[1.0, 0.0], 3).iter().map(|(n, _)| **n).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_vector_dimension_mismatch() {
        let mut index = VectorIndex::new();
        index.insert(1, vec![1.0, 0.0]).unwrap();
        let err = index.insert(2, vec![1.0]).unwrap_err();
        assert!(matches!(err, AppError::IndexBuild { .. }));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_extend_is_all_or_nothing() {
        let mut index: VectorIndex<u8> = VectorIndex::new();
        assert!(index.extend(vec![1, 2], vec![vec![1.0]]).is_err());
        assert!(index
            .extend(vec![1, 2], vec![vec![1.0, 0.0], vec![1.0]])
            .is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn test_rank_survives_nan_scores() {
        let items: Vec<usize> = (0..40).collect();
        let scored = (0..40)
            .map(|i| (i, if i % 3 == 0 { f32::NAN } else { i as f32 }))
            .collect();
        let ranked = rank(scored, &items, 40);

        assert_eq!(ranked.len(), 40);
        assert_eq!(*ranked[0].0, 38);
        let (real, nan): (Vec<&(&usize, f32)>, Vec<_>) = ranked.iter().partition(|(_, s)| !s.is_nan());
        assert_eq!(nan.len(), 14);
        assert!(real.windows(2).all(|w| w[0].1 >= w[1].1));
        assert!(ranked[..26].iter().all(|(_, s)| !s.is_nan()));
        // NaN ties keep insertion order
        let nan_order: Vec<usize> = nan.iter().map(|(i, _)| **i).collect();
        assert_eq!(nan_order, (0..40).step_by(3).collect::<Vec<_>>());
    }

    fn lexical(texts: &[&str]) -> (LexicalIndex, Vec<Uuid>) {
        let ids: Vec<Uuid> = texts.iter().map(|_| Uuid::new_v4()).collect();
        let index = LexicalIndex::build(ids.iter().copied().zip(texts.iter().copied())).unwrap();
        (index, ids)
    }

    #[test]
    fn test_lexical_prefers_matching_documents() {
        let (index, ids) = lexical(&[
            "Paris is the capital of France.",
            "Berlin is the capital of Germany.",
            "Zebras graze on the savanna.",
        ]);

        let hits = index.search("capital of France", 10).unwrap();
        assert_eq!(hits[0].0, ids[0]);
        assert!(hits.iter().all(|(id, _)| *id != ids[2]));
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_lexical_no_match_is_empty() {
        let (index, _) = lexical(&["alpha beta"]);
        assert!(index.search("gamma", 5).unwrap().is_empty());
        assert!(index.search("alpha", 0).unwrap().is_empty());

        let empty = LexicalIndex::build(Vec::<(Uuid, String)>::new()).unwrap();
        assert!(empty.is_empty());
        assert!(empty.search("alpha", 5).unwrap().is_empty());
    }

    #[test]
    fn test_lexical_tolerates_query_syntax() {
        let (index, ids) = lexical(&["Rust (programming language)", "Go: a language"]);
        let hits = index.search("rust AND (\"programming", 5).unwrap();
        assert_eq!(hits[0].0, ids[0]);
    }

    #[test]
    fn test_lexical_ties_keep_insertion_order() {
        let (index, ids) = lexical(&["river delta", "river delta", "river delta"]);
        let order: Vec<Uuid> = index.search("river", 3).unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, ids);
    }
}
