//! Retrieval evaluation: Recall@k over a BEIR-style query set
//!
//! Reads an existing `queries.jsonl` (`{"_id": ..., "text": ...}` per line)
//! and a relevance file (`qid 0 doc_id rel` or the tab separated
//! `query-id corpus-id score` layout with a header). A query counts as a hit
//! when any relevant document id appears among its first `k` sources.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use hrag_core::{Error, RAGEngine, Result};

/// One evaluation question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EvalQuery {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: String,
}

/// Relevant document ids per query id.
pub type Qrels = BTreeMap<String, BTreeSet<String>>;

/// Parse `queries.jsonl`. Blank lines are skipped.
pub fn parse_queries<R: BufRead>(reader: R) -> Result<Vec<EvalQuery>> {
    let mut queries = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let query: EvalQuery = serde_json::from_str(&line).map_err(|e| {
            Error::Serialization(format!("queries line {}: {}", number + 1, e))
        })?;
        queries.push(query);
    }
    Ok(queries)
}

/// Parse a relevance file. Only positive judgements are kept.
pub fn parse_qrels<R: BufRead>(reader: R) -> Result<Qrels> {
    let mut qrels = Qrels::new();
    let mut first = true;

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() || fields[0].starts_with('#') {
            continue;
        }

        let (query_id, doc_id, relevance) = match fields.as_slice() {
            [q, _, d, r] => (*q, *d, *r),
            [q, d, r] => (*q, *d, *r),
            _ => {
                return Err(Error::Serialization(format!(
                    "qrels line {}: expected 3 or 4 fields, got {}",
                    number + 1,
                    fields.len()
                )));
            }
        };

        let relevance = match relevance.parse::<i64>() {
            Ok(r) => r,
            // `query-id corpus-id score`
            Err(_) if first => {
                first = false;
                continue;
            }
            Err(e) => {
                return Err(Error::Serialization(format!(
                    "qrels line {}: bad relevance '{}': {}",
                    number + 1,
                    relevance,
                    e
                )));
            }
        };
        first = false;

        if relevance > 0 {
            qrels
                .entry(query_id.to_string())
                .or_default()
                .insert(doc_id.to_string());
        }
    }

    Ok(qrels)
}

/// Queries paired with their relevance judgements.
#[derive(Debug, Clone, Default)]
pub struct EvalDataset {
    pub queries: Vec<EvalQuery>,
    pub qrels: Qrels,
}

impl EvalDataset {
    pub fn new(queries: Vec<EvalQuery>, qrels: Qrels) -> Self {
        Self { queries, qrels }
    }

    pub fn load(queries_path: &Path, qrels_path: &Path) -> Result<Self> {
        let queries = parse_queries(BufReader::new(File::open(queries_path)?))?;
        let qrels = parse_qrels(BufReader::new(File::open(qrels_path)?))?;
        Ok(Self::new(queries, qrels))
    }

    /// Queries that have at least one relevant document.
    pub fn judged(&self) -> impl Iterator<Item = (&EvalQuery, &BTreeSet<String>)> {
        self.queries
            .iter()
            .filter_map(|q| self.qrels.get(&q.id).map(|gold| (q, gold)))
    }
}

/// Recall@k for one retrieval mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallReport {
    pub mode: String,
    pub k: usize,
    pub hits: usize,
    pub evaluated: usize,
    /// Queries whose retrieval returned an error (counted as misses).
    pub failed: usize,
    pub recall: f64,
}

/// Run every judged query through `engine.retrieve` and measure Recall@k.
pub async fn recall_at_k(
    engine: &dyn RAGEngine,
    mode: &str,
    dataset: &EvalDataset,
    k: usize,
) -> RecallReport {
    let mut hits = 0;
    let mut evaluated = 0;
    let mut failed = 0;

    for (query, gold) in dataset.judged() {
        evaluated += 1;
        match engine.retrieve(&query.text).await {
            Ok(result) => {
                let found = result
                    .bundle
                    .sources
                    .iter()
                    .take(k)
                    .any(|source| gold.contains(&source.id.to_string()));
                if found {
                    hits += 1;
                }
                debug!(mode, query = %query.id, found, "evaluated query");
            }
            Err(e) => {
                warn!(mode, query = %query.id, error = %e, "retrieval failed during evaluation");
                failed += 1;
            }
        }
    }

    let recall = if evaluated == 0 {
        0.0
    } else {
        hits as f64 / evaluated as f64
    };

    RecallReport {
        mode: mode.to_string(),
        k,
        hits,
        evaluated,
        failed,
        recall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_queries() {
        let input = concat!(
            "{\"_id\": \"q0\", \"text\": \"When are visiting hours?\"}\n",
            "\n",
            "{\"_id\": \"q1\", \"text\": \"Is the emergency ward open at night?\", \"metadata\": {}}\n",
        );
        let queries = parse_queries(Cursor::new(input)).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].id, "q1");
    }

    #[test]
    fn test_parse_queries_reports_line() {
        let err = parse_queries(Cursor::new("{\"_id\": \"q0\", \"text\": \"ok\"}\nnot json\n"))
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_trec_qrels() {
        let qrels = parse_qrels(Cursor::new("q0 0 11 1\nq0 0 12 0\nq1 0 13 2\n")).unwrap();
        assert_eq!(qrels["q0"], BTreeSet::from(["11".to_string()]));
        assert_eq!(qrels["q1"], BTreeSet::from(["13".to_string()]));
    }

    #[test]
    fn test_parse_tsv_qrels_with_header() {
        let qrels =
            parse_qrels(Cursor::new("query-id\tcorpus-id\tscore\nq0\t7\t1\n")).unwrap();
        assert_eq!(qrels.len(), 1);
        assert!(qrels["q0"].contains("7"));
    }

    #[test]
    fn test_bad_relevance_after_header_fails() {
        assert!(parse_qrels(Cursor::new("q0 0 1 1\nq1 0 2 x\n")).is_err());
        assert!(parse_qrels(Cursor::new("q0 1\n")).is_err());
    }
}
