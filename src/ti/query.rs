//! Filter input, boolean query construction, sort-axis evaluation and
//! in-process keyset pagination shared by the three entity searches.
//!
//! Tantivy has no `search_after`/`sort`+`size` surface like the external
//! interface this crate is modelled on, so the Text Index asks for a
//! generous bounded candidate pool via [`TopDocs`], evaluates the active
//! sort axis for every hit in Rust, and pages by comparing sort-key tuples
//! against the caller's decoded cursor — "in-process keyset pagination"
//! per the design notes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, RangeQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Term};
use tantivy::{DocAddress, Score, Searcher, TantivyDocument};
use uuid::Uuid;

use crate::types::sort::SortValue;
use crate::vi::Candidate;

use super::error::{Error, Result};

/// Upper bound on how many matches are pulled from tantivy before in-process
/// sorting and keyset filtering. The system does not expect result sets
/// beyond this to be paged through meaningfully; it bounds worst-case query
/// cost rather than correctness.
pub const CANDIDATE_POOL_CAP: usize = 10_000;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 100;

/// Normalises a caller-supplied limit per the boundary rule: `<= 0` becomes
/// the default, `> 100` is clamped.
pub fn normalise_limit(limit: i64) -> usize {
    if limit <= 0 {
        DEFAULT_LIMIT
    } else if limit > MAX_LIMIT as i64 {
        MAX_LIMIT
    } else {
        limit as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Desc
    }
}

/// A single `must`/`must_not`/`should` predicate to fold into the boolean
/// query, expressed against a pre-resolved tantivy field.
pub enum Clause {
    Term(Field, String),
    /// At least one of the given values must match `field` — used to
    /// constrain a query to the UUID set returned by a Vector Index
    /// similarity lookup.
    TermsAny(Field, Vec<String>),
    Range(Field, i64, i64),
    Match { field: Field, text: String, boost: f32 },
}

pub struct QueryPlan {
    pub must: Vec<Clause>,
    pub must_not: Vec<Clause>,
    pub should: Vec<Clause>,
}

/// Builds the tantivy [`BooleanQuery`] from the three buckets. `should`
/// clauses contribute to relevance but never constrain the result set: at
/// least the `must` clauses alone are sufficient, matching the contract
/// that `should` is "soft relevance", never a hard filter.
pub fn build_query(plan: &QueryPlan) -> Result<Box<dyn Query>> {
    let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();

    for clause in &plan.must {
        subqueries.push((Occur::Must, clause_to_query(clause)?));
    }
    for clause in &plan.must_not {
        subqueries.push((Occur::MustNot, clause_to_query(clause)?));
    }
    for clause in &plan.should {
        subqueries.push((Occur::Should, clause_to_query(clause)?));
    }

    if subqueries.is_empty() {
        return Ok(Box::new(tantivy::query::AllQuery));
    }

    Ok(Box::new(BooleanQuery::new(subqueries)))
}

fn clause_to_query(clause: &Clause) -> Result<Box<dyn Query>> {
    Ok(match clause {
        Clause::Term(field, value) => {
            let term = Term::from_field_text(*field, value);
            Box::new(TermQuery::new(term, IndexRecordOption::Basic))
        }
        Clause::TermsAny(field, values) => {
            let terms: Vec<(Occur, Box<dyn Query>)> = values
                .iter()
                .map(|v| {
                    let term = Term::from_field_text(*field, v);
                    (
                        Occur::Should,
                        Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>,
                    )
                })
                .collect();
            Box::new(BooleanQuery::new(terms))
        }
        Clause::Range(field, from, to) => Box::new(RangeQuery::new_i64_bounds(
            *field,
            std::ops::Bound::Included(*from),
            std::ops::Bound::Included(*to),
        )),
        Clause::Match { field, text, boost } => {
            // English analysis happens at index time via the field's own
            // tokenizer; matching re-tokenizes the query text the same way
            // by splitting on whitespace and querying each term, which is
            // sufficient since the analyzer already folds case and strips
            // basic punctuation.
            let terms: Vec<Box<dyn Query>> = text
                .split_whitespace()
                .map(|word| {
                    let term = Term::from_field_text(*field, &word.to_lowercase());
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>
                })
                .collect();
            let base: Box<dyn Query> = if terms.len() == 1 {
                terms.into_iter().next().unwrap()
            } else {
                Box::new(BooleanQuery::new(
                    terms.into_iter().map(|q| (Occur::Should, q)).collect(),
                ))
            };
            Box::new(BoostQuery::new(base, *boost))
        }
    })
}

/// The evaluated sort key for one hit, always terminated by the internal
/// `id` as a deterministic tiebreak (ascending, regardless of the active
/// axis's direction).
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey(pub Vec<SortValue>);

impl SortKey {
    /// Strict "comes after" comparison honouring per-axis direction on the
    /// leading value and ascending order on the trailing id tiebreak.
    fn is_strictly_after(&self, cursor: &[SortValue], direction: Direction) -> Result<bool> {
        if self.0.len() != cursor.len() {
            return Err(Error::CursorMismatch);
        }
        for (i, (mine, theirs)) in self.0.iter().zip(cursor.iter()).enumerate() {
            let is_last = i + 1 == self.0.len();
            let ordering = compare_sort_value(mine, theirs)?;
            if ordering == std::cmp::Ordering::Equal {
                continue;
            }
            let wants_greater = if is_last {
                true // id tiebreak is always ascending
            } else {
                direction == Direction::Desc
            };
            return Ok(if wants_greater {
                ordering == std::cmp::Ordering::Greater
            } else {
                ordering == std::cmp::Ordering::Less
            });
        }
        Ok(false)
    }
}

fn compare_sort_value(a: &SortValue, b: &SortValue) -> Result<std::cmp::Ordering> {
    use SortValue::*;
    Ok(match (a, b) {
        (Str(x), Str(y)) => x.cmp(y),
        (I64(x), I64(y)) => x.cmp(y),
        (F64(x), F64(y)) => x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal),
        (Bool(x), Bool(y)) => x.cmp(y),
        (Timestamp(x), Timestamp(y)) => x.cmp(y),
        _ => return Err(Error::CursorMismatch),
    })
}

/// Deterministic pseudo-random value in `[0, 1)` for a given seed and
/// document uuid, used for the `random` sort axis. The same `(seed, uuid)`
/// pair always yields the same value, so paging through a random-sorted
/// query is stable across requests.
pub fn deterministic_random(seed: u64, uuid: Uuid) -> f64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    uuid.hash(&mut hasher);
    let bits = hasher.finish();
    (bits as f64) / (u64::MAX as f64)
}

/// One hydrated hit: the full stored payload plus the evaluated sort key
/// used to build the next cursor.
pub struct Hit<D> {
    pub doc: D,
    pub score: f32,
    pub sort_key: SortKey,
}

pub struct Page<D> {
    pub hits: Vec<Hit<D>>,
    pub has_more: bool,
    pub total_hits: Option<usize>,
}

/// Collects up to [`CANDIDATE_POOL_CAP`] raw matches, deserialises the
/// stored payload field on each via `extract`, evaluates `sort_key` for
/// each, sorts by that key, drops everything at or before `after` (if a
/// decoded cursor was supplied), and returns exactly one page of `limit`
/// items plus whether more remain.
pub fn paginate<D>(
    searcher: &Searcher,
    query: &dyn Query,
    limit: usize,
    after: Option<&[SortValue]>,
    direction: Direction,
    track_total_hits: bool,
    mut extract: impl FnMut(&TantivyDocument) -> Result<D>,
    mut sort_key_of: impl FnMut(&D, &TantivyDocument, Score) -> SortKey,
) -> Result<Page<D>> {
    let top_docs = searcher.search(query, &TopDocs::with_limit(CANDIDATE_POOL_CAP))?;

    let mut hits = Vec::with_capacity(top_docs.len());
    for (score, address) in top_docs {
        let retrieved: TantivyDocument = searcher.doc(address)?;
        let doc = extract(&retrieved)?;
        let sort_key = sort_key_of(&doc, &retrieved, score);
        hits.push(Hit { doc, score, sort_key });
    }

    sort_hits(&mut hits, direction);

    if let Some(cursor) = after {
        let mut filtered = Vec::with_capacity(hits.len());
        for hit in hits {
            if hit.sort_key.is_strictly_after(cursor, direction)? {
                filtered.push(hit);
            }
        }
        hits = filtered;
    }

    let total_hits = if track_total_hits {
        Some(hits.len())
    } else {
        None
    };

    let has_more = hits.len() > limit;
    hits.truncate(limit);

    Ok(Page {
        hits,
        has_more,
        total_hits,
    })
}

fn sort_hits<D>(hits: &mut [Hit<D>], direction: Direction) {
    hits.sort_by(|a, b| {
        for (i, (x, y)) in a.sort_key.0.iter().zip(b.sort_key.0.iter()).enumerate() {
            let is_last = i + 1 == a.sort_key.0.len();
            let ordering = compare_sort_value(x, y).unwrap_or(std::cmp::Ordering::Equal);
            if ordering == std::cmp::Ordering::Equal {
                continue;
            }
            return if is_last {
                ordering // ascending id tiebreak
            } else if direction == Direction::Desc {
                ordering.reverse()
            } else {
                ordering
            };
        }
        std::cmp::Ordering::Equal
    });
}

/// Filters and reweights vector-index candidates ahead of being folded into
/// a text query: drops anything under `min_score`, if supplied.
pub fn apply_similarity_threshold(
    candidates: Vec<Candidate>,
    min_score: Option<f32>,
) -> Vec<Candidate> {
    match min_score {
        Some(threshold) => candidates
            .into_iter()
            .filter(|c| c.score >= threshold)
            .collect(),
        None => candidates,
    }
}

pub fn millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}
