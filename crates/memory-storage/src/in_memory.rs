//! In-process document store.
//!
//! Keeps indices in a map and evaluates the subset of the OpenSearch query
//! language the memory engine emits: `script_score`, `bool`, `knn`,
//! `multi_match` (best_fields), `match`, `term`, `range`, `match_all` and
//! field sorts. Scores are approximations (keyword relevance is a saturated
//! term-frequency sum, k-NN is `1 / (1 + l2²)`), but matching and ordering
//! follow the same rules. Used by tests and offline runs.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use memory_search::{blend_score, parse_timestamp};
use memory_types::apply_access_to_document;

use crate::error::StorageError;
use crate::store::{MemoryStore, SearchHit, SearchResponse};

/// Term-frequency saturation, as in BM25's `k1`.
const TF_SATURATION: f32 = 1.2;

struct IndexData {
    /// Body the index was created with (settings + mappings)
    definition: Value,
    docs: BTreeMap<String, Value>,
}

impl IndexData {
    fn new(definition: Value) -> Self {
        Self {
            definition,
            docs: BTreeMap::new(),
        }
    }

    /// Mapped type of a (possibly dotted) field.
    fn field_type(&self, field: &str) -> Option<&str> {
        let mut props = self.definition.get("mappings")?.get("properties")?;
        let mut parts = field.split('.').peekable();
        loop {
            let part = parts.next()?;
            let def = props.get(part)?;
            if parts.peek().is_none() {
                return def.get("type")?.as_str();
            }
            props = def.get("properties")?;
        }
    }
}

/// [`MemoryStore`] held entirely in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    indices: RwLock<HashMap<String, IndexData>>,
    writes: AtomicUsize,
    access_update_calls: AtomicUsize,
    fail_writes: AtomicBool,
    fail_access_updates: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `index_document` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(AtomicOrdering::SeqCst)
    }

    /// Number of `update_access` calls so far.
    pub fn access_update_calls(&self) -> usize {
        self.access_update_calls.load(AtomicOrdering::SeqCst)
    }

    /// Make every subsequent document write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, AtomicOrdering::SeqCst);
    }

    /// Make every subsequent access update fail.
    pub fn set_fail_access_updates(&self, fail: bool) {
        self.fail_access_updates.store(fail, AtomicOrdering::SeqCst);
    }

    pub async fn document_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .await
            .get(index)
            .map(|i| i.docs.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &Value,
    ) -> Result<(), StorageError> {
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        if self.fail_writes.load(AtomicOrdering::SeqCst) {
            return Err(StorageError::Transport("injected write failure".into()));
        }
        let mut indices = self.indices.write().await;
        let data = indices
            .entry(index.to_string())
            .or_insert_with(|| IndexData::new(json!({})));
        data.docs.insert(id.to_string(), document.clone());
        debug!(index, id, "Stored document in memory");
        Ok(())
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, StorageError> {
        Ok(self
            .indices
            .read()
            .await
            .get(index)
            .and_then(|i| i.docs.get(id).cloned()))
    }

    async fn exists(&self, index: &str, id: &str) -> Result<bool, StorageError> {
        Ok(self
            .indices
            .read()
            .await
            .get(index)
            .map(|i| i.docs.contains_key(id))
            .unwrap_or(false))
    }

    async fn update_access(
        &self,
        index: &str,
        ids: &[String],
        timestamp: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        self.access_update_calls.fetch_add(1, AtomicOrdering::SeqCst);
        if self.fail_access_updates.load(AtomicOrdering::SeqCst) {
            return Err(StorageError::Transport("injected access update failure".into()));
        }
        let mut indices = self.indices.write().await;
        let Some(data) = indices.get_mut(index) else {
            return Ok(0);
        };
        let mut updated = 0;
        for id in ids {
            if let Some(Value::Object(doc)) = data.docs.get_mut(id) {
                apply_access_to_document(doc, timestamp);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, StorageError> {
        let indices = self.indices.read().await;
        let data = indices
            .get(index)
            .ok_or_else(|| StorageError::IndexNotFound(index.to_string()))?;
        run_search(data, body)
    }

    async fn index_exists(&self, index: &str) -> Result<bool, StorageError> {
        Ok(self.indices.read().await.contains_key(index))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), StorageError> {
        let mut indices = self.indices.write().await;
        if indices.contains_key(index) {
            return Err(StorageError::Status {
                status: 400,
                body: format!("resource_already_exists_exception: {}", index),
            });
        }
        indices.insert(index.to_string(), IndexData::new(body.clone()));
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> Result<Value, StorageError> {
        let indices = self.indices.read().await;
        let data = indices
            .get(index)
            .ok_or_else(|| StorageError::IndexNotFound(index.to_string()))?;
        let mappings = data
            .definition
            .get("mappings")
            .cloned()
            .unwrap_or_else(|| json!({}));
        Ok(json!({ index: { "mappings": mappings } }))
    }
}

fn unsupported(what: impl Into<String>) -> StorageError {
    StorageError::UnsupportedQuery(what.into())
}

fn run_search(data: &IndexData, body: &Value) -> Result<SearchResponse, StorageError> {
    let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
    let match_all = json!({ "match_all": {} });
    let query = body.get("query").unwrap_or(&match_all);
    let sort = parse_sort(body.get("sort"))?;

    let mut eval = Evaluator {
        data,
        knn: HashMap::new(),
    };
    eval.prepare_knn(query)?;

    let mut matched: Vec<(&str, &Value, f32)> = Vec::new();
    for (id, doc) in &data.docs {
        if let Some(score) = eval.score(query, id, doc)? {
            matched.push((id.as_str(), doc, score));
        }
    }
    let total = matched.len() as u64;

    if sort.is_empty() {
        matched.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
    } else {
        matched.sort_by(|a, b| compare_by_sort(&sort, a.1, b.1).then_with(|| a.0.cmp(b.0)));
    }

    let hits = matched
        .into_iter()
        .take(size)
        .map(|(id, doc, score)| SearchHit {
            id: id.to_string(),
            score: if sort.is_empty() { Some(score) } else { None },
            source: doc.clone(),
        })
        .collect();

    Ok(SearchResponse { total, hits })
}

struct Evaluator<'a> {
    data: &'a IndexData,
    /// k-NN clause address -> doc id -> similarity, for the top k docs
    knn: HashMap<usize, HashMap<&'a str, f32>>,
}

impl<'a> Evaluator<'a> {
    /// Resolve every k-NN clause to its global top-k before matching.
    fn prepare_knn(&mut self, query: &Value) -> Result<(), StorageError> {
        let Some(obj) = query.as_object() else {
            return Ok(());
        };
        for (kind, spec) in obj {
            match kind.as_str() {
                "knn" => {
                    let scores = self.knn_top_k(spec)?;
                    self.knn.insert(query as *const Value as usize, scores);
                }
                "bool" => {
                    for key in ["must", "should", "filter", "must_not"] {
                        for clause in clauses(spec.get(key)) {
                            self.prepare_knn(clause)?;
                        }
                    }
                }
                "script_score" => {
                    if let Some(inner) = spec.get("query") {
                        self.prepare_knn(inner)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn knn_top_k(&self, spec: &Value) -> Result<HashMap<&'a str, f32>, StorageError> {
        let (field, params) = single_entry(spec).ok_or_else(|| unsupported("empty knn clause"))?;
        let vector = as_vector(params.get("vector"))
            .ok_or_else(|| unsupported("knn clause without vector"))?;
        let k = params.get("k").and_then(Value::as_u64).unwrap_or(10) as usize;

        let mut scored: Vec<(&'a str, f32)> = self
            .data
            .docs
            .iter()
            .filter_map(|(id, doc)| {
                let candidate = as_vector(field_path(doc, field))?;
                if candidate.len() != vector.len() {
                    return None;
                }
                let dist: f32 = vector
                    .iter()
                    .zip(&candidate)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                Some((id.as_str(), 1.0 / (1.0 + dist)))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        scored.truncate(k);
        Ok(scored.into_iter().collect())
    }

    /// Score of `doc` under `query`, or `None` when it does not match.
    fn score(&self, query: &Value, id: &str, doc: &Value) -> Result<Option<f32>, StorageError> {
        let (kind, spec) =
            single_entry(query).ok_or_else(|| unsupported(format!("malformed query {}", query)))?;
        let boost = spec.get("boost").and_then(Value::as_f64).unwrap_or(1.0) as f32;

        let score = match kind {
            "match_all" => Some(1.0),
            "term" => self.term(spec, doc)?,
            "range" => self.range(spec, doc)?,
            "match" => self.match_query(spec, doc)?,
            "multi_match" => self.multi_match(spec, doc)?,
            "knn" => {
                let clause_boost = single_entry(spec)
                    .and_then(|(_, p)| p.get("boost"))
                    .and_then(Value::as_f64)
                    .unwrap_or(1.0) as f32;
                self.knn
                    .get(&(query as *const Value as usize))
                    .and_then(|scores| scores.get(id))
                    .map(|s| s * clause_boost)
            }
            "bool" => self.bool_query(spec, id, doc)?,
            "script_score" => self.script_score(spec, id, doc)?,
            other => return Err(unsupported(format!("query type '{}'", other))),
        };

        // knn carries its boost inside the field spec
        Ok(match kind {
            "knn" => score,
            _ => score.map(|s| s * boost),
        })
    }

    fn term(&self, spec: &Value, doc: &Value) -> Result<Option<f32>, StorageError> {
        let (field, target) = single_entry(spec).ok_or_else(|| unsupported("empty term"))?;
        let target = target.get("value").unwrap_or(target);
        let found = field_values(doc, field)
            .into_iter()
            .any(|v| values_equal(v, target));
        Ok(found.then_some(1.0))
    }

    fn range(&self, spec: &Value, doc: &Value) -> Result<Option<f32>, StorageError> {
        let (field, bounds) = single_entry(spec).ok_or_else(|| unsupported("empty range"))?;
        let bounds = bounds
            .as_object()
            .ok_or_else(|| unsupported("range bounds must be an object"))?;

        let satisfies = |value: &Value| {
            bounds.iter().all(|(op, bound)| {
                let Some(ord) = compare_values(value, bound) else {
                    return false;
                };
                match op.as_str() {
                    "gte" => ord != Ordering::Less,
                    "gt" => ord == Ordering::Greater,
                    "lte" => ord != Ordering::Greater,
                    "lt" => ord == Ordering::Less,
                    // format, time_zone and friends do not constrain
                    _ => true,
                }
            })
        };

        let found = field_values(doc, field).into_iter().any(satisfies);
        Ok(found.then_some(1.0))
    }

    fn match_query(&self, spec: &Value, doc: &Value) -> Result<Option<f32>, StorageError> {
        let (field, query) = single_entry(spec).ok_or_else(|| unsupported("empty match"))?;
        let text = match query {
            Value::Object(o) => o.get("query").and_then(Value::as_str).unwrap_or_default(),
            Value::String(s) => s.as_str(),
            _ => return Err(unsupported("match query must be text")),
        };
        let score = self.field_text_score(field, text, doc);
        Ok((score > 0.0).then_some(score))
    }

    fn multi_match(&self, spec: &Value, doc: &Value) -> Result<Option<f32>, StorageError> {
        let text = spec
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| unsupported("multi_match without query"))?;
        match spec.get("type").and_then(Value::as_str) {
            None | Some("best_fields") => {}
            Some(other) => return Err(unsupported(format!("multi_match type '{}'", other))),
        }
        let fields = spec
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| unsupported("multi_match without fields"))?;

        let mut best = 0.0f32;
        for field in fields.iter().filter_map(Value::as_str) {
            let (name, boost) = parse_field_boost(field);
            best = best.max(boost * self.field_text_score(name, text, doc));
        }
        Ok((best > 0.0).then_some(best))
    }

    fn bool_query(&self, spec: &Value, id: &str, doc: &Value) -> Result<Option<f32>, StorageError> {
        let must = clauses(spec.get("must"));
        let filter = clauses(spec.get("filter"));
        let should = clauses(spec.get("should"));
        let must_not = clauses(spec.get("must_not"));

        let mut total = 0.0f32;
        for clause in &must {
            match self.score(clause, id, doc)? {
                Some(s) => total += s,
                None => return Ok(None),
            }
        }
        for clause in &filter {
            if self.score(clause, id, doc)?.is_none() {
                return Ok(None);
            }
        }
        for clause in &must_not {
            if self.score(clause, id, doc)?.is_some() {
                return Ok(None);
            }
        }

        let default_msm = if must.is_empty() && filter.is_empty() && !should.is_empty() {
            1
        } else {
            0
        };
        let msm = match spec.get("minimum_should_match") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as usize,
            Some(Value::String(s)) => s.trim().parse::<usize>().unwrap_or(default_msm),
            _ => default_msm,
        };

        let mut matched = 0;
        for clause in &should {
            if let Some(s) = self.score(clause, id, doc)? {
                matched += 1;
                total += s;
            }
        }
        if matched < msm {
            return Ok(None);
        }
        Ok(Some(total))
    }

    fn script_score(
        &self,
        spec: &Value,
        id: &str,
        doc: &Value,
    ) -> Result<Option<f32>, StorageError> {
        let inner = spec
            .get("query")
            .ok_or_else(|| unsupported("script_score without query"))?;
        let Some(score) = self.score(inner, id, doc)? else {
            return Ok(None);
        };
        let params = spec
            .get("script")
            .and_then(|s| s.get("params"))
            .cloned()
            .unwrap_or_else(|| json!({}));
        let weight = |key: &str, default: f32| {
            params
                .get(key)
                .and_then(Value::as_f64)
                .map(|v| v as f32)
                .unwrap_or(default)
        };

        if let Some(query_vector) = as_vector(params.get("query_vector")) {
            let cosine = as_vector(field_path(doc, "embedding"))
                .map(|emb| cosine(&query_vector, &emb))
                .unwrap_or(0.0);
            let blended = blend_score(
                weight("vector_weight", 1.0),
                weight("keyword_weight", 0.0),
                cosine,
                score,
            );
            return Ok(Some(blended));
        }
        if params.get("keyword_weight").is_some() {
            return Ok(Some(weight("keyword_weight", 1.0) * score));
        }
        Err(unsupported("script_score script without recognised params"))
    }

    /// Relevance of one field for `text`.
    ///
    /// Keyword-mapped fields match only on the whole value; text fields sum
    /// a saturated term frequency per distinct query term.
    fn field_text_score(&self, field: &str, text: &str, doc: &Value) -> f32 {
        let values: Vec<String> = field_values(doc, field)
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect();
        if values.is_empty() {
            return 0.0;
        }

        if self.data.field_type(field) == Some("keyword") {
            return if values.iter().any(|v| v == text) {
                1.0
            } else {
                0.0
            };
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for value in &values {
            for token in tokenize(value) {
                *counts.entry(token).or_default() += 1;
            }
        }
        let terms: HashSet<String> = tokenize(text).collect();
        terms
            .iter()
            .filter_map(|t| counts.get(t))
            .map(|&tf| {
                let tf = tf as f32;
                tf * (TF_SATURATION + 1.0) / (tf + TF_SATURATION)
            })
            .sum()
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// `"title^2"` -> `("title", 2.0)`
fn parse_field_boost(field: &str) -> (&str, f32) {
    match field.split_once('^') {
        Some((name, boost)) => (name, boost.parse().unwrap_or(1.0)),
        None => (field, 1.0),
    }
}

/// The single `(key, value)` of a one-key object.
fn single_entry(value: &Value) -> Option<(&str, &Value)> {
    let obj = value.as_object()?;
    obj.iter().next().map(|(k, v)| (k.as_str(), v))
}

/// A clause list: an array, a single clause, or nothing.
fn clauses(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v @ Value::Object(_)) => vec![v],
        _ => Vec::new(),
    }
}

fn field_path<'v>(doc: &'v Value, field: &str) -> Option<&'v Value> {
    field
        .split('.')
        .try_fold(doc, |current, part| current.get(part))
}

/// Leaf values at `field`, with arrays flattened.
fn field_values<'v>(doc: &'v Value, field: &str) -> Vec<&'v Value> {
    match field_path(doc, field) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(v) => vec![v],
    }
}

fn as_vector(value: Option<&Value>) -> Option<Vec<f32>> {
    value?
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(x), Value::String(y)) | (Value::String(y), Value::Number(x)) => {
            y.parse::<f64>().ok() == x.as_f64()
        }
        _ => a == b,
    }
}

/// Order two scalars: numbers numerically, timestamps chronologically,
/// other strings lexically.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        _ => None,
    }
}

/// `(field, descending)` pairs.
fn parse_sort(sort: Option<&Value>) -> Result<Vec<(String, bool)>, StorageError> {
    let Some(sort) = sort else {
        return Ok(Vec::new());
    };
    let entries: Vec<&Value> = match sort {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    entries
        .into_iter()
        .map(|entry| match entry {
            Value::String(field) => Ok((field.clone(), false)),
            Value::Object(_) => {
                let (field, spec) =
                    single_entry(entry).ok_or_else(|| unsupported("empty sort entry"))?;
                let order = match spec {
                    Value::String(s) => s.as_str(),
                    Value::Object(o) => o.get("order").and_then(Value::as_str).unwrap_or("asc"),
                    _ => "asc",
                };
                Ok((field.to_string(), order.eq_ignore_ascii_case("desc")))
            }
            _ => Err(unsupported("sort entry must be a string or object")),
        })
        .collect()
}

fn compare_by_sort(sort: &[(String, bool)], a: &Value, b: &Value) -> Ordering {
    for (field, desc) in sort {
        let va = field_values(a, field).into_iter().next();
        let vb = field_values(b, field).into_iter().next();
        // Missing values sort last regardless of direction
        let ord = match (va, vb) {
            (Some(x), Some(y)) => {
                let ord = compare_values(x, y).unwrap_or(Ordering::Equal);
                if *desc {
                    ord.reverse()
                } else {
                    ord
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
