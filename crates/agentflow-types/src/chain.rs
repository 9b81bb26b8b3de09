//! Chain context: the immutable accumulator of step outputs for one run.
//!
//! Every "mutating" operation returns a new `ChainContext`; nothing is
//! changed in place. The context is serialized into `state_data` so a
//! paused run can be re-hydrated in another process.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::prompt::{format_entries, format_section};

/// Metadata key recording why the run last paused.
pub const META_PAUSE_REASON: &str = "pause_reason";
/// Metadata key recording the approval that resumed the run.
pub const META_RESUME_DATA: &str = "resume_data";
/// Metadata flag set by [`ChainContext::filter`].
pub const META_FILTERED: &str = "filtered";

/// Output recorded for one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// The step's output map.
    pub output: Map<String, Value>,
    /// Node (or handler) that produced the output.
    pub producer_id: String,
    /// When the step finished.
    pub completed_at: DateTime<Utc>,
}

/// Immutable accumulated record of all step outputs and metadata for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainContext {
    #[serde(default, with = "indexed_steps")]
    step_outputs: BTreeMap<usize, StepRecord>,
    #[serde(default)]
    accumulated_context: Map<String, Value>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl ChainContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step output, stamped with the current time.
    pub fn with_step_output(
        &self,
        index: usize,
        output: Map<String, Value>,
        producer_id: impl Into<String>,
    ) -> Self {
        self.with_step_record(
            index,
            StepRecord {
                output,
                producer_id: producer_id.into(),
                completed_at: Utc::now(),
            },
        )
    }

    /// Record a fully specified step.
    ///
    /// `accumulated_context["step_{index}"]` is overwritten when an index is
    /// reused: last write wins.
    pub fn with_step_record(&self, index: usize, record: StepRecord) -> Self {
        let mut next = self.clone();
        next.accumulated_context
            .insert(format!("step_{index}"), Value::Object(record.output.clone()));
        next.step_outputs.insert(index, record);
        next
    }

    /// Narrow what each step shows.
    ///
    /// A non-empty `include` keeps only the listed keys, then `exclude`
    /// removes keys. `accumulated_context` is left untouched and
    /// `metadata.filtered` is set.
    pub fn filter(&self, include: &[&str], exclude: &[&str]) -> Self {
        let mut next = self.clone();
        for record in next.step_outputs.values_mut() {
            record.output = filter_map(&record.output, include, exclude);
        }
        next.metadata
            .insert(META_FILTERED.to_string(), Value::Bool(true));
        next
    }

    /// Return a copy with one metadata entry set.
    pub fn with_metadata(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.metadata.insert(key.into(), value);
        next
    }

    pub fn step_output(&self, index: usize) -> Option<&StepRecord> {
        self.step_outputs.get(&index)
    }

    pub fn step_outputs(&self) -> &BTreeMap<usize, StepRecord> {
        &self.step_outputs
    }

    pub fn accumulated_context(&self) -> &Map<String, Value> {
        &self.accumulated_context
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Index the next executed step should use.
    pub fn next_step_index(&self) -> usize {
        self.step_outputs
            .keys()
            .next_back()
            .map(|last| last + 1)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.step_outputs.is_empty() && self.metadata.is_empty()
    }

    /// Render as prompt text: previous step outputs, accumulated context,
    /// chain metadata. Empty sections are omitted.
    pub fn to_prompt_string(&self) -> String {
        let mut sections = Vec::new();

        if !self.step_outputs.is_empty() {
            let steps = self
                .step_outputs
                .iter()
                .map(|(index, record)| {
                    let body = format_entries(&record.output);
                    if body.is_empty() {
                        format!("### Step {}", index + 1)
                    } else {
                        format!("### Step {}\n{}", index + 1, body)
                    }
                })
                .collect::<Vec<_>>()
                .join("\n\n");
            sections.push(format!("## Previous Step Outputs\n\n{steps}"));
        }

        sections.extend(format_section("Accumulated Context", &self.accumulated_context));
        sections.extend(format_section("Chain Metadata", &self.metadata));

        sections.join("\n\n")
    }

    /// Crude token estimate: a quarter of the rendered character count,
    /// rounded up.
    pub fn token_estimate(&self) -> usize {
        self.to_prompt_string().chars().count().div_ceil(4)
    }

    /// Flattened JSON view that condition paths walk.
    ///
    /// Shape:
    /// ```json
    /// {
    ///   "steps": { "0": { "output": {...}, "producer_id": "...", "completed_at": "..." } },
    ///   "accumulated_context": {...},
    ///   "metadata": {...},
    ///   "pause_reason": <metadata.pause_reason or null>,
    ///   "resume_data": <metadata.resume_data or null>
    /// }
    /// ```
    pub fn to_evaluation_value(&self) -> Value {
        let mut steps = Map::new();
        for (index, record) in &self.step_outputs {
            steps.insert(
                index.to_string(),
                json!({
                    "output": record.output,
                    "producer_id": record.producer_id,
                    "completed_at": record.completed_at.to_rfc3339(),
                }),
            );
        }

        json!({
            "steps": steps,
            "accumulated_context": self.accumulated_context,
            "metadata": self.metadata,
            "pause_reason": self.metadata.get(META_PAUSE_REASON).cloned().unwrap_or(Value::Null),
            "resume_data": self.metadata.get(META_RESUME_DATA).cloned().unwrap_or(Value::Null),
        })
    }
}

/// Step outputs persist as a list of `{index, output, producer_id,
/// completed_at}` entries. Integer map keys do not survive a round trip
/// through a struct that uses `#[serde(flatten)]`, which `StateData` does.
mod indexed_steps {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::{Map, Value};

    use super::StepRecord;

    #[derive(Serialize)]
    struct IndexedRef<'a> {
        index: usize,
        #[serde(flatten)]
        record: &'a StepRecord,
    }

    #[derive(Deserialize)]
    struct Indexed {
        index: usize,
        output: Map<String, Value>,
        producer_id: String,
        completed_at: DateTime<Utc>,
    }

    pub fn serialize<S: Serializer>(
        steps: &BTreeMap<usize, StepRecord>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            steps
                .iter()
                .map(|(index, record)| IndexedRef { index: *index, record }),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<usize, StepRecord>, D::Error> {
        let entries = Vec::<Indexed>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                (
                    entry.index,
                    StepRecord {
                        output: entry.output,
                        producer_id: entry.producer_id,
                        completed_at: entry.completed_at,
                    },
                )
            })
            .collect())
    }
}

fn filter_map(
    output: &Map<String, Value>,
    include: &[&str],
    exclude: &[&str],
) -> Map<String, Value> {
    output
        .iter()
        .filter(|(key, _)| include.is_empty() || include.contains(&key.as_str()))
        .filter(|(key, _)| !exclude.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn sample() -> ChainContext {
        ChainContext::new()
            .with_step_output(0, map(json!({"score": 85, "summary": "ok", "raw": "x"})), "analyze")
            .with_step_output(1, map(json!({"title": "Logo", "raw": "y"})), "draft")
    }

    #[test]
    fn test_with_step_output_does_not_mutate_original() {
        let base = ChainContext::new();
        let next = base.with_step_output(0, map(json!({"a": 1})), "p");

        assert!(base.step_outputs().is_empty());
        assert!(base.accumulated_context().is_empty());
        assert_eq!(next.step_output(0).unwrap().producer_id, "p");
        assert_eq!(next.accumulated_context()["step_0"], json!({"a": 1}));
    }

    #[test]
    fn test_reused_index_is_last_write_wins() {
        let ctx = ChainContext::new()
            .with_step_output(0, map(json!({"a": 1})), "first")
            .with_step_output(0, map(json!({"b": 2})), "second");

        assert_eq!(ctx.accumulated_context()["step_0"], json!({"b": 2}));
        assert_eq!(ctx.step_output(0).unwrap().producer_id, "second");
        assert_eq!(ctx.step_outputs().len(), 1);
    }

    #[test]
    fn test_filter_narrows_steps_but_not_accumulated() {
        let ctx = sample();
        let filtered = ctx.filter(&["score", "title", "raw"], &["raw"]);

        assert_eq!(
            filtered.step_output(0).unwrap().output,
            map(json!({"score": 85}))
        );
        assert_eq!(
            filtered.step_output(1).unwrap().output,
            map(json!({"title": "Logo"}))
        );
        assert_eq!(filtered.accumulated_context(), ctx.accumulated_context());
        assert_eq!(filtered.metadata()[META_FILTERED], json!(true));
        // original untouched
        assert!(ctx.metadata().get(META_FILTERED).is_none());
    }

    #[test]
    fn test_filter_is_commutative_with_step_scope() {
        let ctx = sample();
        let include = ["score", "summary"];
        let exclude = ["summary"];

        let via_context = ctx.filter(&include, &exclude).step_output(0).unwrap().output.clone();
        let direct = filter_map(&ctx.step_output(0).unwrap().output, &include, &exclude);
        assert_eq!(via_context, direct);
    }

    #[test]
    fn test_empty_include_keeps_everything_except_excluded() {
        let filtered = sample().filter(&[], &["raw"]);
        assert_eq!(
            filtered.step_output(0).unwrap().output,
            map(json!({"score": 85, "summary": "ok"}))
        );
    }

    #[test]
    fn test_prompt_sections_in_fixed_order() {
        let ctx = sample().with_metadata("source", json!("work_order"));
        let prompt = ctx.to_prompt_string();

        let steps = prompt.find("## Previous Step Outputs").unwrap();
        let acc = prompt.find("## Accumulated Context").unwrap();
        let meta = prompt.find("## Chain Metadata").unwrap();
        assert!(steps < acc && acc < meta);
        assert!(prompt.contains("### Step 1\n"));
        assert!(prompt.contains("**Score:** 85"));
        assert!(prompt.contains("**Source:** work_order"));
    }

    #[test]
    fn test_prompt_omits_empty_sections() {
        assert_eq!(ChainContext::new().to_prompt_string(), "");

        let meta_only = ChainContext::new().with_metadata("pause_reason", json!("review"));
        let prompt = meta_only.to_prompt_string();
        assert!(prompt.starts_with("## Chain Metadata"));
        assert!(!prompt.contains("Previous Step Outputs"));
        assert!(!prompt.contains("Accumulated Context"));
    }

    #[test]
    fn test_token_estimate_is_ceil_quarter_length() {
        let ctx = sample();
        let len = ctx.to_prompt_string().chars().count();
        assert_eq!(ctx.token_estimate(), len.div_ceil(4));
        assert_eq!(ChainContext::new().token_estimate(), 0);
    }

    #[test]
    fn test_token_estimate_is_monotonic_when_adding_steps() {
        let mut ctx = ChainContext::new();
        let mut previous = ctx.token_estimate();
        for i in 0..6 {
            ctx = ctx.with_step_output(i, map(json!({ "k": i })), "p");
            let estimate = ctx.token_estimate();
            assert!(estimate >= previous);
            previous = estimate;
        }
        // empty output still adds a step heading
        let with_empty = ctx.with_step_output(6, Map::new(), "p");
        assert!(with_empty.token_estimate() >= previous);
    }

    #[test]
    fn test_evaluation_value_shape() {
        let ctx = sample().with_metadata(META_PAUSE_REASON, json!("approval"));
        let value = ctx.to_evaluation_value();

        assert_eq!(value["steps"]["0"]["output"]["score"], json!(85));
        assert_eq!(value["steps"]["1"]["producer_id"], json!("draft"));
        assert_eq!(value["accumulated_context"]["step_1"]["title"], json!("Logo"));
        assert_eq!(value["pause_reason"], json!("approval"));
        assert_eq!(value["resume_data"], Value::Null);
    }

    #[test]
    fn test_next_step_index_follows_highest() {
        assert_eq!(ChainContext::new().next_step_index(), 0);
        assert_eq!(sample().next_step_index(), 2);
    }

    #[test]
    fn test_serde_keeps_step_indexes() {
        let ctx = sample();
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["step_outputs"][1]["index"], json!(1));
        assert_eq!(json["step_outputs"][1]["producer_id"], json!("draft"));
        let restored: ChainContext = serde_json::from_value(json).unwrap();
        assert_eq!(restored, ctx);
    }
}
