use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Epoch milliseconds.
pub type Millis = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "String")]
pub enum StepType {
    /// Waiting period before the first sitting.
    PreStart,
    Zazen,
    Kinhin,
}

impl StepType {
    /// Parse a wire tag. Unknown tags fall back to `Zazen`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "preStart" => StepType::PreStart,
            "kinhin" => StepType::Kinhin,
            _ => StepType::Zazen,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            StepType::PreStart => "preStart",
            StepType::Zazen => "zazen",
            StepType::Kinhin => "kinhin",
        }
    }

    /// Human-readable name shown in status lines.
    pub fn label(&self) -> &'static str {
        match self {
            StepType::PreStart => "Waiting",
            StepType::Zazen => "Zazen",
            StepType::Kinhin => "Kinhin",
        }
    }
}

impl From<String> for StepType {
    fn from(tag: String) -> Self {
        StepType::from_tag(&tag)
    }
}

/// A step as it arrives from a caller or from persisted state.
///
/// Accepts both the compact `{"t": .., "d": ..}` shape and the preset shape
/// `{"type": .., "durationSeconds": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStep {
    #[serde(rename = "t", alias = "type", default = "default_tag")]
    pub step_type: String,
    #[serde(rename = "d", alias = "durationSeconds", default)]
    pub duration_seconds: i64,
}

fn default_tag() -> String {
    StepType::Zazen.tag().to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSession {
    Compact(Vec<RawStep>),
    Preset { steps: Vec<RawStep> },
}

impl RawStep {
    pub fn new(step_type: StepType, duration_seconds: i64) -> Self {
        Self {
            step_type: step_type.tag().to_string(),
            duration_seconds,
        }
    }

    /// Parse either a bare step array or a `{"steps": [...]}` preset object.
    ///
    /// # Errors
    /// Returns `CoreError::Json` if the input matches neither shape.
    pub fn parse_list(json: &str) -> Result<Vec<RawStep>> {
        let session: RawSession = serde_json::from_str(json)?;
        Ok(match session {
            RawSession::Compact(steps) => steps,
            RawSession::Preset { steps } => steps,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSpec {
    step_type: StepType,
    duration_ms: u64,
}

impl StepSpec {
    /// Uses saturating arithmetic so absurd inputs cannot overflow.
    pub fn from_secs(step_type: StepType, duration_secs: u64) -> Self {
        Self {
            step_type,
            duration_ms: duration_secs.saturating_mul(1000),
        }
    }

    pub fn step_type(&self) -> StepType {
        self.step_type
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_ms / 1000
    }
}

/// Ordered, validated, non-empty list of steps for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    steps: Vec<StepSpec>,
}

impl Timeline {
    /// Drops zero-length steps.
    ///
    /// # Errors
    /// Returns `CoreError::EmptyTimeline` if nothing is left.
    pub fn new(steps: Vec<StepSpec>) -> Result<Self> {
        let steps: Vec<StepSpec> = steps.into_iter().filter(|s| s.duration_ms > 0).collect();
        if steps.is_empty() {
            return Err(CoreError::EmptyTimeline);
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&StepSpec> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a constructed timeline.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn total_ms(&self) -> u64 {
        self.steps
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.duration_ms))
    }

    /// Cumulative milliseconds before `step_index` starts.
    pub fn step_offset_ms(&self, step_index: usize) -> u64 {
        self.steps
            .iter()
            .take(step_index)
            .fold(0u64, |acc, s| acc.saturating_add(s.duration_ms))
    }

    /// Compact pairs used by the persisted encoding.
    pub fn to_raw(&self) -> Vec<RawStep> {
        self.steps
            .iter()
            .map(|s| RawStep {
                step_type: s.step_type.tag().to_string(),
                duration_seconds: i64::try_from(s.duration_secs()).unwrap_or(i64::MAX),
            })
            .collect()
    }
}

/// Build a timeline from caller-supplied steps.
///
/// Entries with `duration_seconds <= 0` are dropped and unknown type tags map
/// to `Zazen`.
///
/// # Errors
/// Returns `CoreError::EmptyTimeline` if no step has a positive duration.
pub fn build_timeline(raw: &[RawStep]) -> Result<Timeline> {
    let steps = raw
        .iter()
        .filter(|r| r.duration_seconds > 0)
        .map(|r| StepSpec::from_secs(StepType::from_tag(&r.step_type), r.duration_seconds as u64))
        .collect();
    Timeline::new(steps)
}
