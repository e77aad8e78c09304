//! Assessment data model
//!
//! Dimensions, turns, transcripts, per-dimension results and the final report.

use crate::errors::AssessmentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest score a dimension can receive
pub const MIN_SCORE: u32 = 10;

/// Highest score a dimension can receive
pub const MAX_SCORE: u32 = 60;

/// Number of rubric dimensions
pub const DIMENSION_COUNT: usize = 7;

/// A sub-facet of a dimension with the keyword cues that signal it in an answer
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Facet {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

impl Facet {
    /// Whether the text mentions any of this facet's keywords
    pub fn is_mentioned_in(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k))
    }
}

/// One of the seven fixed rubric axes
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Dimension {
    pub id: u8,
    pub name: &'static str,
    pub native_name: &'static str,
    pub description: &'static str,
    /// Questionnaire item range, inclusive
    pub items: (u8, u8),
    pub facets: &'static [Facet],
}

static DIMENSIONS: [Dimension; DIMENSION_COUNT] = [
    Dimension {
        id: 1,
        name: "Truth-seeking",
        native_name: "寻找真理",
        description: "Desire for the best knowledge even when it contradicts one's beliefs or interests",
        items: (1, 10),
        facets: &[
            Facet {
                name: "weighing evidence",
                keywords: &["evidence", "fact", "data", "verify", "证据", "事实", "数据", "验证"],
            },
            Facet {
                name: "admitting error",
                keywords: &["wrong", "mistake", "admit", "change my mind", "错", "承认", "改变"],
            },
            Facet {
                name: "truth over comfort",
                keywords: &["truth", "honest", "uncomfortable", "真相", "诚实", "真理"],
            },
        ],
    },
    Dimension {
        id: 2,
        name: "Open-mindedness",
        native_name: "开放思想",
        description: "Tolerance of divergent views and sensitivity to one's own bias",
        items: (11, 20),
        facets: &[
            Facet {
                name: "divergent views",
                keywords: &["different", "opinion", "disagree", "perspective", "不同", "观点", "意见"],
            },
            Facet {
                name: "self-monitoring for bias",
                keywords: &["bias", "prejudice", "assumption", "偏见", "成见", "假设"],
            },
            Facet {
                name: "respect for others",
                keywords: &["respect", "listen", "understand", "尊重", "倾听", "理解"],
            },
        ],
    },
    Dimension {
        id: 3,
        name: "Analyticity",
        native_name: "分析能力",
        description: "Alertness to potential problems and use of reason and evidence",
        items: (21, 30),
        facets: &[
            Facet {
                name: "anticipating consequences",
                keywords: &["consequence", "result", "outcome", "risk", "后果", "结果", "风险"],
            },
            Facet {
                name: "reasoning from evidence",
                keywords: &["because", "reason", "therefore", "cause", "因为", "原因", "所以"],
            },
            Facet {
                name: "identifying problems",
                keywords: &["problem", "issue", "analy", "问题", "分析"],
            },
        ],
    },
    Dimension {
        id: 4,
        name: "Systematicity",
        native_name: "系统化能力",
        description: "Being organized, orderly, focused and diligent in inquiry",
        items: (31, 40),
        facets: &[
            Facet {
                name: "organized approach",
                keywords: &["plan", "step", "first", "then", "order", "计划", "步骤", "首先", "然后"],
            },
            Facet {
                name: "focus and diligence",
                keywords: &["focus", "careful", "detail", "persist", "专注", "仔细", "细节", "坚持"],
            },
            Facet {
                name: "handling complexity",
                keywords: &["complex", "structure", "system", "复杂", "结构", "系统"],
            },
        ],
    },
    Dimension {
        id: 5,
        name: "Critical-thinking self-confidence",
        native_name: "批判性思维自信",
        description: "Trust in one's own reasoning process",
        items: (41, 50),
        facets: &[
            Facet {
                name: "trust in own reasoning",
                keywords: &["confident", "trust", "judgment", "believe", "自信", "相信", "判断"],
            },
            Facet {
                name: "leading problem solving",
                keywords: &["lead", "decide", "solve", "带领", "决定", "解决"],
            },
            Facet {
                name: "defending a position",
                keywords: &["challenge", "defend", "convince", "挑战", "说服", "辩护"],
            },
        ],
    },
    Dimension {
        id: 6,
        name: "Inquisitiveness",
        native_name: "求知欲",
        description: "Intellectual curiosity and desire to learn even without immediate payoff",
        items: (51, 60),
        facets: &[
            Facet {
                name: "curiosity",
                keywords: &["curious", "wonder", "interest", "好奇", "兴趣"],
            },
            Facet {
                name: "eagerness to learn",
                keywords: &["learn", "study", "read", "explore", "学习", "阅读", "探索"],
            },
            Facet {
                name: "asking questions",
                keywords: &["why", "how", "question", "ask", "为什么", "怎么", "提问"],
            },
        ],
    },
    Dimension {
        id: 7,
        name: "Cognitive maturity",
        native_name: "认知成熟度",
        description: "Prudence in making, suspending or revising judgment",
        items: (61, 70),
        facets: &[
            Facet {
                name: "tentative judgment",
                keywords: &["depends", "context", "situation", "maybe", "取决", "情况", "可能"],
            },
            Facet {
                name: "multiple solutions",
                keywords: &["alternative", "option", "several", "多种", "选择", "方案"],
            },
            Facet {
                name: "revising judgment",
                keywords: &["revise", "reconsider", "new information", "修正", "重新考虑", "新信息"],
            },
        ],
    },
];

impl Dimension {
    /// All seven dimensions in assessment order
    pub fn all() -> &'static [Dimension] {
        &DIMENSIONS
    }

    /// Look up a dimension by its 1-based identifier
    pub fn by_id(id: u8) -> Result<&'static Dimension, AssessmentError> {
        DIMENSIONS
            .iter()
            .find(|d| d.id == id)
            .ok_or(AssessmentError::UnknownDimension(id))
    }

    /// Number of facets mentioned anywhere in the given texts
    pub fn facets_covered<'a>(&self, texts: impl IntoIterator<Item = &'a str> + Clone) -> usize {
        self.facets
            .iter()
            .filter(|facet| texts.clone().into_iter().any(|t| facet.is_mentioned_in(t)))
            .count()
    }
}

/// Tone and strategy of the next question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    Encourage,
    Normal,
    Probe,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encourage => "encourage",
            Self::Normal => "normal",
            Self::Probe => "probe",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "encourage" | "鼓励" => Some(Self::Encourage),
            "normal" | "正常" => Some(Self::Normal),
            "probe" | "追问" => Some(Self::Probe),
            _ => None,
        }
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Answered,
    /// The answer generator failed every attempt for this round
    GenerationExhausted,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::GenerationExhausted => "generation_exhausted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "answered" => Some(Self::Answered),
            "generation_exhausted" => Some(Self::GenerationExhausted),
            _ => None,
        }
    }
}

/// One question/answer exchange within a dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub round: u32,
    pub mode: InteractionMode,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: TurnOutcome,
}

impl Turn {
    pub fn is_answered(&self) -> bool {
        self.outcome == TurnOutcome::Answered
    }
}

/// Ordered turns for the dimension being diagnosed
///
/// Rounds are assigned on append, so they are always contiguous from 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return it
    pub fn record(
        &mut self,
        mode: InteractionMode,
        question: impl Into<String>,
        answer: impl Into<String>,
        outcome: TurnOutcome,
    ) -> &Turn {
        let round = self.next_round();
        self.turns.push(Turn {
            round,
            mode,
            question: question.into(),
            answer: answer.into(),
            timestamp: Utc::now(),
            outcome,
        });
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn next_round(&self) -> u32 {
        self.turns.len() as u32 + 1
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn answered(&self) -> impl Iterator<Item = &Turn> + Clone {
        self.turns.iter().filter(|t| t.is_answered())
    }

    pub fn answered_count(&self) -> usize {
        self.answered().count()
    }

    pub fn failed_count(&self) -> usize {
        self.turns.len() - self.answered_count()
    }

    /// Total characters across answered turns
    pub fn answer_chars(&self) -> usize {
        self.answered().map(|t| t.answer.chars().count()).sum()
    }

    /// The last `n` turns, oldest first
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }
}

/// Qualitative band of a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreLevel {
    VeryPoor,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl ScoreLevel {
    /// Band for a single dimension score in [10,60]
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=20 => Self::VeryPoor,
            21..=30 => Self::Poor,
            31..=40 => Self::Fair,
            41..=50 => Self::Good,
            _ => Self::Excellent,
        }
    }

    /// Band for an aggregate score in [70,420]
    pub fn from_aggregate(total: u32) -> Self {
        match total {
            350.. => Self::Excellent,
            280..=349 => Self::Good,
            210..=279 => Self::Fair,
            140..=209 => Self::Poor,
            _ => Self::VeryPoor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryPoor => "very_poor",
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "very_poor" | "very poor" | "极差" => Some(Self::VeryPoor),
            "poor" | "较差" => Some(Self::Poor),
            "fair" | "一般" => Some(Self::Fair),
            "good" | "良好" => Some(Self::Good),
            "excellent" | "优秀" => Some(Self::Excellent),
            _ => None,
        }
    }
}

impl fmt::Display for ScoreLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scored outcome of one dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionResult {
    pub dimension_id: u8,
    pub name: String,
    pub score: u32,
    pub level: ScoreLevel,
    pub rationale: String,
    pub rounds_used: u32,
    pub failed_rounds: u32,
    pub low_confidence: bool,
    pub clamped: bool,
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Judge's self-reported confidence in [0,1], when it gave one
    pub confidence: Option<f64>,
}

/// Whether a report covers all dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completeness {
    Complete,
    Incomplete,
}

impl Completeness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
        }
    }
}

/// Aggregate outcome of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub session_id: String,
    pub subject_id: String,
    pub results: Vec<DimensionResult>,
    pub aggregate_score: u32,
    pub average_score: f64,
    /// Only meaningful once every dimension is scored
    pub overall_level: Option<ScoreLevel>,
    pub completeness: Completeness,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Report {
    /// Build a report, deriving the aggregate figures from `results`
    pub fn new(
        session_id: impl Into<String>,
        subject_id: impl Into<String>,
        results: Vec<DimensionResult>,
        completeness: Completeness,
        started_at: DateTime<Utc>,
    ) -> Self {
        let aggregate_score: u32 = results.iter().map(|r| r.score).sum();
        let average_score = if results.is_empty() {
            0.0
        } else {
            (aggregate_score as f64 / results.len() as f64 * 10.0).round() / 10.0
        };
        let overall_level = match completeness {
            Completeness::Complete => Some(ScoreLevel::from_aggregate(aggregate_score)),
            Completeness::Incomplete => None,
        };

        Self {
            session_id: session_id.into(),
            subject_id: subject_id.into(),
            results,
            aggregate_score,
            average_score,
            overall_level,
            completeness,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completeness == Completeness::Complete
    }

    pub fn low_confidence_dimensions(&self) -> impl Iterator<Item = &DimensionResult> {
        self.results.iter().filter(|r| r.low_confidence)
    }
}

/// One transcript record as emitted to a report sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub session_id: String,
    pub subject_id: String,
    pub dimension_id: u8,
    #[serde(flatten)]
    pub turn: Turn,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: u8, score: u32) -> DimensionResult {
        DimensionResult {
            dimension_id: id,
            name: format!("d{}", id),
            score,
            level: ScoreLevel::from_score(score),
            rationale: String::new(),
            rounds_used: 3,
            failed_rounds: 0,
            low_confidence: false,
            clamped: false,
            evidence: Vec::new(),
            confidence: None,
        }
    }

    #[test]
    fn test_catalog_is_ordered_and_complete() {
        let ids: Vec<u8> = Dimension::all().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(Dimension::by_id(7).unwrap().items, (61, 70));
        assert!(matches!(Dimension::by_id(0), Err(AssessmentError::UnknownDimension(0))));
        assert!(matches!(Dimension::by_id(8), Err(AssessmentError::UnknownDimension(8))));
    }

    #[test]
    fn test_facet_coverage() {
        let dim = Dimension::by_id(3).unwrap();
        let answers = ["I look at the risk first", "because the cause matters"];
        assert_eq!(dim.facets_covered(answers.iter().copied()), 2);
        assert_eq!(dim.facets_covered(["nothing here"].iter().copied()), 0);
    }

    #[test]
    fn test_transcript_rounds_are_contiguous() {
        let mut transcript = Transcript::new();
        transcript.record(InteractionMode::Normal, "q1", "a1", TurnOutcome::Answered);
        transcript.record(InteractionMode::Encourage, "q2", "", TurnOutcome::GenerationExhausted);
        transcript.record(InteractionMode::Probe, "q3", "a3", TurnOutcome::Answered);

        let rounds: Vec<u32> = transcript.turns().iter().map(|t| t.round).collect();
        assert_eq!(rounds, vec![1, 2, 3]);
        assert_eq!(transcript.answered_count(), 2);
        assert_eq!(transcript.failed_count(), 1);
        assert_eq!(transcript.answer_chars(), 4);
        assert_eq!(transcript.recent(2).len(), 2);
        assert_eq!(transcript.recent(2)[0].round, 2);
    }

    #[test]
    fn test_score_levels() {
        assert_eq!(ScoreLevel::from_score(10), ScoreLevel::VeryPoor);
        assert_eq!(ScoreLevel::from_score(21), ScoreLevel::Poor);
        assert_eq!(ScoreLevel::from_score(40), ScoreLevel::Fair);
        assert_eq!(ScoreLevel::from_score(43), ScoreLevel::Good);
        assert_eq!(ScoreLevel::from_score(60), ScoreLevel::Excellent);

        assert_eq!(ScoreLevel::from_aggregate(420), ScoreLevel::Excellent);
        assert_eq!(ScoreLevel::from_aggregate(301), ScoreLevel::Good);
        assert_eq!(ScoreLevel::from_aggregate(210), ScoreLevel::Fair);
        assert_eq!(ScoreLevel::from_aggregate(140), ScoreLevel::Poor);
        assert_eq!(ScoreLevel::from_aggregate(70), ScoreLevel::VeryPoor);
    }

    #[test]
    fn test_report_aggregates() {
        let results: Vec<_> = (1..=7).map(|i| result(i, 40 + i as u32)).collect();
        let report = Report::new("s1", "U1", results, Completeness::Complete, Utc::now());
        assert_eq!(report.aggregate_score, 308);
        assert_eq!(report.average_score, 44.0);
        assert_eq!(report.overall_level, Some(ScoreLevel::Good));

        let partial = Report::new("s2", "U1", vec![result(1, 33), result(2, 34)], Completeness::Incomplete, Utc::now());
        assert_eq!(partial.aggregate_score, 67);
        assert_eq!(partial.average_score, 33.5);
        assert!(partial.overall_level.is_none());
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_mode_serialization() {
        let json = serde_json::to_string(&InteractionMode::Probe).unwrap();
        assert_eq!(json, "\"probe\"");
        assert_eq!(InteractionMode::parse("鼓励"), Some(InteractionMode::Encourage));
    }
}
