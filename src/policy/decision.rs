use super::ResponsePayload;
use serde::{Deserialize, Serialize};

/// Sentiment bucket for the strong-signal branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Negative,
}

/// `(game_id, target_score)` row for the strong-signal lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub game_id: u32,
    pub target_score: u32,
}

/// Full `(text_response, game_id, target_score)` row for the quiet-task
/// branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRow {
    pub text_response: String,
    pub game_id: u32,
    pub target_score: u32,
}

impl ResponseRow {
    fn to_payload(&self, is_safe: bool) -> ResponsePayload {
        ResponsePayload {
            text_response: self.text_response.clone(),
            game_id: self.game_id,
            target_score: self.target_score,
            is_safe: Some(is_safe),
        }
    }
}

/// Data-driven decision table.
///
/// Thresholds and lookup rows live in config so new categories are a
/// table edit, not a control-flow change. `evaluate` is a pure function
/// of `(contents, score_difference, classifier_text)`; branches are
/// testable with fixed classifier text and no live collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTable {
    /// Score difference that marks a strong signal.
    #[serde(default = "default_strong_signal")]
    pub strong_signal: u32,
    /// Midpoint for the quiet-task (empty contents) branch.
    #[serde(default = "default_midpoint")]
    pub midpoint: u32,
    /// Substring marking a positive classifier verdict.
    #[serde(default = "default_positive_marker")]
    pub positive_marker: String,
    /// Substring marking unsafe content in the classifier verdict.
    #[serde(default = "default_unsafe_marker")]
    pub unsafe_marker: String,

    /// Game split for the default branch: positive verdict vs not.
    #[serde(default = "default_positive_game")]
    pub positive_game: u32,
    #[serde(default = "default_negative_game")]
    pub negative_game: u32,

    #[serde(default = "default_strong_positive")]
    pub strong_positive: ScoreRow,
    #[serde(default = "default_strong_negative")]
    pub strong_negative: ScoreRow,

    #[serde(default = "default_quiet_above")]
    pub quiet_above: ResponseRow,
    #[serde(default = "default_quiet_below")]
    pub quiet_below: ResponseRow,
    #[serde(default = "default_quiet_at")]
    pub quiet_at: ResponseRow,
}

fn default_strong_signal() -> u32 {
    30
}

fn default_midpoint() -> u32 {
    10
}

fn default_positive_marker() -> String {
    "positive".into()
}

fn default_unsafe_marker() -> String {
    "unsafe".into()
}

fn default_strong_positive() -> ScoreRow {
    ScoreRow {
        game_id: 1,
        target_score: 100,
    }
}

fn default_strong_negative() -> ScoreRow {
    ScoreRow {
        game_id: 2,
        target_score: 0,
    }
}

fn default_quiet_above() -> ResponseRow {
    ResponseRow {
        text_response: "positive momentum".into(),
        game_id: 1,
        target_score: 50,
    }
}

fn default_quiet_below() -> ResponseRow {
    ResponseRow {
        text_response: "relief".into(),
        game_id: 2,
        target_score: 5,
    }
}

fn default_quiet_at() -> ResponseRow {
    ResponseRow {
        text_response: "steady state".into(),
        game_id: 0,
        target_score: 10,
    }
}

fn default_positive_game() -> u32 {
    1
}

fn default_negative_game() -> u32 {
    2
}

impl Default for DecisionTable {
    fn default() -> Self {
        Self {
            strong_signal: default_strong_signal(),
            midpoint: default_midpoint(),
            positive_marker: default_positive_marker(),
            unsafe_marker: default_unsafe_marker(),
            positive_game: default_positive_game(),
            negative_game: default_negative_game(),
            strong_positive: default_strong_positive(),
            strong_negative: default_strong_negative(),
            quiet_above: default_quiet_above(),
            quiet_below: default_quiet_below(),
            quiet_at: default_quiet_at(),
        }
    }
}

impl DecisionTable {
    /// Whether `evaluate` will consult the classifier text for this input.
    /// The quiet-task branch decides on the score alone.
    pub fn needs_classifier(&self, contents: &str, score_difference: u32) -> bool {
        score_difference == self.strong_signal || !contents.is_empty()
    }

    pub fn sentiment(&self, classifier_text: &str) -> Sentiment {
        if contains_ignore_case(classifier_text, &self.positive_marker) {
            Sentiment::Positive
        } else {
            Sentiment::Negative
        }
    }

    pub fn is_safe(&self, classifier_text: &str) -> bool {
        !contains_ignore_case(classifier_text, &self.unsafe_marker)
    }

    /// The decision table. Total: every input reaches exactly one branch.
    pub fn evaluate(
        &self,
        contents: &str,
        score_difference: u32,
        classifier_text: &str,
    ) -> ResponsePayload {
        let is_safe = self.is_safe(classifier_text);

        if score_difference == self.strong_signal {
            let row = match self.sentiment(classifier_text) {
                Sentiment::Positive => self.strong_positive,
                Sentiment::Negative => self.strong_negative,
            };
            return ResponsePayload {
                text_response: classifier_text.to_string(),
                game_id: row.game_id,
                target_score: row.target_score,
                is_safe: Some(is_safe),
            };
        }

        if contents.is_empty() {
            let row = match score_difference.cmp(&self.midpoint) {
                std::cmp::Ordering::Greater => &self.quiet_above,
                std::cmp::Ordering::Less => &self.quiet_below,
                std::cmp::Ordering::Equal => &self.quiet_at,
            };
            return row.to_payload(is_safe);
        }

        ResponsePayload {
            text_response: classifier_text.to_string(),
            game_id: match self.sentiment(classifier_text) {
                Sentiment::Positive => self.positive_game,
                Sentiment::Negative => self.negative_game,
            },
            target_score: score_difference,
            is_safe: Some(is_safe),
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_signal_positive_takes_high_target_row() {
        let table = DecisionTable::default();
        let payload = table.evaluate("great match", 30, "clearly positive outlook");

        assert_eq!(payload.game_id, 1);
        assert_eq!(payload.target_score, 100);
        assert_eq!(payload.text_response, "clearly positive outlook");
        assert_eq!(payload.is_safe, Some(true));
    }

    #[test]
    fn strong_signal_negative_takes_low_target_row() {
        let table = DecisionTable::default();
        let payload = table.evaluate("rough match", 30, "grim reading");

        assert_eq!(payload.game_id, 2);
        assert_eq!(payload.target_score, 0);
    }

    #[test]
    fn empty_contents_above_midpoint_is_positive_momentum() {
        let table = DecisionTable::default();
        let payload = table.evaluate("", 20, "");

        assert_eq!(payload.text_response, "positive momentum");
        assert_eq!(payload.game_id, 1);
        assert_eq!(payload.target_score, 50);
    }

    #[test]
    fn empty_contents_below_midpoint_is_relief() {
        let table = DecisionTable::default();
        let payload = table.evaluate("", 5, "");

        assert_eq!(payload.text_response, "relief");
        assert_eq!(payload.game_id, 2);
        assert_eq!(payload.target_score, 5);
    }

    #[test]
    fn empty_contents_at_midpoint_is_steady() {
        let table = DecisionTable::default();
        let payload = table.evaluate("", 10, "");

        assert_eq!(payload.text_response, "steady state");
        assert_eq!(payload.game_id, 0);
    }

    #[test]
    fn default_branch_forwards_classifier_text_and_score() {
        let table = DecisionTable::default();
        let payload = table.evaluate("we held on", 12, "a positive finish");

        assert_eq!(payload.text_response, "a positive finish");
        assert_eq!(payload.game_id, 1);
        assert_eq!(payload.target_score, 12);
    }

    #[test]
    fn default_branch_negative_split() {
        let table = DecisionTable::default();
        let payload = table.evaluate("we collapsed", 12, "a bleak finish");

        assert_eq!(payload.game_id, 2);
        assert_eq!(payload.target_score, 12);
    }

    #[test]
    fn unsafe_marker_flips_safety_flag() {
        let table = DecisionTable::default();
        let payload = table.evaluate("sketchy", 12, "this looks UNSAFE to repeat");
        assert_eq!(payload.is_safe, Some(false));
    }

    #[test]
    fn quiet_branch_needs_no_classifier() {
        let table = DecisionTable::default();
        assert!(!table.needs_classifier("", 5));
        assert!(table.needs_classifier("", 30));
        assert!(table.needs_classifier("text", 5));
    }

    #[test]
    fn strong_signal_wins_over_empty_contents() {
        let table = DecisionTable::default();
        let payload = table.evaluate("", 30, "positive");
        assert_eq!(payload.target_score, 100);
    }

    #[test]
    fn determinism_given_fixed_classifier_text() {
        let table = DecisionTable::default();
        let a = table.evaluate("same input", 7, "same verdict");
        let b = table.evaluate("same input", 7, "same verdict");
        assert_eq!(a, b);
    }

    #[test]
    fn table_rows_deserialize_from_toml() {
        let table: DecisionTable = toml::from_str(
            r#"
            strong_signal = 42
            [quiet_below]
            text_response = "breathe"
            game_id = 9
            target_score = 1
            "#,
        )
        .unwrap();

        assert_eq!(table.strong_signal, 42);
        assert_eq!(table.quiet_below.text_response, "breathe");
        // untouched rows keep their defaults
        assert_eq!(table.quiet_above.text_response, "positive momentum");
    }
}
