//! Keyword fallback over dumped UI text.
//!
//! Lower confidence than structural probes: attribute names, hidden nodes and
//! unrelated copy can all produce matches. Only used when no embedded surface
//! is attached.

use regex::{Regex, RegexBuilder};
use tracing::warn;
use walletforge_core_types::SurfaceState;

const LOADING_PATTERNS: &[&str] = &["loading", "please wait", "processing", "加载中"];

const COMPLETION_PATTERNS: &[&str] = &[
    "already claimed",
    "claimed",
    "successfully",
    "completed",
    "已领取",
];

const ERROR_PATTERNS: &[&str] = &[
    "something went wrong",
    "try again",
    "failed",
    "not eligible",
    "出错",
];

const INPUT_REQUIRED_PATTERNS: &[&str] = &[
    "sign up",
    "register",
    "enter your email",
    "verification code",
    "注册",
];

const ACTION_PATTERNS: &[&str] = &["claim", "领取"];

/// Keyword lists, one per state.
#[derive(Debug, Clone, Default)]
pub struct KeywordSets {
    pub loading: Vec<String>,
    pub completion: Vec<String>,
    pub error: Vec<String>,
    pub input_required: Vec<String>,
    pub action_available: Vec<String>,
}

impl KeywordSets {
    pub fn builtin() -> Self {
        let owned = |patterns: &[&str]| -> Vec<String> {
            patterns.iter().map(|p| p.to_string()).collect()
        };
        Self {
            loading: owned(LOADING_PATTERNS),
            completion: owned(COMPLETION_PATTERNS),
            error: owned(ERROR_PATTERNS),
            input_required: owned(INPUT_REQUIRED_PATTERNS),
            action_available: owned(ACTION_PATTERNS),
        }
    }
}

/// Case-insensitive whole-word matcher for one keyword list. Word boundaries
/// apply only at ASCII alphanumeric edges so CJK keywords still match inside
/// running text.
fn keyword_matcher(keywords: &[String]) -> Option<Regex> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|keyword| {
            let edge = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
            let mut pattern = String::new();
            if edge(keyword.chars().next()) {
                pattern.push_str(r"\b");
            }
            pattern.push_str(&regex::escape(keyword));
            if edge(keyword.chars().last()) {
                pattern.push_str(r"\b");
            }
            pattern
        })
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    match RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
    {
        Ok(regex) => Some(regex),
        Err(err) => {
            warn!(error = %err, "Keyword list rejected, it will never match");
            None
        }
    }
}

/// Whole-word keyword classifier with the same tie-break order as the
/// structural path.
#[derive(Debug, Clone)]
pub struct HeuristicTextClassifier {
    ordered: Vec<(SurfaceState, Option<Regex>)>,
}

impl Default for HeuristicTextClassifier {
    fn default() -> Self {
        Self::new(KeywordSets::builtin())
    }
}

impl HeuristicTextClassifier {
    pub fn new(keywords: KeywordSets) -> Self {
        let ordered = vec![
            (SurfaceState::Loading, keyword_matcher(&keywords.loading)),
            (SurfaceState::AlreadyDone, keyword_matcher(&keywords.completion)),
            (SurfaceState::Error, keyword_matcher(&keywords.error)),
            (SurfaceState::InputRequired, keyword_matcher(&keywords.input_required)),
            (SurfaceState::ActionAvailable, keyword_matcher(&keywords.action_available)),
        ];
        Self { ordered }
    }

    pub fn classify_text(&self, text: &str) -> SurfaceState {
        self.ordered
            .iter()
            .find(|(_, matcher)| matcher.as_ref().is_some_and(|m| m.is_match(text)))
            .map(|(state, _)| *state)
            .unwrap_or(SurfaceState::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_beats_action() {
        let classifier = HeuristicTextClassifier::default();
        assert_eq!(
            classifier.classify_text("<node text=\"Claim\"/><node text=\"Loading...\"/>"),
            SurfaceState::Loading
        );
    }

    #[test]
    fn completion_beats_action() {
        let classifier = HeuristicTextClassifier::default();
        assert_eq!(
            classifier.classify_text("Reward Already Claimed. Claim more tomorrow"),
            SurfaceState::AlreadyDone
        );
    }

    #[test]
    fn matching_ignores_case() {
        let classifier = HeuristicTextClassifier::default();
        assert_eq!(classifier.classify_text("SIGN UP to continue"), SurfaceState::InputRequired);
        assert_eq!(classifier.classify_text("CLAIM"), SurfaceState::ActionAvailable);
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let classifier = HeuristicTextClassifier::default();
        assert_eq!(
            classifier.classify_text("2 unclaimed rewards. Claim now"),
            SurfaceState::ActionAvailable
        );
        assert_eq!(classifier.classify_text("Unclaimed"), SurfaceState::Unknown);
        assert_eq!(classifier.classify_text("您已领取奖励"), SurfaceState::AlreadyDone);
    }

    #[test]
    fn unknown_when_nothing_matches() {
        let classifier = HeuristicTextClassifier::default();
        assert_eq!(classifier.classify_text("<hierarchy/>"), SurfaceState::Unknown);
    }

    #[test]
    fn custom_keywords_are_normalized() {
        let classifier = HeuristicTextClassifier::new(KeywordSets {
            action_available: vec!["Collect".into()],
            ..Default::default()
        });
        assert_eq!(classifier.classify_text("collect now"), SurfaceState::ActionAvailable);
    }
}
