//! Judge-model evaluation of provider responses.
//!
//! The router picks a judge adapter from the judge model id, sends the fixed
//! rating prompt, and parses the reply with recovery. Evaluation is never
//! allowed to fail the parent pipeline: every exit path produces a usable
//! [`AccuracyMetrics`], degraded if necessary.

use lazy_static::lazy_static;
use regex::Regex;

use quorum_core::{AccuracyMetrics, QueryCategory};

use crate::adapters::AdapterSet;
use crate::prompts::rating_prompt;

lazy_static! {
    /// Markdown code fences judges like to wrap their JSON in.
    static ref CODE_FENCE: Regex = Regex::new(r"```(?:json)?").expect("static regex");
}

/// How much malformed judge output to echo back in the rationale.
const MALFORMED_ECHO_LIMIT: usize = 120;

/// Outcome of the single fallible parse step, kept separate so the
/// recovery policy is visible and testable on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The judge answered in parseable form.
    Parsed {
        score: i64,
        rationale: String,
        query_category: Option<QueryCategory>,
        prompt_optimization: Option<String>,
    },
    /// The judge answered in prose or broken JSON; evaluation is degraded
    /// to a neutral score rather than failed.
    Degraded { echo: String },
}

/// Routes (query, response) pairs to a judge model and normalizes the answer.
pub struct EvaluatorRouter {
    adapters: AdapterSet,
}

impl EvaluatorRouter {
    pub fn new(adapters: AdapterSet) -> Self {
        Self { adapters }
    }

    /// Rate `ai_response` against `original_query` using the given judge.
    ///
    /// Never returns an error: missing credentials and judge transport
    /// failures degrade to a zero score with an explanatory rationale, and
    /// unparseable judge output degrades to a neutral 50.
    pub async fn evaluate(
        &self,
        original_query: &str,
        ai_response: &str,
        judge_model_id: &str,
    ) -> AccuracyMetrics {
        let adapter = self.adapters.for_judge(judge_model_id);

        if !adapter.is_configured() {
            return AccuracyMetrics::unavailable(
                judge_model_id,
                format!(
                    "Evaluator not configured (missing credentials for {} family)",
                    adapter.name()
                ),
            );
        }

        let prompt = rating_prompt(original_query, ai_response);
        let invocation = match adapter.invoke(judge_model_id, &prompt).await {
            Ok(inv) => inv,
            Err(e) => {
                tracing::warn!(judge = judge_model_id, error = %e, "judge call failed");
                return AccuracyMetrics::unavailable(
                    judge_model_id,
                    format!("Evaluation failed: {e}"),
                );
            }
        };

        // evaluator_model always reflects the judge actually used,
        // regardless of what the judge claimed about itself.
        match parse_verdict(&invocation.response_text) {
            Verdict::Parsed {
                score,
                rationale,
                query_category,
                prompt_optimization,
            } => AccuracyMetrics {
                score,
                rationale,
                evaluator_model: judge_model_id.to_string(),
                query_category,
                prompt_optimization,
            },
            Verdict::Degraded { echo } => {
                tracing::warn!(judge = judge_model_id, "malformed judge output");
                AccuracyMetrics {
                    score: 50,
                    rationale: format!("Malformed evaluator output: {echo}"),
                    evaluator_model: judge_model_id.to_string(),
                    query_category: None,
                    prompt_optimization: None,
                }
            }
        }
    }
}

/// Parse raw judge text into a [`Verdict`].
///
/// Code fences are stripped first. A numeric but non-integer score is
/// truncated (not rounded) and the result clamped into \[0, 100\].
pub fn parse_verdict(raw: &str) -> Verdict {
    let cleaned = CODE_FENCE.replace_all(raw, "");
    let cleaned = cleaned.trim();

    let value: serde_json::Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(_) => {
            return Verdict::Degraded {
                echo: truncate_echo(cleaned),
            }
        }
    };

    let score = match &value["score"] {
        v if v.is_i64() => v.as_i64().unwrap_or(0),
        v if v.is_f64() => v.as_f64().unwrap_or(0.0).trunc() as i64,
        // A judge that parses but omits the score counts as zero.
        _ => 0,
    }
    .clamp(0, 100);

    let rationale = value["rationale"]
        .as_str()
        .unwrap_or("No rationale provided")
        .to_string();

    let query_category = value
        .get("query_category")
        .and_then(|v| serde_json::from_value::<QueryCategory>(v.clone()).ok());

    let prompt_optimization = value["prompt_optimization"].as_str().map(String::from);

    Verdict::Parsed {
        score,
        rationale,
        query_category,
        prompt_optimization,
    }
}

fn truncate_echo(text: &str) -> String {
    if text.len() <= MALFORMED_ECHO_LIMIT {
        text.to_string()
    } else {
        let mut end = MALFORMED_ECHO_LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use proptest::prelude::*;

    use crate::adapters::{AdapterError, Invocation, ModelAdapter};

    struct CannedJudge {
        name: &'static str,
        reply: Result<String, &'static str>,
        configured: bool,
    }

    #[async_trait]
    impl ModelAdapter for CannedJudge {
        async fn invoke(&self, _model_id: &str, _prompt: &str) -> Result<Invocation, AdapterError> {
            match &self.reply {
                Ok(text) => Ok(Invocation {
                    response_text: text.clone(),
                    input_tokens: 10,
                    output_tokens: 10,
                }),
                Err(msg) => Err(AdapterError::Http(msg.to_string())),
            }
        }

        fn name(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }
    }

    fn router_with(judge: CannedJudge) -> EvaluatorRouter {
        let judge: Arc<dyn ModelAdapter> = Arc::new(judge);
        EvaluatorRouter::new(AdapterSet::new(
            Arc::clone(&judge),
            Arc::clone(&judge),
            Arc::clone(&judge),
            judge,
        ))
    }

    #[test]
    fn test_fenced_json_is_stripped() {
        let verdict = parse_verdict(
            "```json\n{\"score\": 88, \"rationale\": \"solid\", \"query_category\": \"Straightforward\"}\n```",
        );
        assert_eq!(
            verdict,
            Verdict::Parsed {
                score: 88,
                rationale: "solid".to_string(),
                query_category: Some(QueryCategory::Straightforward),
                prompt_optimization: None,
            }
        );
    }

    #[test]
    fn test_decimal_score_truncates_not_rounds() {
        let verdict = parse_verdict(r#"{"score": 95.7, "rationale": "ok"}"#);
        match verdict {
            Verdict::Parsed { score, .. } => assert_eq!(score, 95),
            other => panic!("expected parsed verdict, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_score_is_clamped() {
        match parse_verdict(r#"{"score": 180, "rationale": "x"}"#) {
            Verdict::Parsed { score, .. } => assert_eq!(score, 100),
            other => panic!("{other:?}"),
        }
        match parse_verdict(r#"{"score": -4, "rationale": "x"}"#) {
            Verdict::Parsed { score, .. } => assert_eq!(score, 0),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_prose_degrades() {
        let verdict = parse_verdict("I think this answer deserves a good grade overall.");
        match verdict {
            Verdict::Degraded { echo } => assert!(echo.starts_with("I think")),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_long_malformed_output_is_truncated() {
        let long = "x".repeat(500);
        match parse_verdict(&long) {
            Verdict::Degraded { echo } => {
                assert!(echo.len() <= MALFORMED_ECHO_LIMIT + 3);
                assert!(echo.ends_with("..."));
            }
            other => panic!("{other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_output_yields_neutral_score() {
        let router = router_with(CannedJudge {
            name: "vertex",
            reply: Ok("Sure! The response looks quite good to me.".to_string()),
            configured: true,
        });
        let accuracy = router.evaluate("q", "r", "gemini-2.5-pro").await;
        assert_eq!(accuracy.score, 50);
        assert!(accuracy.rationale.contains("Malformed evaluator output"));
        assert_eq!(accuracy.evaluator_model, "gemini-2.5-pro");
    }

    #[tokio::test]
    async fn test_unconfigured_judge_scores_zero_with_named_config() {
        let router = router_with(CannedJudge {
            name: "openai",
            reply: Ok(String::new()),
            configured: false,
        });
        let accuracy = router.evaluate("q", "r", "gpt-4o").await;
        assert_eq!(accuracy.score, 0);
        assert!(accuracy.rationale.contains("not configured"));
    }

    #[tokio::test]
    async fn test_judge_transport_failure_degrades() {
        let router = router_with(CannedJudge {
            name: "vertex",
            reply: Err("connection reset"),
            configured: true,
        });
        let accuracy = router.evaluate("q", "r", "gemini-2.5-pro").await;
        assert_eq!(accuracy.score, 0);
        assert!(accuracy.rationale.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_evaluator_model_is_overwritten() {
        let router = router_with(CannedJudge {
            name: "vertex",
            reply: Ok(r#"{"score": 70, "rationale": "fine", "evaluator_model": "i-lied"}"#.to_string()),
            configured: true,
        });
        let accuracy = router.evaluate("q", "r", "gemini-2.5-pro").await;
        assert_eq!(accuracy.evaluator_model, "gemini-2.5-pro");
        assert_eq!(accuracy.score, 70);
    }

    proptest! {
        /// parse_verdict is total: any judge output yields a verdict, and
        /// a parsed score always lands in [0, 100].
        #[test]
        fn prop_parse_verdict_is_total(raw in ".*") {
            match parse_verdict(&raw) {
                Verdict::Parsed { score, .. } => {
                    prop_assert!((0..=100).contains(&score));
                }
                Verdict::Degraded { echo } => {
                    // Truncated echoes carry at most the limit plus "...".
                    prop_assert!(echo.len() <= MALFORMED_ECHO_LIMIT + 3);
                }
            }
        }

        /// No integer a judge reports survives unclamped.
        #[test]
        fn prop_reported_score_is_clamped(reported in any::<i64>()) {
            let raw = format!(r#"{{"score": {reported}, "rationale": "r"}}"#);
            match parse_verdict(&raw) {
                Verdict::Parsed { score, .. } => {
                    prop_assert_eq!(score, reported.clamp(0, 100));
                }
                other => prop_assert!(false, "expected parsed verdict, got {:?}", other),
            }
        }
    }
}
