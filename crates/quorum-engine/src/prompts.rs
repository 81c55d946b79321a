//! Prompts for judge-model evaluation.
//!
//! One fixed rating prompt is used for every judge family. The judge is
//! instructed to answer in strict JSON; the evaluator router still treats
//! the reply as untrusted and parses it with recovery.

/// Build the rating prompt for a (query, response) pair.
pub fn rating_prompt(original_query: &str, ai_response: &str) -> String {
    format!(
        r#"You are an expert AI Governance Judge.

TASK: Evaluate the accuracy and completeness of the AI's response to the User's query.

USER QUERY: {original_query}
AI RESPONSE: {ai_response}

INSTRUCTIONS:
1. Rate the accuracy from 0 to 100 (100 being perfect, 0 being completely wrong).
2. Provide a brief rationale (1 sentence).
3. Classify the query complexity as exactly one of: "Straightforward", "Mid-Level Complication", "Advanced Reasoning".
4. Suggest a one-sentence improvement to the user's prompt.
5. Output ONLY valid JSON in this format:
{{
    "score": 95,
    "rationale": "Correctly identifies S3 encryption defaults and provides actionable steps.",
    "query_category": "Straightforward",
    "prompt_optimization": "Name the specific bucket and region to get account-specific guidance."
}}

IMPORTANT: The score must be an integer between 0 and 100, NOT a decimal."#
    )
}
