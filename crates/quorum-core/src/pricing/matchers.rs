//! Fuzzy model-name matching heuristics.
//!
//! Catalog entries use marketing names ("Claude 3.5 Sonnet") while requests
//! carry provider-native ids ("anthropic.claude-3-5-sonnet-20240620-v1:0").
//! These matchers bridge the two. The rules are deliberately asymmetric and
//! conservative: a wrong rate is worse than a fallback rate.

/// Parameter-size tokens recognized in Llama model names.
const LLAMA_SIZES: &[&str] = &["1b", "3b", "8b", "70b", "405b", "11b", "90b"];

/// Strip spaces, dots, hyphens and colons, then lowercase.
fn normalize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '.' | '-' | ':'))
        .collect()
}

/// Whether a requested id references the 3.5 model generation.
fn request_is_3_5(req_id: &str, normalized: &str) -> bool {
    req_id.contains("3-5") || req_id.contains("3.5") || normalized.contains("35")
}

/// Match a catalog name like "Claude 3.5 Sonnet" against a requested id like
/// "anthropic.claude-3-5-sonnet-20240620-v1:0".
///
/// A sonnet or haiku entry matches only when both sides agree on whether
/// they reference the 3.5 variant. Ids containing "llama" never match,
/// guarding against shared tokens producing false positives.
pub fn anthropic_matches(catalog_name: &str, req_id: &str) -> bool {
    let j = normalize(catalog_name);
    let r = normalize(req_id);

    if r.contains("llama") {
        return false;
    }

    let catalog_3_5 = catalog_name.contains("3.5");
    let req_3_5 = request_is_3_5(req_id, &r);

    for family in ["sonnet", "haiku"] {
        if j.contains(family) && r.contains(family) {
            return catalog_3_5 == req_3_5;
        }
    }

    false
}

/// Pick the Meta rate-table family bucket for a requested id.
///
/// Returns the bucket key used in `aws_meta.json`, or `None` when the id
/// does not look like a Llama model at all.
pub fn meta_family_bucket(req_id: &str) -> Option<&'static str> {
    let lower = req_id.to_lowercase();

    if lower.contains("llama3") || lower.contains("llama-3") {
        if lower.contains("beta") || lower.contains("3.1") || lower.contains("3-1") {
            Some("llama_3_1")
        } else if lower.contains("3.2") || lower.contains("3-2") {
            Some("llama_3_2")
        } else {
            Some("llama_3")
        }
    } else if lower.contains("llama2") {
        Some("llama_2")
    } else {
        None
    }
}

/// Match Llama entries on a shared parameter-size token.
pub fn llama_size_matches(catalog_name: &str, req_id: &str) -> bool {
    let j = catalog_name.to_lowercase();
    let r = req_id.to_lowercase();
    LLAMA_SIZES.iter().any(|size| j.contains(size) && r.contains(size))
}

/// OpenAI: the catalog name must be a substring of the requested id.
/// First match wins, so table order is significant.
pub fn openai_matches(catalog_name: &str, req_id: &str) -> bool {
    req_id.contains(catalog_name)
}

/// GCP: either name may be a substring of the other. The caller strips
/// any "google/" namespace prefix before matching.
pub fn gcp_matches(catalog_name: &str, clean_req_id: &str) -> bool {
    clean_req_id.contains(catalog_name) || catalog_name.contains(clean_req_id)
}
