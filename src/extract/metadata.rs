//! Document-level facts the statement pipeline needs: fiscal period, company
//! name and the unit scale of the figures.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, warn};

use super::error::{ExtractError, FailureKind, ParseFailure};
use super::prompts;
use super::retry::{retry, RetryPolicy};
use crate::llm::Oracle;

const FISCAL_YEAR_QUERY: &str = "fiscal year end date";

/// Segments handed to the oracle when looking for the fiscal year end.
pub const FISCAL_YEAR_TOP_N: usize = 5;

/// Character budgets tried in turn when looking for the company name.
pub const COMPANY_NAME_CONTEXT: [usize; 3] = [1000, 2000, 5000];

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him",
    "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just", "may", "me", "more",
    "most", "must", "my", "no", "nor", "not", "of", "off", "on", "once", "only", "or", "other",
    "our", "ours", "out", "over", "own", "same", "she", "should", "so", "some", "such", "than",
    "that", "the", "their", "theirs", "them", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "under", "until", "up", "upon", "very", "was", "we", "were", "what",
    "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would", "you",
    "your", "yours",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitScale {
    Thousands,
    Millions,
    Billions,
}

impl UnitScale {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitScale::Thousands => "thousands",
            UnitScale::Millions => "millions",
            UnitScale::Billions => "billions",
        }
    }
}

impl fmt::Display for UnitScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitScale {
    type Err = ParseFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s
            .trim()
            .trim_matches(|c| c == '\'' || c == '"' || c == '`')
            .trim_end_matches('.')
            .to_lowercase();
        match cleaned.as_str() {
            "thousands" => Ok(UnitScale::Thousands),
            "millions" => Ok(UnitScale::Millions),
            "billions" => Ok(UnitScale::Billions),
            _ => Err(ParseFailure::UnknownUnitScale {
                value: s.trim().to_string(),
            }),
        }
    }
}

/// Ask for the unit scale shared by the given tables.
pub async fn extract_unit_scale(
    oracle: &dyn Oracle,
    tables: &[String],
    policy: &RetryPolicy,
) -> Result<UnitScale, ExtractError> {
    let combined = tables.join("\n\n");
    let scale = retry(policy, "unit scale", |_| {
        let combined = combined.as_str();
        async move {
            let response = oracle
                .query(prompts::UNIT_SCALE_SYSTEM_PROMPT, combined)
                .await
                .map_err(|e| FailureKind::oracle(&e))?;
            Ok::<_, FailureKind>(response.parse::<UnitScale>()?)
        }
    })
    .await
    .map_err(|e| ExtractError::UnitScaleExhausted {
        attempts: e.attempts,
        last: e.last,
    })?;

    info!(unit_scale = %scale, "Unit scale determined");
    Ok(scale)
}

/// Retrieve the segments closest to "fiscal year end date" and ask for the
/// date. `None` when the oracle finds nothing or fails.
pub async fn extract_fiscal_year_end(oracle: &dyn Oracle, texts: &[&str]) -> Option<String> {
    if texts.is_empty() {
        return None;
    }

    let top = rank_by_similarity(FISCAL_YEAR_QUERY, texts, FISCAL_YEAR_TOP_N);
    let context = top
        .iter()
        .map(|&i| texts[i])
        .collect::<Vec<_>>()
        .join("\n\n");

    match oracle
        .query(
            prompts::FISCAL_YEAR_END_SYSTEM_PROMPT,
            &prompts::fiscal_year_end_user_prompt(&context),
        )
        .await
    {
        Ok(response) => found(&response),
        Err(e) => {
            warn!(error = %e, "Fiscal year end extraction failed");
            None
        }
    }
}

/// Grow the leading context until the oracle names the company. Empty when
/// no attempt finds it.
pub async fn extract_company_name(oracle: &dyn Oracle, texts: &[&str]) -> String {
    for budget in COMPANY_NAME_CONTEXT {
        let context = leading_context(texts, budget);
        if context.trim().is_empty() {
            continue;
        }

        match oracle
            .query(
                prompts::COMPANY_NAME_SYSTEM_PROMPT,
                &prompts::company_name_user_prompt(&context),
            )
            .await
        {
            Ok(response) => {
                if let Some(name) = found(&response) {
                    debug!(budget, company = %name, "Company name found");
                    return name;
                }
            }
            Err(e) => warn!(budget, error = %e, "Company name extraction failed"),
        }
    }
    String::new()
}

fn found(response: &str) -> Option<String> {
    let answer = response.trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case("not found") {
        None
    } else {
        Some(answer.to_string())
    }
}

/// Whole segments from the start of the document, up to `budget` characters.
fn leading_context(texts: &[&str], budget: usize) -> String {
    let mut context = String::new();
    let mut used = 0;
    for text in texts {
        let len = text.chars().count();
        if used + len > budget {
            break;
        }
        context.push_str(text);
        context.push_str("\n\n");
        used += len + 2;
    }
    context
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// L2-normalised TF-IDF vector over a shared vocabulary.
fn tfidf_vector(tokens: &[String], idf: &HashMap<String, f64>) -> HashMap<String, f64> {
    let mut vector: HashMap<String, f64> = HashMap::new();
    for token in tokens {
        if let Some(weight) = idf.get(token) {
            *vector.entry(token.clone()).or_default() += weight;
        }
    }
    let norm = vector.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in vector.values_mut() {
            *v /= norm;
        }
    }
    vector
}

/// Indices of the `top` texts most similar to `query`, best first.
pub fn rank_by_similarity(query: &str, texts: &[&str], top: usize) -> Vec<usize> {
    let docs: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();

    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for tokens in &docs {
        let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        for token in seen {
            *doc_freq.entry(token).or_default() += 1;
        }
    }

    // Smoothed idf: ln((1 + n) / (1 + df)) + 1
    let n = docs.len() as f64;
    let idf: HashMap<String, f64> = doc_freq
        .iter()
        .map(|(t, df)| (t.to_string(), ((1.0 + n) / (1.0 + *df as f64)).ln() + 1.0))
        .collect();

    let query_vec = tfidf_vector(&tokenize(query), &idf);
    let mut scored: Vec<(usize, f64)> = docs
        .iter()
        .enumerate()
        .map(|(i, tokens)| {
            let doc_vec = tfidf_vector(tokens, &idf);
            let score: f64 = query_vec
                .iter()
                .filter_map(|(t, q)| doc_vec.get(t).map(|d| q * d))
                .sum();
            (i, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().take(top).map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::llm::testing::ScriptedOracle;

    #[test]
    fn unit_scale_parsing() {
        assert_eq!(" Millions\n".parse::<UnitScale>(), Ok(UnitScale::Millions));
        assert_eq!("'thousands'".parse::<UnitScale>(), Ok(UnitScale::Thousands));
        assert!("hundreds".parse::<UnitScale>().is_err());
        assert!("millions of dollars".parse::<UnitScale>().is_err());
    }

    #[test]
    fn ranks_fiscal_year_text_first() {
        let texts = [
            "Total revenue grew across all segments.",
            "For the fiscal year ended December 31, 2023 (fiscal year end date)",
            "Our headquarters are in Seattle.",
        ];
        let top = rank_by_similarity(FISCAL_YEAR_QUERY, &texts, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0], 1);
    }

    #[test]
    fn leading_context_keeps_whole_segments() {
        let texts = ["aaaa", "bbbb", "cccc"];
        assert_eq!(leading_context(&texts, 10), "aaaa\n\nbbbb\n\n");
        assert_eq!(leading_context(&texts, 3), "");
    }

    #[tokio::test]
    async fn fiscal_year_not_found_is_none() {
        let oracle = ScriptedOracle::new(["Not Found"]);
        assert_eq!(extract_fiscal_year_end(&oracle, &["text"]).await, None);

        let oracle = ScriptedOracle::new([" December 31, 2023 "]);
        assert_eq!(
            extract_fiscal_year_end(&oracle, &["For the year ended December 31, 2023"]).await,
            Some("December 31, 2023".into())
        );
        assert!(oracle.user_prompts()[0].contains("For the year ended December 31, 2023"));
    }

    #[tokio::test]
    async fn fiscal_year_oracle_error_is_none() {
        let oracle = ScriptedOracle::default();
        assert_eq!(extract_fiscal_year_end(&oracle, &["text"]).await, None);
    }

    #[tokio::test]
    async fn company_name_expands_context() {
        let long = "x".repeat(1500);
        let texts = ["Acme Corp annual report", long.as_str()];
        let oracle = ScriptedOracle::new(["not found", "Acme Corporation"]);

        let name = extract_company_name(&oracle, &texts).await;
        assert_eq!(name, "Acme Corporation");
        let prompts = oracle.user_prompts();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains(&long));
        assert!(prompts[1].contains(&long));
    }

    #[tokio::test]
    async fn company_name_defaults_to_empty() {
        let oracle = ScriptedOracle::new(["Not Found", "Not Found", "Not Found"]);
        assert_eq!(extract_company_name(&oracle, &["Some text"]).await, "");
        assert_eq!(oracle.call_count(), 3);
    }

    #[tokio::test]
    async fn unit_scale_retries_bad_answers() {
        let oracle = ScriptedOracle::new(["in millions of USD", "Millions"]);
        let policy = RetryPolicy::response(3, Duration::ZERO);
        let scale = extract_unit_scale(&oracle, &["T".into()], &policy).await.unwrap();
        assert_eq!(scale, UnitScale::Millions);
        assert_eq!(oracle.call_count(), 2);
    }

    #[tokio::test]
    async fn unit_scale_exhaustion_is_an_error() {
        let oracle = ScriptedOracle::new(["lots", "many", "heaps"]);
        let policy = RetryPolicy::response(3, Duration::ZERO);
        let err = extract_unit_scale(&oracle, &["T".into()], &policy)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractError::UnitScaleExhausted { attempts: 3, .. }
        ));
    }
}
