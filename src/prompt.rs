//! Reviewer prompt construction.
//!
//! Each reference is screened twice with the same material but a different
//! bias instruction:
//!
//! - **Conservative**: exclude whenever eligibility is in doubt
//! - **Comprehensive**: include unless the reference is clearly irrelevant
//!
//! The asymmetry is what makes a disagreement between the two slots a
//! signal worth adjudicating.

use screenwise_common::{Criteria, PicottElement, Reference, Stance};

const NOT_SPECIFIED: &str = "Not specified";

/// JSON contract every reviewer response must follow.
pub const RESPONSE_SCHEMA: &str = r#"{
  "picott_assessment": {
    "population":   { "status": "present|absent|unclear", "evidence": "verbatim quote or empty" },
    "intervention": { "status": "present|absent|unclear", "evidence": "verbatim quote or empty" },
    "comparator":   { "status": "present|absent|unclear", "evidence": "verbatim quote or empty" },
    "outcome":      { "status": "present|absent|unclear", "evidence": "verbatim quote or empty" },
    "timeframe":    { "status": "present|absent|unclear", "evidence": "verbatim quote or empty" },
    "study_design": { "status": "present|absent|unclear", "evidence": "verbatim quote or empty" }
  },
  "criteria_assessment": {
    "inclusion": [ { "criterion": "criterion text", "status": "met|not_met|unclear", "evidence": "quote" } ],
    "exclusion": [ { "criterion": "criterion text", "status": "met|not_met|unclear", "evidence": "quote" } ]
  },
  "reasoning": "one paragraph synthesizing the assessments above",
  "recommendation": "include|exclude",
  "confidence": 0.0
}"#;

/// Build the full reviewer prompt for one reference under one stance.
pub fn build_prompt(reference: &Reference, criteria: &Criteria, stance: Stance) -> String {
    format!(
        r#"# Systematic Review Screening ({role})

You are an expert systematic reviewer screening a reference for eligibility.

## Reference
- Title: {title}
- Authors: {authors}
- Journal: {journal}
- Year: {year}
- DOI: {doi}
- PMID: {pmid}

### Abstract
{abstract_text}

## Screening Criteria (PICOTT)
- Population: {population}
- Intervention: {intervention}
- Comparator: {comparator}
- Outcome: {outcome}
- Timeframe: {timeframe}
- Study designs: {designs}

### Inclusion criteria
{inclusion}

### Exclusion criteria
{exclusion}

## Your Stance
{stance_instruction}

## Decision Rules
Your recommendation MUST be exactly "include" or "exclude". There is no third
option: "maybe", "unclear" or "uncertain" are not valid recommendations.

## Required Analysis (in this order)
1. For each PICOTT element ({elements}), quote the passage of the title or
   abstract that addresses it and assess it as present, absent or unclear.
2. For each inclusion and exclusion criterion listed above, state whether it is
   met, not_met or unclear and cite the supporting evidence.
3. Synthesize the assessments into one reasoning paragraph that justifies the
   recommendation.

## Output
Respond with ONLY a JSON object in this exact format (no markdown, no
explanation outside the JSON):

```json
{schema}
```

"confidence" is a number between 0.0 and 1.0 expressing how certain you are of
the recommendation.
"#,
        role = role_title(stance),
        title = or_not_specified(Some(reference.title.as_str())),
        authors = or_not_specified(reference.authors.as_deref()),
        journal = or_not_specified(reference.journal.as_deref()),
        year = reference
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        doi = or_not_specified(reference.doi.as_deref()),
        pmid = or_not_specified(reference.pmid.as_deref()),
        abstract_text = or_not_specified(reference.abstract_text.as_deref()),
        population = or_not_specified(criteria.population.as_deref()),
        intervention = or_not_specified(criteria.intervention.as_deref()),
        comparator = or_not_specified(criteria.comparator.as_deref()),
        outcome = or_not_specified(criteria.outcome.as_deref()),
        timeframe = format_timeframe(criteria),
        designs = format_inline_list(&criteria.study_designs),
        inclusion = format_bullets(&criteria.inclusion_criteria),
        exclusion = format_bullets(&criteria.exclusion_criteria),
        stance_instruction = stance_instruction(stance),
        elements = PicottElement::ALL
            .iter()
            .map(|e| e.label())
            .collect::<Vec<_>>()
            .join(", "),
        schema = RESPONSE_SCHEMA,
    )
}

fn role_title(stance: Stance) -> &'static str {
    match stance {
        Stance::Conservative => "Conservative Reviewer",
        Stance::Comprehensive => "Comprehensive Reviewer",
    }
}

/// Bias instruction that differentiates the two reviewer slots.
pub fn stance_instruction(stance: Stance) -> &'static str {
    match stance {
        Stance::Conservative => {
            "You are the CONSERVATIVE reviewer. Include a reference only when the \
             title and abstract clearly satisfy the criteria. When evidence is \
             missing, ambiguous or in doubt, default to EXCLUDE."
        }
        Stance::Comprehensive => {
            "You are the COMPREHENSIVE reviewer. Your priority is not to miss \
             potentially relevant studies. Default to INCLUDE unless the reference \
             is clearly irrelevant to the criteria."
        }
    }
}

fn or_not_specified(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => NOT_SPECIFIED,
    }
}

fn format_timeframe(criteria: &Criteria) -> String {
    let start = criteria.timeframe_start.as_deref().filter(|s| !s.trim().is_empty());
    let end = criteria.timeframe_end.as_deref().filter(|s| !s.trim().is_empty());
    let description = criteria
        .timeframe_description
        .as_deref()
        .filter(|s| !s.trim().is_empty());

    let bounds = match (start, end) {
        (Some(s), Some(e)) => Some(format!("{} to {}", s, e)),
        (Some(s), None) => Some(format!("from {}", s)),
        (None, Some(e)) => Some(format!("until {}", e)),
        (None, None) => None,
    };

    match (bounds, description) {
        (Some(b), Some(d)) => format!("{} ({})", b, d),
        (Some(b), None) => b,
        (None, Some(d)) => d.to_string(),
        (None, None) => NOT_SPECIFIED.to_string(),
    }
}

fn format_inline_list(items: &[String]) -> String {
    if items.is_empty() {
        NOT_SPECIFIED.to_string()
    } else {
        items.join(", ")
    }
}

fn format_bullets(items: &[String]) -> String {
    if items.is_empty() {
        NOT_SPECIFIED.to_string()
    } else {
        items
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
