//! Bibliographic references and the PICO(TT) criteria they are screened against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bibliographic record under review. Read-only for the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub pmid: Option<String>,
}

impl Reference {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn with_abstract(mut self, text: &str) -> Self {
        self.abstract_text = Some(text.to_string());
        self
    }

    pub fn with_authors(mut self, authors: &str) -> Self {
        self.authors = Some(authors.to_string());
        self
    }

    pub fn with_journal(mut self, journal: &str) -> Self {
        self.journal = Some(journal.to_string());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_doi(mut self, doi: &str) -> Self {
        self.doi = Some(doi.to_string());
        self
    }

    /// Authors as shown in progress events; empty when unknown.
    pub fn authors_or_empty(&self) -> &str {
        self.authors.as_deref().unwrap_or("")
    }
}

/// The PICO(TT) screening rubric for a project.
///
/// Every field is optional: an absent element is rendered as
/// "Not specified" in prompts rather than omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(default)]
    pub population: Option<String>,
    #[serde(default)]
    pub intervention: Option<String>,
    #[serde(default)]
    pub comparator: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub timeframe_start: Option<String>,
    #[serde(default)]
    pub timeframe_end: Option<String>,
    #[serde(default)]
    pub timeframe_description: Option<String>,
    #[serde(default)]
    pub study_designs: Vec<String>,
    #[serde(default)]
    pub inclusion_criteria: Vec<String>,
    #[serde(default)]
    pub exclusion_criteria: Vec<String>,
}

impl Criteria {
    pub fn with_population(mut self, population: &str) -> Self {
        self.population = Some(population.to_string());
        self
    }

    pub fn with_intervention(mut self, intervention: &str) -> Self {
        self.intervention = Some(intervention.to_string());
        self
    }

    pub fn with_outcome(mut self, outcome: &str) -> Self {
        self.outcome = Some(outcome.to_string());
        self
    }

    pub fn with_inclusion(mut self, criterion: &str) -> Self {
        self.inclusion_criteria.push(criterion.to_string());
        self
    }

    pub fn with_exclusion(mut self, criterion: &str) -> Self {
        self.exclusion_criteria.push(criterion.to_string());
        self
    }

    pub fn with_study_design(mut self, design: &str) -> Self {
        self.study_designs.push(design.to_string());
        self
    }

    /// Freeze the criteria for the duration of one run.
    pub fn snapshot(&self) -> CriteriaSnapshot {
        CriteriaSnapshot {
            criteria: self.clone(),
            captured_at: Utc::now(),
        }
    }
}

/// Criteria captured at run start. Every reference in a run is screened
/// against the same snapshot even if the project's criteria change meanwhile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaSnapshot {
    pub criteria: Criteria,
    pub captured_at: DateTime<Utc>,
}
