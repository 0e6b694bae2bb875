use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RegisterError {
    #[error("validation error: {0}")]
    Validation(String),
}

pub const RATING_MIN: u8 = 1;
pub const RATING_MAX: u8 = 5;
pub const DEFAULT_RATING: u8 = 3;

/// Clamps a probability, impact, or questionnaire rating into [1, 5].
///
/// Bounded input widgets are the normal source of ratings, so this is a
/// defensive backstop rather than an error path.
#[must_use]
pub fn clamp_rating(value: u8) -> u8 {
    value.clamp(RATING_MIN, RATING_MAX)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Low,
    Medium,
    High,
}

impl Classification {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl Display for Classification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a risk score to its ordinal classification.
///
/// Thresholds: score <= 6 is low, 7..=14 is medium, >= 15 is high. Total
/// over every reachable score (1x1 = 1 up to 5x5 = 25).
#[must_use]
pub fn classify(score: u8) -> Classification {
    if score <= 6 {
        Classification::Low
    } else if score <= 14 {
        Classification::Medium
    } else {
        Classification::High
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RiskEntry {
    pub description: String,
    pub probability: u8,
    pub impact: u8,
    pub score: u8,
    pub classification: Classification,
}

impl RiskEntry {
    #[must_use]
    pub fn new(description: &str, probability: u8, impact: u8) -> Self {
        let probability = clamp_rating(probability);
        let impact = clamp_rating(impact);
        let score = probability * impact;
        Self {
            description: description.to_string(),
            probability,
            impact,
            score,
            classification: classify(score),
        }
    }

    /// Overwrites the derived columns from probability and impact.
    ///
    /// Derived values never flow the other way: a caller-supplied score or
    /// classification is discarded here.
    pub fn recompute(&mut self) {
        self.probability = clamp_rating(self.probability);
        self.impact = clamp_rating(self.impact);
        self.score = self.probability * self.impact;
        self.classification = classify(self.score);
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RiskFilter {
    All,
    Level(Classification),
}

impl RiskFilter {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(Self::All),
            other => Classification::parse(other).map(Self::Level),
        }
    }

    #[must_use]
    pub fn matches(self, entry: &RiskEntry) -> bool {
        match self {
            Self::All => true,
            Self::Level(level) => entry.classification == level,
        }
    }
}

/// The canonical in-memory risk table for one session.
///
/// Insertion order is display order; descriptions are not unique. Derived
/// columns are recomputed after every mutation, never lazily.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct RiskRegister {
    entries: Vec<RiskEntry>,
}

impl RiskRegister {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The hardcoded starter set used when no durable rows exist.
    #[must_use]
    pub fn default_set() -> Self {
        Self {
            entries: vec![
                RiskEntry::new("Server failure", 4, 5),
                RiskEntry::new("DDoS attack", 3, 4),
                RiskEntry::new("Human error", 5, 3),
                RiskEntry::new("Power loss", 2, 2),
            ],
        }
    }

    /// Builds a register from loaded rows, recomputing every derived column.
    #[must_use]
    pub fn from_entries(mut entries: Vec<RiskEntry>) -> Self {
        for entry in &mut entries {
            entry.recompute();
        }
        Self { entries }
    }

    /// Appends a new entry with derived columns computed immediately.
    ///
    /// A whitespace-only description is a silent no-op and returns `false`;
    /// no entry is created and no error is surfaced.
    pub fn add_entry(&mut self, description: &str, probability: u8, impact: u8) -> bool {
        if description.trim().is_empty() {
            return false;
        }
        self.entries
            .push(RiskEntry::new(description, probability, impact));
        true
    }

    /// Replaces the whole table with an edited version.
    ///
    /// Models a dynamic-rows table edit: insertions, deletions, and in-place
    /// field changes arrive in one call. Every row's score and classification
    /// are recomputed from probability x impact afterwards, so edits to the
    /// derived columns themselves are always overwritten.
    pub fn apply_edits(&mut self, entries: Vec<RiskEntry>) {
        self.entries = entries;
        self.recompute_all();
    }

    /// Recomputes derived columns for every row. Invoked once per mutation.
    pub fn recompute_all(&mut self) {
        for entry in &mut self.entries {
            entry.recompute();
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<RiskEntry> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    /// Order-preserving read-only view of rows matching the filter.
    #[must_use]
    pub fn filtered(&self, filter: RiskFilter) -> Vec<&RiskEntry> {
        self.entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .collect()
    }

    #[must_use]
    pub fn entries(&self) -> &[RiskEntry] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&RiskEntry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut RiskEntry> {
        self.entries.get_mut(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum MaturityTier {
    NeedsAction,
    Adequate,
    Good,
}

impl MaturityTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NeedsAction => "needs_action",
            Self::Adequate => "adequate",
            Self::Good => "good",
        }
    }

    /// The canned interpretation text shown next to a summary.
    #[must_use]
    pub fn interpretation(self) -> &'static str {
        match self {
            Self::NeedsAction => "Low maturity: needs immediate action",
            Self::Adequate => "Medium maturity: adequate, with room to improve",
            Self::Good => "High maturity: good, keep current practices",
        }
    }
}

/// Interprets a single integer rating: <=2 needs action, <=4 adequate,
/// else good.
#[must_use]
pub fn interpret_rating(rating: u8) -> MaturityTier {
    if rating <= 2 {
        MaturityTier::NeedsAction
    } else if rating <= 4 {
        MaturityTier::Adequate
    } else {
        MaturityTier::Good
    }
}

/// Interprets a continuous average with the same thresholds as
/// [`interpret_rating`].
#[must_use]
pub fn interpret_average(average: f64) -> MaturityTier {
    if average <= 2.0 {
        MaturityTier::NeedsAction
    } else if average <= 4.0 {
        MaturityTier::Adequate
    } else {
        MaturityTier::Good
    }
}

pub const QUALITY_CHARACTERISTICS: [&str; 6] = [
    "functionality",
    "reliability",
    "usability",
    "efficiency",
    "maintainability",
    "portability",
];

pub const CONTROL_AREAS: [(&str, &[&str]); 4] = [
    (
        "access_control",
        &[
            "password_policy",
            "least_privilege",
            "account_review",
            "two_factor_auth",
        ],
    ),
    (
        "network_security",
        &[
            "firewall_rules",
            "network_segmentation",
            "intrusion_detection",
            "traffic_encryption",
        ],
    ),
    (
        "data_protection",
        &["backup_schedule", "encryption_at_rest", "retention_policy"],
    ),
    (
        "incident_response",
        &["response_plan", "incident_drills", "post_incident_review"],
    ),
];

/// A fixed-item checklist mapping item name to a 1-5 rating.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Questionnaire {
    items: Vec<String>,
    ratings: BTreeMap<String, u8>,
}

impl Questionnaire {
    /// Builds a questionnaire with every item at the default rating.
    #[must_use]
    pub fn new(items: &[&str]) -> Self {
        let items: Vec<String> = items.iter().map(ToString::to_string).collect();
        let ratings = items
            .iter()
            .map(|item| (item.clone(), DEFAULT_RATING))
            .collect();
        Self { items, ratings }
    }

    /// The software-quality checklist over the six canonical characteristics.
    #[must_use]
    pub fn quality() -> Self {
        Self::new(&QUALITY_CHARACTERISTICS)
    }

    /// Overlays persisted ratings onto the defaults.
    ///
    /// Stored items that are no longer canonical are ignored; canonical items
    /// with no stored row keep the default.
    pub fn seed(&mut self, stored: &BTreeMap<String, u8>) {
        for (item, rating) in stored {
            if self.ratings.contains_key(item) {
                self.ratings.insert(item.clone(), clamp_rating(*rating));
            }
        }
    }

    /// Sets one rating, clamped into [1, 5].
    ///
    /// # Errors
    /// Returns [`RegisterError::Validation`] when the item is not part of
    /// this questionnaire.
    pub fn set_rating(&mut self, item: &str, value: u8) -> Result<(), RegisterError> {
        if !self.ratings.contains_key(item) {
            return Err(RegisterError::Validation(format!(
                "unknown questionnaire item: {item}"
            )));
        }
        self.ratings.insert(item.to_string(), clamp_rating(value));
        Ok(())
    }

    #[must_use]
    pub fn rating(&self, item: &str) -> Option<u8> {
        self.ratings.get(item).copied()
    }

    /// Item/rating pairs in canonical display order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.items.iter().map(|item| {
            let rating = self.ratings.get(item).copied().unwrap_or(DEFAULT_RATING);
            (item.as_str(), rating)
        })
    }

    /// Floating-point mean over every item.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        let total: u32 = self.iter().map(|(_, rating)| u32::from(rating)).sum();
        f64::from(total) / self.items.len() as f64
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The security-control checklist: four areas, each its own questionnaire.
///
/// Averages are computed per area over only that area's items; there is no
/// whole-assessment average.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct ComplianceAssessment {
    areas: Vec<(String, Questionnaire)>,
}

impl ComplianceAssessment {
    #[must_use]
    pub fn new() -> Self {
        let areas = CONTROL_AREAS
            .iter()
            .map(|(area, items)| ((*area).to_string(), Questionnaire::new(items)))
            .collect();
        Self { areas }
    }

    /// Overlays persisted (area, control, rating) rows onto the defaults.
    pub fn seed(&mut self, stored: &[(String, String, u8)]) {
        for (area, control, rating) in stored {
            if let Some(questionnaire) = self.area_mut(area) {
                // Unknown controls are ignored, same as questionnaire seeding.
                let _ = questionnaire.set_rating(control, *rating);
            }
        }
    }

    /// Sets one control rating.
    ///
    /// # Errors
    /// Returns [`RegisterError::Validation`] when the area or control item is
    /// unknown.
    pub fn set_rating(&mut self, area: &str, control: &str, value: u8) -> Result<(), RegisterError> {
        let questionnaire = self
            .area_mut(area)
            .ok_or_else(|| RegisterError::Validation(format!("unknown control area: {area}")))?;
        questionnaire.set_rating(control, value)
    }

    #[must_use]
    pub fn area(&self, name: &str) -> Option<&Questionnaire> {
        self.areas
            .iter()
            .find(|(area, _)| area == name)
            .map(|(_, questionnaire)| questionnaire)
    }

    fn area_mut(&mut self, name: &str) -> Option<&mut Questionnaire> {
        self.areas
            .iter_mut()
            .find(|(area, _)| area == name)
            .map(|(_, questionnaire)| questionnaire)
    }

    /// Mean rating over one area's items.
    ///
    /// # Errors
    /// Returns [`RegisterError::Validation`] when the area is unknown.
    pub fn area_average(&self, name: &str) -> Result<f64, RegisterError> {
        self.area(name)
            .map(Questionnaire::average)
            .ok_or_else(|| RegisterError::Validation(format!("unknown control area: {name}")))
    }

    /// Area name/questionnaire pairs in canonical display order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Questionnaire)> {
        self.areas
            .iter()
            .map(|(area, questionnaire)| (area.as_str(), questionnaire))
    }
}

impl Default for ComplianceAssessment {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one session owns: the risk table and both questionnaires.
///
/// Passed explicitly to every operation; there are no process-wide
/// singletons.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub risks: RiskRegister,
    pub quality: Questionnaire,
    pub compliance: ComplianceAssessment,
}

impl SessionContext {
    /// A session seeded entirely from defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            risks: RiskRegister::default_set(),
            quality: Questionnaire::quality(),
            compliance: ComplianceAssessment::new(),
        }
    }
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`RegisterError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, RegisterError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            RegisterError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;
    use proptest::prelude::*;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    #[test]
    fn classify_threshold_boundaries() {
        assert_eq!(classify(1), Classification::Low);
        assert_eq!(classify(6), Classification::Low);
        assert_eq!(classify(7), Classification::Medium);
        assert_eq!(classify(14), Classification::Medium);
        assert_eq!(classify(15), Classification::High);
        assert_eq!(classify(25), Classification::High);
    }

    proptest! {
        #[test]
        fn classify_matches_thresholds_over_rating_grid(
            probability in 1_u8..=5,
            impact in 1_u8..=5,
        ) {
            let score = probability * impact;
            let expected = if score <= 6 {
                Classification::Low
            } else if score <= 14 {
                Classification::Medium
            } else {
                Classification::High
            };
            prop_assert_eq!(classify(score), expected);
        }

        #[test]
        fn apply_edits_overwrites_derived_columns(
            probability in 1_u8..=5,
            impact in 1_u8..=5,
            bogus_score in 0_u8..=255,
        ) {
            let mut register = RiskRegister::new();
            let mut edited = RiskEntry::new("edited row", probability, impact);
            edited.score = bogus_score;
            edited.classification = Classification::High;

            register.apply_edits(vec![edited]);

            let row = match register.get(0) {
                Some(value) => value,
                None => panic!("edited row missing after apply_edits"),
            };
            prop_assert_eq!(row.score, probability * impact);
            prop_assert_eq!(row.classification, classify(probability * impact));
        }
    }

    #[test]
    fn entry_clamps_out_of_range_ratings() {
        let entry = RiskEntry::new("clamped", 0, 9);
        assert_eq!(entry.probability, 1);
        assert_eq!(entry.impact, 5);
        assert_eq!(entry.score, 5);
    }

    #[test]
    fn add_entry_rejects_blank_descriptions() {
        let mut register = RiskRegister::new();
        assert!(!register.add_entry("", 3, 3));
        assert!(!register.add_entry("   \t", 3, 3));
        assert!(register.is_empty());

        assert!(register.add_entry("real threat", 3, 3));
        assert_eq!(register.len(), 1);
    }

    #[test]
    fn default_set_classifies_canonical_scenario() {
        let register = RiskRegister::default_set();
        let expected = [
            ("Server failure", 20, Classification::High),
            ("DDoS attack", 12, Classification::Medium),
            ("Human error", 15, Classification::High),
            ("Power loss", 4, Classification::Low),
        ];

        assert_eq!(register.len(), expected.len());
        for (entry, (description, score, classification)) in
            register.entries().iter().zip(expected)
        {
            assert_eq!(entry.description, description);
            assert_eq!(entry.score, score);
            assert_eq!(entry.classification, classification);
        }
    }

    #[test]
    fn filtered_preserves_order_and_does_not_mutate() {
        let register = RiskRegister::default_set();
        let high: Vec<&str> = register
            .filtered(RiskFilter::Level(Classification::High))
            .iter()
            .map(|entry| entry.description.as_str())
            .collect();
        assert_eq!(high, vec!["Server failure", "Human error"]);

        let all = register.filtered(RiskFilter::All);
        assert_eq!(all.len(), register.len());
        assert_eq!(register, RiskRegister::default_set());
    }

    #[test]
    fn filter_parses_sentinel_and_levels() {
        assert_eq!(RiskFilter::parse("all"), Some(RiskFilter::All));
        assert_eq!(
            RiskFilter::parse("medium"),
            Some(RiskFilter::Level(Classification::Medium))
        );
        assert_eq!(RiskFilter::parse("extreme"), None);
    }

    #[test]
    fn uniform_questionnaire_average_is_exact() {
        for rating in RATING_MIN..=RATING_MAX {
            let mut questionnaire = Questionnaire::quality();
            for item in QUALITY_CHARACTERISTICS {
                must_ok(questionnaire.set_rating(item, rating));
            }
            assert_eq!(questionnaire.average(), f64::from(rating));
        }
    }

    #[test]
    fn interpret_tiers_at_canonical_points() {
        assert_eq!(interpret_rating(1), MaturityTier::NeedsAction);
        assert_eq!(interpret_rating(2), MaturityTier::NeedsAction);
        assert_eq!(interpret_rating(3), MaturityTier::Adequate);
        assert_eq!(interpret_rating(4), MaturityTier::Adequate);
        assert_eq!(interpret_rating(5), MaturityTier::Good);

        assert_eq!(interpret_average(2.0), MaturityTier::NeedsAction);
        assert_eq!(interpret_average(2.5), MaturityTier::Adequate);
        assert_eq!(interpret_average(4.0), MaturityTier::Adequate);
        assert_eq!(interpret_average(4.25), MaturityTier::Good);
        assert_eq!(interpret_average(5.0), MaturityTier::Good);
    }

    #[test]
    fn set_rating_clamps_and_rejects_unknown_items() {
        let mut questionnaire = Questionnaire::quality();
        must_ok(questionnaire.set_rating("usability", 9));
        assert_eq!(questionnaire.rating("usability"), Some(5));

        let err = questionnaire.set_rating("velocity", 3);
        assert!(matches!(err, Err(RegisterError::Validation(_))));
    }

    #[test]
    fn seeding_overlays_stored_ratings_onto_defaults() {
        let mut stored = BTreeMap::new();
        stored.insert("reliability".to_string(), 5_u8);
        stored.insert("obsolete_item".to_string(), 1_u8);

        let mut questionnaire = Questionnaire::quality();
        questionnaire.seed(&stored);

        assert_eq!(questionnaire.rating("reliability"), Some(5));
        assert_eq!(questionnaire.rating("usability"), Some(DEFAULT_RATING));
        assert_eq!(questionnaire.rating("obsolete_item"), None);
        assert_eq!(questionnaire.len(), QUALITY_CHARACTERISTICS.len());
    }

    #[test]
    fn compliance_averages_are_per_area() {
        let mut assessment = ComplianceAssessment::new();
        must_ok(assessment.set_rating("access_control", "password_policy", 5));
        must_ok(assessment.set_rating("access_control", "least_privilege", 5));
        must_ok(assessment.set_rating("access_control", "account_review", 5));
        must_ok(assessment.set_rating("access_control", "two_factor_auth", 5));

        assert_eq!(must_ok(assessment.area_average("access_control")), 5.0);
        // Other areas stay at the default mean.
        assert_eq!(
            must_ok(assessment.area_average("network_security")),
            f64::from(DEFAULT_RATING)
        );

        let err = assessment.area_average("physical_security");
        assert!(matches!(err, Err(RegisterError::Validation(_))));
    }

    #[test]
    fn session_context_owns_defaulted_state() {
        let session = SessionContext::with_defaults();
        assert_eq!(session.risks.len(), 4);
        assert_eq!(session.quality.len(), 6);
        assert_eq!(session.compliance.iter().count(), 4);
    }
}
