//! Vehicle context resolution
//!
//! A document's vehicle context is the make (and model, when one dominates)
//! its staged vehicle mentions point at most often. The context feeds the
//! vehicle-specificity score component; entities tied to a different make
//! contradict it.

use super::extraction::ExtractedVehicle;

/// A concrete vehicle tie on an entity: make, optional model, optional years.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleTie {
    pub make: String,
    pub model: Option<String>,
    pub year_start: Option<i32>,
    pub year_end: Option<i32>,
}

impl VehicleTie {
    pub fn new(make: &str, model: Option<&str>) -> Self {
        Self {
            make: make.to_string(),
            model: model.map(str::to_string),
            year_start: None,
            year_end: None,
        }
    }

    fn normalized_make(&self) -> String {
        self.make.trim().to_lowercase()
    }

    fn normalized_model(&self) -> Option<String> {
        self.model.as_deref().map(|m| m.trim().to_lowercase())
    }

    /// Whether two optional year ranges overlap. Open ends overlap anything.
    pub fn years_overlap(&self, other: &VehicleTie) -> bool {
        let start_a = self.year_start.unwrap_or(i32::MIN);
        let end_a = self.year_end.unwrap_or(i32::MAX);
        let start_b = other.year_start.unwrap_or(i32::MIN);
        let end_b = other.year_end.unwrap_or(i32::MAX);
        start_a <= end_b && start_b <= end_a
    }
}

/// How an entity's vehicle tie relates to the document context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleMatch {
    /// Make and model match the context with overlapping years
    ExactModel,
    /// Only the make matches
    MakeOnly,
    /// The entity asserts no make and the context asserts none either
    OemAgnostic,
    /// One side asserts a make, the other does not; no agreement and no
    /// contradiction to score
    Neutral,
    /// The entity ties to a make that contradicts the context
    Contradicts,
}

/// The dominant make/model among a document's staged vehicle mentions.
#[derive(Debug, Clone, Default)]
pub struct VehicleContext {
    pub tie: Option<VehicleTie>,
}

impl VehicleContext {
    /// Derive the context from staged mentions: the most frequent
    /// (make, model) pair wins; ties break by name ascending so the result
    /// is reproducible across runs.
    pub fn from_mentions(mentions: &[ExtractedVehicle]) -> Self {
        use std::collections::BTreeMap;

        if mentions.is_empty() {
            return Self::default();
        }

        let mut counts: BTreeMap<(String, String), (usize, VehicleTie)> = BTreeMap::new();
        for mention in mentions {
            let key = (
                mention.make.trim().to_lowercase(),
                mention
                    .model
                    .as_deref()
                    .unwrap_or_default()
                    .trim()
                    .to_lowercase(),
            );
            let entry = counts.entry(key).or_insert_with(|| {
                (
                    0,
                    VehicleTie {
                        make: mention.make.clone(),
                        model: mention.model.clone(),
                        year_start: mention.year_start,
                        year_end: mention.year_end,
                    },
                )
            });
            entry.0 += 1;
        }

        // BTreeMap iteration is name-ascending, so scanning for the strict
        // maximum leaves the alphabetically first pair on count ties.
        let tie = counts
            .into_iter()
            .fold(None::<(usize, VehicleTie)>, |best, (_, (count, tie))| {
                match &best {
                    Some((best_count, _)) if *best_count >= count => best,
                    _ => Some((count, tie)),
                }
            })
            .map(|(_, tie)| tie);

        Self { tie }
    }

    /// Classify an entity's vehicle tie against this context.
    pub fn classify(&self, entity_tie: Option<&VehicleTie>) -> VehicleMatch {
        match (entity_tie, &self.tie) {
            (None, None) => VehicleMatch::OemAgnostic,
            (None, Some(_)) | (Some(_), None) => VehicleMatch::Neutral,
            (Some(entity), Some(context)) => {
                if entity.normalized_make() != context.normalized_make() {
                    return VehicleMatch::Contradicts;
                }
                match (entity.normalized_model(), context.normalized_model()) {
                    (Some(a), Some(b)) if a == b && entity.years_overlap(context) => {
                        VehicleMatch::ExactModel
                    }
                    _ => VehicleMatch::MakeOnly,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(make: &str, model: Option<&str>) -> ExtractedVehicle {
        ExtractedVehicle {
            make: make.to_string(),
            model: model.map(str::to_string),
            year_start: None,
            year_end: None,
            engine: None,
            transmission: None,
            related_dtc_codes: Vec::new(),
        }
    }

    #[test]
    fn test_context_picks_most_frequent_make() {
        let mentions = vec![
            mention("Ford", Some("F-150")),
            mention("Ford", Some("F-150")),
            mention("Toyota", Some("Camry")),
        ];
        let context = VehicleContext::from_mentions(&mentions);
        assert_eq!(context.tie.as_ref().unwrap().make, "Ford");
    }

    #[test]
    fn test_context_tie_breaks_by_name() {
        let mentions = vec![
            mention("Toyota", Some("Camry")),
            mention("Ford", Some("F-150")),
        ];
        let context = VehicleContext::from_mentions(&mentions);
        // One mention each; "ford" sorts before "toyota".
        assert_eq!(context.tie.as_ref().unwrap().make, "Ford");
    }

    #[test]
    fn test_empty_mentions_yield_no_context() {
        let context = VehicleContext::from_mentions(&[]);
        assert!(context.tie.is_none());
    }

    #[test]
    fn test_classify_exact_model() {
        let context = VehicleContext::from_mentions(&[mention("Ford", Some("F-150"))]);
        let tie = VehicleTie::new("ford", Some("f-150"));
        assert_eq!(context.classify(Some(&tie)), VehicleMatch::ExactModel);
    }

    #[test]
    fn test_classify_make_only() {
        let context = VehicleContext::from_mentions(&[mention("Ford", Some("F-150"))]);
        let tie = VehicleTie::new("Ford", Some("Mustang"));
        assert_eq!(context.classify(Some(&tie)), VehicleMatch::MakeOnly);
    }

    #[test]
    fn test_classify_contradiction() {
        let context = VehicleContext::from_mentions(&[mention("Ford", Some("F-150"))]);
        let tie = VehicleTie::new("Toyota", Some("Camry"));
        assert_eq!(context.classify(Some(&tie)), VehicleMatch::Contradicts);
    }

    #[test]
    fn test_classify_oem_agnostic() {
        let context = VehicleContext::default();
        assert_eq!(context.classify(None), VehicleMatch::OemAgnostic);
    }

    #[test]
    fn test_year_overlap_rules() {
        let mut a = VehicleTie::new("Ford", Some("F-150"));
        a.year_start = Some(2010);
        a.year_end = Some(2014);
        let mut b = VehicleTie::new("Ford", Some("F-150"));
        b.year_start = Some(2014);
        b.year_end = Some(2018);
        assert!(a.years_overlap(&b));

        b.year_start = Some(2015);
        assert!(!a.years_overlap(&b));

        // Open-ended ranges overlap everything
        let open = VehicleTie::new("Ford", Some("F-150"));
        assert!(a.years_overlap(&open));
    }

    #[test]
    fn test_exact_model_requires_year_overlap() {
        let mut mention_with_years = mention("Ford", Some("F-150"));
        mention_with_years.year_start = Some(2010);
        mention_with_years.year_end = Some(2012);
        let context = VehicleContext::from_mentions(&[mention_with_years]);

        let mut tie = VehicleTie::new("Ford", Some("F-150"));
        tie.year_start = Some(2015);
        tie.year_end = Some(2018);
        assert_eq!(context.classify(Some(&tie)), VehicleMatch::MakeOnly);
    }
}
