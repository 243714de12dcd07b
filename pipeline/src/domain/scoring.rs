//! Shared scoring library
//!
//! Pure functions behind the Resolve stage and the audit/stats
//! collaborators. Everything here is deterministic: the same inputs produce
//! bit-identical outputs and orderings, which the resolution log depends on.

use std::cmp::Ordering;

use uuid::Uuid;

use super::vehicle::VehicleMatch;

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

// =============================================================================
// Score Components
// =============================================================================

/// Evidence Quality (0..50): `50·(0.65·avg_trust + 0.35·avg_relevance)`.
pub fn evidence_quality(avg_trust: f64, avg_relevance: f64) -> f64 {
    50.0 * (0.65 * clamp01(avg_trust) + 0.35 * clamp01(avg_relevance))
}

/// Consensus (0..20): `20·clamp(ln(1+n)/ln(11), 0, 1)`.
///
/// Saturates at 10 contributing chunks; monotone non-decreasing in `n`.
pub fn consensus(evidence_count: i64) -> f64 {
    let n = evidence_count.max(0) as f64;
    20.0 * clamp01((1.0 + n).ln() / 11f64.ln())
}

/// Vehicle Specificity (−20..+20) by match class.
pub fn vehicle_specificity(m: VehicleMatch) -> f64 {
    match m {
        VehicleMatch::ExactModel => 20.0,
        VehicleMatch::MakeOnly => 12.0,
        VehicleMatch::OemAgnostic => 6.0,
        VehicleMatch::Neutral => 0.0,
        VehicleMatch::Contradicts => -20.0,
    }
}

/// Practical-impact inputs vary by entity kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PracticalImpact {
    /// Verified fixes and related parts, by confirmed repair count
    FixOrPart { confirmed_repairs: i64 },
    /// Possible causes, by empirical probability weight
    Cause { probability_weight: f64 },
    /// Symptoms, by frequency score (0..10)
    Symptom { frequency_score: i32 },
    /// Forum threads, by whether a solution was marked
    ForumThread { solution_marked: bool },
    /// Diagnostic steps, sensors, live-data parameters
    Informational,
}

/// Practical Impact (0..10) by entity kind.
pub fn practical_impact(input: PracticalImpact) -> f64 {
    match input {
        PracticalImpact::FixOrPart { confirmed_repairs } => {
            let n = confirmed_repairs.max(0) as f64;
            10.0 * clamp01((1.0 + n).ln() / 51f64.ln())
        }
        PracticalImpact::Cause { probability_weight } => 10.0 * clamp01(probability_weight),
        PracticalImpact::Symptom { frequency_score } => {
            10.0 * clamp01(f64::from(frequency_score) / 10.0)
        }
        PracticalImpact::ForumThread { solution_marked } => {
            if solution_marked { 6.0 } else { 0.0 }
        }
        PracticalImpact::Informational => 0.0,
    }
}

/// Unified score S ∈ [−20, 100]: the sum of the four components.
pub fn unified_score(
    avg_trust: f64,
    avg_relevance: f64,
    evidence_count: i64,
    vehicle: VehicleMatch,
    impact: PracticalImpact,
) -> f64 {
    evidence_quality(avg_trust, avg_relevance)
        + consensus(evidence_count)
        + vehicle_specificity(vehicle)
        + practical_impact(impact)
}

// =============================================================================
// Derived Aggregates
// =============================================================================

/// Empirical probability weight for causes:
/// `min(1.0, 0.5 + 0.1·(evidence_count − 1))`, clamped to [0, 1].
pub fn probability_weight(evidence_count: i64) -> f64 {
    let n = evidence_count.max(1) as f64;
    clamp01(0.5 + 0.1 * (n - 1.0))
}

/// Frequency score for symptoms: `min(10, evidence_count)`.
pub fn frequency_score(evidence_count: i64) -> i32 {
    evidence_count.clamp(0, 10) as i32
}

/// Evidence-weighted mean for merging aggregates: the old mean weighted by
/// its count, the new observation weighted by its count.
pub fn weighted_mean(old_mean: f64, old_count: i64, new_mean: f64, new_count: i64) -> f64 {
    let old_n = old_count.max(0) as f64;
    let new_n = new_count.max(0) as f64;
    if old_n + new_n == 0.0 {
        return 0.0;
    }
    (old_mean * old_n + new_mean * new_n) / (old_n + new_n)
}

/// DTC confidence:
/// `min(1.0, 0.3·min(1, source_count/5) + 0.7·avg_trust)`.
pub fn confidence(source_count: i64, avg_trust: f64) -> f64 {
    let source_factor = (source_count.max(0) as f64 / 5.0).min(1.0);
    (0.3 * source_factor + 0.7 * avg_trust).min(1.0)
}

/// Weighted checklist of what a DTC record covers; the sum of present
/// items' weights is the completeness score.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checklist {
    pub has_steps: bool,
    pub has_causes: bool,
    pub has_description: bool,
    pub has_sensors: bool,
    pub has_tsb: bool,
    pub has_category: bool,
    pub has_severity: bool,
}

/// Completeness ∈ [0, 1] with weights
/// steps 0.30, causes 0.25, description 0.15, sensors 0.10, TSB 0.10,
/// category 0.05, severity 0.05.
pub fn completeness(checklist: Checklist) -> f64 {
    let mut score = 0.0;
    if checklist.has_steps {
        score += 0.30;
    }
    if checklist.has_causes {
        score += 0.25;
    }
    if checklist.has_description {
        score += 0.15;
    }
    if checklist.has_sensors {
        score += 0.10;
    }
    if checklist.has_tsb {
        score += 0.10;
    }
    if checklist.has_category {
        score += 0.05;
    }
    if checklist.has_severity {
        score += 0.05;
    }
    score
}

// =============================================================================
// Deterministic Ordering
// =============================================================================

/// The sort key for resolved entities. Ordering must be reproducible:
/// `S desc, evidence_count desc, avg_trust desc, avg_relevance desc,
/// entity_id asc`, with `total_cmp` making float comparison total.
#[derive(Debug, Clone, PartialEq)]
pub struct RankKey {
    pub score: f64,
    pub evidence_count: i64,
    pub avg_trust: f64,
    pub avg_relevance: f64,
    pub entity_id: Uuid,
}

pub fn rank_ordering(a: &RankKey, b: &RankKey) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.evidence_count.cmp(&a.evidence_count))
        .then_with(|| b.avg_trust.total_cmp(&a.avg_trust))
        .then_with(|| b.avg_relevance.total_cmp(&a.avg_relevance))
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_evidence_quality_bounds() {
        assert!((evidence_quality(0.0, 0.0) - 0.0).abs() < EPS);
        assert!((evidence_quality(1.0, 1.0) - 50.0).abs() < EPS);
        assert!((evidence_quality(1.0, 0.0) - 32.5).abs() < EPS);
        assert!((evidence_quality(0.0, 1.0) - 17.5).abs() < EPS);
    }

    #[test]
    fn test_evidence_quality_clamps_inputs() {
        assert!((evidence_quality(1.7, -0.2) - 32.5).abs() < EPS);
    }

    #[test]
    fn test_consensus_saturates_at_ten() {
        assert!((consensus(10) - 20.0).abs() < EPS);
        assert!((consensus(1000) - 20.0).abs() < EPS);
        assert!(consensus(1) > 0.0);
        assert!((consensus(0) - 0.0).abs() < EPS);
    }

    #[test]
    fn test_consensus_monotone() {
        let mut prev = consensus(0);
        for n in 1..=30 {
            let cur = consensus(n);
            assert!(cur >= prev, "consensus decreased at n={}", n);
            prev = cur;
        }
    }

    #[test]
    fn test_vehicle_specificity_values() {
        assert_eq!(vehicle_specificity(VehicleMatch::ExactModel), 20.0);
        assert_eq!(vehicle_specificity(VehicleMatch::MakeOnly), 12.0);
        assert_eq!(vehicle_specificity(VehicleMatch::OemAgnostic), 6.0);
        assert_eq!(vehicle_specificity(VehicleMatch::Neutral), 0.0);
        assert_eq!(vehicle_specificity(VehicleMatch::Contradicts), -20.0);
    }

    #[test]
    fn test_practical_impact_fixes_saturate_at_fifty() {
        assert!((practical_impact(PracticalImpact::FixOrPart {
            confirmed_repairs: 50
        }) - 10.0)
            .abs()
            < EPS);
        assert!(
            practical_impact(PracticalImpact::FixOrPart {
                confirmed_repairs: 500
            }) <= 10.0
        );
        assert!(
            (practical_impact(PracticalImpact::FixOrPart {
                confirmed_repairs: 0
            }) - 0.0)
                .abs()
                < EPS
        );
    }

    #[test]
    fn test_practical_impact_by_kind() {
        assert!(
            (practical_impact(PracticalImpact::Cause {
                probability_weight: 0.7
            }) - 7.0)
                .abs()
                < EPS
        );
        assert!(
            (practical_impact(PracticalImpact::Symptom { frequency_score: 5 }) - 5.0).abs() < EPS
        );
        assert_eq!(
            practical_impact(PracticalImpact::ForumThread {
                solution_marked: true
            }),
            6.0
        );
        assert_eq!(
            practical_impact(PracticalImpact::ForumThread {
                solution_marked: false
            }),
            0.0
        );
        assert_eq!(practical_impact(PracticalImpact::Informational), 0.0);
    }

    #[test]
    fn test_unified_score_range() {
        let min = unified_score(
            0.0,
            0.0,
            0,
            VehicleMatch::Contradicts,
            PracticalImpact::Informational,
        );
        assert!((min - -20.0).abs() < EPS);

        let max = unified_score(
            1.0,
            1.0,
            10,
            VehicleMatch::ExactModel,
            PracticalImpact::Cause {
                probability_weight: 1.0,
            },
        );
        assert!((max - 100.0).abs() < EPS);
    }

    #[test]
    fn test_unified_score_reproducible() {
        let a = unified_score(
            0.83,
            0.61,
            4,
            VehicleMatch::MakeOnly,
            PracticalImpact::Cause {
                probability_weight: probability_weight(4),
            },
        );
        let b = unified_score(
            0.83,
            0.61,
            4,
            VehicleMatch::MakeOnly,
            PracticalImpact::Cause {
                probability_weight: probability_weight(4),
            },
        );
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_probability_weight_progression() {
        assert!((probability_weight(1) - 0.5).abs() < EPS);
        assert!((probability_weight(3) - 0.7).abs() < EPS);
        assert!((probability_weight(6) - 1.0).abs() < EPS);
        // Clamped even when observations suggest higher
        assert!((probability_weight(60) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_frequency_score_caps() {
        assert_eq!(frequency_score(1), 1);
        assert_eq!(frequency_score(10), 10);
        assert_eq!(frequency_score(25), 10);
        assert_eq!(frequency_score(0), 0);
    }

    #[test]
    fn test_weighted_mean() {
        // Old mean 0.8 over 3 observations, new 0.5 over 1
        let merged = weighted_mean(0.8, 3, 0.5, 1);
        assert!((merged - 0.725).abs() < EPS);
        assert!((weighted_mean(0.0, 0, 0.9, 2) - 0.9).abs() < EPS);
        assert_eq!(weighted_mean(0.5, 0, 0.5, 0), 0.0);
    }

    #[test]
    fn test_confidence_formula_exact() {
        // source_factor = min(1, 1/5) = 0.2
        assert!((confidence(1, 0.9) - (0.3 * 0.2 + 0.7 * 0.9)).abs() < EPS);
        // Saturated sources
        assert!((confidence(5, 0.5) - (0.3 + 0.35)).abs() < EPS);
        assert!((confidence(50, 1.0) - 1.0).abs() < EPS);
        assert!((confidence(0, 0.0) - 0.0).abs() < EPS);
    }

    #[test]
    fn test_completeness_weights() {
        assert!((completeness(Checklist::default()) - 0.0).abs() < EPS);
        let full = Checklist {
            has_steps: true,
            has_causes: true,
            has_description: true,
            has_sensors: true,
            has_tsb: true,
            has_category: true,
            has_severity: true,
        };
        assert!((completeness(full) - 1.0).abs() < EPS);
        let steps_only = Checklist {
            has_steps: true,
            ..Checklist::default()
        };
        assert!((completeness(steps_only) - 0.30).abs() < EPS);
    }

    #[test]
    fn test_rank_ordering_total() {
        let id_a = Uuid::from_u128(1);
        let id_b = Uuid::from_u128(2);

        let high = RankKey {
            score: 60.0,
            evidence_count: 2,
            avg_trust: 0.8,
            avg_relevance: 0.6,
            entity_id: id_b,
        };
        let low = RankKey {
            score: 40.0,
            evidence_count: 9,
            avg_trust: 0.9,
            avg_relevance: 0.9,
            entity_id: id_a,
        };
        assert_eq!(rank_ordering(&high, &low), Ordering::Less);

        // Full tie falls through to entity id ascending
        let tie_a = RankKey {
            entity_id: id_a,
            ..high.clone()
        };
        let tie_b = RankKey {
            entity_id: id_b,
            ..high.clone()
        };
        assert_eq!(rank_ordering(&tie_a, &tie_b), Ordering::Less);
        assert_eq!(rank_ordering(&tie_b, &tie_a), Ordering::Greater);
    }

    #[test]
    fn test_rank_ordering_is_stable_across_runs() {
        let mut keys: Vec<RankKey> = (0..8)
            .map(|i| RankKey {
                score: f64::from(i % 3) * 10.0,
                evidence_count: i64::from(i % 2),
                avg_trust: 0.5,
                avg_relevance: 0.5,
                entity_id: Uuid::from_u128(u128::from(i as u32)),
            })
            .collect();
        let mut again = keys.clone();
        keys.sort_by(rank_ordering);
        again.sort_by(rank_ordering);
        assert_eq!(keys, again);
    }
}
