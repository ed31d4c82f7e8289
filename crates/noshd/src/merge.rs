//! Combining an original analysis with its clarification.
//!
//! Pure function: no I/O, no store state, deterministic for a given pair
//! of inputs. Items the original flagged as uncertain are superseded by
//! clarification items of the same name; everything else carries over.
//! Flagged items the clarification never mentions stay flagged, so one
//! merge round does not fake full confidence.

use nosh_common::{
    AnalysisPayload, AnalysisResult, AnalysisSource, FoodItem, UncertaintyAssessment,
};

/// Merge `original` (source = Initial) with `clarification` into one
/// combined result.
pub fn merge(original: &AnalysisResult, clarification: &AnalysisResult) -> AnalysisResult {
    let flagged: Vec<String> = original
        .uncertainty
        .uncertain_items
        .iter()
        .map(|name| name.to_lowercase())
        .collect();

    let clarified: Vec<&FoodItem> = clarification.payload.food_items.iter().collect();

    let mut merged_items: Vec<FoodItem> = Vec::new();
    for item in &original.payload.food_items {
        let key = item.name.to_lowercase();
        let is_flagged = flagged.contains(&key);
        let replacement = if is_flagged {
            clarified.iter().find(|c| c.name.to_lowercase() == key)
        } else {
            None
        };
        match replacement {
            Some(new_item) => merged_items.push((*new_item).clone()),
            None => merged_items.push(item.clone()),
        }
    }

    // Anything the clarification adds that matches no original item is new
    // information; keep it.
    for item in &clarification.payload.food_items {
        let key = item.name.to_lowercase();
        let known = original
            .payload
            .food_items
            .iter()
            .any(|o| o.name.to_lowercase() == key);
        if !known {
            merged_items.push(item.clone());
        }
    }

    // Flagged names the clarification never addressed stay flagged, with
    // their original reasons where the lists run parallel.
    let mut remaining_items: Vec<String> = Vec::new();
    let mut remaining_reasons: Vec<String> = Vec::new();
    for (idx, name) in original.uncertainty.uncertain_items.iter().enumerate() {
        let key = name.to_lowercase();
        let addressed = clarified.iter().any(|c| c.name.to_lowercase() == key);
        if !addressed {
            remaining_items.push(name.clone());
            if let Some(reason) = original.uncertainty.uncertainty_reasons.get(idx) {
                remaining_reasons.push(reason.clone());
            }
        }
    }

    let confidence_score = original
        .uncertainty
        .confidence_score
        .max(clarification.uncertainty.confidence_score);

    let uncertainty = UncertaintyAssessment {
        has_uncertainty: !remaining_items.is_empty(),
        uncertain_items: remaining_items,
        uncertainty_reasons: remaining_reasons,
        confidence_score,
    };

    AnalysisResult {
        payload: AnalysisPayload::new(merged_items),
        uncertainty,
        source: AnalysisSource::Combined,
    }
}
