//! Food analysis records.
//!
//! The analyzer returns a structured payload (food items with nutrition
//! estimates) plus an uncertainty assessment. The clarification core only
//! inspects the uncertainty fields and replaces items by name during a
//! merge; everything else is carried through untouched.

use serde::{Deserialize, Serialize};

/// Nutrition estimate for one item or for a whole analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionInfo {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl NutritionInfo {
    pub fn add(&mut self, other: &NutritionInfo) {
        self.calories += other.calories;
        self.protein += other.protein;
        self.carbs += other.carbs;
        self.fat += other.fat;
    }
}

/// One identified food item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    /// Descriptive quantity, e.g. "1 cup" or "2 slices".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    #[serde(default)]
    pub nutrition: NutritionInfo,
}

impl FoodItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: None,
            nutrition: NutritionInfo::default(),
        }
    }

    pub fn with_quantity(mut self, quantity: impl Into<String>) -> Self {
        self.quantity = Some(quantity.into());
        self
    }

    pub fn with_nutrition(mut self, nutrition: NutritionInfo) -> Self {
        self.nutrition = nutrition;
        self
    }
}

/// Identification payload: the items plus summed totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub food_items: Vec<FoodItem>,
    #[serde(default)]
    pub total_nutrition: NutritionInfo,
}

impl AnalysisPayload {
    pub fn new(food_items: Vec<FoodItem>) -> Self {
        let mut payload = Self {
            food_items,
            total_nutrition: NutritionInfo::default(),
        };
        payload.recompute_totals();
        payload
    }

    /// Re-derive totals from the item list.
    pub fn recompute_totals(&mut self) {
        let mut total = NutritionInfo::default();
        for item in &self.food_items {
            total.add(&item.nutrition);
        }
        self.total_nutrition = total;
    }
}

/// Normalized uncertainty output from an analysis call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyAssessment {
    pub has_uncertainty: bool,
    /// Food items the analyzer flagged as unclear, in analyzer order.
    #[serde(default)]
    pub uncertain_items: Vec<String>,
    /// Free-form explanations, parallel to the items where possible.
    #[serde(default)]
    pub uncertainty_reasons: Vec<String>,
    /// Analyzer confidence in [0.0, 1.0].
    pub confidence_score: f64,
}

impl UncertaintyAssessment {
    /// A confident assessment with no flagged items.
    pub fn confident(confidence_score: f64) -> Self {
        Self {
            has_uncertainty: false,
            uncertain_items: Vec::new(),
            uncertainty_reasons: Vec::new(),
            confidence_score,
        }
    }

    pub fn uncertain(
        items: Vec<String>,
        reasons: Vec<String>,
        confidence_score: f64,
    ) -> Self {
        Self {
            has_uncertainty: true,
            uncertain_items: items,
            uncertainty_reasons: reasons,
            confidence_score,
        }
    }
}

/// Which round of the flow produced an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Initial,
    Clarification,
    Combined,
}

/// One complete analyzer result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub payload: AnalysisPayload,
    pub uncertainty: UncertaintyAssessment,
    pub source: AnalysisSource,
}

impl AnalysisResult {
    pub fn initial(payload: AnalysisPayload, uncertainty: UncertaintyAssessment) -> Self {
        Self {
            payload,
            uncertainty,
            source: AnalysisSource::Initial,
        }
    }

    pub fn clarification(payload: AnalysisPayload, uncertainty: UncertaintyAssessment) -> Self {
        Self {
            payload,
            uncertainty,
            source: AnalysisSource::Clarification,
        }
    }
}
