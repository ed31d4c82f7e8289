//! The opaque food analysis call.
//!
//! `FoodAnalyzer` is the seam the clarification core depends on. The
//! production implementation posts to an OpenAI-compatible chat endpoint
//! and expects a strict JSON reply; tests use `ScriptedAnalyzer` with
//! pre-configured results.

use async_trait::async_trait;
use nosh_common::ipc::IncomingMessage;
use nosh_common::{
    AnalysisPayload, AnalysisResult, AnalyzerConfig, FoodItem, NoshError, NutritionInfo, Result,
    UncertaintyAssessment,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Analysis call. When `context` is present this is a clarification
/// analysis and the implementation must instruct the model to resolve the
/// listed uncertain items.
#[async_trait]
pub trait FoodAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        message: &IncomingMessage,
        context: Option<&UncertaintyAssessment>,
    ) -> Result<AnalysisResult>;
}

const SYSTEM_PROMPT: &str = "You are a nutritionist's assistant. You analyze food descriptions \
and reply with strict JSON: {\"food_items\": [{\"name\", \"quantity\", \"nutrition\": \
{\"calories\", \"protein\", \"carbs\", \"fat\"}}], \"uncertainty\": {\"has_uncertainty\", \
\"uncertain_items\", \"uncertainty_reasons\", \"confidence_score\"}}. Flag any item you \
cannot identify confidently.";

/// Wire shape of the model's JSON reply.
#[derive(Debug, Deserialize)]
struct AnalyzerReply {
    #[serde(default)]
    food_items: Vec<ReplyItem>,
    uncertainty: ReplyUncertainty,
}

#[derive(Debug, Deserialize)]
struct ReplyItem {
    name: String,
    #[serde(default)]
    quantity: Option<String>,
    #[serde(default)]
    nutrition: ReplyNutrition,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyNutrition {
    #[serde(default)]
    calories: f64,
    #[serde(default)]
    protein: f64,
    #[serde(default)]
    carbs: f64,
    #[serde(default)]
    fat: f64,
}

#[derive(Debug, Deserialize)]
struct ReplyUncertainty {
    has_uncertainty: bool,
    #[serde(default)]
    uncertain_items: Vec<String>,
    #[serde(default)]
    uncertainty_reasons: Vec<String>,
    confidence_score: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// HTTP analyzer against an OpenAI-compatible chat completions endpoint.
pub struct HttpAnalyzer {
    config: AnalyzerConfig,
    client: reqwest::Client,
}

impl HttpAnalyzer {
    pub fn new(config: AnalyzerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { config, client })
    }

    fn user_prompt(message: &IncomingMessage, context: Option<&UncertaintyAssessment>) -> String {
        let mut prompt = format!(
            "Analyze this food description and provide nutritional information: {}",
            message.content
        );
        if let Some(assessment) = context {
            prompt.push_str(
                "\n\nThis is a clarification of an earlier analysis that was unclear about: ",
            );
            prompt.push_str(&assessment.uncertain_items.join(", "));
            if !assessment.uncertainty_reasons.is_empty() {
                prompt.push_str(" (");
                prompt.push_str(&assessment.uncertainty_reasons.join("; "));
                prompt.push(')');
            }
            prompt.push_str(". Resolve those items specifically.");
        }
        prompt
    }

    fn parse_reply(text: &str, clarification: bool) -> Result<AnalysisResult> {
        let reply: AnalyzerReply = serde_json::from_str(text)
            .map_err(|e| NoshError::Analysis(format!("malformed analyzer reply: {}", e)))?;

        let score = reply.uncertainty.confidence_score;
        if !(0.0..=1.0).contains(&score) {
            return Err(NoshError::Analysis(format!(
                "confidence score out of range: {}",
                score
            )));
        }

        let items = reply
            .food_items
            .into_iter()
            .map(|item| {
                let mut food = FoodItem::new(item.name).with_nutrition(NutritionInfo {
                    calories: item.nutrition.calories,
                    protein: item.nutrition.protein,
                    carbs: item.nutrition.carbs,
                    fat: item.nutrition.fat,
                });
                if let Some(quantity) = item.quantity {
                    food = food.with_quantity(quantity);
                }
                food
            })
            .collect();

        let uncertainty = UncertaintyAssessment {
            has_uncertainty: reply.uncertainty.has_uncertainty,
            uncertain_items: reply.uncertainty.uncertain_items,
            uncertainty_reasons: reply.uncertainty.uncertainty_reasons,
            confidence_score: score,
        };

        let payload = AnalysisPayload::new(items);
        Ok(if clarification {
            AnalysisResult::clarification(payload, uncertainty)
        } else {
            AnalysisResult::initial(payload, uncertainty)
        })
    }
}

#[async_trait]
impl FoodAnalyzer for HttpAnalyzer {
    async fn analyze(
        &self,
        message: &IncomingMessage,
        context: Option<&UncertaintyAssessment>,
    ) -> Result<AnalysisResult> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::user_prompt(message, context) },
            ],
            "response_format": { "type": "json_object" },
        });

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        debug!(
            "Analyzer call ({}) for {} bytes of input",
            if context.is_some() { "clarification" } else { "initial" },
            message.content.len()
        );

        let response = request
            .send()
            .await
            .map_err(|e| NoshError::Analysis(format!("analyzer request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(NoshError::Analysis(format!(
                "analyzer returned HTTP {}",
                response.status()
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| NoshError::Analysis(format!("invalid analyzer response: {}", e)))?;

        let content = chat
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or_else(|| NoshError::Analysis("analyzer returned empty response".into()))?;

        Self::parse_reply(content, context.is_some())
    }
}

/// Deterministic analyzer for tests: pops pre-configured results in order.
pub struct ScriptedAnalyzer {
    script: std::sync::Mutex<std::collections::VecDeque<Result<AnalysisResult>>>,
}

impl ScriptedAnalyzer {
    pub fn new(results: Vec<Result<AnalysisResult>>) -> Self {
        Self {
            script: std::sync::Mutex::new(results.into()),
        }
    }
}

#[async_trait]
impl FoodAnalyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        _message: &IncomingMessage,
        context: Option<&UncertaintyAssessment>,
    ) -> Result<AnalysisResult> {
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(NoshError::Analysis("script exhausted".into())));

        // Scripts encode the expected source; keep it honest with the call.
        if let Ok(result) = &next {
            if context.is_some() {
                debug_assert_ne!(result.source, nosh_common::AnalysisSource::Initial);
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nosh_common::ipc::PayloadKind;

    #[test]
    fn test_parse_reply_happy_path() {
        let text = r#"{
            "food_items": [
                {"name": "oatmeal", "quantity": "1 cup",
                 "nutrition": {"calories": 150, "protein": 5, "carbs": 27, "fat": 3}}
            ],
            "uncertainty": {
                "has_uncertainty": false,
                "uncertain_items": [],
                "uncertainty_reasons": [],
                "confidence_score": 0.9
            }
        }"#;

        let result = HttpAnalyzer::parse_reply(text, false).unwrap();
        assert_eq!(result.source, nosh_common::AnalysisSource::Initial);
        assert_eq!(result.payload.food_items.len(), 1);
        assert_eq!(result.payload.total_nutrition.calories, 150.0);
        assert!(!result.uncertainty.has_uncertainty);
    }

    #[test]
    fn test_parse_reply_rejects_garbage() {
        let err = HttpAnalyzer::parse_reply("not json at all", false).unwrap_err();
        assert!(matches!(err, NoshError::Analysis(_)));
    }

    #[test]
    fn test_parse_reply_rejects_out_of_range_confidence() {
        let text = r#"{
            "food_items": [],
            "uncertainty": {
                "has_uncertainty": false,
                "confidence_score": 1.7
            }
        }"#;
        let err = HttpAnalyzer::parse_reply(text, false).unwrap_err();
        assert!(matches!(err, NoshError::Analysis(_)));
    }

    #[test]
    fn test_clarification_prompt_lists_uncertain_items() {
        let message = IncomingMessage {
            kind: PayloadKind::Text,
            content: "it was carbonara".to_string(),
        };
        let context = UncertaintyAssessment::uncertain(
            vec!["pasta dish".to_string()],
            vec!["sauce unclear".to_string()],
            0.4,
        );

        let prompt = HttpAnalyzer::user_prompt(&message, Some(&context));
        assert!(prompt.contains("pasta dish"));
        assert!(prompt.contains("sauce unclear"));
        assert!(prompt.contains("carbonara"));
    }
}
