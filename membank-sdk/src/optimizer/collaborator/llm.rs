//! Collaborator backed by a text completion service.
//!
//! The completion client is injected; this module only builds prompts and
//! enforces the output contracts.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{AnalysisCollaborator, AnalysisRequest, PlanCollaborator, PlanRequest};
use crate::error::{SDKError, SDKResult};
use crate::optimizer::types::{AnalysisResult, OptimizationPlan};
use crate::utils::content_hash;

const ANALYSIS_SYSTEM_PROMPT: &str = "You analyze a software-architecture knowledge graph. \
Identify stale entities, redundant entity groups and optimization opportunities. \
Respond with a single JSON object matching the AnalysisResult schema, with no prose.";

const PLAN_SYSTEM_PROMPT: &str = "You plan maintenance of a software-architecture knowledge graph. \
Propose delete, merge, update or move actions that address the analysis within the strategy bounds. \
Respond with a single JSON object matching the OptimizationPlan schema, with no prose.";

/// Text completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> SDKResult<String>;
}

pub struct LlmCollaborator<C> {
    client: C,
}

impl<C: CompletionClient> LlmCollaborator<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    async fn ask<T: DeserializeOwned>(
        &self,
        contract: &str,
        system: &str,
        prompt: &str,
    ) -> SDKResult<T> {
        tracing::debug!("Requesting {} (prompt {})", contract, &content_hash(prompt)[..12]);
        let response = self.client.complete(system, prompt).await?;

        let body = extract_json(&response)
            .ok_or_else(|| SDKError::schema(contract, "response contains no JSON object"))?;
        serde_json::from_str(body).map_err(|e| SDKError::schema(contract, e.to_string()))
    }
}

#[async_trait]
impl<C: CompletionClient> AnalysisCollaborator for LlmCollaborator<C> {
    async fn analyze(&self, request: &AnalysisRequest) -> SDKResult<AnalysisResult> {
        let input = json!({
            "memoryContext": request.memory_context,
            "sample": request.sample,
            "contextAnalysis": request.context_analysis,
            "strategy": request.strategy,
            "strategyConfig": request.strategy_config,
            "focusAreas": request.effective_focus_areas(),
        });
        let prompt = format!(
            "Analyze this memory bank and report stale and redundant knowledge.\n\n{}",
            serde_json::to_string_pretty(&input)?
        );

        let result: AnalysisResult = self
            .ask("AnalysisResult", ANALYSIS_SYSTEM_PROMPT, &prompt)
            .await?;
        result.validate()?;
        Ok(result)
    }
}

#[async_trait]
impl<C: CompletionClient> PlanCollaborator for LlmCollaborator<C> {
    async fn plan(&self, request: &PlanRequest) -> SDKResult<OptimizationPlan> {
        let input = json!({
            "memoryContext": request.memory_context,
            "analysisResult": request.analysis_result,
            "analysisId": request.analysis_id,
            "strategy": request.strategy,
            "strategyConfig": request.strategy_config,
            "focusAreas": request.effective_focus_areas(),
        });
        let prompt = format!(
            "Create an optimization plan for this analysis. At most {} actions.\n\n{}",
            request.strategy_config.max_deletions,
            serde_json::to_string_pretty(&input)?
        );

        let mut plan: OptimizationPlan = self
            .ask("OptimizationPlan", PLAN_SYSTEM_PROMPT, &prompt)
            .await?;
        plan.validate()?;
        if plan.analysis_id.is_none() {
            plan.analysis_id = request.analysis_id.clone();
        }
        Ok(plan)
    }
}

/// The JSON object in a completion: a fenced code block if present,
/// otherwise the outermost braces.
fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```") {
        let fenced = &text[start + 3..];
        let fenced = fenced.strip_prefix("json").unwrap_or(fenced);
        if let Some(end) = fenced.find("```") {
            let inner = fenced[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use crate::config::StrategyTable;
    use crate::optimizer::types::{MemoryContext, Strategy};

    /// Replays a canned response and records the prompts it saw.
    struct StubClient {
        response: String,
        prompts: Mutex<Vec<String>>,
    }

    impl StubClient {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for StubClient {
        async fn complete(&self, _system: &str, prompt: &str) -> SDKResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.response.clone())
        }
    }

    fn context() -> MemoryContext {
        MemoryContext {
            repository: "repo".into(),
            branch: "main".into(),
            entity_counts: BTreeMap::from([("Component".to_string(), 2)]),
            total_entities: 2,
            total_relationships: 1,
            average_entity_age_days: 3.5,
            last_optimization: None,
        }
    }

    fn analysis_request() -> AnalysisRequest {
        AnalysisRequest {
            memory_context: context(),
            sample: None,
            context_analysis: None,
            strategy: Strategy::Balanced,
            strategy_config: StrategyTable::default().balanced.clone(),
            focus_areas: vec![],
        }
    }

    const ANALYSIS_JSON: &str = r#"{
        "summary": {
            "totalEntitiesAnalyzed": 2,
            "staleEntitiesFound": 1,
            "redundancyGroupsFound": 0,
            "optimizationOpportunities": 0,
            "overallHealthScore": 0.5
        },
        "staleEntities": [{
            "id": "comp-old",
            "type": "Component",
            "name": "Old",
            "staleness": 0.8,
            "reason": "unused",
            "safeToDelete": true
        }],
        "riskAssessment": {"overallRisk": "low"}
    }"#;

    #[tokio::test]
    async fn test_analysis_from_fenced_response() {
        let response = format!("Here you go:\n```json\n{}\n```\nDone.", ANALYSIS_JSON);
        let collaborator = LlmCollaborator::new(StubClient::new(&response));

        let result = collaborator.analyze(&analysis_request()).await.unwrap();
        assert_eq!(result.stale_entities.len(), 1);
        assert_eq!(result.stale_entities[0].id, "comp-old");

        let prompts = collaborator.client.prompts.lock().unwrap();
        assert!(prompts[0].contains("\"repository\": \"repo\""));
        assert!(prompts[0].contains("stale-detection"));
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_rejected() {
        let response = ANALYSIS_JSON.replace("0.5", "1.5");
        let collaborator = LlmCollaborator::new(StubClient::new(&response));

        let err = collaborator.analyze(&analysis_request()).await.unwrap_err();
        assert!(matches!(err, SDKError::Schema { ref contract, .. } if contract == "AnalysisResult"));
    }

    #[tokio::test]
    async fn test_malformed_response_is_schema_error() {
        let collaborator = LlmCollaborator::new(StubClient::new("I cannot help with that."));
        let err = collaborator.analyze(&analysis_request()).await.unwrap_err();
        assert!(matches!(err, SDKError::Schema { .. }));

        let collaborator = LlmCollaborator::new(StubClient::new(r#"{"summary": 3}"#));
        let err = collaborator.analyze(&analysis_request()).await.unwrap_err();
        assert!(matches!(err, SDKError::Schema { .. }));
    }

    #[tokio::test]
    async fn test_plan_requires_targets() {
        let analysis: AnalysisResult = serde_json::from_str(ANALYSIS_JSON).unwrap();
        let request = PlanRequest {
            memory_context: context(),
            analysis_result: analysis,
            analysis_id: Some("analysis-7".into()),
            strategy: Strategy::Balanced,
            strategy_config: StrategyTable::default().balanced.clone(),
            focus_areas: vec![],
        };

        let valid = r#"{
            "id": "plan-x",
            "strategy": "balanced",
            "actions": [{"type": "delete", "entityId": "comp-old", "reason": "unused"}],
            "executionOrder": ["comp-old"]
        }"#;
        let collaborator = LlmCollaborator::new(StubClient::new(valid));
        let plan = collaborator.plan(&request).await.unwrap();
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.analysis_id.as_deref(), Some("analysis-7"));
        assert!(collaborator.client.prompts.lock().unwrap()[0].contains("At most 20 actions"));

        let missing_target = r#"{
            "id": "plan-y",
            "strategy": "balanced",
            "actions": [{"type": "merge", "entityId": "comp-a"}]
        }"#;
        let collaborator = LlmCollaborator::new(StubClient::new(missing_target));
        let err = collaborator.plan(&request).await.unwrap_err();
        assert!(err.to_string().contains("requires targetEntityId"));
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("x {\"a\": 1} y"), Some("{\"a\": 1}"));
        assert_eq!(extract_json("```\n{\"a\": 1}\n```"), Some("{\"a\": 1}"));
        assert_eq!(extract_json("no json"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }
}
