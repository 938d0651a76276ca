//! Deterministic built-in collaborator.
//!
//! Staleness and redundancy are derived from the sample alone: no external
//! service is consulted, and the same sample always yields the same result.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use membank_core::{Entity, EntityRef, EntityType};
use uuid::Uuid;

use super::{AnalysisCollaborator, AnalysisRequest, PlanCollaborator, PlanRequest};
use crate::error::SDKResult;
use crate::optimizer::types::{
    AnalysisResult, AnalysisSummary, EstimatedImpact, MemorySample, OptimizationAction,
    OptimizationOpportunity, OptimizationPlan, Priority, RedundancyGroup, RiskAssessment,
    RiskLevel, SafetyMeasures, StaleEntity,
};
use crate::utils::{age_in_days, parse_timestamp};

const DEPRECATED_STALENESS: f64 = 0.9;
const UNKNOWN_AGE_STALENESS: f64 = 0.6;

/// Rule-based analysis and planning.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedCollaborator {
    now: Option<DateTime<Utc>>,
}

impl RuleBasedCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Judge ages against a fixed reference time.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Some(now) }
    }

    fn analyze_sample(&self, sample: &MemorySample, preserve_days: f64) -> AnalysisResult {
        let now = self.now.unwrap_or_else(Utc::now);

        let mut incoming: HashMap<EntityRef, Vec<String>> = HashMap::new();
        let mut outgoing: HashMap<EntityRef, Vec<String>> = HashMap::new();
        for rel in &sample.relationships {
            outgoing.entry(rel.from_ref()).or_default().push(rel.to_id.clone());
            incoming.entry(rel.to_ref()).or_default().push(rel.from_id.clone());
        }
        // The edge list may be capped, so prefer the stored degree when present.
        let degree = |entity: &Entity| {
            let key = entity.entity_ref();
            sample.degree_of(&key).unwrap_or_else(|| {
                incoming.get(&key).map_or(0, Vec::len) + outgoing.get(&key).map_or(0, Vec::len)
            })
        };

        let mut stale_entities = Vec::new();
        for entity in &sample.entities {
            let key = entity.entity_ref();
            let dependencies = incoming.get(&key).cloned().unwrap_or_default();
            let depends_on = outgoing.get(&key).cloned().unwrap_or_default();
            let connected = degree(entity) > 0;

            let deprecated = entity
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("deprecated"));
            let age = entity
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .map(|ts| age_in_days(&ts, &now));

            let verdict = if deprecated {
                Some((DEPRECATED_STALENESS, "Marked deprecated".to_string()))
            } else if connected {
                None
            } else {
                match age {
                    Some(days) if days > preserve_days => Some((
                        age_staleness(days),
                        format!("No relationships, created {:.0} days ago", days),
                    )),
                    Some(_) => None,
                    None => Some((
                        UNKNOWN_AGE_STALENESS,
                        "No relationships and no usable creation timestamp".to_string(),
                    )),
                }
            };

            if let Some((staleness, reason)) = verdict {
                stale_entities.push(StaleEntity {
                    id: entity.id.clone(),
                    entity_type: entity.entity_type,
                    name: entity.name.clone(),
                    staleness,
                    reason,
                    safe_to_delete: !connected,
                    dependencies,
                    depends_on,
                });
            }
        }

        let mut by_name: BTreeMap<(EntityType, String), Vec<&Entity>> = BTreeMap::new();
        for entity in &sample.entities {
            let normalized = normalize_name(&entity.name);
            if !normalized.is_empty() {
                by_name
                    .entry((entity.entity_type, normalized))
                    .or_default()
                    .push(entity);
            }
        }

        let mut redundancies = Vec::new();
        for ((entity_type, _), mut members) in by_name {
            if members.len() < 2 {
                continue;
            }
            members.sort_by(|a, b| a.id.cmp(&b.id));
            // Most connected member survives; lowest id breaks ties
            let primary = members
                .iter()
                .max_by(|a, b| degree(**a).cmp(&degree(**b)).then_with(|| b.id.cmp(&a.id)))
                .map(|e| e.id.clone());
            let identical = members
                .windows(2)
                .all(|pair| pair[0].name.trim() == pair[1].name.trim());

            redundancies.push(RedundancyGroup {
                entities: members.iter().map(|e| e.id.clone()).collect(),
                similarity: if identical { 1.0 } else { 0.9 },
                kind: entity_type.as_str().to_string(),
                merge_recommendation: primary.as_ref().map(|p| format!("Merge duplicates into {}", p)),
                primary_entity: primary,
            });
        }

        let mut affected: HashSet<&str> = stale_entities.iter().map(|s| s.id.as_str()).collect();
        for group in &redundancies {
            for id in &group.entities {
                if group.primary_entity.as_deref() != Some(id.as_str()) {
                    affected.insert(id.as_str());
                }
            }
        }
        let total = sample.entities.len();
        let health = if total == 0 {
            1.0
        } else {
            (1.0 - affected.len() as f64 / total as f64).clamp(0.0, 1.0)
        };

        let mut optimization_opportunities = Vec::new();
        let mut recommendations = Vec::new();
        if !stale_entities.is_empty() {
            optimization_opportunities.push(OptimizationOpportunity {
                kind: "stale-removal".to_string(),
                description: format!("{} stale entities found", stale_entities.len()),
                entities: stale_entities.iter().map(|s| s.id.clone()).collect(),
                priority: if stale_entities.len() > 10 {
                    Priority::High
                } else {
                    Priority::Medium
                },
            });
            recommendations.push("Remove stale entities that nothing depends on".to_string());
        }
        if !redundancies.is_empty() {
            optimization_opportunities.push(OptimizationOpportunity {
                kind: "redundancy-merge".to_string(),
                description: format!("{} groups of duplicate entities", redundancies.len()),
                entities: redundancies
                    .iter()
                    .flat_map(|g| g.entities.iter().cloned())
                    .collect(),
                priority: Priority::Medium,
            });
            recommendations.push("Merge duplicate entities into their best-connected member".to_string());
        }
        if recommendations.is_empty() {
            recommendations.push("No changes needed".to_string());
        }

        let critical: Vec<String> = stale_entities
            .iter()
            .filter(|s| !s.safe_to_delete)
            .map(|s| s.id.clone())
            .collect();
        let overall_risk = match critical.len() {
            0 => RiskLevel::Low,
            1..=5 => RiskLevel::Medium,
            _ => RiskLevel::High,
        };
        let mut safeguards = vec!["Create a snapshot before executing".to_string()];
        if !critical.is_empty() {
            safeguards.push("Review stale entities that still have dependents".to_string());
        }

        AnalysisResult {
            summary: AnalysisSummary {
                total_entities_analyzed: total,
                stale_entities_found: stale_entities.len(),
                redundancy_groups_found: redundancies.len(),
                optimization_opportunities: optimization_opportunities.len(),
                overall_health_score: health,
            },
            stale_entities,
            redundancies,
            optimization_opportunities,
            recommendations,
            risk_assessment: RiskAssessment {
                overall_risk,
                critical_entities_at_risk: critical,
                safeguards_recommended: safeguards,
            },
        }
    }
}

fn age_staleness(days: f64) -> f64 {
    (0.5 + 0.5 * days / 365.0).min(1.0)
}

/// Lowercase alphanumerics only, so "Auth Service" matches "auth-service".
fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[async_trait]
impl AnalysisCollaborator for RuleBasedCollaborator {
    async fn analyze(&self, request: &AnalysisRequest) -> SDKResult<AnalysisResult> {
        let Some(sample) = &request.sample else {
            tracing::debug!("No sample provided; reporting an empty analysis");
            return Ok(self.analyze_sample(
                &MemorySample::empty(),
                request.strategy_config.preserve_recent_entities as f64,
            ));
        };
        Ok(self.analyze_sample(sample, request.strategy_config.preserve_recent_entities as f64))
    }
}

#[async_trait]
impl PlanCollaborator for RuleBasedCollaborator {
    async fn plan(&self, request: &PlanRequest) -> SDKResult<OptimizationPlan> {
        let focus = request.effective_focus_areas();
        let wants = |area: &str| {
            focus.is_empty() || focus.iter().any(|f| f == area || f == "general-optimization")
        };
        let analysis = &request.analysis_result;

        let mut actions = Vec::new();
        let mut claimed: HashSet<String> = HashSet::new();

        for group in &analysis.redundancies {
            let is_tag = group.kind.parse::<EntityType>().ok() == Some(EntityType::Tag);
            if !(wants("redundancy-removal") || (is_tag && wants("tag-consolidation"))) {
                continue;
            }
            let Some(primary) = &group.primary_entity else {
                continue;
            };
            claimed.insert(primary.clone());
            for id in group.entities.iter().filter(|id| *id != primary) {
                if !claimed.insert(id.clone()) {
                    continue;
                }
                let mut action = OptimizationAction::merge(id.clone(), primary.clone())
                    .with_reason(format!("Duplicate of {}", primary))
                    .with_priority(Priority::Medium);
                if let Ok(entity_type) = group.kind.parse::<EntityType>() {
                    action = action.with_entity_type(entity_type);
                }
                action.safety_checks = vec!["relationships-rewired-to-primary".to_string()];
                actions.push(action);
            }
        }

        if wants("stale-detection") || wants("orphan-removal") {
            let mut stale: Vec<&StaleEntity> = analysis
                .stale_entities
                .iter()
                .filter(|s| s.safe_to_delete && !claimed.contains(&s.id))
                .collect();
            stale.sort_by(|a, b| {
                b.staleness
                    .total_cmp(&a.staleness)
                    .then_with(|| a.id.cmp(&b.id))
            });
            for entry in stale {
                if !claimed.insert(entry.id.clone()) {
                    continue;
                }
                let mut action = OptimizationAction::delete(entry.id.clone())
                    .with_entity_type(entry.entity_type)
                    .with_reason(entry.reason.clone())
                    .with_priority(if entry.staleness >= 0.8 {
                        Priority::High
                    } else {
                        Priority::Medium
                    });
                action.safety_checks = vec!["no-incoming-dependencies".to_string()];
                actions.push(action);
            }
        }

        tracing::debug!(
            "Rule-based plan for {}:{} proposes {} actions",
            request.memory_context.repository,
            request.memory_context.branch,
            actions.len()
        );

        Ok(OptimizationPlan {
            id: format!("plan-{}", Uuid::new_v4()),
            analysis_id: request.analysis_id.clone(),
            strategy: request.strategy,
            execution_order: actions.iter().map(|a| a.entity_id.clone()).collect(),
            estimated_impact: EstimatedImpact {
                entities_affected: actions.len(),
                relationships_affected: 0,
            },
            actions,
            safety_measures: SafetyMeasures {
                snapshot_required: true,
                confirmation_required: request.strategy_config.requires_confirmation,
                rollback_plan: "Restore the snapshot taken before execution".to_string(),
            },
        })
    }
}
