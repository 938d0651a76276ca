//! Sampling Engine
//!
//! Pulls a bounded, deterministic subset of a branch and derives descriptive
//! metrics from it.
//!
//! Strategies:
//! - **representative**: entities by id ascending
//! - **problematic**: orphaned or deprecated entities, least connected first
//! - **recent**: entities with a parseable creation timestamp, newest first
//! - **diverse**: an equal share of each entity type, concatenated

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use membank_core::{BranchScope, Entity, EntityFilter, EntityRef, EntityType, GraphQuery};

use super::types::{
    Activity, AgeDistribution, ComplexityLevel, ContextAnalysis, Maturity, MemorySample,
    ProjectCharacteristics, SampleMetadata, SamplingStrategy, Strategy,
};
use crate::error::SDKResult;
use crate::utils::{age_in_days, parse_timestamp};

/// Default cap on relationships fetched for a sample.
pub const DEFAULT_RELATIONSHIP_CAP: usize = 100;

const RECENT_DAYS: f64 = 30.0;
const MEDIUM_DAYS: f64 = 90.0;

pub struct SamplingEngine {
    graph: Arc<dyn GraphQuery>,
    relationship_cap: usize,
}

impl SamplingEngine {
    pub fn new(graph: Arc<dyn GraphQuery>) -> Self {
        Self {
            graph,
            relationship_cap: DEFAULT_RELATIONSHIP_CAP,
        }
    }

    pub fn with_relationship_cap(mut self, cap: usize) -> Self {
        self.relationship_cap = cap;
        self
    }

    /// Select at most `sample_size` entities plus the relationships touching them.
    pub async fn sample(
        &self,
        scope: &BranchScope,
        strategy: SamplingStrategy,
        sample_size: usize,
    ) -> SDKResult<MemorySample> {
        let entities = match strategy {
            SamplingStrategy::Representative => {
                self.graph
                    .entities(scope, &EntityFilter::all().limit(sample_size))
                    .await?
            }
            SamplingStrategy::Problematic => self
                .graph
                .problematic_entities(scope, sample_size)
                .await?
                .into_iter()
                .map(|d| d.entity)
                .collect(),
            SamplingStrategy::Recent => self.recent(scope, sample_size).await?,
            SamplingStrategy::Diverse => self.diverse(scope, sample_size).await?,
        };

        let ids: Vec<String> = entities.iter().map(|e| e.id.clone()).collect();
        let relationships = self
            .graph
            .relationships_touching(scope, &ids, self.relationship_cap)
            .await?;
        let refs: Vec<EntityRef> = entities.iter().map(Entity::entity_ref).collect();
        let degrees = self.graph.entity_degrees(scope, &refs).await?;

        let counts = self.graph.entity_counts(scope).await?;
        let total_entities: usize = counts.values().sum();
        let total_relationships = self.graph.relationship_count(scope).await?;
        let sampling_ratio = if total_entities == 0 {
            0.0
        } else {
            entities.len() as f64 / total_entities as f64
        };

        tracing::debug!(
            "Sampled {} of {} entities from {} ({})",
            entities.len(),
            total_entities,
            scope,
            strategy
        );

        Ok(MemorySample {
            entities,
            relationships,
            degrees: BTreeMap::new(),
            sampling_strategy: strategy,
            sample_size,
            metadata: SampleMetadata {
                total_entities,
                total_relationships,
                sampling_ratio,
            },
        }
        .with_degrees(degrees))
    }

    async fn recent(&self, scope: &BranchScope, sample_size: usize) -> SDKResult<Vec<Entity>> {
        let mut dated: Vec<(DateTime<Utc>, Entity)> = self
            .graph
            .timestamped_entities(scope)
            .await?
            .into_iter()
            .filter_map(|e| {
                let created = e.created_at.as_deref().and_then(parse_timestamp)?;
                Some((created, e))
            })
            .collect();

        // Newest first; id breaks ties so the order is stable
        dated.sort_by(|(a_ts, a), (b_ts, b)| b_ts.cmp(a_ts).then_with(|| a.id.cmp(&b.id)));
        dated.truncate(sample_size);
        Ok(dated.into_iter().map(|(_, e)| e).collect())
    }

    async fn diverse(&self, scope: &BranchScope, sample_size: usize) -> SDKResult<Vec<Entity>> {
        let per_type = (sample_size / EntityType::ALL.len()).max(1);
        let mut entities = Vec::new();
        for entity_type in EntityType::ALL {
            let filter = EntityFilter::of_type(entity_type).limit(per_type);
            entities.extend(self.graph.entities(scope, &filter).await?);
        }
        entities.truncate(sample_size);
        Ok(entities)
    }
}

/// Derive descriptive metrics from a sample, as of now.
pub fn analyze(sample: &MemorySample) -> ContextAnalysis {
    analyze_at(sample, Utc::now())
}

/// Derive descriptive metrics from a sample relative to `now`.
pub fn analyze_at(sample: &MemorySample, now: DateTime<Utc>) -> ContextAnalysis {
    let mut entity_types: BTreeMap<String, usize> = BTreeMap::new();
    for entity in &sample.entities {
        *entity_types
            .entry(entity.entity_type.label().to_string())
            .or_insert(0) += 1;
    }

    let relationship_density = if sample.entities.is_empty() {
        0.0
    } else {
        sample.relationships.len() as f64 / sample.entities.len() as f64
    };

    let age_distribution = age_distribution(&sample.entities, now);

    let total_entities = sample.metadata.total_entities;
    let complexity_score = complexity_score(entity_types.len(), relationship_density, total_entities);

    let recent_ratio = match age_distribution.total() {
        0 => 0.0,
        total => age_distribution.recent as f64 / total as f64,
    };

    let maturity = if total_entities < 20 {
        Maturity::New
    } else if total_entities < 100 && recent_ratio > 0.5 {
        Maturity::Developing
    } else if recent_ratio < 0.1 && old_dominates(&age_distribution) {
        Maturity::Legacy
    } else {
        Maturity::Mature
    };

    let activity = if recent_ratio > 0.3 {
        Activity::High
    } else if recent_ratio > 0.1 {
        Activity::Medium
    } else {
        Activity::Low
    };

    let complexity = if complexity_score < 30 {
        ComplexityLevel::Simple
    } else if complexity_score < 70 {
        ComplexityLevel::Moderate
    } else {
        ComplexityLevel::Complex
    };

    let recommended_strategy = if maturity == Maturity::New || activity == Activity::High {
        Strategy::Conservative
    } else if maturity == Maturity::Legacy && activity == Activity::Low {
        Strategy::Aggressive
    } else {
        Strategy::Balanced
    };

    let tag_count = entity_types
        .get(EntityType::Tag.label())
        .copied()
        .unwrap_or(0);

    let mut focus_areas = Vec::new();
    if old_dominates(&age_distribution) {
        focus_areas.push("stale-detection".to_string());
    }
    if complexity == ComplexityLevel::Complex {
        focus_areas.push("redundancy-removal".to_string());
    }
    if relationship_density > 3.0 {
        focus_areas.push("relationship-cleanup".to_string());
    }
    if tag_count > 10 {
        focus_areas.push("tag-consolidation".to_string());
    }
    if activity == Activity::Low {
        focus_areas.push("orphan-removal".to_string());
    }
    if focus_areas.is_empty() {
        focus_areas.push("general-optimization".to_string());
    }

    ContextAnalysis {
        entity_types,
        relationship_density,
        age_distribution,
        complexity_score,
        project_characteristics: ProjectCharacteristics {
            maturity,
            activity,
            complexity,
        },
        recommended_strategy,
        focus_areas,
    }
}

/// Bucket entities by age. Missing or unparseable timestamps count as old.
fn age_distribution(entities: &[Entity], now: DateTime<Utc>) -> AgeDistribution {
    let mut distribution = AgeDistribution::default();
    for entity in entities {
        let age = entity
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .map(|created| age_in_days(&created, &now));
        match age {
            Some(days) if days < RECENT_DAYS => distribution.recent += 1,
            Some(days) if days < MEDIUM_DAYS => distribution.medium += 1,
            _ => distribution.old += 1,
        }
    }
    distribution
}

fn old_dominates(distribution: &AgeDistribution) -> bool {
    distribution.old > distribution.recent + distribution.medium
}

/// `min(round(10*types + 20*density + min(total/10, 50)), 100)`
fn complexity_score(distinct_types: usize, density: f64, total_entities: usize) -> u32 {
    let size_term = (total_entities as f64 / 10.0).min(50.0);
    let raw = (10.0 * distinct_types as f64 + 20.0 * density + size_term).round();
    raw.clamp(0.0, 100.0) as u32
}
