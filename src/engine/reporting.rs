use std::collections::{BTreeMap, HashSet};

use ulid::Ulid;

use crate::config::UtilizationThresholds;
use crate::interval::{fraction_elapsed, round2};
use crate::model::*;

use super::capacity::committed_capacity;
use super::{Engine, EngineError};

pub fn utilization_percentage(committed: u32, max_capacity: u32) -> f64 {
    if max_capacity == 0 {
        return 0.0;
    }
    committed as f64 / max_capacity as f64 * 100.0
}

pub fn classify(utilization: f64, thresholds: &UtilizationThresholds) -> UtilizationStatus {
    if utilization > thresholds.overallocated {
        UtilizationStatus::Overallocated
    } else if utilization > thresholds.high {
        UtilizationStatus::High
    } else if utilization > thresholds.medium {
        UtilizationStatus::Medium
    } else {
        UtilizationStatus::Low
    }
}

/// Utilization of one person at the instant `now`.
pub fn engineer_utilization(
    ps: &PersonState,
    now: Ms,
    thresholds: &UtilizationThresholds,
) -> EngineerUtilization {
    let at = Span::instant(now);
    let committed = committed_capacity(ps, &at, None);
    let max = ps.person.max_capacity;
    let utilization = utilization_percentage(committed, max);
    EngineerUtilization {
        person: ps.person.clone(),
        committed,
        available: max as i64 - committed as i64,
        utilization_percentage: utilization,
        status: classify(utilization, thresholds),
        active_engagements: ps.overlapping(&at).cloned().collect(),
    }
}

pub fn summarize(rows: &[EngineerUtilization]) -> TeamSummary {
    let mut summary = TeamSummary {
        engineer_count: rows.len(),
        ..TeamSummary::default()
    };
    for row in rows {
        match row.status {
            UtilizationStatus::Overallocated => summary.overallocated += 1,
            UtilizationStatus::High => summary.high += 1,
            UtilizationStatus::Medium => summary.medium += 1,
            UtilizationStatus::Low => summary.low += 1,
        }
    }
    if !rows.is_empty() {
        let total: f64 = rows.iter().map(|r| r.utilization_percentage).sum();
        summary.mean_utilization = total / rows.len() as f64;
    }
    summary
}

/// Coverage of required skills by the assigned people's skills, in percent.
/// Counts every distinct assigned skill, so it can exceed 100.
pub fn skill_coverage(required: &[String], assigned: &HashSet<&str>) -> f64 {
    let required: HashSet<&str> = required.iter().map(String::as_str).collect();
    if required.is_empty() {
        return 0.0;
    }
    round2(assigned.len() as f64 / required.len() as f64 * 100.0)
}

impl Engine {
    pub async fn utilization_report(&self, now: Ms) -> UtilizationReport {
        let thresholds = &self.config.thresholds;
        let mut engineers = Vec::new();
        for shared in self.store.all_people() {
            let guard = shared.read().await;
            if guard.person.role == Role::Engineer {
                engineers.push(engineer_utilization(&guard, now, thresholds));
            }
        }
        engineers.sort_by(|a, b| {
            b.utilization_percentage
                .total_cmp(&a.utilization_percentage)
                .then_with(|| a.person.name.cmp(&b.person.name))
        });
        UtilizationReport {
            at: now,
            team: summarize(&engineers),
            engineers,
        }
    }

    pub async fn person_capacity(
        &self,
        person_id: Ulid,
        now: Ms,
    ) -> Result<EngineerUtilization, EngineError> {
        let shared = self
            .store
            .get_person(&person_id)
            .ok_or(EngineError::NotFound(person_id))?;
        let guard = shared.read().await;
        if guard.person.role != Role::Engineer {
            return Err(EngineError::NotFound(person_id));
        }
        Ok(engineer_utilization(&guard, now, &self.config.thresholds))
    }

    pub async fn project_report(
        &self,
        project_id: Ulid,
        now: Ms,
    ) -> Result<ProjectReport, EngineError> {
        let project = self.get_project(project_id).await?;
        let engagements = self.find_engagements_by_project(project_id).await;

        let mut people: BTreeMap<Ulid, Person> = BTreeMap::new();
        for e in &engagements {
            if people.contains_key(&e.person_id) {
                continue;
            }
            if let Some(shared) = self.store.get_person(&e.person_id) {
                let guard = shared.read().await;
                people.insert(e.person_id, guard.person.clone());
            }
        }

        let mut skill_counts: BTreeMap<String, u32> = BTreeMap::new();
        let mut seniority_counts: BTreeMap<Seniority, u32> = BTreeMap::new();
        for person in people.values() {
            for skill in &person.skills {
                *skill_counts.entry(skill.clone()).or_default() += 1;
            }
            if let Some(s) = person.seniority {
                *seniority_counts.entry(s).or_default() += 1;
            }
        }
        let assigned_skills: HashSet<&str> = skill_counts.keys().map(String::as_str).collect();
        let coverage = skill_coverage(&project.required_skills, &assigned_skills);

        let total_allocation: u32 = engagements.iter().map(|e| e.allocation as u32).sum();
        let average_allocation = if engagements.is_empty() {
            0.0
        } else {
            round2(total_allocation as f64 / engagements.len() as f64)
        };
        let team_size_fulfillment = if project.team_size == 0 {
            0.0
        } else {
            round2(people.len() as f64 / project.team_size as f64 * 100.0)
        };

        Ok(ProjectReport {
            project_id,
            name: project.name,
            status: project.status,
            team_size: project.team_size,
            assigned_engagements: engagements.len(),
            assigned_people: people.len(),
            total_allocation,
            average_allocation,
            skill_coverage: coverage,
            timeline_progress: round2(fraction_elapsed(now, project.span.start, project.span.end)),
            team_size_fulfillment,
            skill_distribution: skill_counts.into_iter().collect(),
            seniority_distribution: seniority_counts.into_iter().collect(),
        })
    }

    pub async fn project_reports(&self, now: Ms) -> Vec<ProjectReport> {
        let mut ids = Vec::new();
        for shared in self.store.all_projects() {
            ids.push(shared.read().await.id);
        }
        ids.sort();

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            // A project deleted mid-scan simply drops out of the report.
            if let Ok(report) = self.project_report(id, now).await {
                reports.push(report);
            }
        }
        reports
    }
}
