use std::cmp::Ordering;

use crate::limits::MAX_SKILLS_PER_QUERY;
use crate::model::*;

use super::capacity::{committed_capacity, validate_window};
use super::{Engine, EngineError};

/// Evaluate one person against a demand. `None` if they are not an engineer,
/// share no skill with the demand, or lack the headroom.
pub fn evaluate(
    ps: &PersonState,
    required_skills: &[String],
    window: &Span,
    required_capacity: u32,
) -> Option<Candidate> {
    if ps.person.role != Role::Engineer {
        return None;
    }
    let matched_skills: Vec<String> = required_skills
        .iter()
        .filter(|skill| ps.person.has_skill(skill))
        .cloned()
        .collect();
    if matched_skills.is_empty() {
        return None;
    }
    let available =
        ps.person.max_capacity as i64 - committed_capacity(ps, window, None) as i64;
    if available < required_capacity as i64 {
        return None;
    }
    Some(Candidate {
        person: ps.person.clone(),
        matched_skills,
        available,
    })
}

/// More matched skills first, then more headroom. Stable.
pub fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| match b.matched_skills.len().cmp(&a.matched_skills.len()) {
        Ordering::Equal => b.available.cmp(&a.available),
        other => other,
    });
}

impl Engine {
    pub async fn find_suitable(
        &self,
        required_skills: &[String],
        window: Span,
        required_capacity: u32,
    ) -> Result<Vec<Candidate>, EngineError> {
        validate_window(&window)?;
        if required_skills.len() > MAX_SKILLS_PER_QUERY {
            return Err(EngineError::LimitExceeded("too many skills in query"));
        }
        let mut required: Vec<String> = Vec::with_capacity(required_skills.len());
        for skill in required_skills.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if !required.iter().any(|r| r == skill) {
                required.push(skill.to_string());
            }
        }
        if required.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        for shared in self.store.all_people() {
            let guard = shared.read().await;
            if let Some(candidate) = evaluate(&guard, &required, &window, required_capacity) {
                candidates.push(candidate);
            }
        }

        // Map iteration order is arbitrary; start from id order so ties are
        // reproducible.
        candidates.sort_by_key(|c| c.person.id);
        rank(&mut candidates);
        tracing::debug!(
            skills = ?required,
            required_capacity,
            found = candidates.len(),
            "matched candidates"
        );
        Ok(candidates)
    }
}
