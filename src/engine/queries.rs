use std::collections::HashSet;

use ulid::Ulid;

use crate::model::*;

use super::capacity::validate_window;
use super::{Engine, EngineError};

fn matches_people_filter(person: &Person, filter: &PeopleFilter) -> bool {
    if filter.role.is_some_and(|r| r != person.role) {
        return false;
    }
    if filter.seniority.is_some() && filter.seniority != person.seniority {
        return false;
    }
    filter.skills.is_empty() || filter.skills.iter().any(|s| person.has_skill(s))
}

fn matches_project_filter(project: &Project, filter: &ProjectFilter) -> bool {
    if filter.status.is_some_and(|s| s != project.status) {
        return false;
    }
    filter.skills.is_empty()
        || filter
            .skills
            .iter()
            .any(|s| project.required_skills.iter().any(|r| r == s))
}

impl Engine {
    // ── People ───────────────────────────────────────────────

    pub async fn get_person(&self, id: Ulid) -> Result<Person, EngineError> {
        let shared = self.person_handle(&id)?;
        let guard = shared.read().await;
        Ok(guard.person.clone())
    }

    /// People matching the filter, ordered by name.
    pub async fn list_people(&self, filter: &PeopleFilter) -> Vec<Person> {
        let mut people = Vec::new();
        for shared in self.store.all_people() {
            let guard = shared.read().await;
            if matches_people_filter(&guard.person, filter) {
                people.push(guard.person.clone());
            }
        }
        people.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        people
    }

    // ── Projects ─────────────────────────────────────────────

    pub async fn get_project(&self, id: Ulid) -> Result<Project, EngineError> {
        let shared = self.project_handle(&id)?;
        let guard = shared.read().await;
        Ok(guard.clone())
    }

    /// Projects matching the filter, by start date. Engineers only see the
    /// projects they are engaged on.
    pub async fn list_projects(&self, identity: &Identity, filter: &ProjectFilter) -> Vec<Project> {
        let visible: Option<HashSet<Ulid>> = if identity.is_manager() {
            None
        } else {
            let mut ids = HashSet::new();
            if let Some(shared) = self.store.get_person(&identity.person_id) {
                let guard = shared.read().await;
                ids.extend(guard.engagements.iter().map(|e| e.project_id));
            }
            Some(ids)
        };

        let mut projects = Vec::new();
        for shared in self.store.all_projects() {
            let guard = shared.read().await;
            if let Some(ids) = &visible
                && !ids.contains(&guard.id)
            {
                continue;
            }
            if matches_project_filter(&guard, filter) {
                projects.push(guard.clone());
            }
        }
        projects.sort_by_key(|p| (p.span.start, p.id));
        projects
    }

    // ── Engagements ──────────────────────────────────────────

    /// An engineer asking for someone else's engagement gets `NotFound`.
    pub async fn get_engagement(
        &self,
        identity: &Identity,
        id: Ulid,
    ) -> Result<Engagement, EngineError> {
        let person_id = self.store.owner_of(&id).ok_or(EngineError::NotFound(id))?;
        let shared = self.person_handle(&person_id)?;
        let guard = shared.read().await;
        guard
            .engagement(id)
            .filter(|e| identity.can_view(e))
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    /// Every engagement visible to the caller, newest start first.
    pub async fn list_engagements(&self, identity: &Identity) -> Vec<Engagement> {
        let mut engagements = Vec::new();
        for shared in self.scoped_people(identity) {
            let guard = shared.read().await;
            engagements.extend(guard.engagements.iter().cloned());
        }
        engagements.sort_by(|a, b| b.span.start.cmp(&a.span.start).then(a.id.cmp(&b.id)));
        engagements
    }

    pub async fn find_engagements_by_person(
        &self,
        person_id: Ulid,
    ) -> Result<Vec<Engagement>, EngineError> {
        let shared = self.person_handle(&person_id)?;
        let guard = shared.read().await;
        Ok(guard.engagements.clone())
    }

    /// Engagements referencing the project, by start date. Empty for an
    /// unknown project.
    pub async fn find_engagements_by_project(&self, project_id: Ulid) -> Vec<Engagement> {
        let mut engagements = Vec::new();
        for id in self.store.engagements_of_project(&project_id) {
            let Some(person_id) = self.store.owner_of(&id) else {
                continue;
            };
            let Some(shared) = self.store.get_person(&person_id) else {
                continue;
            };
            let guard = shared.read().await;
            if let Some(e) = guard.engagement(id) {
                engagements.push(e.clone());
            }
        }
        engagements.sort_by_key(|e| (e.span.start, e.id));
        engagements
    }

    pub async fn find_engagements_overlapping(
        &self,
        person_id: Ulid,
        window: Span,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Engagement>, EngineError> {
        validate_window(&window)?;
        let shared = self.person_handle(&person_id)?;
        let guard = shared.read().await;
        Ok(guard
            .overlapping(&window)
            .filter(|e| Some(e.id) != exclude)
            .cloned()
            .collect())
    }

    /// Visible engagements overlapping `window` (all of them when `None`),
    /// oldest start first, joined with person and project names.
    pub async fn timeline(
        &self,
        identity: &Identity,
        window: Option<Span>,
    ) -> Result<Vec<TimelineEntry>, EngineError> {
        if let Some(w) = &window {
            validate_window(w)?;
        }

        let mut entries = Vec::new();
        for shared in self.scoped_people(identity) {
            let guard = shared.read().await;
            let hits: Vec<Engagement> = match &window {
                Some(w) => guard.overlapping(w).cloned().collect(),
                None => guard.engagements.clone(),
            };
            for engagement in hits {
                entries.push(TimelineEntry {
                    person_name: guard.person.name.clone(),
                    project_name: String::new(),
                    band: AllocationBand::of(engagement.allocation),
                    engagement,
                });
            }
        }

        for entry in &mut entries {
            if let Some(project) = self.store.get_project(&entry.engagement.project_id) {
                entry.project_name = project.read().await.name.clone();
            }
        }
        entries.sort_by_key(|t| (t.engagement.span.start, t.engagement.id));
        Ok(entries)
    }

    fn scoped_people(&self, identity: &Identity) -> Vec<super::SharedPersonState> {
        if identity.is_manager() {
            self.store.all_people()
        } else {
            self.store
                .get_person(&identity.person_id)
                .into_iter()
                .collect()
        }
    }
}
