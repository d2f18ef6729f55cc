use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedPersonState = Arc<RwLock<PersonState>>;
pub type SharedProject = Arc<RwLock<Project>>;

/// In-memory ledger: the records plus the indexes the finders need.
///
/// Each person and each project sits behind its own lock. Writers to a
/// person's engagements must hold that person's write lock; `apply_to_person`
/// assumes the caller already does.
pub struct LedgerStore {
    people: DashMap<Ulid, SharedPersonState>,
    projects: DashMap<Ulid, SharedProject>,
    /// Reverse lookup: engagement id → owning person id.
    engagement_owner: DashMap<Ulid, Ulid>,
    /// Project id → engagement ids referencing it.
    project_engagements: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore {
    pub fn new() -> Self {
        Self {
            people: DashMap::new(),
            projects: DashMap::new(),
            engagement_owner: DashMap::new(),
            project_engagements: DashMap::new(),
        }
    }

    // ── People ───────────────────────────────────────────────

    pub fn person_count(&self) -> usize {
        self.people.len()
    }

    pub fn contains_person(&self, id: &Ulid) -> bool {
        self.people.contains_key(id)
    }

    pub fn get_person(&self, id: &Ulid) -> Option<SharedPersonState> {
        self.people.get(id).map(|e| e.value().clone())
    }

    pub fn insert_person(&self, person: Person) {
        self.people
            .insert(person.id, Arc::new(RwLock::new(PersonState::new(person))));
    }

    pub fn person_ids(&self) -> Vec<Ulid> {
        self.people.iter().map(|e| *e.key()).collect()
    }

    /// Snapshot of every person handle. Locks are taken by the caller.
    pub fn all_people(&self) -> Vec<SharedPersonState> {
        self.people.iter().map(|e| e.value().clone()).collect()
    }

    // ── Projects ─────────────────────────────────────────────

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    pub fn contains_project(&self, id: &Ulid) -> bool {
        self.projects.contains_key(id)
    }

    pub fn get_project(&self, id: &Ulid) -> Option<SharedProject> {
        self.projects.get(id).map(|e| e.value().clone())
    }

    pub fn insert_project(&self, project: Project) {
        self.projects.insert(project.id, Arc::new(RwLock::new(project)));
    }

    pub fn remove_project(&self, id: &Ulid) -> Option<SharedProject> {
        self.projects.remove(id).map(|(_, p)| p)
    }

    pub fn all_projects(&self) -> Vec<SharedProject> {
        self.projects.iter().map(|e| e.value().clone()).collect()
    }

    // ── Engagement indexes ───────────────────────────────────

    pub fn owner_of(&self, engagement_id: &Ulid) -> Option<Ulid> {
        self.engagement_owner.get(engagement_id).map(|e| *e.value())
    }

    /// Claim `engagement_id` for `person_id` ahead of the WAL append. Returns
    /// false when the id is already taken, by any person.
    pub fn reserve_engagement_id(&self, engagement_id: Ulid, person_id: Ulid) -> bool {
        match self.engagement_owner.entry(engagement_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(person_id);
                true
            }
        }
    }

    /// Drop a reservation whose engagement never made it to the log.
    pub fn release_engagement_id(&self, engagement_id: &Ulid) {
        self.engagement_owner.remove(engagement_id);
    }

    pub fn engagements_of_project(&self, project_id: &Ulid) -> Vec<Ulid> {
        self.project_engagements
            .get(project_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn project_in_use(&self, project_id: &Ulid) -> bool {
        self.project_engagements
            .get(project_id)
            .is_some_and(|ids| !ids.is_empty())
    }

    fn index_engagement(&self, engagement: &Engagement) {
        self.engagement_owner
            .insert(engagement.id, engagement.person_id);
        let mut ids = self
            .project_engagements
            .entry(engagement.project_id)
            .or_default();
        if !ids.contains(&engagement.id) {
            ids.push(engagement.id);
        }
    }

    fn unindex_engagement(&self, id: &Ulid, project_id: &Ulid) {
        self.engagement_owner.remove(id);
        if let Some(mut ids) = self.project_engagements.get_mut(project_id) {
            ids.retain(|e| e != id);
        }
    }

    // ── Event application ────────────────────────────────────

    /// Apply an engagement or person-update event to a locked person.
    pub fn apply_to_person(&self, ps: &mut PersonState, event: &Event) {
        match event {
            Event::PersonUpdated(person) => {
                ps.person = person.clone();
            }
            Event::EngagementCreated(engagement) => {
                ps.insert_engagement(engagement.clone());
                self.index_engagement(engagement);
            }
            Event::EngagementUpdated(engagement) => {
                ps.remove_engagement(engagement.id);
                ps.insert_engagement(engagement.clone());
                self.index_engagement(engagement);
            }
            Event::EngagementDeleted { id, project_id, .. } => {
                ps.remove_engagement(*id);
                self.unindex_engagement(id, project_id);
            }
            // Map-level events, handled by `apply_catalog`.
            Event::PersonCreated(_)
            | Event::ProjectCreated(_)
            | Event::ProjectUpdated(_)
            | Event::ProjectDeleted { .. } => {}
        }
    }

    /// Apply a person-creation or project event to the maps. Project updates
    /// replace the record outright; live updates mutate under the project lock
    /// instead.
    pub fn apply_catalog(&self, event: &Event) {
        match event {
            Event::PersonCreated(person) => self.insert_person(person.clone()),
            Event::ProjectCreated(project) | Event::ProjectUpdated(project) => {
                self.insert_project(project.clone())
            }
            Event::ProjectDeleted { id } => {
                self.remove_project(id);
                self.project_engagements.remove(id);
            }
            Event::PersonUpdated(_)
            | Event::EngagementCreated(_)
            | Event::EngagementUpdated(_)
            | Event::EngagementDeleted { .. } => {}
        }
    }

    /// Apply an event read back from the WAL. We are the sole owner of every
    /// lock during replay, so `try_write` never contends.
    pub fn apply_replayed(&self, event: &Event) {
        match event {
            Event::PersonCreated(_)
            | Event::ProjectCreated(_)
            | Event::ProjectUpdated(_)
            | Event::ProjectDeleted { .. } => self.apply_catalog(event),
            Event::PersonUpdated(Person { id: person_id, .. })
            | Event::EngagementCreated(Engagement { person_id, .. })
            | Event::EngagementUpdated(Engagement { person_id, .. })
            | Event::EngagementDeleted { person_id, .. } => {
                let Some(shared) = self.get_person(person_id) else {
                    tracing::warn!(%person_id, "replayed event for unknown person, skipping");
                    return;
                };
                match shared.try_write() {
                    Ok(mut guard) => self.apply_to_person(&mut guard, event),
                    Err(_) => tracing::warn!(%person_id, "person locked during replay, skipping event"),
                }
            }
        }
    }
}
