use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::capacity::{admit, validate_allocation, validate_span};
use super::{Engine, EngineError, WalCommand};

const DEFAULT_DEPARTMENT: &str = "Engineering";

fn validate_name(name: &str, what: &'static str) -> Result<String, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::validation(format!("{what} must not be empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(name.to_string())
}

/// Trim, drop empties and de-duplicate, keeping first-seen order.
pub(crate) fn normalize_skills(skills: &[String]) -> Result<Vec<String>, EngineError> {
    let mut out: Vec<String> = Vec::with_capacity(skills.len());
    for skill in skills.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if skill.len() > MAX_SKILL_LEN {
            return Err(EngineError::LimitExceeded("skill tag too long"));
        }
        if !out.iter().any(|s| s == skill) {
            out.push(skill.to_string());
        }
    }
    if out.len() > MAX_SKILLS {
        return Err(EngineError::LimitExceeded("too many skills"));
    }
    Ok(out)
}

fn validate_capacity(max_capacity: u32) -> Result<u32, EngineError> {
    if max_capacity > MAX_PERSON_CAPACITY {
        return Err(EngineError::LimitExceeded("max_capacity too large"));
    }
    Ok(max_capacity)
}

fn validate_team_size(team_size: u32) -> Result<u32, EngineError> {
    if team_size == 0 {
        return Err(EngineError::validation("team_size must be at least 1"));
    }
    if team_size > MAX_TEAM_SIZE {
        return Err(EngineError::LimitExceeded("team_size too large"));
    }
    Ok(team_size)
}

fn validate_description(description: &str) -> Result<String, EngineError> {
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    Ok(description.trim().to_string())
}

fn role_label(label: Option<&str>, default: &str) -> Result<String, EngineError> {
    let label = label.map(str::trim).filter(|l| !l.is_empty()).unwrap_or(default);
    if label.len() > MAX_ROLE_LABEL_LEN {
        return Err(EngineError::LimitExceeded("role label too long"));
    }
    Ok(label.to_string())
}

fn record_admission(outcome: &'static str) {
    metrics::counter!(crate::observability::ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);
}

impl Engine {
    // ── People ───────────────────────────────────────────────

    pub async fn create_person(&self, new: NewPerson) -> Result<Person, EngineError> {
        let name = validate_name(&new.name, "name")?;
        let skills = normalize_skills(&new.skills)?;
        let department = match new.department.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => validate_name(d, "department")?,
            _ => DEFAULT_DEPARTMENT.to_string(),
        };
        let max_capacity =
            validate_capacity(new.max_capacity.unwrap_or_else(|| new.role.default_capacity()))?;

        let _catalog = self.catalog_lock.lock().await;
        if self.store.person_count() >= MAX_PEOPLE {
            return Err(EngineError::LimitExceeded("too many people"));
        }
        if self.store.contains_person(&new.id) {
            return Err(EngineError::AlreadyExists(new.id));
        }

        let person = Person {
            id: new.id,
            name,
            role: new.role,
            skills,
            seniority: new.seniority,
            department,
            max_capacity,
        };
        let event = Event::PersonCreated(person.clone());
        self.wal_append(&event).await?;
        self.store.apply_catalog(&event);
        tracing::debug!(person_id = %person.id, role = person.role.as_str(), "person created");
        Ok(person)
    }

    /// Lowering `max_capacity` below what is already committed is allowed;
    /// the person then reports as overallocated.
    pub async fn update_person(&self, id: Ulid, patch: PersonPatch) -> Result<Person, EngineError> {
        let shared = self.person_handle(&id)?;
        let mut guard = shared.write().await;

        let mut person = guard.person.clone();
        if let Some(name) = &patch.name {
            person.name = validate_name(name, "name")?;
        }
        if let Some(skills) = &patch.skills {
            person.skills = normalize_skills(skills)?;
        }
        if let Some(seniority) = patch.seniority {
            person.seniority = Some(seniority);
        }
        if let Some(max_capacity) = patch.max_capacity {
            person.max_capacity = validate_capacity(max_capacity)?;
        }

        let event = Event::PersonUpdated(person.clone());
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(person)
    }

    // ── Projects ─────────────────────────────────────────────

    pub async fn create_project(&self, new: NewProject) -> Result<Project, EngineError> {
        let name = validate_name(&new.name, "name")?;
        let description = validate_description(&new.description)?;
        let required_skills = normalize_skills(&new.required_skills)?;
        let team_size = validate_team_size(new.team_size)?;
        validate_span(&new.span)?;

        let _catalog = self.catalog_lock.lock().await;
        if self.store.project_count() >= MAX_PROJECTS {
            return Err(EngineError::LimitExceeded("too many projects"));
        }
        if self.store.contains_project(&new.id) {
            return Err(EngineError::AlreadyExists(new.id));
        }
        let manager = self.person_handle(&new.manager_id)?;
        if manager.read().await.person.role != Role::Manager {
            return Err(EngineError::validation("manager_id must reference a manager"));
        }

        let project = Project {
            id: new.id,
            name,
            description,
            required_skills,
            team_size,
            status: new.status.unwrap_or(ProjectStatus::Planning),
            manager_id: new.manager_id,
            span: new.span,
        };
        let event = Event::ProjectCreated(project.clone());
        self.wal_append(&event).await?;
        self.store.apply_catalog(&event);
        tracing::debug!(project_id = %project.id, "project created");
        Ok(project)
    }

    pub async fn update_project(&self, id: Ulid, patch: ProjectPatch) -> Result<Project, EngineError> {
        let shared = self.project_handle(&id)?;
        let mut guard = shared.write().await;
        // Deleted while we waited for the lock.
        if !self.store.contains_project(&id) {
            return Err(EngineError::NotFound(id));
        }

        let mut project = guard.clone();
        if let Some(name) = &patch.name {
            project.name = validate_name(name, "name")?;
        }
        if let Some(description) = &patch.description {
            project.description = validate_description(description)?;
        }
        if let Some(skills) = &patch.required_skills {
            project.required_skills = normalize_skills(skills)?;
        }
        if let Some(team_size) = patch.team_size {
            project.team_size = validate_team_size(team_size)?;
        }
        if let Some(status) = patch.status {
            project.status = status;
        }
        if patch.start.is_some() || patch.end.is_some() {
            project.span = Span {
                start: patch.start.unwrap_or(project.span.start),
                end: patch.end.unwrap_or(project.span.end),
            };
            validate_span(&project.span)?;
        }

        self.wal_append(&Event::ProjectUpdated(project.clone())).await?;
        *guard = project.clone();
        Ok(project)
    }

    pub async fn delete_project(&self, id: Ulid) -> Result<(), EngineError> {
        let shared = self.project_handle(&id)?;
        let _guard = shared.write().await;
        if !self.store.contains_project(&id) {
            return Err(EngineError::NotFound(id));
        }
        // Engagement creation holds the project's read lock, so the index
        // cannot gain an entry while we hold the write lock.
        if self.store.project_in_use(&id) {
            return Err(EngineError::ProjectInUse(id));
        }

        let event = Event::ProjectDeleted { id };
        self.wal_append(&event).await?;
        self.store.apply_catalog(&event);
        tracing::debug!(project_id = %id, "project deleted");
        Ok(())
    }

    // ── Engagements ──────────────────────────────────────────

    /// Admit and commit a new engagement. The person's write lock is held from
    /// the capacity read through the WAL append, so concurrent requests for
    /// the same person are serialised.
    pub async fn create_engagement(&self, new: NewEngagement) -> Result<Engagement, EngineError> {
        let allocation = validate_allocation(new.allocation)?;
        validate_span(&new.span)?;
        let role = role_label(new.role.as_deref(), &self.config.default_role_label)?;

        let person = self.person_handle(&new.person_id)?;
        let mut guard = person.write().await;
        if guard.person.role != Role::Engineer {
            return Err(EngineError::NotFound(new.person_id));
        }
        if self.store.owner_of(&new.id).is_some() {
            return Err(EngineError::AlreadyExists(new.id));
        }
        if guard.engagements.len() >= MAX_ENGAGEMENTS_PER_PERSON {
            return Err(EngineError::LimitExceeded("too many engagements for person"));
        }

        let project = self.project_handle(&new.project_id)?;
        let _project_guard = project.read().await;
        if !self.store.contains_project(&new.project_id) {
            return Err(EngineError::NotFound(new.project_id));
        }

        if let Admission::Reject { committed, available, .. } =
            admit(&guard, &new.span, allocation, None)
        {
            record_admission("rejected");
            tracing::debug!(
                person_id = %new.person_id,
                committed,
                requested = allocation,
                available,
                "engagement rejected"
            );
            return Err(EngineError::CapacityExceeded {
                person_id: new.person_id,
                requested: allocation,
                available,
            });
        }

        let engagement = Engagement {
            id: new.id,
            person_id: new.person_id,
            project_id: new.project_id,
            allocation,
            span: new.span,
            role,
            version: 1,
        };
        // The id index is shared across people, so claim it before logging.
        if !self.store.reserve_engagement_id(engagement.id, engagement.person_id) {
            return Err(EngineError::AlreadyExists(engagement.id));
        }
        if let Err(e) = self
            .persist_and_apply(&mut guard, &Event::EngagementCreated(engagement.clone()))
            .await
        {
            self.store.release_engagement_id(&engagement.id);
            return Err(e);
        }
        record_admission("accepted");
        Ok(engagement)
    }

    /// Update allocation, dates or role. Capacity is re-checked, excluding the
    /// engagement itself, whenever allocation or dates change.
    pub async fn update_engagement(
        &self,
        id: Ulid,
        patch: EngagementPatch,
    ) -> Result<Engagement, EngineError> {
        let person_id = self.store.owner_of(&id).ok_or(EngineError::NotFound(id))?;
        let person = self.person_handle(&person_id)?;
        let mut guard = person.write().await;
        let current = guard
            .engagement(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        if let Some(expected) = patch.expected_version
            && expected != current.version
        {
            return Err(EngineError::Conflict {
                id,
                expected,
                actual: current.version,
            });
        }

        let mut updated = current.clone();
        if let Some(allocation) = patch.allocation {
            updated.allocation = validate_allocation(allocation)?;
        }
        if patch.start.is_some() || patch.end.is_some() {
            updated.span = Span {
                start: patch.start.unwrap_or(current.span.start),
                end: patch.end.unwrap_or(current.span.end),
            };
            validate_span(&updated.span)?;
        }
        if let Some(role) = &patch.role {
            updated.role = role_label(Some(role), &self.config.default_role_label)?;
        }

        let recheck = patch.allocation.is_some() || patch.start.is_some() || patch.end.is_some();
        if recheck {
            if let Admission::Reject { available, .. } =
                admit(&guard, &updated.span, updated.allocation, Some(id))
            {
                record_admission("rejected");
                tracing::debug!(engagement_id = %id, %person_id, available, "engagement update rejected");
                return Err(EngineError::CapacityExceeded {
                    person_id,
                    requested: updated.allocation,
                    available,
                });
            }
            record_admission("accepted");
        }

        updated.version = current.version + 1;
        self.persist_and_apply(&mut guard, &Event::EngagementUpdated(updated.clone()))
            .await?;
        Ok(updated)
    }

    /// Returns the removed engagement.
    pub async fn delete_engagement(&self, id: Ulid) -> Result<Engagement, EngineError> {
        let person_id = self.store.owner_of(&id).ok_or(EngineError::NotFound(id))?;
        let person = self.person_handle(&person_id)?;
        let mut guard = person.write().await;
        let current = guard
            .engagement(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        let event = Event::EngagementDeleted {
            id,
            person_id,
            project_id: current.project_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(current)
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate
    /// the current state: people, then projects, then engagements.
    ///
    /// Every person and project lock is held until the new file is swapped in,
    /// so no write can land between the snapshot and the swap.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _catalog = self.catalog_lock.lock().await;

        // Person locks before project locks, same order as engagement writers.
        let mut person_guards = Vec::new();
        for shared in self.store.all_people() {
            person_guards.push(shared.read_owned().await);
        }
        person_guards.sort_by_key(|g| g.id());

        let mut project_guards = Vec::new();
        for shared in self.store.all_projects() {
            project_guards.push(shared.read_owned().await);
        }
        project_guards.sort_by_key(|g| g.id);

        let mut events = Vec::new();
        for ps in &person_guards {
            events.push(Event::PersonCreated(ps.person.clone()));
        }
        for project in &project_guards {
            events.push(Event::ProjectCreated((**project).clone()));
        }
        for ps in &person_guards {
            for engagement in &ps.engagements {
                events.push(Event::EngagementCreated(engagement.clone()));
            }
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
