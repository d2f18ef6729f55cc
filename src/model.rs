use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::interval;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Closed interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start <= end, "Span start must not be after end");
        Self { start, end }
    }

    /// A window degenerate to a single instant.
    pub fn instant(t: Ms) -> Self {
        Self { start: t, end: t }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        interval::overlaps(self.start, self.end, other.start, other.end)
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Engineer,
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Engineer => "engineer",
            Role::Manager => "manager",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "engineer" => Some(Role::Engineer),
            "manager" => Some(Role::Manager),
            _ => None,
        }
    }

    /// Engineers are schedulable by default; managers are not.
    pub fn default_capacity(&self) -> u32 {
        match self {
            Role::Engineer => 100,
            Role::Manager => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Seniority {
    Junior,
    Mid,
    Senior,
}

impl Seniority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Seniority::Junior => "junior",
            Seniority::Mid => "mid",
            Seniority::Senior => "senior",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "junior" => Some(Seniority::Junior),
            "mid" => Some(Seniority::Mid),
            "senior" => Some(Seniority::Senior),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStatus {
    Planning,
    Active,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "planning" => Some(ProjectStatus::Planning),
            "active" => Some(ProjectStatus::Active),
            "completed" => Some(ProjectStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: Ulid,
    pub name: String,
    pub role: Role,
    /// Ordered, de-duplicated skill tags.
    pub skills: Vec<String>,
    pub seniority: Option<Seniority>,
    pub department: String,
    /// Percent of a full working week this person can be committed to.
    pub max_capacity: u32,
}

impl Person {
    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|s| s == skill)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Ulid,
    pub name: String,
    pub description: String,
    pub required_skills: Vec<String>,
    pub team_size: u32,
    pub status: ProjectStatus,
    pub manager_id: Ulid,
    pub span: Span,
}

/// A time-bounded fractional commitment of a person to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub id: Ulid,
    pub person_id: Ulid,
    pub project_id: Ulid,
    /// Percent in `[1, 100]`.
    pub allocation: u8,
    pub span: Span,
    pub role: String,
    /// Bumped on every update; lets hosts detect lost updates.
    pub version: u64,
}

/// A person together with their engagements.
#[derive(Debug, Clone)]
pub struct PersonState {
    pub person: Person,
    /// All engagements owned by this person, sorted by `span.start`.
    pub engagements: Vec<Engagement>,
}

impl PersonState {
    pub fn new(person: Person) -> Self {
        Self {
            person,
            engagements: Vec::new(),
        }
    }

    pub fn id(&self) -> Ulid {
        self.person.id
    }

    /// Insert engagement maintaining sort order by span.start.
    pub fn insert_engagement(&mut self, engagement: Engagement) {
        let pos = self
            .engagements
            .binary_search_by_key(&engagement.span.start, |e| e.span.start)
            .unwrap_or_else(|e| e);
        self.engagements.insert(pos, engagement);
    }

    /// Remove engagement by id.
    pub fn remove_engagement(&mut self, id: Ulid) -> Option<Engagement> {
        let pos = self.engagements.iter().position(|e| e.id == id)?;
        Some(self.engagements.remove(pos))
    }

    pub fn engagement(&self, id: Ulid) -> Option<&Engagement> {
        self.engagements.iter().find(|e| e.id == id)
    }

    /// Engagements whose closed span intersects the window.
    /// Binary search skips everything starting after `window.end`.
    pub fn overlapping(&self, window: &Span) -> impl Iterator<Item = &Engagement> {
        let right_bound = self
            .engagements
            .partition_point(|e| e.span.start <= window.end);
        self.engagements[..right_bound]
            .iter()
            .filter(move |e| e.span.overlaps(window))
    }
}

/// Who is asking. Supplied by the host; the engine trusts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub person_id: Ulid,
    pub role: Role,
}

impl Identity {
    pub fn new(person_id: Ulid, role: Role) -> Self {
        Self { person_id, role }
    }

    /// The host operator: not a person in the ledger, but acts as a manager.
    pub fn operator() -> Self {
        Self {
            person_id: Ulid::nil(),
            role: Role::Manager,
        }
    }

    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }

    pub fn can_view(&self, engagement: &Engagement) -> bool {
        self.is_manager() || engagement.person_id == self.person_id
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PersonCreated(Person),
    PersonUpdated(Person),
    ProjectCreated(Project),
    ProjectUpdated(Project),
    ProjectDeleted { id: Ulid },
    EngagementCreated(Engagement),
    EngagementUpdated(Engagement),
    EngagementDeleted {
        id: Ulid,
        person_id: Ulid,
        project_id: Ulid,
    },
}

// ── Inputs ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NewPerson {
    pub id: Ulid,
    pub name: String,
    pub role: Role,
    pub skills: Vec<String>,
    pub seniority: Option<Seniority>,
    pub department: Option<String>,
    /// Defaults to the role's capacity when absent.
    pub max_capacity: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonPatch {
    pub name: Option<String>,
    pub skills: Option<Vec<String>>,
    pub seniority: Option<Seniority>,
    pub max_capacity: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeopleFilter {
    pub role: Option<Role>,
    /// Any-of match.
    pub skills: Vec<String>,
    pub seniority: Option<Seniority>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub id: Ulid,
    pub name: String,
    pub description: String,
    pub required_skills: Vec<String>,
    pub team_size: u32,
    pub status: Option<ProjectStatus>,
    pub manager_id: Ulid,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub required_skills: Option<Vec<String>>,
    pub team_size: Option<u32>,
    pub status: Option<ProjectStatus>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    /// Any-of match against required skills.
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEngagement {
    pub id: Ulid,
    pub person_id: Ulid,
    pub project_id: Ulid,
    pub allocation: i64,
    pub span: Span,
    /// Defaults to the configured role label.
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngagementPatch {
    pub allocation: Option<i64>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub role: Option<String>,
    /// Reject the update if the stored version differs.
    pub expected_version: Option<u64>,
}

// ── Query result types ───────────────────────────────────────────

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Reject {
        committed: u32,
        requested: u8,
        /// `max_capacity - committed`; negative when already overcommitted.
        available: i64,
    },
}

impl Admission {
    pub fn is_accept(&self) -> bool {
        matches!(self, Admission::Accept)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub person: Person,
    /// Required skills this person has, in request order.
    pub matched_skills: Vec<String>,
    pub available: i64,
}

/// Committed load over one stretch of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSegment {
    pub span: Span,
    pub committed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UtilizationStatus {
    Overallocated,
    High,
    Medium,
    Low,
}

impl UtilizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UtilizationStatus::Overallocated => "overallocated",
            UtilizationStatus::High => "high",
            UtilizationStatus::Medium => "medium",
            UtilizationStatus::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineerUtilization {
    pub person: Person,
    pub committed: u32,
    pub available: i64,
    pub utilization_percentage: f64,
    pub status: UtilizationStatus,
    pub active_engagements: Vec<Engagement>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TeamSummary {
    pub engineer_count: usize,
    pub mean_utilization: f64,
    pub overallocated: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UtilizationReport {
    pub at: Ms,
    pub team: TeamSummary,
    /// Sorted by utilization, highest first.
    pub engineers: Vec<EngineerUtilization>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectReport {
    pub project_id: Ulid,
    pub name: String,
    pub status: ProjectStatus,
    pub team_size: u32,
    pub assigned_engagements: usize,
    /// Distinct people holding those engagements.
    pub assigned_people: usize,
    pub total_allocation: u32,
    pub average_allocation: f64,
    pub skill_coverage: f64,
    pub timeline_progress: f64,
    pub team_size_fulfillment: f64,
    pub skill_distribution: Vec<(String, u32)>,
    pub seniority_distribution: Vec<(Seniority, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationBand {
    Light,
    Moderate,
    Heavy,
    Full,
}

impl AllocationBand {
    pub fn of(allocation: u8) -> Self {
        match allocation {
            0..=25 => AllocationBand::Light,
            26..=50 => AllocationBand::Moderate,
            51..=75 => AllocationBand::Heavy,
            _ => AllocationBand::Full,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationBand::Light => "light",
            AllocationBand::Moderate => "moderate",
            AllocationBand::Heavy => "heavy",
            AllocationBand::Full => "full",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub engagement: Engagement,
    pub person_name: String,
    pub project_name: String,
    pub band: AllocationBand,
}
