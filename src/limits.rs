//! Hard limits enforced by the engine and the SQL front end.

use crate::model::Ms;

pub const MAX_PEOPLE: usize = 100_000;
pub const MAX_PROJECTS: usize = 100_000;
pub const MAX_ENGAGEMENTS_PER_PERSON: usize = 10_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4096;
pub const MAX_ROLE_LABEL_LEN: usize = 128;
pub const MAX_SKILLS: usize = 64;
pub const MAX_SKILL_LEN: usize = 64;

/// Upper bound for `Person::max_capacity`, in percent.
pub const MAX_PERSON_CAPACITY: u32 = 200;

pub const MAX_TEAM_SIZE: u32 = 10_000;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

pub const MAX_SKILLS_PER_QUERY: usize = 64;
pub const MAX_IN_CLAUSE_IDS: usize = 1000;
