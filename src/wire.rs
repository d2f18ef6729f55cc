use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use ulid::Ulid;

use crate::auth::LoadlineAuthSource;
use crate::engine::{Engine, EngineError};
use crate::interval::now_ms;
use crate::limits::{MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command};

pub struct LoadlineHandler {
    engine: Arc<Engine>,
    query_parser: Arc<LoadlineQueryParser>,
}

impl LoadlineHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(LoadlineQueryParser),
        }
    }

    /// The startup `user` is either a person id or an operator name.
    async fn resolve_identity<C: ClientInfo>(&self, client: &C) -> PgWireResult<Identity> {
        let Some(user) = client.metadata().get("user") else {
            return Ok(Identity::operator());
        };
        let Ok(person_id) = Ulid::from_string(user) else {
            return Ok(Identity::operator());
        };
        match self.engine.get_person(person_id).await {
            Ok(person) => Ok(Identity::new(person.id, person.role)),
            Err(_) => Err(user_error("28000", format!("unknown person: {person_id}"))),
        }
    }

    /// Run every statement of a simple query in order, stopping at the first
    /// failure.
    async fn run_batch(&self, identity: &Identity, query: &str) -> PgWireResult<Vec<Response>> {
        let cmds = sql::parse_batch(query).map_err(sql_err)?;
        let mut responses = Vec::with_capacity(cmds.len());
        for cmd in cmds {
            responses.extend(self.run(identity, cmd).await?);
        }
        Ok(responses)
    }

    async fn run(&self, identity: &Identity, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let start = Instant::now();

        let result = self.execute_command(identity, cmd).await;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        identity: &Identity,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::InsertPerson(new) => {
                require_manager(identity, "create people")?;
                engine.create_person(new).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdatePerson { id, patch } => {
                let own_profile = identity.person_id == id && patch.max_capacity.is_none();
                if !own_profile {
                    require_manager(identity, "update this person")?;
                }
                engine.update_person(id, patch).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::InsertProject(new) => {
                require_manager(identity, "create projects")?;
                engine.create_project(new).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateProject { id, patch } => {
                require_manager(identity, "update projects")?;
                engine.update_project(id, patch).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteProject { id } => {
                require_manager(identity, "delete projects")?;
                engine.delete_project(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertEngagement(new) => {
                require_manager(identity, "create engagements")?;
                engine.create_engagement(new).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateEngagement { id, patch } => {
                require_manager(identity, "update engagements")?;
                engine.update_engagement(id, patch).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteEngagement { id } => {
                require_manager(identity, "delete engagements")?;
                engine.delete_engagement(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectPeople { id, filter } => {
                let mut people = engine.list_people(&filter).await;
                if let Some(id) = id {
                    people.retain(|p| p.id == id);
                }
                Ok(vec![rows(people_schema(), people, encode_person)])
            }
            Command::SelectProjects { id, filter } => {
                let mut projects = engine.list_projects(identity, &filter).await;
                if let Some(id) = id {
                    projects.retain(|p| p.id == id);
                }
                Ok(vec![rows(projects_schema(), projects, encode_project)])
            }
            Command::SelectEngagements {
                id,
                person_id,
                project_id,
            } => {
                let mut found = match (id, person_id, project_id) {
                    (Some(id), _, _) => match engine.get_engagement(identity, id).await {
                        Ok(e) => vec![e],
                        Err(EngineError::NotFound(_)) => Vec::new(),
                        Err(e) => return Err(engine_err(e)),
                    },
                    (None, Some(pid), _) => {
                        engine.find_engagements_by_person(pid).await.map_err(engine_err)?
                    }
                    (None, None, Some(pid)) => engine.find_engagements_by_project(pid).await,
                    (None, None, None) => engine.list_engagements(identity).await,
                };
                found.retain(|e| {
                    identity.can_view(e)
                        && person_id.is_none_or(|p| e.person_id == p)
                        && project_id.is_none_or(|p| e.project_id == p)
                });
                Ok(vec![rows(engagements_schema(), found, encode_engagement)])
            }
            Command::SelectCapacity {
                person_id,
                start,
                end,
            } => {
                require_self_or_manager(identity, person_id)?;
                let window = Span { start, end };
                let committed = engine
                    .committed_capacity(person_id, window, None)
                    .await
                    .map_err(engine_err)?;
                let person = engine.get_person(person_id).await.map_err(engine_err)?;
                let row = (person, window, committed);
                Ok(vec![rows(capacity_schema(), vec![row], encode_capacity)])
            }
            Command::SelectLoad {
                person_id,
                start,
                end,
            } => {
                require_self_or_manager(identity, person_id)?;
                let segments = engine
                    .load_profile(person_id, Span { start, end })
                    .await
                    .map_err(engine_err)?;
                let segments: Vec<_> = segments.into_iter().map(|s| (person_id, s)).collect();
                Ok(vec![rows(load_schema(), segments, encode_load)])
            }
            Command::SelectSuitable {
                skills,
                start,
                end,
                capacity,
            } => {
                require_manager(identity, "search for available people")?;
                let candidates = engine
                    .find_suitable(&skills, Span { start, end }, capacity)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![rows(suitable_schema(), candidates, encode_candidate)])
            }
            Command::SelectUtilization { person_id, at } => {
                let at = at.unwrap_or_else(now_ms);
                let person_id = match person_id {
                    Some(id) => Some(id),
                    None if !identity.is_manager() => Some(identity.person_id),
                    None => None,
                };
                let report = match person_id {
                    Some(id) => {
                        require_self_or_manager(identity, id)?;
                        vec![engine.person_capacity(id, at).await.map_err(engine_err)?]
                    }
                    None => engine.utilization_report(at).await.engineers,
                };
                Ok(vec![rows(utilization_schema(), report, encode_utilization)])
            }
            Command::SelectTeamUtilization { at } => {
                require_manager(identity, "view team utilization")?;
                let report = engine.utilization_report(at.unwrap_or_else(now_ms)).await;
                Ok(vec![rows(team_schema(), vec![report.team], encode_team)])
            }
            Command::SelectProjectReport { project_id, at } => {
                require_manager(identity, "view project reports")?;
                let at = at.unwrap_or_else(now_ms);
                let reports = match project_id {
                    Some(id) => vec![engine.project_report(id, at).await.map_err(engine_err)?],
                    None => engine.project_reports(at).await,
                };
                Ok(vec![rows(project_report_schema(), reports, encode_project_report)])
            }
            Command::SelectTimeline { start, end } => {
                let window = match (start, end) {
                    (None, None) => None,
                    (start, end) => Some(Span {
                        start: start.unwrap_or(MIN_VALID_TIMESTAMP_MS),
                        end: end.unwrap_or(MAX_VALID_TIMESTAMP_MS),
                    }),
                };
                let entries = engine.timeline(identity, window).await.map_err(engine_err)?;
                Ok(vec![rows(timeline_schema(), entries, encode_timeline)])
            }
        }
    }
}

fn require_manager(identity: &Identity, action: &str) -> PgWireResult<()> {
    if identity.is_manager() {
        Ok(())
    } else {
        Err(user_error("42501", format!("only managers may {action}")))
    }
}

fn require_self_or_manager(identity: &Identity, person_id: Ulid) -> PgWireResult<()> {
    if identity.is_manager() || identity.person_id == person_id {
        Ok(())
    } else {
        Err(user_error(
            "42501",
            format!("engineers may only view their own capacity, not {person_id}"),
        ))
    }
}

// ── Result sets ──────────────────────────────────────────────────

fn rows<T>(
    schema: Vec<FieldInfo>,
    items: Vec<T>,
    encode: impl Fn(&mut DataRowEncoder, &T) -> PgWireResult<()>,
) -> Response {
    let schema = Arc::new(schema);
    let rows: Vec<PgWireResult<_>> = items
        .iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn people_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("role", Type::VARCHAR),
        field("skills", Type::VARCHAR),
        field("seniority", Type::VARCHAR),
        field("department", Type::VARCHAR),
        field("max_capacity", Type::INT8),
    ]
}

fn projects_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("description", Type::VARCHAR),
        field("required_skills", Type::VARCHAR),
        field("team_size", Type::INT8),
        field("status", Type::VARCHAR),
        field("manager_id", Type::VARCHAR),
        field("start", Type::INT8),
        field("end", Type::INT8),
    ]
}

fn engagements_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("person_id", Type::VARCHAR),
        field("project_id", Type::VARCHAR),
        field("allocation", Type::INT8),
        field("start", Type::INT8),
        field("end", Type::INT8),
        field("role", Type::VARCHAR),
        field("version", Type::INT8),
    ]
}

fn capacity_schema() -> Vec<FieldInfo> {
    vec![
        field("person_id", Type::VARCHAR),
        field("start", Type::INT8),
        field("end", Type::INT8),
        field("committed", Type::INT8),
        field("max_capacity", Type::INT8),
        field("available", Type::INT8),
    ]
}

fn load_schema() -> Vec<FieldInfo> {
    vec![
        field("person_id", Type::VARCHAR),
        field("start", Type::INT8),
        field("end", Type::INT8),
        field("committed", Type::INT8),
    ]
}

fn suitable_schema() -> Vec<FieldInfo> {
    vec![
        field("person_id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("seniority", Type::VARCHAR),
        field("matched_skills", Type::VARCHAR),
        field("available", Type::INT8),
    ]
}

fn utilization_schema() -> Vec<FieldInfo> {
    vec![
        field("person_id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("committed", Type::INT8),
        field("available", Type::INT8),
        field("utilization", Type::FLOAT8),
        field("status", Type::VARCHAR),
        field("active_engagements", Type::INT8),
    ]
}

fn team_schema() -> Vec<FieldInfo> {
    vec![
        field("engineer_count", Type::INT8),
        field("mean_utilization", Type::FLOAT8),
        field("overallocated", Type::INT8),
        field("high", Type::INT8),
        field("medium", Type::INT8),
        field("low", Type::INT8),
    ]
}

fn project_report_schema() -> Vec<FieldInfo> {
    vec![
        field("project_id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("status", Type::VARCHAR),
        field("team_size", Type::INT8),
        field("assigned_engagements", Type::INT8),
        field("assigned_people", Type::INT8),
        field("total_allocation", Type::INT8),
        field("average_allocation", Type::FLOAT8),
        field("skill_coverage", Type::FLOAT8),
        field("timeline_progress", Type::FLOAT8),
        field("team_size_fulfillment", Type::FLOAT8),
        field("skill_distribution", Type::VARCHAR),
        field("seniority_distribution", Type::VARCHAR),
    ]
}

fn timeline_schema() -> Vec<FieldInfo> {
    vec![
        field("engagement_id", Type::VARCHAR),
        field("person_id", Type::VARCHAR),
        field("person_name", Type::VARCHAR),
        field("project_id", Type::VARCHAR),
        field("project_name", Type::VARCHAR),
        field("allocation", Type::INT8),
        field("start", Type::INT8),
        field("end", Type::INT8),
        field("role", Type::VARCHAR),
        field("band", Type::VARCHAR),
    ]
}

fn schema_for_table(table: &str) -> Vec<FieldInfo> {
    match table {
        "people" => people_schema(),
        "projects" => projects_schema(),
        "engagements" => engagements_schema(),
        "capacity" => capacity_schema(),
        "load" => load_schema(),
        "suitable" => suitable_schema(),
        "utilization" => utilization_schema(),
        "team_utilization" => team_schema(),
        "project_report" => project_report_schema(),
        "timeline" => timeline_schema(),
        _ => vec![],
    }
}

fn encode_person(enc: &mut DataRowEncoder, p: &Person) -> PgWireResult<()> {
    enc.encode_field(&p.id.to_string())?;
    enc.encode_field(&p.name)?;
    enc.encode_field(&p.role.as_str().to_string())?;
    enc.encode_field(&p.skills.join(","))?;
    enc.encode_field(&p.seniority.map(|s| s.as_str().to_string()))?;
    enc.encode_field(&p.department)?;
    enc.encode_field(&i64::from(p.max_capacity))
}

fn encode_project(enc: &mut DataRowEncoder, p: &Project) -> PgWireResult<()> {
    enc.encode_field(&p.id.to_string())?;
    enc.encode_field(&p.name)?;
    enc.encode_field(&p.description)?;
    enc.encode_field(&p.required_skills.join(","))?;
    enc.encode_field(&i64::from(p.team_size))?;
    enc.encode_field(&p.status.as_str().to_string())?;
    enc.encode_field(&p.manager_id.to_string())?;
    enc.encode_field(&p.span.start)?;
    enc.encode_field(&p.span.end)
}

fn encode_engagement(enc: &mut DataRowEncoder, e: &Engagement) -> PgWireResult<()> {
    enc.encode_field(&e.id.to_string())?;
    enc.encode_field(&e.person_id.to_string())?;
    enc.encode_field(&e.project_id.to_string())?;
    enc.encode_field(&i64::from(e.allocation))?;
    enc.encode_field(&e.span.start)?;
    enc.encode_field(&e.span.end)?;
    enc.encode_field(&e.role)?;
    enc.encode_field(&(e.version as i64))
}

fn encode_capacity(
    enc: &mut DataRowEncoder,
    (person, window, committed): &(Person, Span, u32),
) -> PgWireResult<()> {
    enc.encode_field(&person.id.to_string())?;
    enc.encode_field(&window.start)?;
    enc.encode_field(&window.end)?;
    enc.encode_field(&i64::from(*committed))?;
    enc.encode_field(&i64::from(person.max_capacity))?;
    enc.encode_field(&(i64::from(person.max_capacity) - i64::from(*committed)))
}

fn encode_load(enc: &mut DataRowEncoder, (person_id, s): &(Ulid, LoadSegment)) -> PgWireResult<()> {
    enc.encode_field(&person_id.to_string())?;
    enc.encode_field(&s.span.start)?;
    enc.encode_field(&s.span.end)?;
    enc.encode_field(&i64::from(s.committed))
}

fn encode_candidate(enc: &mut DataRowEncoder, c: &Candidate) -> PgWireResult<()> {
    enc.encode_field(&c.person.id.to_string())?;
    enc.encode_field(&c.person.name)?;
    enc.encode_field(&c.person.seniority.map(|s| s.as_str().to_string()))?;
    enc.encode_field(&c.matched_skills.join(","))?;
    enc.encode_field(&c.available)
}

fn encode_utilization(enc: &mut DataRowEncoder, u: &EngineerUtilization) -> PgWireResult<()> {
    enc.encode_field(&u.person.id.to_string())?;
    enc.encode_field(&u.person.name)?;
    enc.encode_field(&i64::from(u.committed))?;
    enc.encode_field(&u.available)?;
    enc.encode_field(&u.utilization_percentage)?;
    enc.encode_field(&u.status.as_str().to_string())?;
    enc.encode_field(&(u.active_engagements.len() as i64))
}

fn encode_team(enc: &mut DataRowEncoder, t: &TeamSummary) -> PgWireResult<()> {
    enc.encode_field(&(t.engineer_count as i64))?;
    enc.encode_field(&t.mean_utilization)?;
    enc.encode_field(&(t.overallocated as i64))?;
    enc.encode_field(&(t.high as i64))?;
    enc.encode_field(&(t.medium as i64))?;
    enc.encode_field(&(t.low as i64))
}

fn encode_project_report(enc: &mut DataRowEncoder, r: &ProjectReport) -> PgWireResult<()> {
    let skills: serde_json::Map<String, serde_json::Value> = r
        .skill_distribution
        .iter()
        .map(|(skill, n)| (skill.clone(), (*n).into()))
        .collect();
    let seniority: serde_json::Map<String, serde_json::Value> = r
        .seniority_distribution
        .iter()
        .map(|(s, n)| (s.as_str().to_string(), (*n).into()))
        .collect();

    enc.encode_field(&r.project_id.to_string())?;
    enc.encode_field(&r.name)?;
    enc.encode_field(&r.status.as_str().to_string())?;
    enc.encode_field(&i64::from(r.team_size))?;
    enc.encode_field(&(r.assigned_engagements as i64))?;
    enc.encode_field(&(r.assigned_people as i64))?;
    enc.encode_field(&i64::from(r.total_allocation))?;
    enc.encode_field(&r.average_allocation)?;
    enc.encode_field(&r.skill_coverage)?;
    enc.encode_field(&r.timeline_progress)?;
    enc.encode_field(&r.team_size_fulfillment)?;
    enc.encode_field(&serde_json::Value::Object(skills).to_string())?;
    enc.encode_field(&serde_json::Value::Object(seniority).to_string())
}

fn encode_timeline(enc: &mut DataRowEncoder, t: &TimelineEntry) -> PgWireResult<()> {
    let e = &t.engagement;
    enc.encode_field(&e.id.to_string())?;
    enc.encode_field(&e.person_id.to_string())?;
    enc.encode_field(&t.person_name)?;
    enc.encode_field(&e.project_id.to_string())?;
    enc.encode_field(&t.project_name)?;
    enc.encode_field(&i64::from(e.allocation))?;
    enc.encode_field(&e.span.start)?;
    enc.encode_field(&e.span.end)?;
    enc.encode_field(&e.role)?;
    enc.encode_field(&t.band.as_str().to_string())
}

#[async_trait]
impl SimpleQueryHandler for LoadlineHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let identity = self.resolve_identity(client).await?;
        self.run_batch(&identity, query).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct LoadlineQueryParser;

#[async_trait]
impl QueryParser for LoadlineQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(describe(stmt))
    }
}

/// Result columns of a statement, empty for anything but a SELECT.
fn describe(stmt: &str) -> Vec<FieldInfo> {
    sql::select_table(stmt)
        .map(|table| schema_for_table(&table))
        .unwrap_or_default()
}

#[async_trait]
impl ExtendedQueryHandler for LoadlineHandler {
    type Statement = String;
    type QueryParser = LoadlineQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let identity = self.resolve_identity(client).await?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.run(&identity, cmd).await?;
        responses
            .pop()
            .ok_or_else(|| user_error("XX000", "statement produced no response".into()))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            describe(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(describe(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
/// Highest index first so `$1` never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    bind_params(&portal.statement.statement, &portal.parameters)
}

fn bind_params(sql: &str, params: &[Option<Bytes>]) -> String {
    let mut result = sql.to_string();
    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct LoadlineFactory {
    handler: Arc<LoadlineHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<LoadlineAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl LoadlineFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = LoadlineAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(LoadlineHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for LoadlineFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(LoadlineFactory::new(engine, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Validation(_) => "22023",
        EngineError::NotFound(_) => "P0002",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::CapacityExceeded { .. } => "23514",
        EngineError::Conflict { .. } => "40001",
        EngineError::ProjectInUse(_) => "23503",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(sqlstate(&e), e.to_string())
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    let code = match &e {
        sql::SqlError::UnknownTable(_) => "42P01",
        sql::SqlError::UnknownColumn(_) => "42703",
        _ => "42601",
    };
    user_error(code, e.to_string())
}
