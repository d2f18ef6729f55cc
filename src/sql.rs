use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::interval::parse_timestamp;
use crate::limits::{MAX_IN_CLAUSE_IDS, MAX_SKILLS_PER_QUERY};
use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertPerson(NewPerson),
    UpdatePerson {
        id: Ulid,
        patch: PersonPatch,
    },
    InsertProject(NewProject),
    UpdateProject {
        id: Ulid,
        patch: ProjectPatch,
    },
    DeleteProject {
        id: Ulid,
    },
    InsertEngagement(NewEngagement),
    UpdateEngagement {
        id: Ulid,
        patch: EngagementPatch,
    },
    DeleteEngagement {
        id: Ulid,
    },
    SelectPeople {
        id: Option<Ulid>,
        filter: PeopleFilter,
    },
    SelectProjects {
        id: Option<Ulid>,
        filter: ProjectFilter,
    },
    SelectEngagements {
        id: Option<Ulid>,
        person_id: Option<Ulid>,
        project_id: Option<Ulid>,
    },
    SelectCapacity {
        person_id: Ulid,
        start: Ms,
        end: Ms,
    },
    SelectLoad {
        person_id: Ulid,
        start: Ms,
        end: Ms,
    },
    SelectSuitable {
        skills: Vec<String>,
        start: Ms,
        end: Ms,
        capacity: u32,
    },
    SelectUtilization {
        person_id: Option<Ulid>,
        at: Option<Ms>,
    },
    SelectTeamUtilization {
        at: Option<Ms>,
    },
    SelectProjectReport {
        project_id: Option<Ulid>,
        at: Option<Ms>,
    },
    SelectTimeline {
        start: Option<Ms>,
        end: Option<Ms>,
    },
}

const PEOPLE_COLUMNS: &[&str] = &[
    "id",
    "name",
    "role",
    "skills",
    "seniority",
    "department",
    "max_capacity",
];
const PROJECT_COLUMNS: &[&str] = &[
    "id",
    "name",
    "manager_id",
    "start",
    "end",
    "team_size",
    "required_skills",
    "status",
    "description",
];
const ENGAGEMENT_COLUMNS: &[&str] = &["id", "person_id", "project_id", "allocation", "start", "end", "role"];

/// Parse a single statement.
pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    parse_batch(sql)?.into_iter().next().ok_or(SqlError::Empty)
}

/// Parse every `;`-separated statement of a simple query.
pub fn parse_batch(sql: &str) -> Result<Vec<Command>, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    stmts.iter().map(parse_statement).collect()
}

fn parse_statement(stmt: &Statement) -> Result<Command, SqlError> {
    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Table named in the FROM clause of a SELECT, without interpreting any
/// values. Used to describe result columns before parameters are bound.
pub fn select_table(sql: &str) -> Option<String> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).ok()?;
    let Statement::Query(query) = stmts.first()? else {
        return None;
    };
    let SetExpr::Select(select) = query.body.as_ref() else {
        return None;
    };
    table_factor_name(&select.from.first()?.relation).ok()
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let defaults = match table.as_str() {
        "people" => PEOPLE_COLUMNS,
        "projects" => PROJECT_COLUMNS,
        "engagements" => ENGAGEMENT_COLUMNS,
        _ => return Err(SqlError::UnknownTable(table)),
    };
    let row = insert_row(insert, &table, defaults)?;

    match table.as_str() {
        "people" => {
            let role = parse_role(row.require("role")?)?;
            Ok(Command::InsertPerson(NewPerson {
                id: row.get("id").map(parse_ulid_expr).transpose()?.unwrap_or_else(Ulid::new),
                name: parse_string_expr(row.require("name")?)?,
                role,
                skills: row.get("skills").map(parse_skills_expr).transpose()?.unwrap_or_default(),
                seniority: row.get("seniority").map(parse_seniority_or_null).transpose()?.flatten(),
                department: row.get("department").map(parse_string_or_null).transpose()?.flatten(),
                max_capacity: row.get("max_capacity").map(parse_u32).transpose()?,
            }))
        }
        "projects" => Ok(Command::InsertProject(NewProject {
            id: row.get("id").map(parse_ulid_expr).transpose()?.unwrap_or_else(Ulid::new),
            name: parse_string_expr(row.require("name")?)?,
            description: row
                .get("description")
                .map(parse_string_or_null)
                .transpose()?
                .flatten()
                .unwrap_or_default(),
            required_skills: row
                .get("required_skills")
                .map(parse_skills_expr)
                .transpose()?
                .unwrap_or_default(),
            team_size: row.get("team_size").map(parse_u32).transpose()?.unwrap_or(1),
            status: row.get("status").map(parse_status).transpose()?,
            manager_id: parse_ulid_expr(row.require("manager_id")?)?,
            span: Span {
                start: parse_ms_expr(row.require("start")?)?,
                end: parse_ms_expr(row.require("end")?)?,
            },
        })),
        _ => Ok(Command::InsertEngagement(NewEngagement {
            id: row.get("id").map(parse_ulid_expr).transpose()?.unwrap_or_else(Ulid::new),
            person_id: parse_ulid_expr(row.require("person_id")?)?,
            project_id: parse_ulid_expr(row.require("project_id")?)?,
            allocation: parse_i64_expr(row.require("allocation")?)?,
            span: Span {
                start: parse_ms_expr(row.require("start")?)?,
                end: parse_ms_expr(row.require("end")?)?,
            },
            role: row.get("role").map(parse_string_or_null).transpose()?.flatten(),
        })),
    }
}

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let mut set = Vec::with_capacity(assignments.len());
    for a in assignments {
        let col = match &a.target {
            AssignmentTarget::ColumnName(name) => {
                object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))?
            }
            _ => return Err(SqlError::Unsupported("tuple assignment".into())),
        };
        set.push((col, &a.value));
    }
    if set.is_empty() {
        return Err(SqlError::Parse("UPDATE without SET".into()));
    }

    let mut filters = Filters::parse(selection)?;
    let id = parse_ulid_expr(filters.take("id", Cmp::Eq).ok_or(SqlError::MissingFilter("id"))?)?;

    match table.as_str() {
        "people" => {
            filters.finish()?;
            let mut patch = PersonPatch::default();
            for (col, value) in set {
                match col.as_str() {
                    "name" => patch.name = Some(parse_string_expr(value)?),
                    "skills" => patch.skills = Some(parse_skills_expr(value)?),
                    "seniority" => patch.seniority = Some(parse_seniority(value)?),
                    "max_capacity" => patch.max_capacity = Some(parse_u32(value)?),
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            Ok(Command::UpdatePerson { id, patch })
        }
        "projects" => {
            filters.finish()?;
            let mut patch = ProjectPatch::default();
            for (col, value) in set {
                match col.as_str() {
                    "name" => patch.name = Some(parse_string_expr(value)?),
                    "description" => patch.description = Some(parse_string_expr(value)?),
                    "required_skills" => patch.required_skills = Some(parse_skills_expr(value)?),
                    "team_size" => patch.team_size = Some(parse_u32(value)?),
                    "status" => patch.status = Some(parse_status(value)?),
                    "start" => patch.start = Some(parse_ms_expr(value)?),
                    "end" => patch.end = Some(parse_ms_expr(value)?),
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            Ok(Command::UpdateProject { id, patch })
        }
        "engagements" => {
            let mut patch = EngagementPatch {
                expected_version: filters.take("version", Cmp::Eq).map(parse_version).transpose()?,
                ..EngagementPatch::default()
            };
            filters.finish()?;
            for (col, value) in set {
                match col.as_str() {
                    "allocation" => patch.allocation = Some(parse_i64_expr(value)?),
                    "start" => patch.start = Some(parse_ms_expr(value)?),
                    "end" => patch.end = Some(parse_ms_expr(value)?),
                    "role" => patch.role = Some(parse_string_expr(value)?),
                    "version" => patch.expected_version = Some(parse_version(value)?),
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            Ok(Command::UpdateEngagement { id, patch })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "projects" => Ok(Command::DeleteProject { id }),
        "engagements" => Ok(Command::DeleteEngagement { id }),
        "people" => Err(SqlError::Unsupported("people cannot be deleted".into())),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let mut filters = Filters::parse(&select.selection)?;

    let cmd = match table.as_str() {
        "people" => Command::SelectPeople {
            id: filters.take_ulid("id")?,
            filter: PeopleFilter {
                role: filters.take("role", Cmp::Eq).map(parse_role).transpose()?,
                skills: filters
                    .take("skills", Cmp::Eq)
                    .map(parse_skills_expr)
                    .transpose()?
                    .unwrap_or_default(),
                seniority: filters.take("seniority", Cmp::Eq).map(parse_seniority).transpose()?,
            },
        },
        "projects" => Command::SelectProjects {
            id: filters.take_ulid("id")?,
            filter: ProjectFilter {
                status: filters.take("status", Cmp::Eq).map(parse_status).transpose()?,
                skills: filters
                    .take("skills", Cmp::Eq)
                    .map(parse_skills_expr)
                    .transpose()?
                    .unwrap_or_default(),
            },
        },
        "engagements" => Command::SelectEngagements {
            id: filters.take_ulid("id")?,
            person_id: filters.take_ulid("person_id")?,
            project_id: filters.take_ulid("project_id")?,
        },
        "capacity" | "load" => {
            let person_id = filters
                .take_ulid("person_id")?
                .ok_or(SqlError::MissingFilter("person_id"))?;
            let (start, end) = filters.take_window()?;
            let (start, end) = (
                start.ok_or(SqlError::MissingFilter("start"))?,
                end.ok_or(SqlError::MissingFilter("end"))?,
            );
            if table == "capacity" {
                Command::SelectCapacity { person_id, start, end }
            } else {
                Command::SelectLoad { person_id, start, end }
            }
        }
        "suitable" => {
            let skills = parse_skills_expr(
                filters
                    .take("skills", Cmp::Eq)
                    .ok_or(SqlError::MissingFilter("skills"))?,
            )?;
            if skills.len() > MAX_SKILLS_PER_QUERY {
                return Err(SqlError::Parse("too many skills in query".into()));
            }
            let (start, end) = filters.take_window()?;
            Command::SelectSuitable {
                skills,
                start: start.ok_or(SqlError::MissingFilter("start"))?,
                end: end.ok_or(SqlError::MissingFilter("end"))?,
                capacity: filters.take("capacity", Cmp::Eq).map(parse_u32).transpose()?.unwrap_or(0),
            }
        }
        "utilization" => Command::SelectUtilization {
            person_id: filters.take_ulid("person_id")?,
            at: filters.take("at", Cmp::Eq).map(parse_ms_expr).transpose()?,
        },
        "team_utilization" => Command::SelectTeamUtilization {
            at: filters.take("at", Cmp::Eq).map(parse_ms_expr).transpose()?,
        },
        "project_report" => Command::SelectProjectReport {
            project_id: filters.take_ulid("project_id")?,
            at: filters.take("at", Cmp::Eq).map(parse_ms_expr).transpose()?,
        },
        "timeline" => {
            let (start, end) = filters.take_window()?;
            Command::SelectTimeline { start, end }
        }
        _ => return Err(SqlError::UnknownTable(table)),
    };
    filters.finish()?;
    Ok(cmd)
}

// ── WHERE clauses ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cmp {
    Eq,
    GtEq,
    LtEq,
}

/// Flattened `col <op> value AND ...` conjunction. Every filter must be
/// consumed by the statement it belongs to.
struct Filters<'a> {
    items: Vec<(String, Cmp, &'a Expr)>,
}

impl<'a> Filters<'a> {
    fn parse(selection: &'a Option<Expr>) -> Result<Self, SqlError> {
        let mut items = Vec::new();
        if let Some(expr) = selection {
            collect_filters(expr, &mut items)?;
        }
        if items.len() > MAX_IN_CLAUSE_IDS {
            return Err(SqlError::Parse("too many filters".into()));
        }
        Ok(Self { items })
    }

    fn take(&mut self, col: &str, cmp: Cmp) -> Option<&'a Expr> {
        let pos = self.items.iter().position(|(c, op, _)| c == col && *op == cmp)?;
        Some(self.items.remove(pos).2)
    }

    fn take_ulid(&mut self, col: &str) -> Result<Option<Ulid>, SqlError> {
        self.take(col, Cmp::Eq).map(parse_ulid_expr).transpose()
    }

    /// `start >= X AND "end" <= Y`, either side optional.
    fn take_window(&mut self) -> Result<(Option<Ms>, Option<Ms>), SqlError> {
        let start = self.take("start", Cmp::GtEq).map(parse_ms_expr).transpose()?;
        let end = self.take("end", Cmp::LtEq).map(parse_ms_expr).transpose()?;
        Ok((start, end))
    }

    fn finish(self) -> Result<(), SqlError> {
        match self.items.first() {
            Some((col, _, _)) => Err(SqlError::Unsupported(format!("filter on {col}"))),
            None => Ok(()),
        }
    }
}

fn collect_filters<'a>(
    expr: &'a Expr,
    out: &mut Vec<(String, Cmp, &'a Expr)>,
) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_filters(inner, out),
        Expr::BinaryOp { left, op, right } => {
            let cmp = match op {
                ast::BinaryOperator::And => {
                    collect_filters(left, out)?;
                    return collect_filters(right, out);
                }
                ast::BinaryOperator::Eq => Cmp::Eq,
                ast::BinaryOperator::GtEq => Cmp::GtEq,
                ast::BinaryOperator::LtEq => Cmp::LtEq,
                other => return Err(SqlError::Unsupported(format!("operator {other}"))),
            };
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
            out.push((col, cmp, right.as_ref()));
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

/// One VALUES row keyed by column name.
struct InsertRow<'a> {
    table: &'a str,
    cells: Vec<(String, &'a Expr)>,
}

impl<'a> InsertRow<'a> {
    fn get(&self, col: &str) -> Option<&'a Expr> {
        self.cells.iter().find(|(c, _)| c == col).map(|(_, e)| *e)
    }

    fn require(&self, col: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(col)
            .ok_or_else(|| SqlError::Parse(format!("{}: missing column {col}", self.table)))
    }
}

fn insert_row<'a>(
    insert: &'a ast::Insert,
    table: &'a str,
    defaults: &[&str],
) -> Result<InsertRow<'a>, SqlError> {
    let rows = extract_insert_rows(insert)?;
    if rows.len() != 1 {
        return Err(SqlError::Unsupported("multi-row INSERT".into()));
    }
    let values = &rows[0];

    let columns: Vec<String> = if insert.columns.is_empty() {
        if values.len() > defaults.len() {
            return Err(SqlError::WrongArity(table.to_string(), defaults.len(), values.len()));
        }
        defaults.iter().map(|c| c.to_string()).collect()
    } else {
        if insert.columns.len() != values.len() {
            return Err(SqlError::WrongArity(
                table.to_string(),
                insert.columns.len(),
                values.len(),
            ));
        }
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    for col in &columns {
        if !defaults.contains(&col.as_str()) {
            return Err(SqlError::UnknownColumn(col.clone()));
        }
    }

    Ok(InsertRow {
        table,
        cells: columns.into_iter().zip(values.iter()).collect(),
    })
}

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(&values.rows)
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid_expr(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .trim()
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_version(expr: &Expr) -> Result<u64, SqlError> {
    let v = parse_i64_expr(expr)?;
    u64::try_from(v).map_err(|_| SqlError::Parse(format!("bad version: {v}")))
}

/// Unix milliseconds, or an ISO-8601 date / datetime string.
fn parse_ms_expr(expr: &Expr) -> Result<Ms, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            parse_timestamp(s).ok_or_else(|| SqlError::Parse(format!("bad timestamp: {s}")))
        }
        _ => parse_i64_expr(expr),
    }
}

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::DoubleQuotedString(s)) => Ok(s.clone()),
        Some(Value::Number(n, _)) => Ok(n.clone()),
        _ => Err(SqlError::Parse(format!("expected string, got {expr:?}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_string_expr(expr).map(Some)
}

/// `'a,b,c'` or `ARRAY['a','b','c']`. NULL is the empty set.
fn parse_skills_expr(expr: &Expr) -> Result<Vec<String>, SqlError> {
    if is_null(expr) {
        return Ok(Vec::new());
    }
    if let Expr::Array(array) = expr {
        return array.elem.iter().map(parse_string_expr).collect();
    }
    let s = parse_string_expr(expr)?;
    Ok(s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect())
}

fn parse_role(expr: &Expr) -> Result<Role, SqlError> {
    let s = parse_string_expr(expr)?;
    Role::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad role: {s}")))
}

fn parse_seniority(expr: &Expr) -> Result<Seniority, SqlError> {
    let s = parse_string_expr(expr)?;
    Seniority::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad seniority: {s}")))
}

fn parse_seniority_or_null(expr: &Expr) -> Result<Option<Seniority>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_seniority(expr).map(Some)
}

fn parse_status(expr: &Expr) -> Result<ProjectStatus, SqlError> {
    let s = parse_string_expr(expr)?;
    ProjectStatus::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad status: {s}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(String, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
