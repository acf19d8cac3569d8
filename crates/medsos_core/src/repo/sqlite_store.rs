//! SQLite-backed dispatch store.
//!
//! # Responsibility
//! - Persist responders, requests (with ranked snapshots) and reward grants.
//! - Keep SQL details inside the storage boundary.
//!
//! # Invariants
//! - The connection must be migrated to `latest_version()` before use.
//! - Multi-row writes (request + snapshot, grant + credit) run in one
//!   transaction; a failed step rolls everything back.
//! - Read paths re-validate rows and surface corruption as `InvalidData`.

use crate::db::migrations::{latest_version, schema_version};
use crate::db::{open_db, open_db_in_memory};
use crate::model::geo::Coordinate;
use crate::model::request::{Candidate, EmergencyRequest, RequestId, RequestState};
use crate::model::responder::{Responder, ResponderRole};
use crate::model::reward::RewardGrant;
use crate::repo::request_repo::{RequestListQuery, RequestRepository};
use crate::repo::responder_repo::{ResponderListQuery, ResponderOrder, ResponderRepository};
use crate::repo::reward_repo::RewardRepository;
use crate::repo::{ensure_positive_points, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior,
};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const RESPONDER_SELECT_SQL: &str = "SELECT
    id,
    name,
    contact_handle,
    role,
    specialty,
    latitude,
    longitude,
    available,
    credit_points,
    is_deactivated
FROM responders";

const REQUEST_SELECT_SQL: &str = "SELECT
    id,
    requester_id,
    origin_latitude,
    origin_longitude,
    state,
    contacted_responder_id,
    created_at,
    resolved_at
FROM emergency_requests";

const GRANT_SELECT_SQL: &str = "SELECT
    request_id,
    responder_id,
    points,
    granted_at
FROM reward_grants";

const OPEN_STATES_SQL: &str = "('pending', 'dispatched', 'contacted')";

/// Dispatch store over one migrated SQLite connection.
///
/// The connection is guarded by a mutex; each trait call holds it for the
/// duration of one statement or transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wraps an already migrated connection.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        let version = schema_version(&conn)?;
        if version != latest_version() {
            return Err(RepoError::InvalidData(format!(
                "dispatch store requires schema version {}, got {version}",
                latest_version()
            )));
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory() -> RepoResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResponderRepository for SqliteStore {
    fn insert_responder(&self, responder: &Responder) -> RepoResult<()> {
        responder.validate()?;

        self.conn()
            .execute(
                "INSERT INTO responders (
                    id,
                    name,
                    contact_handle,
                    role,
                    specialty,
                    latitude,
                    longitude,
                    available,
                    credit_points,
                    is_deactivated
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
                params![
                    responder.id.as_str(),
                    responder.name.as_str(),
                    responder.contact_handle.as_str(),
                    role_to_db(responder.role),
                    responder.specialty.as_deref(),
                    responder.location.latitude,
                    responder.location.longitude,
                    bool_to_int(responder.available),
                    responder.credit_points,
                    bool_to_int(responder.is_deactivated),
                ],
            )
            .map_err(|err| {
                if is_primary_key_violation(&err) {
                    RepoError::DuplicateResponder(responder.id.clone())
                } else {
                    err.into()
                }
            })?;

        Ok(())
    }

    fn get_responder(&self, id: &str) -> RepoResult<Option<Responder>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{RESPONDER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_responder_row(row)?));
        }

        Ok(None)
    }

    fn list_responders(&self, query: &ResponderListQuery) -> RepoResult<Vec<Responder>> {
        let mut sql = format!("{RESPONDER_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_deactivated {
            sql.push_str(" AND is_deactivated = 0");
        }
        if query.available_only {
            sql.push_str(" AND available = 1");
        }

        sql.push_str(match query.order {
            ResponderOrder::Id => " ORDER BY id ASC",
            ResponderOrder::CreditDesc => " ORDER BY credit_points DESC, id ASC",
        });

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut responders = Vec::new();
        while let Some(row) = rows.next()? {
            responders.push(parse_responder_row(row)?);
        }
        Ok(responders)
    }

    fn list_dispatchable(&self) -> RepoResult<Vec<Responder>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{RESPONDER_SELECT_SQL}
             WHERE available = 1
               AND is_deactivated = 0
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut responders = Vec::new();
        while let Some(row) = rows.next()? {
            responders.push(parse_responder_row(row)?);
        }
        Ok(responders)
    }

    fn set_availability(&self, id: &str, available: bool) -> RepoResult<()> {
        let changed = self.conn().execute(
            "UPDATE responders
             SET
                available = ?1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?2
               AND is_deactivated = 0;",
            params![bool_to_int(available), id],
        )?;

        if changed == 0 {
            return Err(RepoError::ResponderNotFound(id.to_string()));
        }
        Ok(())
    }

    fn add_credit(&self, id: &str, points: i64) -> RepoResult<i64> {
        ensure_positive_points(points)?;

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let total = credit_responder(&tx, id, points)?;
        tx.commit()?;
        Ok(total)
    }

    fn deactivate_responder(&self, id: &str) -> RepoResult<()> {
        let changed = self.conn().execute(
            "UPDATE responders
             SET
                is_deactivated = 1,
                available = 0,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            [id],
        )?;

        if changed == 0 {
            return Err(RepoError::ResponderNotFound(id.to_string()));
        }
        Ok(())
    }

    fn count_responders(&self, available_only: bool) -> RepoResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*)
             FROM responders
             WHERE is_deactivated = 0
               AND (?1 = 0 OR available = 1);",
            [bool_to_int(available_only)],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

impl RequestRepository for SqliteStore {
    fn insert_request(&self, request: &EmergencyRequest) -> RepoResult<()> {
        request.check_consistency().map_err(RepoError::InvalidData)?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO emergency_requests (
                id,
                requester_id,
                origin_latitude,
                origin_longitude,
                state,
                contacted_responder_id,
                created_at,
                resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                request.id.to_string(),
                request.requester_id.as_str(),
                request.origin.latitude,
                request.origin.longitude,
                request.state.as_str(),
                request.contacted_responder_id.as_deref(),
                request.created_at,
                request.resolved_at,
            ],
        )
        .map_err(|err| {
            if is_primary_key_violation(&err) {
                RepoError::DuplicateRequest(request.id)
            } else {
                err.into()
            }
        })?;
        write_snapshot(&tx, request)?;
        tx.commit()?;
        Ok(())
    }

    fn update_request(&self, request: &EmergencyRequest) -> RepoResult<()> {
        request.check_consistency().map_err(RepoError::InvalidData)?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE emergency_requests
             SET
                requester_id = ?1,
                origin_latitude = ?2,
                origin_longitude = ?3,
                state = ?4,
                contacted_responder_id = ?5,
                created_at = ?6,
                resolved_at = ?7,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?8;",
            params![
                request.requester_id.as_str(),
                request.origin.latitude,
                request.origin.longitude,
                request.state.as_str(),
                request.contacted_responder_id.as_deref(),
                request.created_at,
                request.resolved_at,
                request.id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::RequestNotFound(request.id));
        }

        tx.execute(
            "DELETE FROM request_candidates WHERE request_id = ?1;",
            [request.id.to_string()],
        )?;
        write_snapshot(&tx, request)?;
        tx.commit()?;
        Ok(())
    }

    fn get_request(&self, id: RequestId) -> RepoResult<Option<EmergencyRequest>> {
        let conn = self.conn();
        let header = conn
            .query_row(
                &format!("{REQUEST_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(parse_request_row(row)),
            )
            .optional()?;

        match header {
            Some(parsed) => Ok(Some(attach_snapshot(&conn, parsed?)?)),
            None => Ok(None),
        }
    }

    fn list_requests(&self, query: &RequestListQuery) -> RepoResult<Vec<EmergencyRequest>> {
        let mut sql = format!("{REQUEST_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(requester_id) = &query.requester_id {
            sql.push_str(" AND requester_id = ?");
            bind_values.push(Value::Text(requester_id.clone()));
        }
        if query.open_only {
            sql.push_str(&format!(" AND state IN {OPEN_STATES_SQL}"));
        }

        sql.push_str(" ORDER BY created_at DESC, rowid DESC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let conn = self.conn();
        let mut headers = Vec::new();
        {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            while let Some(row) = rows.next()? {
                headers.push(parse_request_row(row)?);
            }
        }

        headers
            .into_iter()
            .map(|header| attach_snapshot(&conn, header))
            .collect()
    }

    fn count_requests(&self, states: &[RequestState]) -> RepoResult<u64> {
        let mut sql = "SELECT COUNT(*) FROM emergency_requests".to_string();
        if !states.is_empty() {
            let placeholders = vec!["?"; states.len()].join(", ");
            sql.push_str(&format!(" WHERE state IN ({placeholders})"));
        }

        let count: i64 = self.conn().query_row(
            &sql,
            params_from_iter(states.iter().map(|state| state.as_str())),
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

impl RewardRepository for SqliteStore {
    fn get_grant(&self, request_id: RequestId) -> RepoResult<Option<RewardGrant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{GRANT_SELECT_SQL} WHERE request_id = ?1;"))?;
        let mut rows = stmt.query([request_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_grant_row(row)?));
        }

        Ok(None)
    }

    fn record_grant(&self, grant: &RewardGrant) -> RepoResult<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM reward_grants WHERE request_id = ?1);",
            [grant.request_id.to_string()],
            |row| row.get(0),
        )?;
        if exists {
            return Err(RepoError::DuplicateGrant(grant.request_id));
        }

        // Dropping `tx` on any error below rolls back the credit.
        let total = credit_responder(&tx, &grant.responder_id, grant.points)?;
        tx.execute(
            "INSERT INTO reward_grants (
                request_id,
                responder_id,
                points,
                granted_at
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                grant.request_id.to_string(),
                grant.responder_id.as_str(),
                grant.points,
                grant.granted_at,
            ],
        )?;
        tx.commit()?;
        Ok(total)
    }

    fn list_grants_for_responder(
        &self,
        responder_id: &str,
        limit: Option<u32>,
    ) -> RepoResult<Vec<RewardGrant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{GRANT_SELECT_SQL}
             WHERE responder_id = ?1
             ORDER BY granted_at DESC, rowid DESC
             LIMIT ?2;"
        ))?;
        let limit = limit.map_or(-1, i64::from);
        let mut rows = stmt.query(params![responder_id, limit])?;
        let mut grants = Vec::new();
        while let Some(row) = rows.next()? {
            grants.push(parse_grant_row(row)?);
        }
        Ok(grants)
    }

    fn total_points_awarded(&self) -> RepoResult<i64> {
        let total = self.conn().query_row(
            "SELECT COALESCE(SUM(points), 0) FROM reward_grants;",
            [],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

fn credit_responder(conn: &Connection, id: &str, points: i64) -> RepoResult<i64> {
    ensure_positive_points(points)?;

    let changed = conn.execute(
        "UPDATE responders
         SET
            credit_points = credit_points + ?1,
            updated_at = (strftime('%s', 'now') * 1000)
         WHERE id = ?2;",
        params![points, id],
    )?;
    if changed == 0 {
        return Err(RepoError::ResponderNotFound(id.to_string()));
    }

    let total = conn.query_row(
        "SELECT credit_points FROM responders WHERE id = ?1;",
        [id],
        |row| row.get(0),
    )?;
    Ok(total)
}

fn write_snapshot(conn: &Connection, request: &EmergencyRequest) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO request_candidates (
            request_id,
            rank,
            responder_id,
            distance_km
        ) VALUES (?1, ?2, ?3, ?4);",
    )?;
    let request_id = request.id.to_string();
    for (rank, candidate) in request.candidate_snapshot.iter().enumerate() {
        stmt.execute(params![
            request_id,
            rank as i64,
            candidate.responder_id.as_str(),
            candidate.distance_km,
        ])?;
    }
    Ok(())
}

fn attach_snapshot(conn: &Connection, mut request: EmergencyRequest) -> RepoResult<EmergencyRequest> {
    let mut stmt = conn.prepare(
        "SELECT responder_id, distance_km
         FROM request_candidates
         WHERE request_id = ?1
         ORDER BY rank ASC;",
    )?;
    let mut rows = stmt.query([request.id.to_string()])?;
    while let Some(row) = rows.next()? {
        request.candidate_snapshot.push(Candidate {
            responder_id: row.get("responder_id")?,
            distance_km: row.get("distance_km")?,
        });
    }

    request.check_consistency().map_err(RepoError::InvalidData)?;
    Ok(request)
}

fn parse_responder_row(row: &Row<'_>) -> RepoResult<Responder> {
    let role_text: String = row.get("role")?;
    let role = parse_role(&role_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid role `{role_text}` in responders.role"))
    })?;

    let responder = Responder {
        id: row.get("id")?,
        name: row.get("name")?,
        contact_handle: row.get("contact_handle")?,
        role,
        specialty: row.get("specialty")?,
        location: Coordinate {
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
        },
        available: int_to_bool(row.get("available")?, "responders.available")?,
        credit_points: row.get("credit_points")?,
        is_deactivated: int_to_bool(row.get("is_deactivated")?, "responders.is_deactivated")?,
    };
    responder.validate()?;
    Ok(responder)
}

/// Parses the request header; the snapshot is attached separately.
fn parse_request_row(row: &Row<'_>) -> RepoResult<EmergencyRequest> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "emergency_requests.id")?;

    let state_text: String = row.get("state")?;
    let state = parse_state(&state_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid state `{state_text}` in emergency_requests.state"
        ))
    })?;

    Ok(EmergencyRequest {
        id,
        requester_id: row.get("requester_id")?,
        origin: Coordinate {
            latitude: row.get("origin_latitude")?,
            longitude: row.get("origin_longitude")?,
        },
        state,
        candidate_snapshot: Vec::new(),
        contacted_responder_id: row.get("contacted_responder_id")?,
        created_at: row.get("created_at")?,
        resolved_at: row.get("resolved_at")?,
    })
}

fn parse_grant_row(row: &Row<'_>) -> RepoResult<RewardGrant> {
    let request_text: String = row.get("request_id")?;
    Ok(RewardGrant {
        request_id: parse_uuid(&request_text, "reward_grants.request_id")?,
        responder_id: row.get("responder_id")?,
        points: row.get("points")?,
        granted_at: row.get("granted_at")?,
    })
}

fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn role_to_db(role: ResponderRole) -> &'static str {
    match role {
        ResponderRole::Physician => "physician",
        ResponderRole::Nurse => "nurse",
        ResponderRole::Pharmacist => "pharmacist",
        ResponderRole::TechnicalAssistant => "technical_assistant",
    }
}

fn parse_role(value: &str) -> Option<ResponderRole> {
    match value {
        "physician" => Some(ResponderRole::Physician),
        "nurse" => Some(ResponderRole::Nurse),
        "pharmacist" => Some(ResponderRole::Pharmacist),
        "technical_assistant" => Some(ResponderRole::TechnicalAssistant),
        _ => None,
    }
}

fn parse_state(value: &str) -> Option<RequestState> {
    match value {
        "pending" => Some(RequestState::Pending),
        "dispatched" => Some(RequestState::Dispatched),
        "contacted" => Some(RequestState::Contacted),
        "resolved" => Some(RequestState::Resolved),
        "abandoned" => Some(RequestState::Abandoned),
        _ => None,
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}
