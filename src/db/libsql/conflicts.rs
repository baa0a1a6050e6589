use std::collections::{BTreeMap, BTreeSet};

use libsql::params;
use uuid::Uuid;

use crate::conflicts::model::{
    AffiliatedEntity, CaseFile, CaseId, CaseRecord, ConflictCheckRecord, CorpusEntry,
    EntityCategory, EntitySlot, LawyerAssignment, NewConflictCheck, Party, PartyKind, PartyRole,
};
use crate::conflicts::normalize::{normalize_identifier, normalize_name};
use crate::conflicts::ConflictLevel;
use crate::db::{ConflictReportStore, CorpusMatches, CorpusQuery, CorpusStore, CorpusWriter};
use crate::error::DatabaseError;

use super::{
    LibSqlBackend, fmt_ts, get_i64, get_opt_i64, get_opt_text, get_text, opt_i64, opt_text,
    parse_timestamp, placeholders,
};

fn parse_party_role(raw: &str) -> Result<PartyRole, DatabaseError> {
    PartyRole::from_db_value(raw)
        .ok_or_else(|| DatabaseError::Serialization(format!("invalid party role '{raw}'")))
}

fn parse_party_kind(raw: &str) -> Result<PartyKind, DatabaseError> {
    PartyKind::from_db_value(raw)
        .ok_or_else(|| DatabaseError::Serialization(format!("invalid party kind '{raw}'")))
}

fn parse_category(raw: &str) -> Result<EntityCategory, DatabaseError> {
    EntityCategory::from_db_value(raw)
        .ok_or_else(|| DatabaseError::Serialization(format!("invalid entity category '{raw}'")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(raw).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

async fn insert_party(
    conn: &libsql::Connection,
    case_id: CaseId,
    party: &Party,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO case_parties \
         (case_id, role, kind, name, name_normalized, identifier, identifier_normalized) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            case_id,
            party.role.as_str(),
            party.kind.as_str(),
            party.name.trim(),
            normalize_name(&party.name),
            opt_text(party.identifier.as_deref()),
            opt_text(party.identifier.as_deref().and_then(normalize_identifier).as_deref()),
        ],
    )
    .await?;
    Ok(())
}

async fn insert_case_rows(conn: &libsql::Connection, file: &CaseFile) -> Result<(), DatabaseError> {
    let case = &file.case;
    conn.execute(
        "INSERT INTO cases (id, case_type, created_at) VALUES (?1, ?2, ?3)",
        params![case.id, case.case_type.as_str(), fmt_ts(&case.created_at)],
    )
    .await?;

    insert_party(conn, case.id, &case.client).await?;
    if let Some(opponent) = &case.opponent {
        insert_party(conn, case.id, opponent).await?;
    }

    for entity in &file.affiliated {
        conn.execute(
            "INSERT INTO affiliated_entities \
             (case_id, category, name, name_normalized, identifier, identifier_normalized) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                case.id,
                entity.category.as_str(),
                entity.name.trim(),
                normalize_name(&entity.name),
                opt_text(entity.identifier.as_deref()),
                opt_text(entity.identifier.as_deref().and_then(normalize_identifier).as_deref()),
            ],
        )
        .await?;
    }

    for assignment in &file.assignments {
        conn.execute(
            "INSERT INTO lawyer_assignments (case_id, lawyer_id, assigned_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(case_id, lawyer_id) DO NOTHING",
            params![
                case.id,
                assignment.lawyer_id.as_str(),
                fmt_ts(&assignment.assigned_at)
            ],
        )
        .await?;
    }
    Ok(())
}

async fn case_exists(conn: &libsql::Connection, case_id: CaseId) -> Result<bool, DatabaseError> {
    let row = conn
        .query("SELECT 1 FROM cases WHERE id = ?1", params![case_id])
        .await?
        .next()
        .await?;
    Ok(row.is_some())
}

async fn load_case_rows(
    conn: &libsql::Connection,
    case_id: CaseId,
) -> Result<Option<CaseFile>, DatabaseError> {
    let Some(case_row) = conn
        .query(
            "SELECT case_type, created_at FROM cases WHERE id = ?1",
            params![case_id],
        )
        .await?
        .next()
        .await?
    else {
        return Ok(None);
    };
    let case_type = get_text(&case_row, 0)?;
    let created_at = parse_timestamp(&get_text(&case_row, 1)?)?;

    let mut client = None;
    let mut opponent = None;
    let mut rows = conn
        .query(
            "SELECT role, kind, name, identifier FROM case_parties WHERE case_id = ?1",
            params![case_id],
        )
        .await?;
    while let Some(row) = rows.next().await? {
        let party = Party {
            role: parse_party_role(&get_text(&row, 0)?)?,
            kind: parse_party_kind(&get_text(&row, 1)?)?,
            name: get_text(&row, 2)?,
            identifier: get_opt_text(&row, 3)?,
        };
        match party.role {
            PartyRole::Client => client = Some(party),
            PartyRole::Opponent => opponent = Some(party),
        }
    }
    let client = client.ok_or_else(|| {
        DatabaseError::Serialization(format!("case {case_id} has no client party"))
    })?;

    let mut affiliated = Vec::new();
    let mut rows = conn
        .query(
            "SELECT category, name, identifier FROM affiliated_entities \
             WHERE case_id = ?1 ORDER BY id",
            params![case_id],
        )
        .await?;
    while let Some(row) = rows.next().await? {
        affiliated.push(AffiliatedEntity {
            category: parse_category(&get_text(&row, 0)?)?,
            name: get_text(&row, 1)?,
            identifier: get_opt_text(&row, 2)?,
        });
    }

    let mut assignments = Vec::new();
    let mut rows = conn
        .query(
            "SELECT lawyer_id, assigned_at FROM lawyer_assignments \
             WHERE case_id = ?1 ORDER BY lawyer_id",
            params![case_id],
        )
        .await?;
    while let Some(row) = rows.next().await? {
        assignments.push(LawyerAssignment {
            case_id,
            lawyer_id: get_text(&row, 0)?,
            assigned_at: parse_timestamp(&get_text(&row, 1)?)?,
        });
    }

    Ok(Some(CaseFile {
        case: CaseRecord {
            id: case_id,
            client,
            opponent,
            case_type,
            created_at,
        },
        affiliated,
        assignments,
    }))
}

/// Parameter list `names..., identifiers..., exclude` shared by both entity queries.
fn entity_lookup_params(query: &CorpusQuery) -> (String, String, usize, Vec<libsql::Value>) {
    let names = query.name_keys.len();
    let identifiers = query.identifier_keys.len();
    let name_clause = placeholders(1, names);
    let identifier_clause = placeholders(names + 1, identifiers);
    let exclude_idx = names + identifiers + 1;

    let mut values: Vec<libsql::Value> = Vec::with_capacity(exclude_idx);
    values.extend(query.name_keys.iter().cloned().map(libsql::Value::Text));
    values.extend(query.identifier_keys.iter().cloned().map(libsql::Value::Text));
    values.push(opt_i64(query.exclude_case_id));
    (name_clause, identifier_clause, exclude_idx, values)
}

async fn lookup_rows(
    conn: &libsql::Connection,
    query: &CorpusQuery,
) -> Result<CorpusMatches, DatabaseError> {
    let mut entries = Vec::new();

    if !query.name_keys.is_empty() || !query.identifier_keys.is_empty() {
        let (name_clause, identifier_clause, exclude_idx, values) = entity_lookup_params(query);

        let party_sql = format!(
            "SELECT case_id, role, name, name_normalized, identifier_normalized \
             FROM case_parties \
             WHERE (name_normalized IN ({name_clause}) OR identifier_normalized IN ({identifier_clause})) \
               AND (?{exclude_idx} IS NULL OR case_id <> ?{exclude_idx}) \
             ORDER BY case_id, role"
        );
        let mut rows = conn.query(&party_sql, values.clone()).await?;
        while let Some(row) = rows.next().await? {
            entries.push(CorpusEntry {
                case_id: get_i64(&row, 0)?,
                slot: EntitySlot::Party(parse_party_role(&get_text(&row, 1)?)?),
                name: get_text(&row, 2)?,
                name_key: get_text(&row, 3)?,
                identifier_key: get_opt_text(&row, 4)?,
            });
        }

        let entity_sql = format!(
            "SELECT case_id, category, name, name_normalized, identifier_normalized \
             FROM affiliated_entities \
             WHERE (name_normalized IN ({name_clause}) OR identifier_normalized IN ({identifier_clause})) \
               AND (?{exclude_idx} IS NULL OR case_id <> ?{exclude_idx}) \
             ORDER BY case_id, id"
        );
        let mut rows = conn.query(&entity_sql, values).await?;
        while let Some(row) = rows.next().await? {
            entries.push(CorpusEntry {
                case_id: get_i64(&row, 0)?,
                slot: EntitySlot::Affiliated(parse_category(&get_text(&row, 1)?)?),
                name: get_text(&row, 2)?,
                name_key: get_text(&row, 3)?,
                identifier_key: get_opt_text(&row, 4)?,
            });
        }
    }

    let mut reviewer_cases: BTreeMap<String, BTreeSet<CaseId>> = BTreeMap::new();
    if !query.reviewer_ids.is_empty() {
        let count = query.reviewer_ids.len();
        let exclude_idx = count + 1;
        let sql = format!(
            "SELECT lawyer_id, case_id FROM lawyer_assignments \
             WHERE lawyer_id IN ({}) \
               AND (?{exclude_idx} IS NULL OR case_id <> ?{exclude_idx})",
            placeholders(1, count)
        );
        let mut values: Vec<libsql::Value> = query
            .reviewer_ids
            .iter()
            .cloned()
            .map(libsql::Value::Text)
            .collect();
        values.push(opt_i64(query.exclude_case_id));

        let mut rows = conn.query(&sql, values).await?;
        while let Some(row) = rows.next().await? {
            reviewer_cases
                .entry(get_text(&row, 0)?)
                .or_default()
                .insert(get_i64(&row, 1)?);
        }
    }

    Ok(CorpusMatches {
        entries,
        reviewer_cases,
    })
}

fn row_to_report(row: &libsql::Row) -> Result<ConflictCheckRecord, DatabaseError> {
    let id_raw = get_text(row, 0)?;
    let level_raw = get_text(row, 3)?;
    Ok(ConflictCheckRecord {
        id: Uuid::parse_str(&id_raw)
            .map_err(|e| DatabaseError::Serialization(format!("invalid report id: {e}")))?,
        case_id: get_opt_i64(row, 1)?,
        search_params: from_json(&get_text(row, 2)?)?,
        level: ConflictLevel::from_db_value(&level_raw).ok_or_else(|| {
            DatabaseError::Serialization(format!("invalid conflict level '{level_raw}'"))
        })?,
        reasons: from_json(&get_text(row, 4)?)?,
        conflicting_case_ids: from_json(&get_text(row, 5)?)?,
        recommendations: from_json(&get_text(row, 6)?)?,
        warnings: from_json(&get_text(row, 7)?)?,
        checked_by: get_text(row, 8)?,
        checked_at: parse_timestamp(&get_text(row, 9)?)?,
    })
}

const REPORT_COLUMNS: &str = "id, case_id, search_params, level, reasons_json, \
     conflicting_case_ids, recommendations, warnings_json, checked_by, checked_at";

#[async_trait::async_trait]
impl CorpusStore for LibSqlBackend {
    async fn load_case(&self, case_id: CaseId) -> Result<Option<CaseFile>, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute("BEGIN DEFERRED", ()).await?;
        let loaded = load_case_rows(&conn, case_id).await;
        conn.execute("COMMIT", ()).await?;
        loaded
    }

    async fn lookup(&self, query: &CorpusQuery) -> Result<CorpusMatches, DatabaseError> {
        let conn = self.connect().await?;
        // One read transaction: every row below comes from the same snapshot.
        conn.execute("BEGIN DEFERRED", ()).await?;
        match lookup_rows(&conn, query).await {
            Ok(matches) => {
                conn.execute("COMMIT", ()).await?;
                Ok(matches)
            }
            Err(e) => {
                if let Err(rollback) = conn.execute("ROLLBACK", ()).await {
                    tracing::warn!("Failed to roll back corpus lookup: {}", rollback);
                }
                Err(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl CorpusWriter for LibSqlBackend {
    async fn insert_case(&self, file: &CaseFile) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await?;

        let outcome = match case_exists(&conn, file.case.id).await {
            Ok(true) => Err(DatabaseError::Duplicate(format!("case {}", file.case.id))),
            Ok(false) => insert_case_rows(&conn, file).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                conn.execute("COMMIT", ()).await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = conn.execute("ROLLBACK", ()).await {
                    tracing::warn!("Failed to roll back case insert: {}", rollback);
                }
                Err(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl ConflictReportStore for LibSqlBackend {
    async fn insert_report(&self, record: &NewConflictCheck) -> Result<ConflictCheckRecord, DatabaseError> {
        let id = Uuid::new_v4();
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO conflict_checks \
             (id, case_id, search_params, level, reasons_json, conflicting_case_ids, \
              recommendations, warnings_json, checked_by, checked_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id.to_string(),
                opt_i64(record.case_id),
                to_json(&record.search_params)?,
                record.level.as_str(),
                to_json(&record.reasons)?,
                to_json(&record.conflicting_case_ids)?,
                to_json(&record.recommendations)?,
                to_json(&record.warnings)?,
                record.checked_by.as_str(),
                fmt_ts(&record.checked_at),
            ],
        )
        .await?;
        Ok(ConflictCheckRecord::from_new(id, record.clone()))
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<ConflictCheckRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {REPORT_COLUMNS} FROM conflict_checks WHERE id = ?1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.as_ref().map(row_to_report).transpose()
    }

    async fn list_reports_for_case(&self, case_id: CaseId) -> Result<Vec<ConflictCheckRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {REPORT_COLUMNS} FROM conflict_checks \
                     WHERE case_id = ?1 ORDER BY checked_at, id"
                ),
                params![case_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_report(&row)?);
        }
        Ok(out)
    }
}
