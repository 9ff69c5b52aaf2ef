use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use super::DatabaseError;
use crate::imaging::QualityMetrics;
use crate::models::{AnalysisRecord, Conversation, Message, MessageRole, UploadKind};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FMT).to_string()
}

fn parse_ts(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, TS_FMT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid timestamp {s:?}: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

// ═══════════════════════════════════════════
// Analysis Repository
// ═══════════════════════════════════════════

pub fn insert_analysis(conn: &Connection, rec: &AnalysisRecord) -> Result<(), DatabaseError> {
    let issues = serde_json::to_string(&rec.issues)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    let labels = serde_json::to_string(&rec.labels)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    conn.execute(
        "INSERT INTO analyses (id, created_at, upload_kind, brightness, contrast, sharpness,
         noise, issues, detected_text, labels, confidence, report, metadata_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            rec.id.to_string(),
            format_ts(&rec.created_at),
            rec.upload_kind.as_str(),
            rec.metrics.brightness,
            rec.metrics.contrast,
            rec.metrics.sharpness,
            rec.metrics.noise,
            issues,
            rec.detected_text,
            labels,
            rec.confidence,
            rec.report,
            rec.metadata_json,
        ],
    )?;
    Ok(())
}

pub fn get_analysis(conn: &Connection, id: &Uuid) -> Result<Option<AnalysisRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, created_at, upload_kind, brightness, contrast, sharpness,
         noise, issues, detected_text, labels, confidence, report, metadata_json
         FROM analyses WHERE id = ?1",
    )?;

    let row = stmt
        .query_row(params![id.to_string()], |row| {
            Ok(AnalysisRow {
                id: row.get(0)?,
                created_at: row.get(1)?,
                upload_kind: row.get(2)?,
                brightness: row.get(3)?,
                contrast: row.get(4)?,
                sharpness: row.get(5)?,
                noise: row.get(6)?,
                issues: row.get(7)?,
                detected_text: row.get(8)?,
                labels: row.get(9)?,
                confidence: row.get(10)?,
                report: row.get(11)?,
                metadata_json: row.get(12)?,
            })
        })
        .optional()?;

    row.map(analysis_from_row).transpose()
}

struct AnalysisRow {
    id: String,
    created_at: String,
    upload_kind: String,
    brightness: f32,
    contrast: f32,
    sharpness: f32,
    noise: f32,
    issues: String,
    detected_text: String,
    labels: String,
    confidence: f32,
    report: String,
    metadata_json: Option<String>,
}

fn analysis_from_row(row: AnalysisRow) -> Result<AnalysisRecord, DatabaseError> {
    Ok(AnalysisRecord {
        id: parse_uuid(&row.id)?,
        created_at: parse_ts(&row.created_at)?,
        upload_kind: UploadKind::from_str(&row.upload_kind)?,
        metrics: QualityMetrics {
            brightness: row.brightness,
            contrast: row.contrast,
            sharpness: row.sharpness,
            noise: row.noise,
        },
        issues: serde_json::from_str(&row.issues).unwrap_or_default(),
        detected_text: row.detected_text,
        labels: serde_json::from_str(&row.labels).unwrap_or_default(),
        confidence: row.confidence,
        report: row.report,
        metadata_json: row.metadata_json,
    })
}

// ═══════════════════════════════════════════
// Conversation Repository
// ═══════════════════════════════════════════

pub fn insert_conversation(conn: &Connection, conv: &Conversation) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO conversations (id, analysis_id, started_at, title) VALUES (?1, ?2, ?3, ?4)",
        params![
            conv.id.to_string(),
            conv.analysis_id.map(|id| id.to_string()),
            format_ts(&conv.started_at),
            conv.title,
        ],
    )?;
    Ok(())
}

pub fn get_conversation(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<Conversation>, DatabaseError> {
    let result = conn
        .query_row(
            "SELECT id, analysis_id, started_at, title FROM conversations WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;

    result
        .map(|(id, analysis_id, started_at, title)| {
            Ok(Conversation {
                id: parse_uuid(&id)?,
                analysis_id: analysis_id.as_deref().map(parse_uuid).transpose()?,
                started_at: parse_ts(&started_at)?,
                title,
            })
        })
        .transpose()
}

/// Conversation list entry, newest first, with a message count for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub analysis_id: Option<Uuid>,
    pub started_at: NaiveDateTime,
    pub title: Option<String>,
    pub message_count: i64,
}

pub fn list_conversations(conn: &Connection) -> Result<Vec<ConversationSummary>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.analysis_id, c.started_at, c.title, COUNT(m.id)
         FROM conversations c
         LEFT JOIN messages m ON m.conversation_id = c.id
         GROUP BY c.id
         ORDER BY c.started_at DESC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, i64>(4)?,
        ))
    })?;

    let mut summaries = Vec::new();
    for row in rows {
        let (id, analysis_id, started_at, title, message_count) = row?;
        summaries.push(ConversationSummary {
            id: parse_uuid(&id)?,
            analysis_id: analysis_id.as_deref().map(parse_uuid).transpose()?,
            started_at: parse_ts(&started_at)?,
            title,
            message_count,
        });
    }
    Ok(summaries)
}

pub fn insert_message(conn: &Connection, msg: &Message) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO messages (id, conversation_id, role, content, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            msg.id.to_string(),
            msg.conversation_id.to_string(),
            msg.role.as_str(),
            msg.content,
            format_ts(&msg.timestamp),
        ],
    )?;
    Ok(())
}

pub fn get_messages_by_conversation(
    conn: &Connection,
    conversation_id: &Uuid,
) -> Result<Vec<Message>, DatabaseError> {
    // Timestamps have second resolution, so a question and its answer
    // can tie; rowid preserves insertion order across the tie.
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, role, content, timestamp
         FROM messages WHERE conversation_id = ?1 ORDER BY timestamp ASC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![conversation_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut messages = Vec::new();
    for row in rows {
        let (id, conversation_id, role, content, timestamp) = row?;
        messages.push(Message {
            id: parse_uuid(&id)?,
            conversation_id: parse_uuid(&conversation_id)?,
            role: MessageRole::from_str(&role)?,
            content,
            timestamp: parse_ts(&timestamp)?,
        });
    }
    Ok(messages)
}

/// The analysis a conversation is anchored to, if it still exists.
pub fn get_analysis_for_conversation(
    conn: &Connection,
    conversation_id: &Uuid,
) -> Result<Option<AnalysisRecord>, DatabaseError> {
    let analysis_id: Option<Option<String>> = conn
        .query_row(
            "SELECT analysis_id FROM conversations WHERE id = ?1",
            params![conversation_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    match analysis_id.flatten() {
        Some(id) => get_analysis(conn, &parse_uuid(&id)?),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    fn sample_analysis() -> AnalysisRecord {
        AnalysisRecord::new(
            UploadKind::Dicom,
            QualityMetrics {
                brightness: 0.45,
                contrast: 0.6,
                sharpness: 42.0,
                noise: 12.5,
            },
            vec!["Low brightness".into()],
            "R marker".into(),
            vec!["chest x-ray".into(), "radiograph".into()],
            0.85,
            "A narrative report.".into(),
            Some(r#"{"modality":"CR"}"#.into()),
        )
    }

    #[test]
    fn analysis_round_trip() {
        let conn = open_memory_database().unwrap();
        let rec = sample_analysis();
        insert_analysis(&conn, &rec).unwrap();

        let loaded = get_analysis(&conn, &rec.id).unwrap().unwrap();
        assert_eq!(loaded.id, rec.id);
        assert_eq!(loaded.upload_kind, UploadKind::Dicom);
        assert_eq!(loaded.metrics.brightness, 0.45);
        assert_eq!(loaded.issues, vec!["Low brightness".to_string()]);
        assert_eq!(loaded.labels.len(), 2);
        assert_eq!(loaded.report, "A narrative report.");
        assert!(loaded.metadata_json.is_some());
    }

    #[test]
    fn missing_analysis_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_analysis(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn conversation_and_messages_round_trip() {
        let conn = open_memory_database().unwrap();
        let rec = sample_analysis();
        insert_analysis(&conn, &rec).unwrap();

        let conv = Conversation::new(Some(rec.id), Some("Chest image".into()));
        insert_conversation(&conn, &conv).unwrap();

        let q = Message::new(conv.id, MessageRole::User, "What did you find?".into());
        insert_message(&conn, &q).unwrap();
        let a = Message::new(conv.id, MessageRole::Assistant, "See the report.".into());
        insert_message(&conn, &a).unwrap();

        let loaded = get_conversation(&conn, &conv.id).unwrap().unwrap();
        assert_eq!(loaded.analysis_id, Some(rec.id));

        let messages = get_messages_by_conversation(&conn, &conv.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].content, "See the report.");
    }

    #[test]
    fn list_conversations_counts_messages() {
        let conn = open_memory_database().unwrap();
        let conv = Conversation::new(None, None);
        insert_conversation(&conn, &conv).unwrap();
        insert_message(&conn, &Message::new(conv.id, MessageRole::User, "hi".into())).unwrap();

        let list = list_conversations(&conn).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message_count, 1);
    }

    #[test]
    fn analysis_lookup_via_conversation() {
        let conn = open_memory_database().unwrap();
        let rec = sample_analysis();
        insert_analysis(&conn, &rec).unwrap();
        let conv = Conversation::new(Some(rec.id), None);
        insert_conversation(&conn, &conv).unwrap();

        let found = get_analysis_for_conversation(&conn, &conv.id).unwrap();
        assert_eq!(found.unwrap().id, rec.id);

        let detached = Conversation::new(None, None);
        insert_conversation(&conn, &detached).unwrap();
        assert!(get_analysis_for_conversation(&conn, &detached.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn message_order_survives_timestamp_ties() {
        let conn = open_memory_database().unwrap();
        let conv = Conversation::new(None, None);
        insert_conversation(&conn, &conv).unwrap();

        // Same second, and the answer's UUID sorts before the question's.
        let ts = chrono::Local::now().naive_local();
        let question = Message {
            id: Uuid::parse_str("ffffffff-ffff-4fff-8fff-ffffffffffff").unwrap(),
            conversation_id: conv.id,
            role: MessageRole::User,
            content: "What did you find?".into(),
            timestamp: ts,
        };
        let answer = Message {
            id: Uuid::parse_str("00000000-0000-4000-8000-000000000000").unwrap(),
            conversation_id: conv.id,
            role: MessageRole::Assistant,
            content: "See the report.".into(),
            timestamp: ts,
        };
        insert_message(&conn, &question).unwrap();
        insert_message(&conn, &answer).unwrap();

        let messages = get_messages_by_conversation(&conn, &conv.id).unwrap();
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[test]
    fn malformed_timestamp_is_an_error() {
        let conn = open_memory_database().unwrap();
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO conversations (id, analysis_id, started_at, title)
             VALUES (?1, NULL, 'not-a-date', NULL)",
            params![id.to_string()],
        )
        .unwrap();

        assert!(get_conversation(&conn, &id).is_err());
    }

    #[test]
    fn message_fk_enforced() {
        let conn = open_memory_database().unwrap();
        let orphan = Message::new(Uuid::new_v4(), MessageRole::User, "hello".into());
        assert!(insert_message(&conn, &orphan).is_err());
    }
}
