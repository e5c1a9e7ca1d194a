//! Tables the call dashboard may query.

use sqlx_pg_toolkit::{Catalog, ColumnKind, TableSchema};

pub const CALL_LOGS: &str = "call_logs";
pub const AGENTS: &str = "agents";
pub const PHONE_NUMBERS: &str = "phone_numbers";

/// Catalog of the call dashboard: call logs, agents and phone numbers.
pub fn call_dashboard() -> Catalog {
   Catalog::new()
      .with_table(call_logs())
      .with_table(agents())
      .with_table(phone_numbers())
}

/// One row per call; scoped by `agent_id`.
pub fn call_logs() -> TableSchema {
   TableSchema::new(CALL_LOGS, "id")
      .column("id", ColumnKind::Uuid)
      .column("agent_id", ColumnKind::Uuid)
      .column("phone_number_id", ColumnKind::Uuid)
      .column("call_started_at", ColumnKind::Timestamp)
      .column("call_ended_at", ColumnKind::Timestamp)
      .column("duration_seconds", ColumnKind::Integer)
      .column("from_number", ColumnKind::Text)
      .column("to_number", ColumnKind::Text)
      .column("direction", ColumnKind::Text)
      .column("status", ColumnKind::Text)
      .column("ended_reason", ColumnKind::Text)
      .column("cost_transport", ColumnKind::Numeric)
      .column("cost_llm", ColumnKind::Numeric)
      .column("cost_tts", ColumnKind::Numeric)
      .column("recording_url", ColumnKind::Text)
      .column("transcript", ColumnKind::Text)
      .column("metadata", ColumnKind::Json)
      .column("metrics", ColumnKind::Json)
      .column("created_at", ColumnKind::Timestamp)
}

pub fn agents() -> TableSchema {
   TableSchema::new(AGENTS, "id")
      .column("id", ColumnKind::Uuid)
      .column("name", ColumnKind::Text)
      .column("voice", ColumnKind::Text)
      .column("language", ColumnKind::Text)
      .column("system_prompt", ColumnKind::Text)
      .column("is_active", ColumnKind::Boolean)
      .column("created_at", ColumnKind::Timestamp)
      .column("metadata", ColumnKind::Json)
}

pub fn phone_numbers() -> TableSchema {
   TableSchema::new(PHONE_NUMBERS, "id")
      .column("id", ColumnKind::Uuid)
      .column("agent_id", ColumnKind::Uuid)
      .column("number", ColumnKind::Text)
      .column("provider", ColumnKind::Text)
      .column("country_code", ColumnKind::Text)
      .column("is_active", ColumnKind::Boolean)
      .column("created_at", ColumnKind::Timestamp)
}
