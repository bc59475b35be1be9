// crates/db/src/migrations.rs
//! Inline SQL migrations for the PowerPulse schema (§3, §3.1). Tracked one
//! statement per slot in `_migrations`, applied once each — the same
//! mechanism the teacher repo uses, generalized to this schema.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: conversations
    r#"
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY,
    chat_id TEXT NOT NULL UNIQUE,
    customer_name TEXT,
    total_messages INTEGER NOT NULL DEFAULT 0,
    customer_messages INTEGER NOT NULL DEFAULT 0,
    agent_messages INTEGER NOT NULL DEFAULT 0,
    first_message_time TEXT NOT NULL,
    last_message_time TEXT NOT NULL,
    common_topics TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#,
    // Migration 2: messages
    r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY,
    conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    chat_id TEXT NOT NULL,
    message_content TEXT NOT NULL,
    direction TEXT NOT NULL,
    social_create_time TEXT NOT NULL,
    agent_info TEXT
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_messages_conversation_time ON messages(conversation_id, social_create_time);"#,
    // Migration 3: daily_analyses
    r#"
CREATE TABLE IF NOT EXISTS daily_analyses (
    id INTEGER PRIMARY KEY,
    conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    analysis_date TEXT NOT NULL,
    sentiment_score REAL,
    sentiment_shift REAL,
    resolution_achieved REAL,
    fcr_score REAL,
    ces REAL,
    first_response_time REAL,
    avg_response_time REAL,
    total_handling_time REAL,
    effectiveness_score REAL,
    effort_score REAL,
    efficiency_score REAL,
    empathy_score REAL,
    csi_score REAL,
    error TEXT,
    UNIQUE(conversation_id, analysis_date)
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_daily_analyses_conversation ON daily_analyses(conversation_id);"#,
    // Migration 4: jobs + association table
    r#"
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY,
    upload_id TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    result TEXT
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_upload ON jobs(upload_id);"#,
    r#"
CREATE TABLE IF NOT EXISTS job_daily_analyses (
    job_id INTEGER NOT NULL REFERENCES jobs(id),
    daily_analysis_id INTEGER NOT NULL REFERENCES daily_analyses(id),
    UNIQUE(job_id, daily_analysis_id)
);
"#,
    // a DailyAnalysis belongs to at most one Job, ever (§3 invariant)
    r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_job_daily_analyses_unique_daily ON job_daily_analyses(daily_analysis_id);"#,
    // Migration 5: processed_chats
    r#"
CREATE TABLE IF NOT EXISTS processed_chats (
    chat_id TEXT PRIMARY KEY,
    processed_at TEXT NOT NULL,
    message_count INTEGER NOT NULL
);
"#,
    // Migration 6: metrics cache
    r#"
CREATE TABLE IF NOT EXISTS metrics (
    metric_name TEXT PRIMARY KEY,
    metric_value REAL NOT NULL,
    metric_metadata TEXT,
    calculated_at TEXT NOT NULL
);
"#,
];
