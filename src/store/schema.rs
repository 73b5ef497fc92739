pub const SCHEMA: &str = r#"
-- Every entity is a JSON document keyed by (collection, id)
CREATE TABLE IF NOT EXISTS records (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,   -- insertion order, kept across upserts
    collection TEXT NOT NULL,
    id TEXT NOT NULL,

    -- Owning project (NULL for users)
    project_id TEXT,

    body TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(collection, id)
);

CREATE INDEX IF NOT EXISTS idx_records_project ON records(collection, project_id);
"#;
