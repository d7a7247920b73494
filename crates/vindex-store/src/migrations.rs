//! Database migrations.
//! Migrations are forward-only. Never edit or delete a migration after it ships.

/// All migrations in order. Each migration is a SQL string; the runner
/// tracks progress in `PRAGMA user_version`.
pub(crate) const MIGRATIONS: &[&str] = &[
    // Migration 1: videos
    r#"
    CREATE TABLE videos (
        video_id TEXT PRIMARY KEY,
        file_path TEXT NOT NULL UNIQUE,
        content_hash TEXT,
        file_created_at TEXT,
        duration_seconds REAL,
        status TEXT NOT NULL DEFAULT 'discovered',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        error_message TEXT
    );

    CREATE INDEX idx_videos_status ON videos (status);
    CREATE INDEX idx_videos_created_at_id ON videos (file_created_at, video_id);
    "#,
    // Migration 2: tasks, unique per (video, type, language)
    r#"
    CREATE TABLE tasks (
        task_id TEXT PRIMARY KEY,
        video_id TEXT NOT NULL REFERENCES videos (video_id),
        task_type TEXT NOT NULL,
        language TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        priority INTEGER NOT NULL DEFAULT 50,
        dependencies TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        error_message TEXT
    );

    CREATE UNIQUE INDEX idx_tasks_video_type_language
        ON tasks (video_id, task_type, coalesce(language, ''));
    CREATE INDEX idx_tasks_status ON tasks (status);
    CREATE INDEX idx_tasks_dequeue ON tasks (task_type, status, priority, created_at);
    "#,
    // Migration 3: runs
    r#"
    CREATE TABLE runs (
        run_id TEXT PRIMARY KEY,
        asset_id TEXT NOT NULL REFERENCES videos (video_id),
        pipeline_profile TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        status TEXT NOT NULL DEFAULT 'running',
        error_message TEXT
    );

    CREATE INDEX idx_runs_asset ON runs (asset_id);
    "#,
    // Migration 4: artifacts
    r#"
    CREATE TABLE artifacts (
        artifact_id TEXT PRIMARY KEY,
        asset_id TEXT NOT NULL REFERENCES videos (video_id),
        artifact_type TEXT NOT NULL,
        schema_version INTEGER NOT NULL,
        span_start_ms INTEGER NOT NULL,
        span_end_ms INTEGER NOT NULL,
        payload_json TEXT NOT NULL,
        producer TEXT NOT NULL,
        producer_version TEXT NOT NULL,
        model_profile TEXT NOT NULL,
        config_hash TEXT NOT NULL,
        input_hash TEXT NOT NULL,
        run_id TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX idx_artifacts_asset_type_start
        ON artifacts (asset_id, artifact_type, span_start_ms);
    CREATE INDEX idx_artifacts_asset_type_profile_start
        ON artifacts (asset_id, artifact_type, model_profile, span_start_ms);
    CREATE INDEX idx_artifacts_type_created ON artifacts (artifact_type, created_at);
    CREATE INDEX idx_artifacts_run ON artifacts (run_id);
    "#,
    // Migration 5: selection policies
    r#"
    CREATE TABLE artifact_selections (
        asset_id TEXT NOT NULL REFERENCES videos (video_id),
        artifact_type TEXT NOT NULL,
        mode TEXT NOT NULL,
        preferred_profile TEXT,
        pinned_run_id TEXT,
        pinned_artifact_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (asset_id, artifact_type)
    );
    "#,
    // Migration 6: text projections (metadata tables + FTS5 indexes)
    r#"
    CREATE TABLE transcript_segments (
        artifact_id TEXT PRIMARY KEY,
        asset_id TEXT NOT NULL,
        start_ms INTEGER NOT NULL,
        end_ms INTEGER NOT NULL,
        text TEXT NOT NULL
    );

    CREATE INDEX idx_transcript_segments_asset
        ON transcript_segments (asset_id, start_ms);

    CREATE VIRTUAL TABLE transcript_fts USING fts5(
        text,
        artifact_id UNINDEXED,
        asset_id UNINDEXED,
        start_ms UNINDEXED,
        end_ms UNINDEXED
    );

    CREATE TABLE ocr_segments (
        artifact_id TEXT PRIMARY KEY,
        asset_id TEXT NOT NULL,
        start_ms INTEGER NOT NULL,
        end_ms INTEGER NOT NULL,
        text TEXT NOT NULL
    );

    CREATE INDEX idx_ocr_segments_asset ON ocr_segments (asset_id, start_ms);

    CREATE VIRTUAL TABLE ocr_fts USING fts5(
        text,
        artifact_id UNINDEXED,
        asset_id UNINDEXED,
        start_ms UNINDEXED,
        end_ms UNINDEXED
    );
    "#,
    // Migration 7: label, cluster and scene projections
    r#"
    CREATE TABLE object_labels (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        artifact_id TEXT NOT NULL,
        asset_id TEXT NOT NULL,
        label TEXT NOT NULL,
        confidence REAL NOT NULL,
        start_ms INTEGER NOT NULL,
        end_ms INTEGER NOT NULL
    );

    CREATE INDEX idx_object_labels_asset ON object_labels (asset_id, label, start_ms);
    CREATE INDEX idx_object_labels_artifact ON object_labels (artifact_id);
    CREATE INDEX idx_object_labels_label_global
        ON object_labels (label, asset_id, start_ms);

    CREATE TABLE face_clusters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        artifact_id TEXT NOT NULL,
        asset_id TEXT NOT NULL,
        cluster_id TEXT NOT NULL,
        confidence REAL NOT NULL,
        start_ms INTEGER NOT NULL,
        end_ms INTEGER NOT NULL
    );

    CREATE INDEX idx_face_clusters_asset ON face_clusters (asset_id, cluster_id, start_ms);
    CREATE INDEX idx_face_clusters_artifact ON face_clusters (artifact_id);
    CREATE INDEX idx_face_clusters_cluster_global
        ON face_clusters (cluster_id, asset_id, start_ms);

    CREATE TABLE scene_ranges (
        artifact_id TEXT PRIMARY KEY,
        asset_id TEXT NOT NULL,
        scene_index INTEGER NOT NULL,
        start_ms INTEGER NOT NULL,
        end_ms INTEGER NOT NULL
    );

    CREATE INDEX idx_scene_ranges_asset ON scene_ranges (asset_id, start_ms);
    "#,
    // Migration 8: geo projection, one location per video
    r#"
    CREATE TABLE video_locations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id TEXT NOT NULL UNIQUE REFERENCES videos (video_id),
        artifact_id TEXT NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        altitude REAL,
        country TEXT,
        state TEXT,
        city TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX idx_video_locations_latitude ON video_locations (latitude);
    CREATE INDEX idx_video_locations_longitude ON video_locations (longitude);
    CREATE INDEX idx_video_locations_country ON video_locations (country);
    CREATE INDEX idx_video_locations_state ON video_locations (state);
    CREATE INDEX idx_video_locations_city ON video_locations (city);
    "#,
];
