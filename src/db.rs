use crate::store::{StoreError, StoreResult};
use log::{error, info};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::{Duration, Instant};

pub const DB_FILE_NAME: &str = "coursebook.sqlite3";

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

// Versions must stay strictly increasing; applied versions are mirrored to PRAGMA user_version.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: "
        CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            student_no TEXT,
            class_id TEXT,
            department TEXT,
            title TEXT,
            gender TEXT,
            email TEXT,
            phone TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
        CREATE INDEX IF NOT EXISTS idx_users_class ON users(class_id);
        CREATE INDEX IF NOT EXISTS idx_users_student_no ON users(student_no);

        CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            grade TEXT NOT NULL,
            department TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_classes_grade ON classes(grade);

        CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            credits REAL NOT NULL,
            department TEXT,
            category TEXT NOT NULL,
            description TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_courses_department ON courses(department);
        CREATE INDEX IF NOT EXISTS idx_courses_status ON courses(status);
        CREATE INDEX IF NOT EXISTS idx_courses_category ON courses(category);

        CREATE TABLE IF NOT EXISTS plans(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            semester TEXT NOT NULL,
            class_id TEXT,
            schedule TEXT,
            classroom TEXT,
            capacity INTEGER NOT NULL,
            enrolled INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        );
        CREATE INDEX IF NOT EXISTS idx_plans_course ON plans(course_id);
        CREATE INDEX IF NOT EXISTS idx_plans_teacher ON plans(teacher_id);
        CREATE INDEX IF NOT EXISTS idx_plans_semester ON plans(semester);
        CREATE INDEX IF NOT EXISTS idx_plans_class ON plans(class_id);

        CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            plan_id TEXT NOT NULL,
            enroll_date TEXT NOT NULL,
            status TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES users(id),
            FOREIGN KEY(plan_id) REFERENCES plans(id),
            UNIQUE(student_id, plan_id)
        );
        CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id);
        CREATE INDEX IF NOT EXISTS idx_enrollments_plan ON enrollments(plan_id);

        CREATE TABLE IF NOT EXISTS scores(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            plan_id TEXT NOT NULL,
            attendance REAL,
            midterm REAL,
            final_exam REAL,
            homework REAL,
            total INTEGER,
            level TEXT,
            gpa REAL,
            semester TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES users(id),
            FOREIGN KEY(plan_id) REFERENCES plans(id),
            UNIQUE(student_id, plan_id)
        );
        CREATE INDEX IF NOT EXISTS idx_scores_student ON scores(student_id);
        CREATE INDEX IF NOT EXISTS idx_scores_plan ON scores(plan_id);

        CREATE TABLE IF NOT EXISTS score_details(
            id TEXT PRIMARY KEY,
            score_id TEXT NOT NULL,
            item_name TEXT NOT NULL,
            weight REAL NOT NULL,
            score REAL,
            status TEXT NOT NULL,
            submit_time TEXT,
            FOREIGN KEY(score_id) REFERENCES scores(id)
        );
        CREATE INDEX IF NOT EXISTS idx_score_details_score ON score_details(score_id);

        CREATE TABLE IF NOT EXISTS materials(
            id TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL,
            name TEXT NOT NULL,
            file_type TEXT NOT NULL,
            url TEXT,
            size_bytes INTEGER NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            uploaded_at TEXT NOT NULL,
            FOREIGN KEY(plan_id) REFERENCES plans(id)
        );
        CREATE INDEX IF NOT EXISTS idx_materials_plan ON materials(plan_id);
        CREATE INDEX IF NOT EXISTS idx_materials_type ON materials(file_type);

        CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            deadline TEXT,
            total_score REAL NOT NULL,
            weight REAL NOT NULL DEFAULT 0,
            start_time TEXT,
            end_time TEXT,
            duration_minutes INTEGER,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(plan_id) REFERENCES plans(id)
        );
        CREATE INDEX IF NOT EXISTS idx_assignments_plan ON assignments(plan_id);
        CREATE INDEX IF NOT EXISTS idx_assignments_kind ON assignments(kind);
        CREATE INDEX IF NOT EXISTS idx_assignments_deadline ON assignments(deadline);

        CREATE TABLE IF NOT EXISTS submissions(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            content TEXT,
            file_name TEXT,
            submit_time TEXT NOT NULL,
            status TEXT NOT NULL,
            score REAL,
            feedback TEXT,
            graded_at TEXT,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(student_id) REFERENCES users(id),
            UNIQUE(student_id, assignment_id)
        );
        CREATE INDEX IF NOT EXISTS idx_submissions_assignment ON submissions(assignment_id);
        CREATE INDEX IF NOT EXISTS idx_submissions_student ON submissions(student_id);

        CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        );
        ",
    },
    Migration {
        // Course preview flag, score publication and material download history.
        version: 2,
        sql: "
        ALTER TABLE courses ADD COLUMN allow_preview INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE scores ADD COLUMN published INTEGER NOT NULL DEFAULT 0;

        CREATE TABLE IF NOT EXISTS download_history(
            id TEXT PRIMARY KEY,
            material_id TEXT NOT NULL,
            user_id TEXT,
            downloaded_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_download_history_material ON download_history(material_id);
        CREATE INDEX IF NOT EXISTS idx_download_history_user ON download_history(user_id);
        ",
    },
];

/// Stores in dependency order (parents before children).
pub const STORE_ORDER: &[&str] = &[
    "users",
    "classes",
    "courses",
    "plans",
    "enrollments",
    "scores",
    "score_details",
    "materials",
    "assignments",
    "submissions",
    "download_history",
];

pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    let started_at = Instant::now();
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    info!(
        "event=db_open module=db status=start path={}",
        db_path.display()
    );

    let mut conn = Connection::open(&db_path)?;
    if let Err(e) = bootstrap(&mut conn) {
        error!(
            "event=db_open module=db status=error duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            e
        );
        return Err(e.into());
    }

    info!(
        "event=db_open module=db status=ok duration_ms={} schema_version={}",
        started_at.elapsed().as_millis(),
        latest_version()
    );
    Ok(conn)
}

#[cfg(test)]
pub fn open_db_in_memory() -> StoreResult<Connection> {
    let mut conn = Connection::open_in_memory()?;
    bootstrap(&mut conn)?;
    Ok(conn)
}

fn bootstrap(conn: &mut Connection) -> StoreResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    apply_migrations(conn)
}

pub fn apply_migrations(conn: &mut Connection) -> StoreResult<()> {
    let current = schema_version(conn)?;
    let latest = latest_version();

    if current > latest {
        return Err(StoreError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for m in MIGRATIONS {
        if m.version <= current {
            continue;
        }
        info!(
            "event=db_migrate module=db status=apply version={}",
            m.version
        );
        tx.execute_batch(m.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", m.version))?;
    }
    tx.commit()?;
    Ok(())
}

pub fn schema_version(conn: &Connection) -> StoreResult<u32> {
    let v = conn.query_row("PRAGMA user_version;", [], |r| r.get::<_, u32>(0))?;
    Ok(v)
}

/// Drops every store and re-applies the migrations from scratch.
pub fn reset(conn: &mut Connection) -> StoreResult<()> {
    {
        let tx = conn.transaction()?;
        for table in STORE_ORDER.iter().rev() {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
        }
        tx.execute_batch("DROP TABLE IF EXISTS settings; PRAGMA user_version = 0;")?;
        tx.commit()?;
    }
    apply_migrations(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Every setting as `(key, value)`, ordered by key.
pub fn settings_all(conn: &Connection) -> anyhow::Result<Vec<(String, serde_json::Value)>> {
    let mut stmt = conn.prepare("SELECT key, value_json FROM settings ORDER BY key")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(rows.len());
    for (key, raw) in rows {
        out.push((key, serde_json::from_str(&raw)?));
    }
    Ok(out)
}

/// Inserts a setting only when the key is free. Returns whether it was written.
pub fn settings_insert_new(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?) ON CONFLICT(key) DO NOTHING",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClassRoom;
    use crate::store;
    use serde_json::json;

    #[test]
    fn fresh_database_is_at_latest_version() {
        let conn = open_db_in_memory().expect("open");
        assert_eq!(schema_version(&conn).expect("version"), latest_version());
        assert_eq!(latest_version(), 2);
    }

    #[test]
    fn newer_schema_is_refused() {
        let mut conn = open_db_in_memory().expect("open");
        conn.execute_batch("PRAGMA user_version = 99;").expect("bump");
        match apply_migrations(&mut conn) {
            Err(StoreError::UnsupportedSchemaVersion { db_version, .. }) => {
                assert_eq!(db_version, 99)
            }
            other => panic!("expected unsupported version, got {other:?}"),
        }
    }

    #[test]
    fn reset_empties_stores_and_settings() {
        let mut conn = open_db_in_memory().expect("open");
        store::add(
            &conn,
            &ClassRoom {
                id: "cls_2024_01".to_string(),
                name: "Class 1".to_string(),
                grade: "2024".to_string(),
                department: None,
                created_at: "2024-09-01T00:00:00".to_string(),
            },
        )
        .expect("add");
        settings_set_json(&conn, "setup.dashboard", &json!({ "upcomingExamDays": 3 }))
            .expect("set");

        reset(&mut conn).expect("reset");
        assert_eq!(store::count_all::<ClassRoom>(&conn).expect("count"), 0);
        assert_eq!(settings_get_json(&conn, "setup.dashboard").expect("get"), None);
        assert_eq!(schema_version(&conn).expect("version"), 2);
    }

    #[test]
    fn insert_new_keeps_existing_setting() {
        let conn = open_db_in_memory().expect("open");
        settings_set_json(&conn, "grading.weights.p1", &json!({ "final": 100 })).expect("set");
        let dup = settings_insert_new(&conn, "grading.weights.p1", &json!({ "final": 0 }));
        assert!(!dup.expect("dup"));
        let fresh = settings_insert_new(&conn, "setup.materials", &json!({ "quotaMb": 5 }));
        assert!(fresh.expect("new"));
        let all = settings_all(&conn).expect("all");
        assert_eq!(
            all,
            vec![
                ("grading.weights.p1".to_string(), json!({ "final": 100 })),
                ("setup.materials".to_string(), json!({ "quotaMb": 5 })),
            ]
        );
    }

    #[test]
    fn settings_overwrite_in_place() {
        let conn = open_db_in_memory().expect("open");
        settings_set_json(&conn, "k", &json!(1)).expect("set");
        settings_set_json(&conn, "k", &json!({ "a": true })).expect("overwrite");
        assert_eq!(settings_get_json(&conn, "k").expect("get"), Some(json!({ "a": true })));
    }
}
