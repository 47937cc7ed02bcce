use crate::dates;
use crate::ids;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{optional_str, require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::models::ClassRoom;
use crate::store;
use rusqlite::Connection;
use serde_json::{json, Value};

fn handle_classes_list(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "classes": [] }));
    };

    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.grade,
           c.department,
           (SELECT COUNT(*) FROM users u WHERE u.class_id = c.id AND u.role = 'student') AS student_count,
           (SELECT COUNT(*) FROM plans p WHERE p.class_id = c.id) AS plan_count
         FROM classes c
         ORDER BY c.grade, c.name",
    )?;
    let classes = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let grade: String = row.get(2)?;
            let department: Option<String> = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let plan_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "grade": grade,
                "department": department,
                "studentCount": student_count,
                "planCount": plan_count
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "classes": classes }))
}

fn next_class_id(conn: &Connection, grade: &str) -> Result<String, HandlerErr> {
    let mut n = store::count_by_index::<ClassRoom>(conn, "grade", grade)? as usize;
    loop {
        let id = ids::class_room(grade, n);
        if store::get_by_id::<ClassRoom>(conn, &id)?.is_none() {
            return Ok(id);
        }
        n += 1;
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = required_str(req, "name")?;
    let grade = required_str(req, "grade")?;
    let department = optional_str(req, "department")?;

    let class = ClassRoom {
        id: next_class_id(conn, &grade)?,
        name,
        grade,
        department,
        created_at: dates::format_datetime(&dates::now()),
    };
    store::add(conn, &class)?;
    Ok(json!({ "classId": class.id, "class": class }))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = required_str(req, "classId")?;
    if store::get_by_id::<ClassRoom>(conn, &class_id)?.is_none() {
        return Err(HandlerErr::not_found("class"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    // Members and offerings outlive the class; they just lose the link.
    let students = tx.execute("UPDATE users SET class_id = NULL WHERE class_id = ?", [&class_id])?;
    tx.execute("UPDATE plans SET class_id = NULL WHERE class_id = ?", [&class_id])?;
    store::delete::<ClassRoom>(&tx, &class_id)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    Ok(json!({ "ok": true, "unlinkedUsers": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "classes.list" => handle_classes_list(state, req),
        "classes.create" => handle_classes_create(state, req),
        "classes.delete" => handle_classes_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
