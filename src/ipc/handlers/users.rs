use crate::dates;
use crate::ids;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::plans::delete_plan_cascade;
use crate::ipc::helpers::{
    optional_bool, optional_i64, optional_str, require_db, required_object, required_str,
    str_field,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{
    ClassRoom, Enrollment, Plan, Score, ScoreDetail, Submission, User, ROLE_ADMIN, ROLE_STUDENT,
    ROLE_TEACHER,
};
use crate::store;
use chrono::Datelike;
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};

fn parse_role(raw: &str) -> Result<&'static str, HandlerErr> {
    match raw {
        "student" => Ok(ROLE_STUDENT),
        "teacher" => Ok(ROLE_TEACHER),
        "admin" => Ok(ROLE_ADMIN),
        _ => Err(HandlerErr::bad_params("role must be student, teacher or admin")),
    }
}

fn next_user_id(conn: &Connection, role: &str, year: i32) -> Result<String, HandlerErr> {
    let existing = store::get_by_index::<User>(conn, "role", role)?;
    let ids_iter = existing.iter().map(|u| u.id.as_str());
    Ok(match role {
        ROLE_STUDENT => ids::student(year, ids_iter),
        ROLE_TEACHER => ids::teacher(ids_iter),
        _ => ids::sequential("admin", ids_iter),
    })
}

fn check_class(conn: &Connection, class_id: &Option<String>) -> Result<(), HandlerErr> {
    if let Some(id) = class_id {
        if store::get_by_id::<ClassRoom>(conn, id)?.is_none() {
            return Err(HandlerErr::not_found("class"));
        }
    }
    Ok(())
}

fn handle_users_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let role = optional_str(req, "role")?;
    let class_id = optional_str(req, "classId")?;

    let mut users = match (&role, &class_id) {
        (Some(r), _) => store::get_by_index::<User>(conn, "role", parse_role(r)?)?,
        (None, Some(c)) => store::get_by_index::<User>(conn, "class_id", c)?,
        (None, None) => store::get_all::<User>(conn)?,
    };
    if let Some(c) = &class_id {
        users.retain(|u| u.class_id.as_deref() == Some(c.as_str()));
    }
    Ok(json!({ "users": users }))
}

fn handle_users_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let user_id = required_str(req, "userId")?;
    let user = store::get_by_id::<User>(conn, &user_id)?
        .ok_or_else(|| HandlerErr::not_found("user"))?;
    Ok(json!({ "user": user }))
}

fn handle_users_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let role = parse_role(&required_str(req, "role")?)?;
    let username = required_str(req, "username")?;
    let name = required_str(req, "name")?;
    let class_id = optional_str(req, "classId")?;
    check_class(conn, &class_id)?;

    let now = dates::now();
    let year = match optional_i64(req, "year")? {
        Some(y) if (1900..=9999).contains(&y) => y as i32,
        Some(_) => return Err(HandlerErr::bad_params("year must be a four digit year")),
        None => now.year(),
    };

    let id = match optional_str(req, "userId")? {
        Some(id) => id,
        None => next_user_id(conn, role, year)?,
    };
    let user = User {
        id,
        username,
        name,
        role: role.to_string(),
        student_no: optional_str(req, "studentNo")?,
        class_id,
        department: optional_str(req, "department")?,
        title: optional_str(req, "title")?,
        gender: optional_str(req, "gender")?,
        email: optional_str(req, "email")?,
        phone: optional_str(req, "phone")?,
        created_at: dates::format_datetime(&now),
    };
    store::add(conn, &user)?;
    info!(
        "event=user_create module=users status=ok id={} role={}",
        user.id, user.role
    );
    Ok(json!({ "user": user }))
}

fn handle_users_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let user_id = required_str(req, "userId")?;
    let patch_map = required_object(req, "patch")?;
    let patch = Value::Object(patch_map.clone());
    let mut user = store::get_by_id::<User>(conn, &user_id)?
        .ok_or_else(|| HandlerErr::not_found("user"))?;

    for key in patch_map.keys() {
        match key.as_str() {
            "username" => {
                user.username = str_field(&patch, key)?
                    .ok_or_else(|| HandlerErr::bad_params("username must not be empty"))?
            }
            "name" => {
                user.name = str_field(&patch, key)?
                    .ok_or_else(|| HandlerErr::bad_params("name must not be empty"))?
            }
            "studentNo" => user.student_no = str_field(&patch, key)?,
            "classId" => {
                user.class_id = str_field(&patch, key)?;
                check_class(conn, &user.class_id)?;
            }
            "department" => user.department = str_field(&patch, key)?,
            "title" => user.title = str_field(&patch, key)?,
            "gender" => user.gender = str_field(&patch, key)?,
            "email" => user.email = str_field(&patch, key)?,
            "phone" => user.phone = str_field(&patch, key)?,
            other => return Err(HandlerErr::bad_params(format!("unknown user field: {other}"))),
        }
    }
    store::put(conn, &user)?;
    Ok(json!({ "user": user }))
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let user_id = required_str(req, "userId")?;
    let force = optional_bool(req, "force")?.unwrap_or(false);
    if store::get_by_id::<User>(conn, &user_id)?.is_none() {
        return Err(HandlerErr::not_found("user"));
    }

    let plans = store::get_by_index::<Plan>(conn, "teacher_id", &user_id)?;
    let enrollments = store::get_by_index::<Enrollment>(conn, "student_id", &user_id)?;
    if !force && (!plans.is_empty() || !enrollments.is_empty()) {
        return Err(HandlerErr::new("in_use", "user is referenced by plans or enrollments")
            .with_details(json!({ "plans": plans.len(), "enrollments": enrollments.len() })));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for plan in &plans {
        delete_plan_cascade(&tx, &plan.id)?;
    }
    for e in &enrollments {
        tx.execute(
            "UPDATE plans SET enrolled = MAX(enrolled - 1, 0) WHERE id = ?",
            [&e.plan_id],
        )?;
    }
    store::delete_by_index::<Enrollment>(&tx, "student_id", &user_id)?;
    for score in store::get_by_index::<Score>(&tx, "student_id", &user_id)? {
        store::delete_by_index::<ScoreDetail>(&tx, "score_id", &score.id)?;
    }
    store::delete_by_index::<Score>(&tx, "student_id", &user_id)?;
    store::delete_by_index::<Submission>(&tx, "student_id", &user_id)?;
    tx.execute("DELETE FROM download_history WHERE user_id = ?", [&user_id])?;
    store::delete::<User>(&tx, &user_id)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    info!(
        "event=user_delete module=users status=ok id={} plans={} enrollments={}",
        user_id,
        plans.len(),
        enrollments.len()
    );
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "users.list" => handle_users_list(state, req),
        "users.get" => handle_users_get(state, req),
        "users.create" => handle_users_create(state, req),
        "users.update" => handle_users_update(state, req),
        "users.delete" => handle_users_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
