use crate::dates;
use crate::ids;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{as_of, optional_str, require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::models::{
    Assignment, Enrollment, Plan, Submission, User, ENROLL_ACTIVE, ENROLL_COMPLETED, ROLE_STUDENT,
};
use crate::store;
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashSet;

fn require_student(conn: &Connection, student_id: &str) -> Result<User, HandlerErr> {
    match store::get_by_id::<User>(conn, student_id)? {
        Some(u) if u.role == ROLE_STUDENT => Ok(u),
        Some(_) => Err(HandlerErr::bad_params("studentId must name a student")),
        None => Err(HandlerErr::not_found("student")),
    }
}

fn handle_enroll(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = required_str(req, "studentId")?;
    let plan_id = required_str(req, "planId")?;
    let today = as_of(req)?;

    require_student(conn, &student_id)?;
    let plan =
        store::get_by_id::<Plan>(conn, &plan_id)?.ok_or_else(|| HandlerErr::not_found("plan"))?;

    let id = ids::enrollment(&student_id, &plan_id);
    if store::get_by_id::<Enrollment>(conn, &id)?.is_some()
        || store::get_by_index::<Enrollment>(conn, "student_id", &student_id)?
            .iter()
            .any(|e| e.plan_id == plan_id)
    {
        return Err(HandlerErr::new("already_enrolled", "student is already enrolled in this plan"));
    }
    if plan.enrolled >= plan.capacity && !setup::allow_over_capacity(conn) {
        return Err(HandlerErr::new("plan_full", "plan has reached its capacity")
            .with_details(json!({ "capacity": plan.capacity, "enrolled": plan.enrolled })));
    }

    let enrollment = Enrollment {
        id,
        student_id,
        plan_id,
        enroll_date: dates::format_date(&today),
        status: ENROLL_ACTIVE.to_string(),
    };
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    store::add(&tx, &enrollment)?;
    tx.execute(
        "UPDATE plans SET enrolled = enrolled + 1 WHERE id = ?",
        [&enrollment.plan_id],
    )?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    info!(
        "event=enroll module=enrollments status=ok id={}",
        enrollment.id
    );
    Ok(json!({ "enrollment": enrollment, "enrolled": plan.enrolled + 1 }))
}

fn handle_drop(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let enrollment_id = required_str(req, "enrollmentId")?;
    let enrollment = store::get_by_id::<Enrollment>(conn, &enrollment_id)?
        .ok_or_else(|| HandlerErr::not_found("enrollment"))?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    store::delete::<Enrollment>(&tx, &enrollment_id)?;
    tx.execute(
        "UPDATE plans SET enrolled = MAX(enrolled - 1, 0) WHERE id = ?",
        [&enrollment.plan_id],
    )?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn handle_complete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let enrollment_id = required_str(req, "enrollmentId")?;
    let mut enrollment = store::get_by_id::<Enrollment>(conn, &enrollment_id)?
        .ok_or_else(|| HandlerErr::not_found("enrollment"))?;
    enrollment.status = ENROLL_COMPLETED.to_string();
    store::put(conn, &enrollment)?;
    Ok(json!({ "enrollment": enrollment }))
}

/// Percent of the plan's assignments this student has submitted.
fn plan_progress(assignments: &[Assignment], submitted: &HashSet<String>) -> i64 {
    if assignments.is_empty() {
        return 0;
    }
    let done = assignments
        .iter()
        .filter(|a| submitted.contains(&a.id))
        .count();
    crate::calc::round_half_up(done as f64 * 100.0 / assignments.len() as f64)
}

fn handle_list_by_student(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = required_str(req, "studentId")?;
    let filter = optional_str(req, "filter")?.unwrap_or_else(|| "all".to_string());
    let wanted: Option<&str> = match filter.as_str() {
        "all" => None,
        "ongoing" => Some(ENROLL_ACTIVE),
        "completed" => Some(ENROLL_COMPLETED),
        _ => {
            return Err(HandlerErr::bad_params(
                "filter must be all, ongoing or completed",
            ))
        }
    };
    require_student(conn, &student_id)?;

    let submitted: HashSet<String> =
        store::get_by_index::<Submission>(conn, "student_id", &student_id)?
            .into_iter()
            .map(|s| s.assignment_id)
            .collect();

    let mut stmt = conn.prepare(
        "SELECT e.id, e.plan_id, e.enroll_date, e.status,
                c.id, c.code, c.name, c.credits, c.category,
                u.name, p.semester, p.schedule, p.classroom
         FROM enrollments e
         JOIN plans p ON p.id = e.plan_id
         JOIN courses c ON c.id = p.course_id
         LEFT JOIN users u ON u.id = p.teacher_id
         WHERE e.student_id = ?
         ORDER BY e.enroll_date DESC, e.id",
    )?;
    let rows = stmt
        .query_map([&student_id], |r| {
            Ok((
                r.get::<_, String>(1)?,
                r.get::<_, String>(3)?,
                json!({
                    "enrollmentId": r.get::<_, String>(0)?,
                    "planId": r.get::<_, String>(1)?,
                    "enrollDate": r.get::<_, String>(2)?,
                    "status": r.get::<_, String>(3)?,
                    "courseId": r.get::<_, String>(4)?,
                    "courseCode": r.get::<_, String>(5)?,
                    "courseName": r.get::<_, String>(6)?,
                    "credits": r.get::<_, f64>(7)?,
                    "category": r.get::<_, String>(8)?,
                    "teacherName": r.get::<_, Option<String>>(9)?,
                    "semester": r.get::<_, String>(10)?,
                    "schedule": r.get::<_, Option<String>>(11)?,
                    "classroom": r.get::<_, Option<String>>(12)?,
                }),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut courses = Vec::new();
    for (plan_id, status, mut row) in rows {
        if wanted.is_some_and(|w| w != status) {
            continue;
        }
        let assignments = store::get_by_index::<Assignment>(conn, "plan_id", &plan_id)?;
        row["progress"] = json!(plan_progress(&assignments, &submitted));
        courses.push(row);
    }
    Ok(json!({ "courses": courses }))
}

fn handle_student_stats(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = required_str(req, "studentId")?;
    require_student(conn, &student_id)?;

    let enrollments = store::get_by_index::<Enrollment>(conn, "student_id", &student_id)?;
    let mut assignment_count = 0usize;
    for e in &enrollments {
        assignment_count +=
            store::count_by_index::<Assignment>(conn, "plan_id", &e.plan_id)? as usize;
    }
    let completed = store::count_by_index::<Submission>(conn, "student_id", &student_id)? as usize;
    Ok(json!({
        "totalCourses": enrollments.len(),
        "pendingTasks": assignment_count.saturating_sub(completed),
        "completedTasks": completed
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "enrollments.enroll" => handle_enroll(state, req),
        "enrollments.drop" => handle_drop(state, req),
        "enrollments.complete" => handle_complete(state, req),
        "enrollments.listByStudent" => handle_list_by_student(state, req),
        "student.stats" => handle_student_stats(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
