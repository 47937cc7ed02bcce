use crate::calc::round_to;
use crate::dates;
use crate::ids;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    as_of, optional_f64, optional_i64, optional_str, require_db, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{Assignment, Enrollment, Plan, Score, Submission, KIND_EXAM, KIND_HOMEWORK};
use crate::store;
use chrono::{Duration, NaiveDateTime};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};

fn parse_kind(raw: &str) -> Result<&'static str, HandlerErr> {
    match raw {
        "homework" => Ok(KIND_HOMEWORK),
        "exam" => Ok(KIND_EXAM),
        _ => Err(HandlerErr::bad_params("kind must be homework or exam")),
    }
}

fn parse_time(req: &Request, key: &str) -> Result<Option<(String, NaiveDateTime)>, HandlerErr> {
    match optional_str(req, key)? {
        Some(raw) => {
            let dt = if key == "deadline" {
                dates::parse_deadline(&raw)
            } else {
                dates::parse_datetime(&raw)
            };
            let dt = dt.ok_or_else(|| {
                HandlerErr::bad_params(format!(
                    "{key} must be YYYY-MM-DD or YYYY-MM-DDTHH:MM[:SS]"
                ))
            })?;
            Ok(Some((raw, dt)))
        }
        None => Ok(None),
    }
}

/// When a submission stops being on time: the deadline for homework, the end for exams.
pub fn due_at(a: &Assignment) -> Option<NaiveDateTime> {
    match a.kind.as_str() {
        KIND_EXAM => a.end_time.as_deref().and_then(dates::parse_datetime),
        _ => a.deadline.as_deref().and_then(dates::parse_deadline),
    }
}

fn next_assignment_id(conn: &Connection, plan_id: &str) -> Result<String, HandlerErr> {
    let mut n = store::count_by_index::<Assignment>(conn, "plan_id", plan_id)? as usize;
    loop {
        let id = ids::assignment(plan_id, n);
        if store::get_by_id::<Assignment>(conn, &id)?.is_none() {
            return Ok(id);
        }
        n += 1;
    }
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    let kind = parse_kind(&required_str(req, "kind")?)?;
    let title = required_str(req, "title")?;
    if store::get_by_id::<Plan>(conn, &plan_id)?.is_none() {
        return Err(HandlerErr::not_found("plan"));
    }

    let total_score = optional_f64(req, "totalScore")?.unwrap_or(100.0);
    if total_score <= 0.0 {
        return Err(HandlerErr::bad_params("totalScore must be positive"));
    }
    let weight = optional_f64(req, "weight")?.unwrap_or(0.0);
    if !(0.0..=100.0).contains(&weight) {
        return Err(HandlerErr::bad_params("weight must be in 0..=100"));
    }

    let deadline = parse_time(req, "deadline")?;
    let start = parse_time(req, "startTime")?;
    let end = parse_time(req, "endTime")?;
    let duration = optional_i64(req, "durationMinutes")?;

    if kind == KIND_HOMEWORK && deadline.is_none() {
        return Err(HandlerErr::bad_params("homework requires a deadline"));
    }
    if kind == KIND_EXAM {
        let (Some((_, s)), Some((_, e))) = (&start, &end) else {
            return Err(HandlerErr::bad_params("exam requires startTime and endTime"));
        };
        if e <= s {
            return Err(HandlerErr::bad_params("endTime must be after startTime"));
        }
        if !duration.is_some_and(|d| d > 0) {
            return Err(HandlerErr::bad_params("exam requires a positive durationMinutes"));
        }
    }

    let assignment = Assignment {
        id: next_assignment_id(conn, &plan_id)?,
        plan_id,
        kind: kind.to_string(),
        title,
        description: optional_str(req, "description")?.unwrap_or_default(),
        deadline: deadline.map(|(raw, _)| raw),
        total_score,
        weight,
        start_time: start.map(|(raw, _)| raw),
        end_time: end.map(|(raw, _)| raw),
        duration_minutes: duration,
        status: "published".to_string(),
        created_at: dates::format_datetime(&dates::now()),
    };
    store::add(conn, &assignment)?;
    info!(
        "event=assignment_create module=assignments status=ok id={} kind={}",
        assignment.id, assignment.kind
    );
    Ok(json!({ "assignment": assignment }))
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut assignments = match optional_str(req, "planId")? {
        Some(p) => store::get_by_index::<Assignment>(conn, "plan_id", &p)?,
        None => store::get_all::<Assignment>(conn)?,
    };
    if let Some(k) = optional_str(req, "kind")? {
        let k = parse_kind(&k)?;
        assignments.retain(|a| a.kind == k);
    }

    let mut rows = Vec::with_capacity(assignments.len());
    for a in assignments {
        let subs = store::get_by_index::<Submission>(conn, "assignment_id", &a.id)?;
        let graded = subs.iter().filter(|s| s.is_graded()).count();
        let mut row = json!(a);
        row["submissionCount"] = json!(subs.len());
        row["gradedCount"] = json!(graded);
        rows.push(row);
    }
    Ok(json!({ "assignments": rows }))
}

fn handle_assignments_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let assignment_id = required_str(req, "assignmentId")?;
    if store::get_by_id::<Assignment>(conn, &assignment_id)?.is_none() {
        return Err(HandlerErr::not_found("assignment"));
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let submissions = store::delete_by_index::<Submission>(&tx, "assignment_id", &assignment_id)?;
    store::delete::<Assignment>(&tx, &assignment_id)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "ok": true, "submissionsRemoved": submissions }))
}

fn rate_text(part: usize, whole: usize) -> String {
    if whole == 0 {
        return "0%".to_string();
    }
    format!("{:.2}%", part as f64 * 100.0 / whole as f64)
}

fn handle_assignments_status(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    if store::get_by_id::<Plan>(conn, &plan_id)?.is_none() {
        return Err(HandlerErr::not_found("plan"));
    }
    let students = store::count_by_index::<Enrollment>(conn, "plan_id", &plan_id)? as usize;

    let mut rows = Vec::new();
    for a in store::get_by_index::<Assignment>(conn, "plan_id", &plan_id)? {
        let subs = store::get_by_index::<Submission>(conn, "assignment_id", &a.id)?;
        rows.push(json!({
            "assignmentId": a.id,
            "title": a.title,
            "kind": a.kind,
            "totalStudents": students,
            "submittedCount": subs.len(),
            "pendingCount": students.saturating_sub(subs.len()),
            "completionRate": rate_text(subs.len(), students),
            "submissions": subs.iter().map(|s| json!({
                "studentId": s.student_id,
                "submitTime": s.submit_time,
                "score": s.score,
                "status": s.status,
            })).collect::<Vec<_>>(),
        }));
    }
    Ok(json!({ "assignments": rows }))
}

fn handle_assignments_for_student(
    state: &mut AppState,
    req: &Request,
) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    let student_id = required_str(req, "studentId")?;
    let now = as_of(req)?;

    let mut rows = Vec::new();
    for a in store::get_by_index::<Assignment>(conn, "plan_id", &plan_id)? {
        let mine = store::get_by_index::<Submission>(conn, "assignment_id", &a.id)?
            .into_iter()
            .find(|s| s.student_id == student_id);
        let label = if mine.is_some() {
            "submitted"
        } else if due_at(&a).is_some_and(|due| due < now) {
            "overdue"
        } else {
            "pending"
        };
        rows.push(json!({
            "assignment": a,
            "submission": mine,
            "state": label,
        }));
    }
    Ok(json!({ "assignments": rows }))
}

fn handle_exams_status(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    if store::get_by_id::<Plan>(conn, &plan_id)?.is_none() {
        return Err(HandlerErr::not_found("plan"));
    }
    let students = store::count_by_index::<Enrollment>(conn, "plan_id", &plan_id)? as usize;
    let taken: Vec<Score> = store::get_by_index::<Score>(conn, "plan_id", &plan_id)?
        .into_iter()
        .filter(|s| s.final_exam.is_some())
        .collect();
    let average = if taken.is_empty() {
        0.0
    } else {
        let sum: f64 = taken.iter().filter_map(|s| s.final_exam).sum();
        round_to(sum / taken.len() as f64, 2)
    };
    Ok(json!({
        "totalStudents": students,
        "examTaken": taken.len(),
        "examPending": students.saturating_sub(taken.len()),
        "averageScore": average,
        "scores": taken.iter().map(|s| json!({
            "studentId": s.student_id,
            "final": s.final_exam,
            "updatedAt": s.updated_at,
        })).collect::<Vec<_>>(),
    }))
}

/// Exams whose start falls in `[now, now + days]`, soonest first.
pub fn upcoming_exams(
    conn: &Connection,
    now: NaiveDateTime,
    days: i64,
    plan_filter: Option<&[String]>,
) -> Result<Vec<(Assignment, NaiveDateTime)>, HandlerErr> {
    let horizon = Duration::try_days(days)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(NaiveDateTime::MAX);
    let mut out: Vec<(Assignment, NaiveDateTime)> =
        store::get_by_index::<Assignment>(conn, "kind", KIND_EXAM)?
            .into_iter()
            .filter(|a| plan_filter.map_or(true, |plans| plans.contains(&a.plan_id)))
            .filter_map(|a| {
                let start = a.start_time.as_deref().and_then(dates::parse_datetime)?;
                (start >= now && start <= horizon).then_some((a, start))
            })
            .collect();
    out.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(out)
}

fn handle_exams_upcoming(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let now = as_of(req)?;
    let days = match optional_i64(req, "days")? {
        Some(d) if (1..=setup::MAX_UPCOMING_EXAM_DAYS).contains(&d) => d,
        Some(_) => {
            return Err(HandlerErr::bad_params(format!(
                "days must be in 1..={}",
                setup::MAX_UPCOMING_EXAM_DAYS
            )))
        }
        None => setup::upcoming_exam_days(conn),
    };
    let exams: Vec<Value> = upcoming_exams(conn, now, days, None)?
        .into_iter()
        .map(|(a, start)| {
            let mut v = json!(a);
            v["daysUntil"] = json!((start.date() - now.date()).num_days());
            v
        })
        .collect();
    Ok(json!({ "days": days, "exams": exams }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "assignments.create" => handle_assignments_create(state, req),
        "assignments.list" => handle_assignments_list(state, req),
        "assignments.delete" => handle_assignments_delete(state, req),
        "assignments.status" => handle_assignments_status(state, req),
        "assignments.forStudent" => handle_assignments_for_student(state, req),
        "exams.status" => handle_exams_status(state, req),
        "exams.upcoming" => handle_exams_upcoming(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
