use crate::dates;
use crate::ids;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::assignments::due_at;
use crate::ipc::helpers::{
    as_of, optional_bool, optional_f64, optional_str, require_db, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{
    Assignment, Enrollment, Submission, User, SUBMISSION_GRADED, SUBMISSION_SUBMITTED,
};
use crate::store;
use log::info;
use serde_json::{json, Value};
use std::collections::HashMap;

fn handle_submit(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let assignment_id = required_str(req, "assignmentId")?;
    let student_id = required_str(req, "studentId")?;
    let content = optional_str(req, "content")?;
    let file_name = optional_str(req, "fileName")?;
    if content.is_none() && file_name.is_none() {
        return Err(HandlerErr::bad_params("content or fileName is required"));
    }
    let now = as_of(req)?;

    let assignment = store::get_by_id::<Assignment>(conn, &assignment_id)?
        .ok_or_else(|| HandlerErr::not_found("assignment"))?;
    let enrolled = store::get_by_index::<Enrollment>(conn, "student_id", &student_id)?
        .iter()
        .any(|e| e.plan_id == assignment.plan_id);
    if !enrolled {
        return Err(HandlerErr::new(
            "not_enrolled",
            "student is not enrolled in this assignment's plan",
        ));
    }

    let existing = store::get_by_index::<Submission>(conn, "student_id", &student_id)?
        .into_iter()
        .find(|s| s.assignment_id == assignment_id);
    if existing.as_ref().is_some_and(|s| s.is_graded()) {
        return Err(HandlerErr::new(
            "already_graded",
            "submission has been graded and can no longer be replaced",
        ));
    }
    if let Some(due) = due_at(&assignment) {
        if now > due {
            return Err(HandlerErr::new("deadline_passed", "the deadline has passed")
                .with_details(json!({ "deadline": dates::format_datetime(&due) })));
        }
    }

    let replaced = existing.is_some();
    let submission = Submission {
        id: existing
            .map(|s| s.id)
            .unwrap_or_else(|| ids::generic("sub")),
        assignment_id,
        student_id,
        content,
        file_name,
        submit_time: dates::format_datetime(&now),
        status: SUBMISSION_SUBMITTED.to_string(),
        score: None,
        feedback: None,
        graded_at: None,
    };
    store::put(conn, &submission)?;
    info!(
        "event=submit module=submissions status=ok id={} replaced={}",
        submission.id, replaced
    );
    Ok(json!({ "submission": submission, "replaced": replaced }))
}

fn handle_grade(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let submission_id = required_str(req, "submissionId")?;
    let score = optional_f64(req, "score")?.ok_or_else(|| HandlerErr::bad_params("missing score"))?;

    let mut submission = store::get_by_id::<Submission>(conn, &submission_id)?
        .ok_or_else(|| HandlerErr::not_found("submission"))?;
    let assignment = store::get_by_id::<Assignment>(conn, &submission.assignment_id)?
        .ok_or_else(|| HandlerErr::not_found("assignment"))?;
    if !(0.0..=assignment.total_score).contains(&score) {
        return Err(HandlerErr::bad_params(format!(
            "score must be in 0..={}",
            assignment.total_score
        )));
    }

    submission.score = Some(score);
    submission.feedback = optional_str(req, "feedback")?;
    submission.status = SUBMISSION_GRADED.to_string();
    submission.graded_at = Some(dates::format_datetime(&dates::now()));
    store::put(conn, &submission)?;
    Ok(json!({ "submission": submission }))
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut submissions = match optional_str(req, "assignmentId")? {
        Some(a) => store::get_by_index::<Submission>(conn, "assignment_id", &a)?,
        None => store::get_all::<Submission>(conn)?,
    };
    if optional_bool(req, "ungradedOnly")?.unwrap_or(false) {
        submissions.retain(|s| !s.is_graded());
    }
    submissions.sort_by(|a, b| a.submit_time.cmp(&b.submit_time));

    let names: HashMap<String, String> = store::get_all::<User>(conn)?
        .into_iter()
        .map(|u| (u.id, u.name))
        .collect();
    let rows: Vec<Value> = submissions
        .into_iter()
        .map(|s| {
            let mut v = json!(s);
            v["studentName"] = json!(names.get(&s.student_id));
            v
        })
        .collect();
    Ok(json!({ "submissions": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "submissions.submit" => handle_submit(state, req),
        "submissions.grade" => handle_grade(state, req),
        "submissions.list" => handle_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
