use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::assignments::upcoming_exams;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{as_of, optional_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::models::{Assignment, Course, Plan, Submission, COURSE_PUBLISHED};
use crate::store;
use serde_json::{json, Value};
use std::collections::HashSet;

fn handle_teacher_dashboard(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let now = as_of(req)?;
    let teacher_id = optional_str(req, "teacherId")?;

    let plans = match &teacher_id {
        Some(t) => store::get_by_index::<Plan>(conn, "teacher_id", t)?,
        None => store::get_all::<Plan>(conn)?,
    };
    let plan_ids: Vec<String> = plans.iter().map(|p| p.id.clone()).collect();
    let course_ids: HashSet<&str> = plans.iter().map(|p| p.course_id.as_str()).collect();

    let published: Vec<Course> = store::get_by_index::<Course>(conn, "status", COURSE_PUBLISHED)?
        .into_iter()
        .filter(|c| teacher_id.is_none() || course_ids.contains(c.id.as_str()))
        .collect();
    let total_students: i64 = plans.iter().map(|p| p.enrolled).sum();

    let mut pending_grading = 0;
    for plan_id in &plan_ids {
        for a in store::get_by_index::<Assignment>(conn, "plan_id", plan_id)? {
            let ungraded = store::get_by_index::<Submission>(conn, "assignment_id", &a.id)?
                .iter()
                .any(|s| !s.is_graded());
            if ungraded {
                pending_grading += 1;
            }
        }
    }

    let days = setup::upcoming_exam_days(conn);
    let filter = teacher_id.as_ref().map(|_| plan_ids.as_slice());
    let upcoming: Vec<Value> = upcoming_exams(conn, now, days, filter)?
        .into_iter()
        .map(|(a, _)| {
            json!({
                "assignmentId": a.id,
                "planId": a.plan_id,
                "title": a.title,
                "startTime": a.start_time,
            })
        })
        .collect();

    Ok(json!({
        "publishedCourses": published.len(),
        "planCount": plans.len(),
        "totalStudents": total_students,
        "pendingGrading": pending_grading,
        "upcomingExams": upcoming.len(),
        "upcomingExamDays": days,
        "upcoming": upcoming,
        "courses": published.iter().map(|c| json!({
            "id": c.id,
            "code": c.code,
            "name": c.name,
            "category": c.category,
        })).collect::<Vec<_>>(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "dashboard.teacher" => handle_teacher_dashboard(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
