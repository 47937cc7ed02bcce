use crate::ids;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::grades::weights_key;
use crate::ipc::helpers::{
    contains_ci, i64_field, optional_str, require_db, required_object, required_str, str_field,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{
    Assignment, ClassRoom, Course, DownloadRecord, Enrollment, Material, Plan, Score, ScoreDetail,
    Submission, User, ROLE_TEACHER,
};
use crate::store::{self, StoreResult};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Removes a plan and everything hanging off it. Callers own the transaction.
pub fn delete_plan_cascade(conn: &Connection, plan_id: &str) -> StoreResult<usize> {
    let mut removed = 0;
    for a in store::get_by_index::<Assignment>(conn, "plan_id", plan_id)? {
        removed += store::delete_by_index::<Submission>(conn, "assignment_id", &a.id)?;
    }
    removed += store::delete_by_index::<Assignment>(conn, "plan_id", plan_id)?;
    for m in store::get_by_index::<Material>(conn, "plan_id", plan_id)? {
        removed += store::delete_by_index::<DownloadRecord>(conn, "material_id", &m.id)?;
    }
    removed += store::delete_by_index::<Material>(conn, "plan_id", plan_id)?;
    for s in store::get_by_index::<Score>(conn, "plan_id", plan_id)? {
        removed += store::delete_by_index::<ScoreDetail>(conn, "score_id", &s.id)?;
    }
    removed += store::delete_by_index::<Score>(conn, "plan_id", plan_id)?;
    removed += store::delete_by_index::<Enrollment>(conn, "plan_id", plan_id)?;
    if store::delete::<Plan>(conn, plan_id)? {
        removed += 1;
    }
    conn.execute("DELETE FROM settings WHERE key = ?", [weights_key(plan_id)])?;
    Ok(removed)
}

fn check_teacher(conn: &Connection, teacher_id: &str) -> Result<(), HandlerErr> {
    match store::get_by_id::<User>(conn, teacher_id)? {
        Some(u) if u.role == ROLE_TEACHER => Ok(()),
        Some(_) => Err(HandlerErr::bad_params("teacherId must name a teacher")),
        None => Err(HandlerErr::not_found("teacher")),
    }
}

fn check_class(conn: &Connection, class_id: &Option<String>) -> Result<(), HandlerErr> {
    if let Some(id) = class_id {
        if store::get_by_id::<ClassRoom>(conn, id)?.is_none() {
            return Err(HandlerErr::not_found("class"));
        }
    }
    Ok(())
}

fn plan_row(
    plan: &Plan,
    course: Option<&Course>,
    teacher: Option<&User>,
    enrolled_ids: Option<&HashSet<String>>,
) -> Value {
    let mut row = json!({
        "id": plan.id,
        "courseId": plan.course_id,
        "courseName": course.map(|c| c.name.as_str()),
        "courseCode": course.map(|c| c.code.as_str()),
        "credits": course.map(|c| c.credits),
        "category": course.map(|c| c.category.as_str()),
        "teacherId": plan.teacher_id,
        "teacherName": teacher.map(|t| t.name.as_str()),
        "semester": plan.semester,
        "classId": plan.class_id,
        "schedule": plan.schedule,
        "classroom": plan.classroom,
        "capacity": plan.capacity,
        "enrolled": plan.enrolled,
        "isFull": plan.enrolled >= plan.capacity,
        "status": plan.status,
    });
    if let Some(ids) = enrolled_ids {
        row["isEnrolled"] = Value::Bool(ids.contains(&plan.id));
    }
    row
}

fn handle_plans_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = required_str(req, "courseId")?;
    let teacher_id = required_str(req, "teacherId")?;
    let semester = required_str(req, "semester")?;
    let class_id = optional_str(req, "classId")?;
    let capacity = i64_field(&req.params, "capacity")?
        .ok_or_else(|| HandlerErr::bad_params("missing capacity"))?;
    if capacity <= 0 {
        return Err(HandlerErr::bad_params("capacity must be positive"));
    }

    let course = store::get_by_id::<Course>(conn, &course_id)?
        .ok_or_else(|| HandlerErr::not_found("course"))?;
    check_teacher(conn, &teacher_id)?;
    check_class(conn, &class_id)?;

    let plan = Plan {
        id: ids::plan(&semester, &course.code),
        course_id,
        teacher_id,
        semester,
        class_id,
        schedule: optional_str(req, "schedule")?,
        classroom: optional_str(req, "classroom")?,
        capacity,
        enrolled: 0,
        status: "active".to_string(),
    };
    store::add(conn, &plan)?;
    info!(
        "event=plan_create module=plans status=ok id={} capacity={}",
        plan.id, plan.capacity
    );
    Ok(json!({ "planId": plan.id, "plan": plan }))
}

fn handle_plans_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    let patch_map = required_object(req, "patch")?;
    let patch = Value::Object(patch_map.clone());
    let mut plan =
        store::get_by_id::<Plan>(conn, &plan_id)?.ok_or_else(|| HandlerErr::not_found("plan"))?;

    for key in patch_map.keys() {
        match key.as_str() {
            "teacherId" => {
                let t = str_field(&patch, key)?
                    .ok_or_else(|| HandlerErr::bad_params("teacherId must not be empty"))?;
                check_teacher(conn, &t)?;
                plan.teacher_id = t;
            }
            "classId" => {
                plan.class_id = str_field(&patch, key)?;
                check_class(conn, &plan.class_id)?;
            }
            "schedule" => plan.schedule = str_field(&patch, key)?,
            "classroom" => plan.classroom = str_field(&patch, key)?,
            "status" => {
                plan.status = str_field(&patch, key)?
                    .ok_or_else(|| HandlerErr::bad_params("status must not be empty"))?
            }
            "capacity" => {
                let c = i64_field(&patch, key)?
                    .ok_or_else(|| HandlerErr::bad_params("capacity must not be null"))?;
                if c <= 0 {
                    return Err(HandlerErr::bad_params("capacity must be positive"));
                }
                plan.capacity = c;
            }
            other => return Err(HandlerErr::bad_params(format!("unknown plan field: {other}"))),
        }
    }
    store::put(conn, &plan)?;
    Ok(json!({ "plan": plan }))
}

fn handle_plans_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    let plan =
        store::get_by_id::<Plan>(conn, &plan_id)?.ok_or_else(|| HandlerErr::not_found("plan"))?;
    let course = store::get_by_id::<Course>(conn, &plan.course_id)?;
    let teacher = store::get_by_id::<User>(conn, &plan.teacher_id)?;
    Ok(json!({ "plan": plan_row(&plan, course.as_ref(), teacher.as_ref(), None) }))
}

fn handle_plans_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = optional_str(req, "studentId")?;
    let category = optional_str(req, "category")?.filter(|c| c != "all");
    let search = optional_str(req, "search")?.map(|s| s.to_lowercase());

    let plans = match optional_str(req, "semester")? {
        Some(s) => store::get_by_index::<Plan>(conn, "semester", &s)?,
        None => store::get_all::<Plan>(conn)?,
    };
    let courses: HashMap<String, Course> = store::get_all::<Course>(conn)?
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();
    let teachers: HashMap<String, User> = store::get_by_index::<User>(conn, "role", ROLE_TEACHER)?
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect();
    let enrolled_ids: Option<HashSet<String>> = match &student_id {
        Some(sid) => Some(
            store::get_by_index::<Enrollment>(conn, "student_id", sid)?
                .into_iter()
                .map(|e| e.plan_id)
                .collect(),
        ),
        None => None,
    };

    let mut rows = Vec::new();
    for plan in &plans {
        let course = courses.get(&plan.course_id);
        let teacher = teachers.get(&plan.teacher_id);
        if let Some(cat) = &category {
            if course.map(|c| &c.category) != Some(cat) {
                continue;
            }
        }
        if let Some(term) = &search {
            let hit = course
                .is_some_and(|c| contains_ci(&c.name, term) || contains_ci(&c.code, term))
                || teacher.is_some_and(|t| contains_ci(&t.name, term));
            if !hit {
                continue;
            }
        }
        rows.push(plan_row(plan, course, teacher, enrolled_ids.as_ref()));
    }
    Ok(json!({ "plans": rows }))
}

fn handle_plans_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    if store::get_by_id::<Plan>(conn, &plan_id)?.is_none() {
        return Err(HandlerErr::not_found("plan"));
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let removed = delete_plan_cascade(&tx, &plan_id)
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    info!(
        "event=plan_delete module=plans status=ok id={} removed={}",
        plan_id, removed
    );
    Ok(json!({ "ok": true, "removed": removed }))
}

fn handle_plans_students(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    if store::get_by_id::<Plan>(conn, &plan_id)?.is_none() {
        return Err(HandlerErr::not_found("plan"));
    }
    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.student_no, u.class_id, e.id, e.enroll_date, e.status
         FROM enrollments e
         JOIN users u ON u.id = e.student_id
         WHERE e.plan_id = ?
         ORDER BY u.student_no, u.id",
    )?;
    let students = stmt
        .query_map([&plan_id], |r| {
            Ok(json!({
                "studentId": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "studentNo": r.get::<_, Option<String>>(2)?,
                "classId": r.get::<_, Option<String>>(3)?,
                "enrollmentId": r.get::<_, String>(4)?,
                "enrollDate": r.get::<_, String>(5)?,
                "status": r.get::<_, String>(6)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "plans.create" => handle_plans_create(state, req),
        "plans.update" => handle_plans_update(state, req),
        "plans.get" => handle_plans_get(state, req),
        "plans.list" => handle_plans_list(state, req),
        "plans.delete" => handle_plans_delete(state, req),
        "plans.students" => handle_plans_students(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
