use crate::dates;
use crate::ids;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    bool_field, contains_ci, f64_field, optional_str, require_db, required_object, required_str,
    str_field,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{Course, Plan, COURSE_ARCHIVED, COURSE_DRAFT, COURSE_PUBLISHED};
use crate::store;
use log::info;
use serde_json::{json, Value};

const MAX_DESCRIPTION_CHARS: usize = 500;

fn parse_status(raw: &str) -> Result<&'static str, HandlerErr> {
    match raw {
        "draft" => Ok(COURSE_DRAFT),
        "published" => Ok(COURSE_PUBLISHED),
        "archived" => Ok(COURSE_ARCHIVED),
        _ => Err(HandlerErr::bad_params(
            "status must be draft, published or archived",
        )),
    }
}

fn parse_category(raw: &str) -> Result<&'static str, HandlerErr> {
    match raw {
        "required" => Ok("required"),
        "elective" => Ok("elective"),
        "general" => Ok("general"),
        _ => Err(HandlerErr::bad_params(
            "category must be required, elective or general",
        )),
    }
}

/// Applies `input` over `course`, field by field. Absent fields keep their value.
fn merge_course(course: &mut Course, input: &Value) -> Result<(), HandlerErr> {
    if let Some(v) = str_field(input, "code")? {
        course.code = v;
    }
    if let Some(v) = str_field(input, "name")? {
        course.name = v;
    }
    if let Some(v) = str_field(input, "description")? {
        course.description = v;
    }
    if let Some(v) = f64_field(input, "credits")? {
        course.credits = v;
    }
    if input.get("department").is_some() {
        course.department = str_field(input, "department")?;
    }
    if let Some(v) = str_field(input, "category")? {
        course.category = parse_category(&v)?.to_string();
    }
    if let Some(v) = str_field(input, "status")? {
        course.status = parse_status(&v)?.to_string();
    }
    if let Some(v) = bool_field(input, "allowPreview")? {
        course.allow_preview = v;
    }
    Ok(())
}

fn validate_course(course: &Course) -> Result<(), HandlerErr> {
    let mut missing = Vec::new();
    if course.name.is_empty() {
        missing.push("name");
    }
    if course.code.is_empty() {
        missing.push("code");
    }
    if course.description.is_empty() {
        missing.push("description");
    }
    if !missing.is_empty() {
        return Err(HandlerErr::bad_params("name, code and description are required")
            .with_details(json!({ "missing": missing })));
    }
    if course.description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(HandlerErr::bad_params(format!(
            "description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    if course.credits < 0.0 {
        return Err(HandlerErr::bad_params("credits must not be negative"));
    }
    Ok(())
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut courses = match optional_str(req, "status")? {
        Some(s) if s != "all" => store::get_by_index::<Course>(conn, "status", parse_status(&s)?)?,
        _ => store::get_all::<Course>(conn)?,
    };
    if let Some(term) = optional_str(req, "search")? {
        let term = term.to_lowercase();
        courses.retain(|c| {
            contains_ci(&c.name, &term)
                || contains_ci(&c.code, &term)
                || c.department.as_deref().is_some_and(|d| contains_ci(d, &term))
        });
    }
    courses.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.code.cmp(&b.code)));
    Ok(json!({ "courses": courses }))
}

fn handle_courses_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = required_str(req, "courseId")?;
    let course = store::get_by_id::<Course>(conn, &course_id)?
        .ok_or_else(|| HandlerErr::not_found("course"))?;
    let plan_count = store::count_by_index::<Plan>(conn, "course_id", &course_id)?;
    Ok(json!({ "course": course, "planCount": plan_count }))
}

fn handle_courses_save(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let input = Value::Object(required_object(req, "course")?.clone());
    let now = dates::format_datetime(&dates::now());

    let existing = match str_field(&input, "id")? {
        Some(id) => store::get_by_id::<Course>(conn, &id)?,
        None => None,
    };
    let created = existing.is_none();
    let mut course = existing.unwrap_or_else(|| Course {
        id: String::new(),
        code: String::new(),
        name: String::new(),
        credits: 0.0,
        department: None,
        category: "required".to_string(),
        description: String::new(),
        status: COURSE_DRAFT.to_string(),
        allow_preview: false,
        created_at: now.clone(),
        updated_at: now.clone(),
    });
    merge_course(&mut course, &input)?;
    validate_course(&course)?;

    if created {
        course.id = match str_field(&input, "id")? {
            Some(id) => id,
            None => ids::course(&course.code),
        };
    }
    course.updated_at = now;
    if created {
        store::add(conn, &course)?;
    } else {
        store::put(conn, &course)?;
    }
    info!(
        "event=course_save module=courses status=ok id={} created={}",
        course.id, created
    );
    Ok(json!({ "course": course, "created": created }))
}

fn set_status(state: &mut AppState, req: &Request, status: &str) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = required_str(req, "courseId")?;
    let mut course = store::get_by_id::<Course>(conn, &course_id)?
        .ok_or_else(|| HandlerErr::not_found("course"))?;
    course.status = status.to_string();
    course.updated_at = dates::format_datetime(&dates::now());
    store::put(conn, &course)?;
    Ok(json!({ "course": course }))
}

fn handle_courses_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = required_str(req, "courseId")?;
    if store::get_by_id::<Course>(conn, &course_id)?.is_none() {
        return Err(HandlerErr::not_found("course"));
    }
    let plans = store::count_by_index::<Plan>(conn, "course_id", &course_id)?;
    if plans > 0 {
        return Err(
            HandlerErr::new("in_use", "course has scheduled plans; delete them first")
                .with_details(json!({ "plans": plans })),
        );
    }
    store::delete::<Course>(conn, &course_id)
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn handle_courses_stats(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let count = |s: &str| store::count_by_index::<Course>(conn, "status", s);
    let draft = count(COURSE_DRAFT)?;
    let published = count(COURSE_PUBLISHED)?;
    let archived = count(COURSE_ARCHIVED)?;
    Ok(json!({
        "total": draft + published + archived,
        "draft": draft,
        "published": published,
        "archived": archived
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "courses.list" => handle_courses_list(state, req),
        "courses.get" => handle_courses_get(state, req),
        "courses.save" => handle_courses_save(state, req),
        "courses.publish" => set_status(state, req, COURSE_PUBLISHED),
        "courses.archive" => set_status(state, req, COURSE_ARCHIVED),
        "courses.restore" => set_status(state, req, COURSE_DRAFT),
        "courses.delete" => handle_courses_delete(state, req),
        "courses.stats" => handle_courses_stats(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
