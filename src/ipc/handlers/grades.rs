use crate::calc::{self, Components, CreditItem, DetailItem, Weights};
use crate::db;
use crate::dates;
use crate::ids;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    contains_ci, f64_field, optional_i64, optional_str, require_db, required_str, str_field,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{Course, Enrollment, Plan, Score, ScoreDetail, User};
use crate::store;
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 1000;
const CSV_HEADER: &str = "student_no,name,attendance,midterm,final,homework,total,level,gpa";

pub fn weights_key(plan_id: &str) -> String {
    format!("grading.weights.{plan_id}")
}

fn require_plan(conn: &Connection, plan_id: &str) -> Result<Plan, HandlerErr> {
    store::get_by_id::<Plan>(conn, plan_id)?.ok_or_else(|| HandlerErr::not_found("plan"))
}

/// Saved per-plan weights, or the workspace default when none (or invalid ones) are saved.
fn plan_weights(conn: &Connection, plan_id: &str) -> anyhow::Result<(Weights, bool)> {
    let saved = db::settings_get_json(conn, &weights_key(plan_id))?
        .and_then(|v| serde_json::from_value::<Weights>(v).ok())
        .filter(|w| w.validate().is_ok());
    Ok(match saved {
        Some(w) => (w, false),
        None => (setup::default_weights(conn), true),
    })
}

fn components_of(score: &Score) -> Components {
    Components {
        attendance: score.attendance,
        midterm: score.midterm,
        final_exam: score.final_exam,
        homework: score.homework,
    }
}

fn apply_totals(score: &mut Score, weights: &Weights) {
    let total = calc::final_grade(&components_of(score), weights);
    score.total = Some(total);
    score.level = Some(calc::grade_level(total).to_string());
    score.gpa = Some(calc::gpa(total));
}

fn handle_weights_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    require_plan(conn, &plan_id)?;
    let (weights, is_default) = plan_weights(conn, &plan_id)?;
    Ok(json!({ "weights": weights, "isDefault": is_default }))
}

fn handle_weights_set(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    require_plan(conn, &plan_id)?;
    let raw = req
        .params
        .get("weights")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing weights"))?;
    let weights: Weights = serde_json::from_value(raw)
        .map_err(|e| HandlerErr::bad_params(format!("weights: {e}")))?;
    weights.validate().map_err(HandlerErr::bad_params)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    db::settings_set_json(&tx, &weights_key(&plan_id), &json!(weights))
        .map_err(|e| HandlerErr::new("db_update_failed", format!("{e:#}")))?;
    let now = dates::format_datetime(&dates::now());
    let mut recomputed = 0;
    for mut score in store::get_by_index::<Score>(&tx, "plan_id", &plan_id)? {
        apply_totals(&mut score, &weights);
        score.updated_at = now.clone();
        store::put(&tx, &score)?;
        recomputed += 1;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    info!(
        "event=weights_set module=grades status=ok plan={} recomputed={}",
        plan_id, recomputed
    );
    Ok(json!({ "weights": weights, "recomputed": recomputed }))
}

fn component_param(
    req: &Request,
    key: &str,
    current: Option<f64>,
) -> Result<Option<f64>, HandlerErr> {
    if req.params.get(key).is_none() {
        return Ok(current);
    }
    let v = f64_field(&req.params, key)?;
    if let Some(n) = v {
        calc::validate_component(key, n).map_err(HandlerErr::bad_params)?;
    }
    Ok(v)
}

fn handle_upsert(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    let student_id = required_str(req, "studentId")?;
    let plan = require_plan(conn, &plan_id)?;
    let enrolled = store::get_by_index::<Enrollment>(conn, "plan_id", &plan_id)?
        .iter()
        .any(|e| e.student_id == student_id);
    if !enrolled {
        return Err(HandlerErr::new("not_enrolled", "student is not enrolled in this plan"));
    }

    let id = ids::score(&student_id, &plan_id);
    let existing = store::get_by_id::<Score>(conn, &id)?;
    let created = existing.is_none();
    let mut score = existing.unwrap_or_else(|| Score {
        id,
        student_id,
        plan_id: plan_id.clone(),
        attendance: None,
        midterm: None,
        final_exam: None,
        homework: None,
        total: None,
        level: None,
        gpa: None,
        published: false,
        semester: plan.semester.clone(),
        updated_at: String::new(),
    });
    score.attendance = component_param(req, "attendance", score.attendance)?;
    score.midterm = component_param(req, "midterm", score.midterm)?;
    score.final_exam = component_param(req, "final", score.final_exam)?;
    score.homework = component_param(req, "homework", score.homework)?;

    let (weights, _) = plan_weights(conn, &plan_id)?;
    apply_totals(&mut score, &weights);
    score.updated_at = dates::format_datetime(&dates::now());
    store::put(conn, &score)?;
    Ok(json!({ "score": score, "created": created }))
}

struct GradeRow {
    score: Score,
    name: String,
    student_no: Option<String>,
}

fn grade_rows(conn: &Connection, plan_id: &str) -> Result<Vec<GradeRow>, HandlerErr> {
    let mut rows = Vec::new();
    for score in store::get_by_index::<Score>(conn, "plan_id", plan_id)? {
        let user = store::get_by_id::<User>(conn, &score.student_id)?;
        rows.push(GradeRow {
            name: user.as_ref().map(|u| u.name.clone()).unwrap_or_default(),
            student_no: user.and_then(|u| u.student_no),
            score,
        });
    }
    rows.sort_by(|a, b| {
        a.student_no
            .cmp(&b.student_no)
            .then_with(|| a.score.student_id.cmp(&b.score.student_id))
    });
    Ok(rows)
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    require_plan(conn, &plan_id)?;
    let page = optional_i64(req, "page")?.unwrap_or(1);
    let page_size = optional_i64(req, "pageSize")?.unwrap_or(DEFAULT_PAGE_SIZE);
    if page < 1 || !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(HandlerErr::bad_params(format!(
            "page must be at least 1 and pageSize in 1..={MAX_PAGE_SIZE}"
        )));
    }

    let mut rows = grade_rows(conn, &plan_id)?;
    if let Some(term) = optional_str(req, "search")? {
        let term = term.to_lowercase();
        rows.retain(|r| {
            contains_ci(&r.score.student_id, &term)
                || contains_ci(&r.name, &term)
                || r.student_no.as_deref().is_some_and(|n| contains_ci(n, &term))
        });
    }
    let total = rows.len();
    let page_size = page_size as usize;
    let page_count = total.div_ceil(page_size);
    let skip = usize::try_from(page - 1)
        .unwrap_or(usize::MAX)
        .saturating_mul(page_size);
    let items: Vec<Value> = rows
        .into_iter()
        .skip(skip)
        .take(page_size)
        .map(|r| {
            let mut v = json!(r.score);
            v["studentName"] = json!(r.name);
            v["studentNo"] = json!(r.student_no);
            v
        })
        .collect();
    Ok(json!({
        "rows": items,
        "total": total,
        "page": page,
        "pageSize": page_size,
        "pageCount": page_count
    }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    let student_id = required_str(req, "studentId")?;
    let id = ids::score(&student_id, &plan_id);
    if store::get_by_id::<Score>(conn, &id)?.is_none() {
        return Err(HandlerErr::not_found("score"));
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    store::delete_by_index::<ScoreDetail>(&tx, "score_id", &id)?;
    store::delete::<Score>(&tx, &id)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn handle_summary(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    require_plan(conn, &plan_id)?;
    let finals: Vec<i64> = store::get_by_index::<Score>(conn, "plan_id", &plan_id)?
        .iter()
        .filter_map(|s| s.total)
        .collect();
    let threshold = setup::pass_threshold(conn);
    Ok(json!({
        "summary": calc::summary(&finals, threshold),
        "passThreshold": threshold
    }))
}

fn handle_progress(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    require_plan(conn, &plan_id)?;
    let rows: Vec<Components> = store::get_by_index::<Score>(conn, "plan_id", &plan_id)?
        .iter()
        .map(components_of)
        .collect();
    let entered = rows.iter().filter(|c| c.any_entered()).count();
    Ok(json!({
        "progress": calc::entry_progress(&rows),
        "entered": entered,
        "total": rows.len()
    }))
}

fn handle_publish(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    require_plan(conn, &plan_id)?;
    let published = conn
        .execute(
            "UPDATE scores SET published = 1, updated_at = ? WHERE plan_id = ?",
            (dates::format_datetime(&dates::now()), &plan_id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    info!(
        "event=grades_publish module=grades status=ok plan={} rows={}",
        plan_id, published
    );
    Ok(json!({ "published": published }))
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn csv_num(v: Option<f64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

fn render_csv(rows: &[GradeRow]) -> String {
    let mut out = String::from("\u{feff}");
    out.push_str(CSV_HEADER);
    out.push('\n');
    for r in rows {
        let s = &r.score;
        let cells = [
            csv_field(r.student_no.as_deref().unwrap_or(&s.student_id)),
            csv_field(&r.name),
            csv_num(s.attendance),
            csv_num(s.midterm),
            csv_num(s.final_exam),
            csv_num(s.homework),
            s.total.map(|t| t.to_string()).unwrap_or_default(),
            s.level.clone().unwrap_or_default(),
            csv_num(s.gpa),
        ];
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    let out_path = PathBuf::from(required_str(req, "outPath")?);
    require_plan(conn, &plan_id)?;

    let rows = grade_rows(conn, &plan_id)?;
    let text = render_csv(&rows);
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    }
    std::fs::write(&out_path, text.as_bytes())
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    Ok(json!({
        "outPath": out_path.to_string_lossy(),
        "rowsExported": rows.len()
    }))
}

fn handle_details_set(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let plan_id = required_str(req, "planId")?;
    let student_id = required_str(req, "studentId")?;
    let score_id = ids::score(&student_id, &plan_id);
    if store::get_by_id::<Score>(conn, &score_id)?.is_none() {
        return Err(HandlerErr::not_found("score"));
    }
    let Some(items) = req.params.get("items").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("items must be an array"));
    };

    let mut details = Vec::with_capacity(items.len());
    for item in items {
        let item_name = str_field(item, "itemName")?
            .ok_or_else(|| HandlerErr::bad_params("itemName is required"))?;
        let weight = f64_field(item, "weight")?
            .ok_or_else(|| HandlerErr::bad_params("weight is required"))?;
        if !(0.0..=100.0).contains(&weight) {
            return Err(HandlerErr::bad_params("weight must be in 0..=100"));
        }
        let score = f64_field(item, "score")?;
        if let Some(s) = score {
            calc::validate_component("score", s).map_err(HandlerErr::bad_params)?;
        }
        let status = str_field(item, "status")?.unwrap_or_else(|| {
            if score.is_some() { "completed" } else { "pending" }.to_string()
        });
        details.push(ScoreDetail {
            id: ids::generic("detail"),
            score_id: score_id.clone(),
            item_name,
            weight,
            score,
            status,
            submit_time: str_field(item, "submitTime")?,
        });
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    store::delete_by_index::<ScoreDetail>(&tx, "score_id", &score_id)?;
    for d in &details {
        store::add(&tx, d)?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "details": details }))
}

struct PublishedRow {
    score: Score,
    plan: Plan,
    course: Course,
}

fn published_scores(conn: &Connection, student_id: &str) -> Result<Vec<PublishedRow>, HandlerErr> {
    let mut out = Vec::new();
    for score in store::get_by_index::<Score>(conn, "student_id", student_id)? {
        if !score.published {
            continue;
        }
        let Some(plan) = store::get_by_id::<Plan>(conn, &score.plan_id)? else {
            continue;
        };
        let Some(course) = store::get_by_id::<Course>(conn, &plan.course_id)? else {
            continue;
        };
        out.push(PublishedRow {
            score,
            plan,
            course,
        });
    }
    Ok(out)
}

fn handle_student_grades(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = required_str(req, "studentId")?;
    let semester = optional_str(req, "semester")?.filter(|s| s != "all");

    let grades: Vec<Value> = published_scores(conn, &student_id)?
        .into_iter()
        .filter(|r| semester.as_ref().map_or(true, |s| &r.plan.semester == s))
        .map(|r| {
            json!({
                "planId": r.plan.id,
                "courseCode": r.course.code,
                "courseName": r.course.name,
                "category": r.course.category,
                "credits": r.course.credits,
                "semester": r.plan.semester,
                "total": r.score.total,
                "level": r.score.level,
                "gpa": r.score.gpa,
                "gradeClass": calc::grade_class(r.score.total.map(|t| t as f64)),
            })
        })
        .collect();
    Ok(json!({ "grades": grades }))
}

fn handle_student_summary(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = required_str(req, "studentId")?;
    let rows = published_scores(conn, &student_id)?;
    let items: Vec<CreditItem> = rows
        .iter()
        .map(|r| CreditItem {
            credits: r.course.credits,
            gpa: r.score.gpa.filter(|g| *g > 0.0),
        })
        .collect();
    let credit = calc::credit_weighted_gpa(&items);
    Ok(json!({
        "totalCredits": credit.total_credits,
        "averageGpa": credit.average_gpa,
        "completedCourses": rows.len()
    }))
}

fn handle_student_detail(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = required_str(req, "studentId")?;
    let plan_id = required_str(req, "planId")?;
    let plan = require_plan(conn, &plan_id)?;
    let course = store::get_by_id::<Course>(conn, &plan.course_id)?
        .ok_or_else(|| HandlerErr::not_found("course"))?;
    let teacher = store::get_by_id::<User>(conn, &plan.teacher_id)?;
    let score = store::get_by_id::<Score>(conn, &ids::score(&student_id, &plan_id))?
        .filter(|s| s.published)
        .ok_or_else(|| HandlerErr::not_found("score"))?;

    let details = store::get_by_index::<ScoreDetail>(conn, "score_id", &score.id)?;
    let (breakdown, weighted_total) = if details.is_empty() {
        let (w, _) = plan_weights(conn, &plan_id)?;
        let parts = [
            ("attendance", w.attendance, score.attendance),
            ("midterm", w.midterm, score.midterm),
            ("final", w.final_exam, score.final_exam),
            ("homework", w.homework, score.homework),
        ];
        let items: Vec<Value> = parts
            .iter()
            .map(|(name, weight, value)| {
                json!({
                    "itemName": name,
                    "weight": weight,
                    "score": value,
                    "status": if value.is_some() { "completed" } else { "pending" },
                    "gradeClass": calc::grade_class(*value),
                })
            })
            .collect();
        (items, score.total.map(|t| t as f64))
    } else {
        let weighted = calc::detail_weighted_total(
            &details
                .iter()
                .map(|d| DetailItem {
                    weight: d.weight,
                    score: d.score,
                })
                .collect::<Vec<_>>(),
        );
        let items: Vec<Value> = details
            .iter()
            .map(|d| {
                let mut v = json!(d);
                v["gradeClass"] = json!(calc::grade_class(d.score));
                v
            })
            .collect();
        (items, weighted)
    };

    Ok(json!({
        "course": {
            "code": course.code,
            "name": course.name,
            "credits": course.credits,
            "semester": plan.semester,
            "teacherName": teacher.map(|t| t.name),
        },
        "total": score.total,
        "level": score.level,
        "gpa": score.gpa,
        "gradeClass": calc::grade_class(score.total.map(|t| t as f64)),
        "breakdown": breakdown,
        "weightedTotal": weighted_total
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let outcome = match req.method.as_str() {
        "grades.weights.get" => handle_weights_get(state, req),
        "grades.weights.set" => handle_weights_set(state, req),
        "grades.upsert" => handle_upsert(state, req),
        "grades.list" => handle_list(state, req),
        "grades.delete" => handle_delete(state, req),
        "grades.summary" => handle_summary(state, req),
        "grades.progress" => handle_progress(state, req),
        "grades.publish" => handle_publish(state, req),
        "grades.exportCsv" => handle_export_csv(state, req),
        "grades.details.set" => handle_details_set(state, req),
        "student.grades" => handle_student_grades(state, req),
        "student.gradeSummary" => handle_student_summary(state, req),
        "student.gradeDetail" => handle_student_detail(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
