mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request, request_err, request_ok, seeded_sidecar, DEMO_PLAN, DEMO_STUDENT};

fn enroll_extra(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, n: usize) -> Vec<String> {
    let mut ids = Vec::new();
    for i in 0..n {
        let user_id = format!("stu_extra{:02}", i);
        let _ = request_ok(
            stdin,
            reader,
            &format!("u{i}"),
            "users.create",
            json!({
                "role": "student",
                "userId": user_id,
                "username": user_id,
                "name": format!("Student {i:02}"),
                "studentNo": format!("20249900{i:02}")
            }),
        );
        let _ = request_ok(
            stdin,
            reader,
            &format!("e{i}"),
            "enrollments.enroll",
            json!({ "studentId": user_id, "planId": DEMO_PLAN }),
        );
        ids.push(user_id);
    }
    ids
}

#[test]
fn upsert_merges_components_and_computes_totals() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-grades-upsert");
    let ids = enroll_extra(&mut stdin, &mut reader, 1);

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.upsert",
        json!({ "planId": DEMO_PLAN, "studentId": ids[0], "attendance": 100, "final": 80 }),
    );
    assert_eq!(first["created"], json!(true));
    // 100*0.1 + 80*0.4 = 42
    assert_eq!(first["score"]["total"], json!(42));
    assert_eq!(first["score"]["level"], json!("F"));
    assert_eq!(first["score"]["gpa"], json!(0.0));

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.upsert",
        json!({ "planId": DEMO_PLAN, "studentId": ids[0], "midterm": 90, "homework": 95 }),
    );
    assert_eq!(second["created"], json!(false));
    // 10 + 27 + 32 + 19 = 88
    assert_eq!(second["score"]["total"], json!(88));
    assert_eq!(second["score"]["attendance"], json!(100.0));
    assert_eq!(second["score"]["gpa"], json!(3.8));

    let out_of_range = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "grades.upsert",
        json!({ "planId": DEMO_PLAN, "studentId": ids[0], "final": 101 }),
    );
    assert_eq!(out_of_range, "bad_params");

    let stranger = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "grades.upsert",
        json!({ "planId": "plan_2024_1_CS102", "studentId": DEMO_STUDENT, "final": 70 }),
    );
    assert_eq!(stranger, "not_enrolled");
}

#[test]
fn weights_are_per_plan_and_recompute_scores() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-grades-weights");

    let before = request_ok(&mut stdin, &mut reader, "1", "grades.weights.get", json!({ "planId": DEMO_PLAN }));
    assert_eq!(before["isDefault"], json!(true));
    assert_eq!(before["weights"], json!({ "attendance": 10, "midterm": 30, "final": 40, "homework": 20 }));

    let bad = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "grades.weights.set",
        json!({ "planId": DEMO_PLAN, "weights": { "attendance": 10, "midterm": 30, "final": 40, "homework": 30 } }),
    );
    assert_eq!(bad, "bad_params");

    let set = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.weights.set",
        json!({ "planId": DEMO_PLAN, "weights": { "attendance": 0, "midterm": 0, "final": 100, "homework": 0 } }),
    );
    assert_eq!(set["recomputed"], json!(1));

    let rows = request_ok(&mut stdin, &mut reader, "4", "grades.list", json!({ "planId": DEMO_PLAN }));
    assert_eq!(rows["rows"][0]["total"], json!(90));
    assert_eq!(rows["rows"][0]["level"], json!("A"));

    let other = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grades.weights.get",
        json!({ "planId": "plan_2024_1_CS102" }),
    );
    assert_eq!(other["isDefault"], json!(true));
}

#[test]
fn list_paginates_and_searches() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-grades-page");
    let ids = enroll_extra(&mut stdin, &mut reader, 11);
    for (i, id) in ids.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("g{i}"),
            "grades.upsert",
            json!({ "planId": DEMO_PLAN, "studentId": id, "final": 50 + i as i64 }),
        );
    }

    let page1 = request_ok(&mut stdin, &mut reader, "1", "grades.list", json!({ "planId": DEMO_PLAN }));
    assert_eq!(page1["total"], json!(12));
    assert_eq!(page1["pageSize"], json!(10));
    assert_eq!(page1["pageCount"], json!(2));
    assert_eq!(page1["rows"].as_array().map(|a| a.len()), Some(10));

    let page2 = request_ok(&mut stdin, &mut reader, "2", "grades.list", json!({ "planId": DEMO_PLAN, "page": 2 }));
    assert_eq!(page2["rows"].as_array().map(|a| a.len()), Some(2));

    let found = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.list",
        json!({ "planId": DEMO_PLAN, "search": "zhang" }),
    );
    assert_eq!(found["total"], json!(1));
    assert_eq!(found["rows"][0]["studentNo"], json!("2024150001"));

    let code = request_err(&mut stdin, &mut reader, "4", "grades.list", json!({ "planId": DEMO_PLAN, "page": 0 }));
    assert_eq!(code, "bad_params");
}

#[test]
fn summary_progress_and_publish() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-grades-summary");
    let ids = enroll_extra(&mut stdin, &mut reader, 2);
    // 55*0.4 = 22 and a blank row
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.upsert",
        json!({ "planId": DEMO_PLAN, "studentId": ids[0], "final": 55 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.upsert",
        json!({ "planId": DEMO_PLAN, "studentId": ids[1] }),
    );

    let summary = request_ok(&mut stdin, &mut reader, "3", "grades.summary", json!({ "planId": DEMO_PLAN }));
    assert_eq!(summary["passThreshold"], json!(60.0));
    assert_eq!(summary["summary"]["count"], json!(3));
    assert_eq!(summary["summary"]["max"], json!(88));
    assert_eq!(summary["summary"]["min"], json!(0));
    assert_eq!(summary["summary"]["passCount"], json!(1));
    assert_eq!(summary["summary"]["average"], json!(36.7));

    let progress = request_ok(&mut stdin, &mut reader, "4", "grades.progress", json!({ "planId": DEMO_PLAN }));
    assert_eq!(progress["entered"], json!(2));
    assert_eq!(progress["total"], json!(3));
    assert_eq!(progress["progress"], json!(67));

    let hidden = request_ok(&mut stdin, &mut reader, "5", "student.grades", json!({ "studentId": ids[0] }));
    assert_eq!(hidden["grades"], json!([]));

    let published = request_ok(&mut stdin, &mut reader, "6", "grades.publish", json!({ "planId": DEMO_PLAN }));
    assert_eq!(published["published"], json!(3));

    let visible = request_ok(&mut stdin, &mut reader, "7", "student.grades", json!({ "studentId": ids[0] }));
    assert_eq!(visible["grades"][0]["total"], json!(22));
    assert_eq!(visible["grades"][0]["gradeClass"], json!("fail"));
}

#[test]
fn student_views_show_published_results() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-grades-student");

    let grades = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "student.grades",
        json!({ "studentId": DEMO_STUDENT, "semester": "2024-1" }),
    );
    let rows = grades["grades"].as_array().expect("grades");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["courseCode"], json!("CS101"));
    assert_eq!(rows[0]["level"], json!("B"));
    assert_eq!(rows[0]["gradeClass"], json!("good"));

    let none = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "student.grades",
        json!({ "studentId": DEMO_STUDENT, "semester": "2023-2" }),
    );
    assert_eq!(none["grades"], json!([]));

    let summary = request_ok(&mut stdin, &mut reader, "3", "student.gradeSummary", json!({ "studentId": DEMO_STUDENT }));
    assert_eq!(summary["totalCredits"], json!(4.0));
    assert_eq!(summary["averageGpa"], json!(3.8));

    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "student.gradeDetail",
        json!({ "studentId": DEMO_STUDENT, "planId": DEMO_PLAN }),
    );
    assert_eq!(detail["course"]["teacherName"], json!("Prof. Zhang"));
    assert_eq!(detail["breakdown"].as_array().map(|a| a.len()), Some(5));
    // (95*10 + 85*15 + 90*15 + 82*20 + 90*40) / 100 = 88.15
    let weighted = detail["weightedTotal"].as_f64().expect("weightedTotal");
    assert!((weighted - 88.15).abs() <= 0.051, "{weighted}");

    let replaced = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grades.details.set",
        json!({ "planId": DEMO_PLAN, "studentId": DEMO_STUDENT, "items": [
            { "itemName": "Project", "weight": 50, "score": 100 },
            { "itemName": "Final exam", "weight": 50 }
        ]}),
    );
    assert_eq!(replaced["details"][1]["status"], json!("pending"));
    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "student.gradeDetail",
        json!({ "studentId": DEMO_STUDENT, "planId": DEMO_PLAN }),
    );
    assert_eq!(detail["weightedTotal"], json!(50.0));

    let unpublished = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "student.gradeDetail",
        json!({ "studentId": DEMO_STUDENT, "planId": "plan_2024_1_CS102" }),
    );
    assert_eq!(unpublished, "not_found");
}

#[test]
fn export_csv_writes_bom_and_rows() {
    let (_child, mut stdin, mut reader, ws) = seeded_sidecar("coursebook-grades-csv");
    let out = ws.join("exports").join("cs101.csv");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.exportCsv",
        json!({ "planId": DEMO_PLAN, "outPath": out.to_string_lossy() }),
    );
    assert_eq!(exported["rowsExported"], json!(1));

    let bytes = std::fs::read(&out).expect("read csv");
    assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);
    let text = String::from_utf8(bytes[3..].to_vec()).expect("utf8");
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("student_no,name,attendance,midterm,final,homework,total,level,gpa")
    );
    assert_eq!(lines.next(), Some("2024150001,Zhang San,95,82,90,88,88,B,3.8"));
}

#[test]
fn delete_removes_score_and_details() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-grades-delete");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.delete",
        json!({ "planId": DEMO_PLAN, "studentId": DEMO_STUDENT }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "grades.delete",
        json!({ "planId": DEMO_PLAN, "studentId": DEMO_STUDENT }),
    );
    assert_eq!(resp["error"]["code"], json!("not_found"));
    let summary = request_ok(&mut stdin, &mut reader, "3", "student.gradeSummary", json!({ "studentId": DEMO_STUDENT }));
    assert_eq!(summary["completedCourses"], json!(0));
}

#[test]
fn paging_rejects_oversized_pages_and_tolerates_far_pages() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-grades-paging-bounds");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "grades.list",
        json!({ "planId": DEMO_PLAN, "pageSize": i64::MAX }),
    );
    assert_eq!(code, "bad_params");

    let widest = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.list",
        json!({ "planId": DEMO_PLAN, "pageSize": 1000 }),
    );
    assert_eq!(widest["pageCount"], json!(1));
    assert_eq!(widest["rows"].as_array().map(|a| a.len()), Some(1));

    let far = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.list",
        json!({ "planId": DEMO_PLAN, "page": i64::MAX, "pageSize": 1000 }),
    );
    assert_eq!(far["rows"], json!([]));
    assert_eq!(far["total"], json!(1));

    let health = request_ok(&mut stdin, &mut reader, "4", "health", json!({}));
    assert!(health.is_object());
}
