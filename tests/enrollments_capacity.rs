mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request, request_err, request_ok, seeded_sidecar, DEMO_PLAN, DEMO_STUDENT};

fn add_student(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, id: &str, user_id: &str) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "users.create",
        json!({ "role": "student", "username": user_id, "name": user_id, "userId": user_id }),
    );
}

fn tiny_plan(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> String {
    let created = request_ok(
        stdin,
        reader,
        "plan",
        "plans.create",
        json!({
            "courseId": "crs_GE101",
            "teacherId": "tea_002",
            "semester": "2024-2",
            "capacity": 1
        }),
    );
    created["planId"].as_str().expect("planId").to_string()
}

#[test]
fn enroll_rejects_duplicates_and_full_plans() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-enroll-full");
    let plan_id = tiny_plan(&mut stdin, &mut reader);
    assert_eq!(plan_id, "plan_2024_2_GE101");

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "enrollments.enroll",
        json!({ "studentId": DEMO_STUDENT, "planId": plan_id, "asOf": "2024-09-02" }),
    );
    assert_eq!(first["enrolled"], json!(1));
    assert_eq!(first["enrollment"]["enrollDate"], json!("2024-09-02"));

    let dup = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "enrollments.enroll",
        json!({ "studentId": DEMO_STUDENT, "planId": plan_id }),
    );
    assert_eq!(dup, "already_enrolled");

    add_student(&mut stdin, &mut reader, "3", "stu_x1");
    let full = request(
        &mut stdin,
        &mut reader,
        "4",
        "enrollments.enroll",
        json!({ "studentId": "stu_x1", "planId": plan_id }),
    );
    assert_eq!(full["error"]["code"], json!("plan_full"));
    assert_eq!(full["error"]["details"]["capacity"], json!(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "setup.update",
        json!({ "section": "enrollment", "patch": { "allowOverCapacity": true } }),
    );
    let over = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "enrollments.enroll",
        json!({ "studentId": "stu_x1", "planId": plan_id }),
    );
    assert_eq!(over["enrolled"], json!(2));

    let listed = request_ok(&mut stdin, &mut reader, "7", "plans.get", json!({ "planId": plan_id }));
    assert_eq!(listed["plan"]["isFull"], json!(true));
}

#[test]
fn only_students_can_enroll() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-enroll-role");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "enrollments.enroll",
        json!({ "studentId": "tea_001", "planId": DEMO_PLAN }),
    );
    assert_eq!(code, "bad_params");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "enrollments.enroll",
        json!({ "studentId": DEMO_STUDENT, "planId": "plan_missing" }),
    );
    assert_eq!(code, "not_found");
}

#[test]
fn drop_frees_a_seat_and_never_goes_negative() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-enroll-drop");
    let enrollment_id = format!("sc_{DEMO_STUDENT}_{DEMO_PLAN}");

    let _ = request_ok(&mut stdin, &mut reader, "1", "enrollments.drop", json!({ "enrollmentId": enrollment_id }));
    let plan = request_ok(&mut stdin, &mut reader, "2", "plans.get", json!({ "planId": DEMO_PLAN }));
    assert_eq!(plan["plan"]["enrolled"], json!(0));

    let code = request_err(&mut stdin, &mut reader, "3", "enrollments.drop", json!({ "enrollmentId": enrollment_id }));
    assert_eq!(code, "not_found");
    let plan = request_ok(&mut stdin, &mut reader, "4", "plans.get", json!({ "planId": DEMO_PLAN }));
    assert_eq!(plan["plan"]["enrolled"], json!(0));
}

#[test]
fn student_course_list_filters_and_reports_progress() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-enroll-list");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "enrollments.enroll",
        json!({ "studentId": DEMO_STUDENT, "planId": "plan_2024_1_CS103" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "submissions.submit",
        json!({
            "assignmentId": "assign_plan_2024_1_CS101_01",
            "studentId": DEMO_STUDENT,
            "content": "linked list",
            "asOf": "2024-12-01T10:00:00"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "enrollments.complete",
        json!({ "enrollmentId": format!("sc_{DEMO_STUDENT}_{DEMO_PLAN}") }),
    );

    let all = request_ok(&mut stdin, &mut reader, "4", "enrollments.listByStudent", json!({ "studentId": DEMO_STUDENT }));
    let rows = all["courses"].as_array().expect("courses");
    assert_eq!(rows.len(), 2);
    let cs101 = rows.iter().find(|r| r["planId"] == json!(DEMO_PLAN)).expect("cs101 row");
    assert_eq!(cs101["progress"], json!(50));
    assert_eq!(cs101["teacherName"], json!("Prof. Zhang"));

    let ongoing = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "enrollments.listByStudent",
        json!({ "studentId": DEMO_STUDENT, "filter": "ongoing" }),
    );
    assert_eq!(ongoing["courses"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(ongoing["courses"][0]["courseCode"], json!("CS103"));

    let stats = request_ok(&mut stdin, &mut reader, "6", "student.stats", json!({ "studentId": DEMO_STUDENT }));
    assert_eq!(stats["totalCourses"], json!(2));
    assert_eq!(stats["completedTasks"], json!(1));
    assert_eq!(stats["pendingTasks"], json!(1));
}

#[test]
fn plan_list_marks_student_enrollment() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-plan-list");
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "plans.list",
        json!({ "semester": "2024-1", "studentId": DEMO_STUDENT }),
    );
    let rows = listed["plans"].as_array().expect("plans");
    assert_eq!(rows.len(), 3);
    for row in rows {
        let expected = row["id"] == json!(DEMO_PLAN);
        assert_eq!(row["isEnrolled"], json!(expected), "{row}");
    }

    let students = request_ok(&mut stdin, &mut reader, "2", "plans.students", json!({ "planId": DEMO_PLAN }));
    assert_eq!(students["students"].as_array().map(|a| a.len()), Some(1));
}
