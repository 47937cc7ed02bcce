mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, seeded_sidecar, DEMO_PLAN};

#[test]
fn get_returns_defaults_for_every_section() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-setup-defaults");
    let setup = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(
        setup["grading"]["defaultWeights"],
        json!({ "attendance": 10, "midterm": 30, "final": 40, "homework": 20 })
    );
    assert_eq!(setup["grading"]["passThreshold"], json!(60.0));
    assert_eq!(setup["materials"]["storageQuotaMb"], json!(5000));
    assert_eq!(setup["enrollment"]["allowOverCapacity"], json!(false));
    assert_eq!(setup["dashboard"]["upcomingExamDays"], json!(7));
}

#[test]
fn update_validates_and_persists() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-setup-update");

    let unknown_section = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "setup.update",
        json!({ "section": "printing", "patch": {} }),
    );
    assert_eq!(unknown_section, "bad_params");

    let unknown_field = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "dashboard", "patch": { "theme": "dark" } }),
    );
    assert_eq!(unknown_field, "bad_params");

    let out_of_range = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "dashboard", "patch": { "upcomingExamDays": 0 } }),
    );
    assert_eq!(out_of_range, "bad_params");

    let bad_weights = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "grading", "patch": { "defaultWeights": { "attendance": 50, "midterm": 50, "final": 50, "homework": 0 } } }),
    );
    assert_eq!(bad_weights, "bad_params");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "setup.update",
        json!({ "section": "grading", "patch": {
            "defaultWeights": { "attendance": 20, "midterm": 20, "final": 40, "homework": 20 },
            "passThreshold": 70
        }}),
    );
    assert_eq!(updated["section"], json!("grading"));
    assert_eq!(updated["value"]["passThreshold"], json!(70.0));

    let setup = request_ok(&mut stdin, &mut reader, "6", "setup.get", json!({}));
    assert_eq!(setup["grading"]["defaultWeights"]["attendance"], json!(20));

    // Plans without their own weights follow the new default.
    let weights = request_ok(&mut stdin, &mut reader, "7", "grades.weights.get", json!({ "planId": DEMO_PLAN }));
    assert_eq!(weights["isDefault"], json!(true));
    assert_eq!(weights["weights"]["attendance"], json!(20));

    let summary = request_ok(&mut stdin, &mut reader, "8", "grades.summary", json!({ "planId": DEMO_PLAN }));
    assert_eq!(summary["passThreshold"], json!(70.0));
}
