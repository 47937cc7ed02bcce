mod test_support;

use serde_json::json;
use test_support::{request, request_err, request_ok, seeded_sidecar, DEMO_PLAN, DEMO_STUDENT};

fn names(result: &serde_json::Value) -> Vec<String> {
    result["materials"]
        .as_array()
        .expect("materials")
        .iter()
        .map(|m| m["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn list_sorts_and_searches() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-materials-list");

    let by_default = request_ok(&mut stdin, &mut reader, "1", "materials.list", json!({ "planId": DEMO_PLAN }));
    assert_eq!(names(&by_default)[0], "Algorithm diagrams.png");
    assert_eq!(by_default["materials"][0]["courseName"], json!("Data Structures and Algorithms"));
    assert_eq!(by_default["materials"][0]["sizeText"], json!("156 KB"));

    let by_name = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "materials.list",
        json!({ "planId": DEMO_PLAN, "sort": "name-asc" }),
    );
    assert_eq!(
        names(&by_name),
        vec!["Algorithm diagrams.png", "Chapter 1 - Overview.pdf", "Course introduction.mp4"]
    );

    let by_size = request_ok(&mut stdin, &mut reader, "3", "materials.list", json!({ "sort": "size-desc" }));
    assert_eq!(names(&by_size)[0], "Course introduction.mp4");
    assert_eq!(by_size["materials"][0]["fileType"], json!("video"));

    let by_description = request_ok(&mut stdin, &mut reader, "4", "materials.list", json!({ "search": "VIDEO" }));
    assert_eq!(names(&by_description), vec!["Course introduction.mp4"]);

    let by_course = request_ok(&mut stdin, &mut reader, "5", "materials.list", json!({ "search": "data structures" }));
    assert_eq!(names(&by_course).len(), 3);

    let code = request_err(&mut stdin, &mut reader, "6", "materials.list", json!({ "sort": "color" }));
    assert_eq!(code, "bad_params");
}

#[test]
fn quota_is_enforced_and_reported() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-materials-quota");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.update",
        json!({ "section": "materials", "patch": { "storageQuotaMb": 20 } }),
    );

    let over = request(
        &mut stdin,
        &mut reader,
        "2",
        "materials.add",
        json!({ "planId": DEMO_PLAN, "name": "Lecture 2.pptx", "sizeBytes": 3_000_000 }),
    );
    assert_eq!(over["error"]["code"], json!("quota_exceeded"));
    assert_eq!(over["error"]["details"]["quotaBytes"], json!(20 * 1024 * 1024));

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "materials.add",
        json!({ "planId": DEMO_PLAN, "name": "Notes.DOCX", "sizeBytes": 1_000_000, "description": "week 2" }),
    );
    assert_eq!(added["material"]["fileType"], json!("doc"));

    // Other plans have their own allowance.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "materials.add",
        json!({ "planId": "plan_2024_1_CS102", "name": "intro.mp4", "sizeBytes": 3_000_000 }),
    );

    let storage = request_ok(&mut stdin, &mut reader, "5", "materials.storage", json!({ "planId": DEMO_PLAN }));
    assert_eq!(storage["usedBytes"], json!(19_719_539));
    assert_eq!(storage["quotaText"], json!("20 MB"));
    assert_eq!(storage["level"], json!("critical"));

    let whole = request_ok(&mut stdin, &mut reader, "6", "materials.storage", json!({}));
    assert_eq!(whole["usedBytes"], json!(22_719_539));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "materials.add",
        json!({ "planId": DEMO_PLAN, "name": "neg.txt", "sizeBytes": -1 }),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn delete_reports_missing_ids() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-materials-delete");
    let listed = request_ok(&mut stdin, &mut reader, "1", "materials.list", json!({ "sort": "name-asc" }));
    let first = listed["materials"][0]["id"].as_str().expect("id").to_string();

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "materials.delete",
        json!({ "materialIds": [first, "mat_missing"] }),
    );
    assert_eq!(deleted["deleted"], json!(1));
    assert_eq!(deleted["missing"], json!(["mat_missing"]));

    let code = request_err(&mut stdin, &mut reader, "3", "materials.delete", json!({ "materialIds": [] }));
    assert_eq!(code, "bad_params");
}

#[test]
fn download_history_is_capped_and_clearable() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-materials-history");
    let listed = request_ok(&mut stdin, &mut reader, "1", "materials.list", json!({}));
    let material_id = listed["materials"][0]["id"].as_str().expect("id").to_string();

    for i in 0..102 {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("d{i}"),
            "materials.recordDownload",
            json!({ "materialId": material_id, "userId": DEMO_STUDENT }),
        );
    }
    let history = request_ok(&mut stdin, &mut reader, "2", "materials.downloadHistory", json!({}));
    assert_eq!(history["total"], json!(100));
    assert_eq!(history["history"][0]["courseName"], json!("Data Structures and Algorithms"));

    let recent = request_ok(&mut stdin, &mut reader, "3", "materials.downloadHistory", json!({ "limit": 5 }));
    assert_eq!(recent["total"], json!(5));

    let cleared = request_ok(&mut stdin, &mut reader, "4", "materials.clearDownloadHistory", json!({}));
    assert_eq!(cleared["removed"], json!(100));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "materials.recordDownload",
        json!({ "materialId": "mat_missing" }),
    );
    assert_eq!(code, "not_found");
}

#[test]
fn huge_sizes_are_rejected_without_taking_the_sidecar_down() {
    let (_child, mut stdin, mut reader, _ws) = seeded_sidecar("coursebook-materials-huge");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "materials.add",
        json!({ "planId": DEMO_PLAN, "name": "tiny.txt", "sizeBytes": 10 }),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "materials.add",
        json!({ "planId": DEMO_PLAN, "name": "huge.bin", "sizeBytes": i64::MAX }),
    );
    assert_eq!(code, "bad_params");

    // Within the size cap but far beyond the quota.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "materials.add",
        json!({ "planId": DEMO_PLAN, "name": "big.bin", "sizeBytes": 1_i64 << 40 }),
    );
    assert_eq!(code, "quota_exceeded");

    let health = request_ok(&mut stdin, &mut reader, "4", "health", json!({}));
    assert!(health.is_object());
    let storage = request_ok(&mut stdin, &mut reader, "5", "materials.storage", json!({ "planId": DEMO_PLAN }));
    assert_eq!(storage["usedBytes"], json!(18_719_549));
}
