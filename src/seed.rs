//! Demo workspace content: one class, one student, three teachers, four
//! courses with three offerings, and a graded record for the student.

use crate::calc::{self, Components, Weights};
use crate::dates;
use crate::ids;
use crate::models::*;
use crate::store;
use log::info;
use rusqlite::Connection;

pub const DEMO_STUDENT_ID: &str = "stu_2024001";
const SEMESTER: &str = "2024-1";

#[derive(Debug, Clone, Default)]
pub struct SeedSummary {
    pub skipped: bool,
    pub records: usize,
}

pub fn seed_demo(conn: &Connection) -> anyhow::Result<SeedSummary> {
    if store::count_all::<User>(conn)? > 0 {
        info!("event=seed module=seed status=skipped reason=users_present");
        return Ok(SeedSummary {
            skipped: true,
            records: 0,
        });
    }

    let now = dates::format_datetime(&dates::now());
    let tx = conn.unchecked_transaction()?;
    let mut records = 0;

    let class = ClassRoom {
        id: ids::class_room("2024", 0),
        name: "Computer Science 2024 Class 1".to_string(),
        grade: "2024".to_string(),
        department: Some("School of Computing".to_string()),
        created_at: now.clone(),
    };
    store::add(&tx, &class)?;
    records += 1;

    let student = User {
        id: DEMO_STUDENT_ID.to_string(),
        username: "student001".to_string(),
        name: "Zhang San".to_string(),
        role: ROLE_STUDENT.to_string(),
        student_no: Some("2024150001".to_string()),
        class_id: Some(class.id.clone()),
        department: None,
        title: None,
        gender: Some("male".to_string()),
        email: Some("zhangsan@example.com".to_string()),
        phone: None,
        created_at: now.clone(),
    };
    store::add(&tx, &student)?;
    records += 1;

    for (n, (username, name, title)) in [
        ("teacher001", "Prof. Zhang", "Professor"),
        ("teacher002", "Dr. Li", "Associate Professor"),
        ("teacher003", "Prof. Wang", "Professor"),
    ]
    .into_iter()
    .enumerate()
    {
        let teacher = User {
            id: format!("tea_{:03}", n + 1),
            username: username.to_string(),
            name: name.to_string(),
            role: ROLE_TEACHER.to_string(),
            student_no: None,
            class_id: None,
            department: Some("School of Computing".to_string()),
            title: Some(title.to_string()),
            gender: None,
            email: Some(format!("{username}@example.com")),
            phone: None,
            created_at: now.clone(),
        };
        store::add(&tx, &teacher)?;
        records += 1;
    }

    let courses = [
        ("CS101", "Data Structures and Algorithms", 4.0, "School of Computing", "required",
         "Common data structures and algorithm design."),
        ("CS102", "Web Front-end Development", 3.0, "School of Computing", "elective",
         "HTML, CSS and JavaScript with modern front-end frameworks."),
        ("CS103", "Database Systems", 4.0, "School of Computing", "required",
         "Database principles, SQL, schema design and administration."),
        ("GE101", "College English", 2.0, "School of Foreign Languages", "general",
         "Listening, speaking, reading and writing."),
    ];
    for (code, name, credits, dept, category, desc) in courses {
        let course = Course {
            id: ids::course(code),
            code: code.to_string(),
            name: name.to_string(),
            credits,
            department: Some(dept.to_string()),
            category: category.to_string(),
            description: desc.to_string(),
            status: COURSE_PUBLISHED.to_string(),
            allow_preview: true,
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        store::add(&tx, &course)?;
        records += 1;
    }

    let plans = [
        ("CS101", "tea_001", "Mon 1-2, Wed 3-4", "A101", 120),
        ("CS102", "tea_002", "Tue 5-6, Thu 7-8", "B203", 80),
        ("CS103", "tea_003", "Mon 3-4, Fri 1-2", "A205", 100),
    ];
    for (code, teacher_id, schedule, room, capacity) in plans {
        let plan = Plan {
            id: ids::plan(SEMESTER, code),
            course_id: ids::course(code),
            teacher_id: teacher_id.to_string(),
            semester: SEMESTER.to_string(),
            class_id: Some(class.id.clone()),
            schedule: Some(schedule.to_string()),
            classroom: Some(room.to_string()),
            capacity,
            enrolled: 0,
            status: "active".to_string(),
        };
        store::add(&tx, &plan)?;
        records += 1;
    }

    let first_plan = ids::plan(SEMESTER, "CS101");
    store::add(
        &tx,
        &Enrollment {
            id: ids::enrollment(DEMO_STUDENT_ID, &first_plan),
            student_id: DEMO_STUDENT_ID.to_string(),
            plan_id: first_plan.clone(),
            enroll_date: "2024-09-01".to_string(),
            status: ENROLL_ACTIVE.to_string(),
        },
    )?;
    tx.execute("UPDATE plans SET enrolled = enrolled + 1 WHERE id = ?", [&first_plan])?;
    records += 1;

    let materials = [
        ("Chapter 1 - Overview.pdf", 2_621_440, "2024-09-01T08:00:00", "Chapter one slides"),
        ("Course introduction.mp4", 15_938_355, "2024-09-01T09:00:00", "Introductory video"),
        ("Algorithm diagrams.png", 159_744, "2024-09-05T10:00:00", "Common algorithm diagrams"),
    ];
    for (name, size, at, desc) in materials {
        store::add(
            &tx,
            &Material {
                id: ids::generic("mat"),
                plan_id: first_plan.clone(),
                name: name.to_string(),
                file_type: file_type_for(name).to_string(),
                url: None,
                size_bytes: size,
                description: desc.to_string(),
                uploaded_at: at.to_string(),
            },
        )?;
        records += 1;
    }

    let homework = [
        (
            "Homework 1: linked lists",
            "Implement insert, delete and find on a singly linked list.",
            "2024-12-25",
        ),
        (
            "Homework 2: tree traversal",
            "Implement pre-, in- and post-order traversal.",
            "2024-12-30",
        ),
    ];
    for (n, (title, desc, deadline)) in homework.into_iter().enumerate() {
        store::add(
            &tx,
            &Assignment {
                id: ids::assignment(&first_plan, n),
                plan_id: first_plan.clone(),
                kind: KIND_HOMEWORK.to_string(),
                title: title.to_string(),
                description: desc.to_string(),
                deadline: Some(deadline.to_string()),
                total_score: 100.0,
                weight: 15.0,
                start_time: None,
                end_time: None,
                duration_minutes: None,
                status: "published".to_string(),
                created_at: now.clone(),
            },
        )?;
        records += 1;
    }

    let comps = Components {
        attendance: Some(95.0),
        midterm: Some(82.0),
        final_exam: Some(90.0),
        homework: Some(88.0),
    };
    let total = calc::final_grade(&comps, &Weights::default());
    let score_id = ids::score(DEMO_STUDENT_ID, &first_plan);
    store::add(
        &tx,
        &Score {
            id: score_id.clone(),
            student_id: DEMO_STUDENT_ID.to_string(),
            plan_id: first_plan.clone(),
            attendance: comps.attendance,
            midterm: comps.midterm,
            final_exam: comps.final_exam,
            homework: comps.homework,
            total: Some(total),
            level: Some(calc::grade_level(total).to_string()),
            gpa: Some(calc::gpa(total)),
            published: true,
            semester: SEMESTER.to_string(),
            updated_at: now.clone(),
        },
    )?;
    records += 1;

    let details = [
        ("Attendance", 10.0, 95.0, "2024-11-20"),
        ("Homework 1", 15.0, 85.0, "2024-12-01"),
        ("Homework 2", 15.0, 90.0, "2024-12-10"),
        ("Midterm exam", 20.0, 82.0, "2024-11-15"),
        ("Final exam", 40.0, 90.0, "2024-12-20"),
    ];
    for (item, weight, score, at) in details {
        store::add(
            &tx,
            &ScoreDetail {
                id: ids::generic("detail"),
                score_id: score_id.clone(),
                item_name: item.to_string(),
                weight,
                score: Some(score),
                status: "completed".to_string(),
                submit_time: Some(at.to_string()),
            },
        )?;
        records += 1;
    }

    tx.commit()?;
    info!("event=seed module=seed status=ok records={}", records);
    Ok(SeedSummary {
        skipped: false,
        records,
    })
}
