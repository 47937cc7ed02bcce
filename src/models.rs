use crate::store::{flag, opt_int, opt_real, opt_text, text, Record};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub const ROLE_STUDENT: &str = "student";
pub const ROLE_TEACHER: &str = "teacher";
pub const ROLE_ADMIN: &str = "admin";

pub const COURSE_DRAFT: &str = "draft";
pub const COURSE_PUBLISHED: &str = "published";
pub const COURSE_ARCHIVED: &str = "archived";

pub const ENROLL_ACTIVE: &str = "active";
pub const ENROLL_COMPLETED: &str = "completed";

pub const KIND_HOMEWORK: &str = "homework";
pub const KIND_EXAM: &str = "exam";

pub const SUBMISSION_SUBMITTED: &str = "submitted";
pub const SUBMISSION_GRADED: &str = "graded";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub student_no: Option<String>,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub created_at: String,
}

impl Record for User {
    const STORE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "username",
        "name",
        "role",
        "student_no",
        "class_id",
        "department",
        "title",
        "gender",
        "email",
        "phone",
        "created_at",
    ];
    const INDEXES: &'static [&'static str] = &["username", "student_no", "role", "class_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            name: row.get(2)?,
            role: row.get(3)?,
            student_no: row.get(4)?,
            class_id: row.get(5)?,
            department: row.get(6)?,
            title: row.get(7)?,
            gender: row.get(8)?,
            email: row.get(9)?,
            phone: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.id),
            text(&self.username),
            text(&self.name),
            text(&self.role),
            opt_text(&self.student_no),
            opt_text(&self.class_id),
            opt_text(&self.department),
            opt_text(&self.title),
            opt_text(&self.gender),
            opt_text(&self.email),
            opt_text(&self.phone),
            text(&self.created_at),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRoom {
    pub id: String,
    pub name: String,
    pub grade: String,
    #[serde(default)]
    pub department: Option<String>,
    pub created_at: String,
}

impl Record for ClassRoom {
    const STORE: &'static str = "classes";
    const COLUMNS: &'static [&'static str] = &["id", "name", "grade", "department", "created_at"];
    const INDEXES: &'static [&'static str] = &["name", "grade"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            grade: row.get(2)?,
            department: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.id),
            text(&self.name),
            text(&self.grade),
            opt_text(&self.department),
            text(&self.created_at),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub code: String,
    pub name: String,
    pub credits: f64,
    #[serde(default)]
    pub department: Option<String>,
    pub category: String,
    pub description: String,
    pub status: String,
    #[serde(default)]
    pub allow_preview: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Record for Course {
    const STORE: &'static str = "courses";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "code",
        "name",
        "credits",
        "department",
        "category",
        "description",
        "status",
        "allow_preview",
        "created_at",
        "updated_at",
    ];
    const INDEXES: &'static [&'static str] = &["code", "department", "status", "category"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            credits: row.get(3)?,
            department: row.get(4)?,
            category: row.get(5)?,
            description: row.get(6)?,
            status: row.get(7)?,
            allow_preview: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.id),
            text(&self.code),
            text(&self.name),
            Value::Real(self.credits),
            opt_text(&self.department),
            text(&self.category),
            text(&self.description),
            text(&self.status),
            flag(self.allow_preview),
            text(&self.created_at),
            text(&self.updated_at),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub course_id: String,
    pub teacher_id: String,
    pub semester: String,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub classroom: Option<String>,
    pub capacity: i64,
    #[serde(default)]
    pub enrolled: i64,
    pub status: String,
}

impl Record for Plan {
    const STORE: &'static str = "plans";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "course_id",
        "teacher_id",
        "semester",
        "class_id",
        "schedule",
        "classroom",
        "capacity",
        "enrolled",
        "status",
    ];
    const INDEXES: &'static [&'static str] = &["course_id", "teacher_id", "semester", "class_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            course_id: row.get(1)?,
            teacher_id: row.get(2)?,
            semester: row.get(3)?,
            class_id: row.get(4)?,
            schedule: row.get(5)?,
            classroom: row.get(6)?,
            capacity: row.get(7)?,
            enrolled: row.get(8)?,
            status: row.get(9)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.id),
            text(&self.course_id),
            text(&self.teacher_id),
            text(&self.semester),
            opt_text(&self.class_id),
            opt_text(&self.schedule),
            opt_text(&self.classroom),
            Value::Integer(self.capacity),
            Value::Integer(self.enrolled),
            text(&self.status),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub plan_id: String,
    pub enroll_date: String,
    pub status: String,
}

impl Record for Enrollment {
    const STORE: &'static str = "enrollments";
    const COLUMNS: &'static [&'static str] =
        &["id", "student_id", "plan_id", "enroll_date", "status"];
    const INDEXES: &'static [&'static str] = &["student_id", "plan_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            student_id: row.get(1)?,
            plan_id: row.get(2)?,
            enroll_date: row.get(3)?,
            status: row.get(4)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.id),
            text(&self.student_id),
            text(&self.plan_id),
            text(&self.enroll_date),
            text(&self.status),
        ]
    }
}

/// One student's grade-book row for one plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub id: String,
    pub student_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub attendance: Option<f64>,
    #[serde(default)]
    pub midterm: Option<f64>,
    #[serde(default, rename = "final")]
    pub final_exam: Option<f64>,
    #[serde(default)]
    pub homework: Option<f64>,
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub gpa: Option<f64>,
    #[serde(default)]
    pub published: bool,
    pub semester: String,
    pub updated_at: String,
}

impl Record for Score {
    const STORE: &'static str = "scores";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "student_id",
        "plan_id",
        "attendance",
        "midterm",
        "final_exam",
        "homework",
        "total",
        "level",
        "gpa",
        "published",
        "semester",
        "updated_at",
    ];
    const INDEXES: &'static [&'static str] = &["student_id", "plan_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            student_id: row.get(1)?,
            plan_id: row.get(2)?,
            attendance: row.get(3)?,
            midterm: row.get(4)?,
            final_exam: row.get(5)?,
            homework: row.get(6)?,
            total: row.get(7)?,
            level: row.get(8)?,
            gpa: row.get(9)?,
            published: row.get(10)?,
            semester: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.id),
            text(&self.student_id),
            text(&self.plan_id),
            opt_real(self.attendance),
            opt_real(self.midterm),
            opt_real(self.final_exam),
            opt_real(self.homework),
            opt_int(self.total),
            opt_text(&self.level),
            opt_real(self.gpa),
            flag(self.published),
            text(&self.semester),
            text(&self.updated_at),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDetail {
    pub id: String,
    pub score_id: String,
    pub item_name: String,
    pub weight: f64,
    #[serde(default)]
    pub score: Option<f64>,
    pub status: String,
    #[serde(default)]
    pub submit_time: Option<String>,
}

impl Record for ScoreDetail {
    const STORE: &'static str = "score_details";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "score_id",
        "item_name",
        "weight",
        "score",
        "status",
        "submit_time",
    ];
    const INDEXES: &'static [&'static str] = &["score_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            score_id: row.get(1)?,
            item_name: row.get(2)?,
            weight: row.get(3)?,
            score: row.get(4)?,
            status: row.get(5)?,
            submit_time: row.get(6)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.id),
            text(&self.score_id),
            text(&self.item_name),
            Value::Real(self.weight),
            opt_real(self.score),
            text(&self.status),
            opt_text(&self.submit_time),
        ]
    }
}

/// Material category from the file extension, case-insensitive.
pub fn file_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "doc" | "docx" | "txt" | "rtf" => "doc",
        "pdf" => "pdf",
        "ppt" | "pptx" => "ppt",
        "xls" | "xlsx" => "excel",
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" => "image",
        "mp4" | "avi" | "mov" | "mkv" | "wmv" | "flv" => "video",
        "mp3" | "wav" | "flac" | "aac" | "ogg" => "audio",
        "zip" | "rar" | "7z" | "tar" | "gz" => "archive",
        _ => "other",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    pub plan_id: String,
    pub name: String,
    pub file_type: String,
    #[serde(default)]
    pub url: Option<String>,
    pub size_bytes: i64,
    #[serde(default)]
    pub description: String,
    pub uploaded_at: String,
}

impl Record for Material {
    const STORE: &'static str = "materials";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "plan_id",
        "name",
        "file_type",
        "url",
        "size_bytes",
        "description",
        "uploaded_at",
    ];
    const INDEXES: &'static [&'static str] = &["plan_id", "file_type"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            plan_id: row.get(1)?,
            name: row.get(2)?,
            file_type: row.get(3)?,
            url: row.get(4)?,
            size_bytes: row.get(5)?,
            description: row.get(6)?,
            uploaded_at: row.get(7)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.id),
            text(&self.plan_id),
            text(&self.name),
            text(&self.file_type),
            opt_text(&self.url),
            Value::Integer(self.size_bytes),
            text(&self.description),
            text(&self.uploaded_at),
        ]
    }
}

/// Homework or exam attached to a plan. Exams carry a time window instead of a deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub plan_id: String,
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deadline: Option<String>,
    pub total_score: f64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    pub status: String,
    pub created_at: String,
}

impl Record for Assignment {
    const STORE: &'static str = "assignments";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "plan_id",
        "kind",
        "title",
        "description",
        "deadline",
        "total_score",
        "weight",
        "start_time",
        "end_time",
        "duration_minutes",
        "status",
        "created_at",
    ];
    const INDEXES: &'static [&'static str] = &["plan_id", "kind", "deadline"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            plan_id: row.get(1)?,
            kind: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            deadline: row.get(5)?,
            total_score: row.get(6)?,
            weight: row.get(7)?,
            start_time: row.get(8)?,
            end_time: row.get(9)?,
            duration_minutes: row.get(10)?,
            status: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.id),
            text(&self.plan_id),
            text(&self.kind),
            text(&self.title),
            text(&self.description),
            opt_text(&self.deadline),
            Value::Real(self.total_score),
            Value::Real(self.weight),
            opt_text(&self.start_time),
            opt_text(&self.end_time),
            opt_int(self.duration_minutes),
            text(&self.status),
            text(&self.created_at),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    pub submit_time: String,
    pub status: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub graded_at: Option<String>,
}

impl Submission {
    pub fn is_graded(&self) -> bool {
        self.status == SUBMISSION_GRADED
    }
}

impl Record for Submission {
    const STORE: &'static str = "submissions";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "assignment_id",
        "student_id",
        "content",
        "file_name",
        "submit_time",
        "status",
        "score",
        "feedback",
        "graded_at",
    ];
    const INDEXES: &'static [&'static str] = &["assignment_id", "student_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            assignment_id: row.get(1)?,
            student_id: row.get(2)?,
            content: row.get(3)?,
            file_name: row.get(4)?,
            submit_time: row.get(5)?,
            status: row.get(6)?,
            score: row.get(7)?,
            feedback: row.get(8)?,
            graded_at: row.get(9)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.id),
            text(&self.assignment_id),
            text(&self.student_id),
            opt_text(&self.content),
            opt_text(&self.file_name),
            text(&self.submit_time),
            text(&self.status),
            opt_real(self.score),
            opt_text(&self.feedback),
            opt_text(&self.graded_at),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub id: String,
    pub material_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub downloaded_at: String,
}

impl Record for DownloadRecord {
    const STORE: &'static str = "download_history";
    const COLUMNS: &'static [&'static str] = &["id", "material_id", "user_id", "downloaded_at"];
    const INDEXES: &'static [&'static str] = &["material_id", "user_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            material_id: row.get(1)?,
            user_id: row.get(2)?,
            downloaded_at: row.get(3)?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.id),
            text(&self.material_id),
            opt_text(&self.user_id),
            text(&self.downloaded_at),
        ]
    }
}
