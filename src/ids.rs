//! Human-readable string ids, `prefix_suffix` shaped.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `prefix_NNN` where NNN is one past the largest numeric suffix already used.
pub fn sequential<'a, I>(prefix: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let head = format!("{prefix}_");
    let max = existing
        .into_iter()
        .filter(|id| id.starts_with(&head))
        .filter_map(|id| id.rsplit('_').next())
        .filter_map(|tail| tail.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}_{:03}", max + 1)
}

pub fn teacher<'a, I>(existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    sequential("tea", existing)
}

/// `stu_<year><NNN>`, numbered from how many students already exist for that year
/// and moved forward past any number still in use.
pub fn student<'a, I>(year: i32, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let head = format!("stu_{year}");
    let taken: HashSet<&str> = existing
        .into_iter()
        .filter(|id| id.starts_with(&head))
        .collect();
    let mut n = taken.len() + 1;
    loop {
        let id = format!("{head}{n:03}");
        if !taken.contains(id.as_str()) {
            return id;
        }
        n += 1;
    }
}

pub fn course(code: &str) -> String {
    format!("crs_{code}")
}

pub fn plan(semester: &str, course_code: &str) -> String {
    format!("plan_{}_{}", semester.replace('-', "_"), course_code)
}

pub fn class_room(grade: &str, existing_in_grade: usize) -> String {
    format!("cls_{grade}_{:02}", existing_in_grade + 1)
}

pub fn score(student_id: &str, plan_id: &str) -> String {
    format!("score_{student_id}_{plan_id}")
}

pub fn enrollment(student_id: &str, plan_id: &str) -> String {
    format!("sc_{student_id}_{plan_id}")
}

pub fn assignment(plan_id: &str, existing_in_plan: usize) -> String {
    format!("assign_{plan_id}_{:02}", existing_in_plan + 1)
}

/// Timestamp-plus-random id for records without a natural key.
pub fn generic(prefix: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let random: String = Uuid::new_v4().as_bytes()[..4]
        .iter()
        .map(|b| BASE36[(*b as usize) % BASE36.len()] as char)
        .collect();
    format!("{prefix}_{}{}", to_base36(millis), random)
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
