pub mod assignments;
pub mod classes;
pub mod core;
pub mod courses;
pub mod dashboard;
pub mod enrollments;
pub mod grades;
pub mod materials;
pub mod plans;
pub mod setup;
pub mod submissions;
pub mod users;
