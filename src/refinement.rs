pub mod restricted;
pub mod surplus;
pub mod user_defined;
