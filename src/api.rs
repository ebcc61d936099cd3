pub mod amber;
pub mod home_assistant;
