pub mod reasoning;
pub mod types;
