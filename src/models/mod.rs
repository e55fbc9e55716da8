use serde::{Deserialize, Serialize};

pub mod activity;
pub mod forum;
pub mod learning;
pub mod mood;
pub mod survey;
pub mod user;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}
