use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TAG_COLORS: &[&str] = &["blue", "purple", "green", "orange", "pink", "teal", "indigo"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: format!("tag_{}", Uuid::new_v4().simple()),
            name: name.into(),
            color: color.into(),
        }
    }
}
