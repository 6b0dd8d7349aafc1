use serde::{Deserialize, Serialize};

/// User on whose behalf an indexing request is made
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingUser {
    pub id: i64,
    pub username: String,
    pub is_superuser: bool,
}

impl ActingUser {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            is_superuser: false,
        }
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }
}
