use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Palette names assigned to new accounts in rotation.
pub const ACCOUNT_COLORS: &[&str] = &["blue", "purple", "orange", "green", "rose", "indigo", "cyan"];

pub const LOCAL_EMAIL: &str = "local@taskmerge.app";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Local,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Local => "local",
        }
    }
}

/// A task source: a linked Google identity or a local-only list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
    pub color: String,
    pub initials: String,
    pub provider: Provider,
    #[serde(default)]
    pub is_primary: bool,
}

/// Profile of the signed-in Google identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl Account {
    pub fn local(name: impl Into<String>, color: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: format!("acc_local_{}", Uuid::new_v4().simple()),
            initials: initials(&name),
            name,
            email: LOCAL_EMAIL.to_string(),
            color: color.into(),
            provider: Provider::Local,
            is_primary: false,
        }
    }

    pub fn google(profile: &User, color: impl Into<String>) -> Self {
        let name = if profile.name.trim().is_empty() {
            "Google Account".to_string()
        } else {
            profile.name.clone()
        };
        let suffix = profile
            .sub
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        Self {
            id: format!("acc_google_{}", suffix),
            initials: initials(&name),
            name,
            email: profile.email.clone(),
            color: color.into(),
            provider: Provider::Google,
            is_primary: false,
        }
    }

    pub fn is_google(&self) -> bool {
        self.provider == Provider::Google
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.initials = initials(&self.name);
    }
}

/// First two characters of a name, upper-cased.
pub fn initials(name: &str) -> String {
    name.trim().chars().take(2).collect::<String>().to_uppercase()
}

/// Palette color for the n-th account.
pub fn color_for(index: usize) -> &'static str {
    ACCOUNT_COLORS[index % ACCOUNT_COLORS.len()]
}
