use std::path::Path;

use anyhow::{Context, Result};
use fantoccini::cookies::Cookie;
use serde::{Deserialize, Serialize};

/// A portal cookie kept between runs so the SMS login is only needed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl SavedCookie {
    pub fn from_cookie(cookie: &Cookie<'_>) -> Self {
        Self {
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            domain: cookie.domain().map(String::from),
            path: cookie.path().map(String::from),
            secure: cookie.secure().unwrap_or(false),
            http_only: cookie.http_only().unwrap_or(false),
        }
    }

    pub fn to_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.name.clone(), self.value.clone());
        if let Some(domain) = &self.domain {
            cookie.set_domain(domain.clone());
        }
        if let Some(path) = &self.path {
            cookie.set_path(path.clone());
        }
        cookie.set_secure(self.secure);
        cookie.set_http_only(self.http_only);
        cookie
    }
}

pub fn save(path: &Path, cookies: &[SavedCookie]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(cookies)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn load(path: &Path) -> Result<Vec<SavedCookie>> {
    let json = std::fs::read_to_string(path).with_context(|| {
        format!("No saved session at {} (run `login` first)", path.display())
    })?;
    serde_json::from_str(&json).with_context(|| format!("Corrupt session file {}", path.display()))
}
