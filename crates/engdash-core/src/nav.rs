use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Which view of a collection a route points at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    List,
    New,
    Details(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavError {
    #[error("empty route")]
    Empty,
    #[error("route `{0}` has too many segments (expected <collection>[/<id>|/new])")]
    TooManySegments(String),
    #[error("query parameter `{0}` is not valid UTF-8 once decoded")]
    BadEncoding(String),
}

/// Explicit navigation state handed to a page: route, query parameters
/// and a one-shot refresh flag.
///
/// Parsed from strings such as `goals`, `goals/new` or
/// `goals/12?refresh=1&q=api`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NavState {
    pub collection: String,
    pub target: Target,
    pub params: BTreeMap<String, String>,
    refresh: bool,
}

impl NavState {
    pub fn list(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    pub fn details(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            target: Target::Details(id.into()),
            ..Self::default()
        }
    }

    pub fn new_entity(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            target: Target::New,
            ..Self::default()
        }
    }

    /// Ask the receiving page to refetch its data once.
    pub fn with_refresh(mut self) -> Self {
        self.refresh = true;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Consume the refresh flag: returns it and resets it to false.
    pub fn take_refresh(&mut self) -> bool {
        std::mem::take(&mut self.refresh)
    }
}

impl FromStr for NavState {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('/');
        let (path, query) = match s.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (s, None),
        };

        let segments: Vec<&str> = path.split('/').filter(|seg| !seg.is_empty()).collect();
        let mut nav = match segments.as_slice() {
            [] => return Err(NavError::Empty),
            [collection] => NavState::list(*collection),
            [collection, "new"] => NavState::new_entity(*collection),
            [collection, id] => NavState::details(*collection, *id),
            _ => return Err(NavError::TooManySegments(s.to_string())),
        };

        for pair in query.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode(key)?;
            let value = decode(value)?;
            if key == "refresh" {
                nav.refresh = !matches!(value.as_str(), "0" | "false");
            } else {
                nav.params.insert(key, value);
            }
        }
        Ok(nav)
    }
}

fn decode(raw: &str) -> Result<String, NavError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|_| NavError::BadEncoding(raw.to_string()))
}

/// Query values are percent-encoded so `&`, `=` and `?` survive a
/// `to_string` / `parse` round trip.
impl fmt::Display for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.collection)?;
        match &self.target {
            Target::List => {}
            Target::New => write!(f, "/new")?,
            Target::Details(id) => write!(f, "/{id}")?,
        }
        let mut sep = '?';
        for (key, value) in &self.params {
            write!(
                f,
                "{sep}{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )?;
            sep = '&';
        }
        if self.refresh {
            write!(f, "{sep}refresh=1")?;
        }
        Ok(())
    }
}
