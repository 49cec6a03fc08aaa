//! Access gating for lecture streams
//!
//! Evaluates whether the requesting principal may view a lecture's primary
//! or preview asset before any upstream connection is opened. The course and
//! purchase data live in an external store; this module only consumes it
//! through the [`CourseCatalog`] seam.

use crate::error::{RelayError, Result};
use crate::models::{AccessDecision, Course, Lecture, Principal};
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Lookup contract for lecture/course/purchase state.
///
/// Implemented by the platform's document store in production; a
/// [`StaticCatalog`] ships for the binary and tests.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn lecture(&self, lecture_id: &str) -> Result<Option<Lecture>>;

    async fn course(&self, course_id: &str) -> Result<Option<Course>>;

    /// Whether an active access grant exists for (user, course).
    async fn has_active_grant(&self, user_id: &str, course_id: &str) -> Result<bool>;
}

/// Bearer token claims. Tokens minted by the platform carry the user id
/// under either `_id` or `id`.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "_id")]
    mongo_id: Option<String>,
    id: Option<String>,
    email: Option<String>,
    #[allow(dead_code)]
    exp: usize,
}

/// Evaluates access for lecture stream requests.
pub struct AccessGate<C: CourseCatalog> {
    catalog: C,
    jwt_secret: Option<String>,
}

impl<C: CourseCatalog> AccessGate<C> {
    pub fn new(catalog: C, jwt_secret: Option<String>) -> Self {
        AccessGate {
            catalog,
            jwt_secret,
        }
    }

    /// Extract the principal from the request credentials.
    ///
    /// The Authorization header takes precedence over the `token` query
    /// parameter (used by players that cannot set headers on media
    /// requests). Every parse or verification failure degrades to
    /// anonymous - a public preview must stay playable without credentials.
    pub fn principal_from_request(
        &self,
        auth_header: Option<&str>,
        query_token: Option<&str>,
    ) -> Option<Principal> {
        if let Some(header) = auth_header {
            if let Some(token) = header.strip_prefix("Bearer ") {
                if let Some(principal) = self.verify_token(token.trim()) {
                    return Some(principal);
                }
                debug!("Authorization header token rejected, trying query token");
            }
        }

        query_token.and_then(|token| self.verify_token(token))
    }

    fn verify_token(&self, token: &str) -> Option<Principal> {
        let secret = self.jwt_secret.as_deref()?;
        let key = DecodingKey::from_secret(secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);

        match decode::<Claims>(token, &key, &validation) {
            Ok(data) => {
                let id = data.claims.mongo_id.or(data.claims.id)?;
                Some(Principal {
                    id,
                    email: data.claims.email,
                })
            }
            Err(e) => {
                debug!("Token verification failed: {}", e);
                None
            }
        }
    }

    /// Authorize a lecture stream and return the upstream URL to proxy.
    ///
    /// Errors: 404 for unknown lectures and unknown/inactive courses, 401
    /// when access is denied and no principal was established, 403 when a
    /// verified principal lacks access (or the lecture has no playable URL).
    pub async fn authorize(
        &self,
        lecture_id: &str,
        principal: Option<&Principal>,
    ) -> Result<String> {
        let lecture = self
            .catalog
            .lecture(lecture_id)
            .await?
            .ok_or(RelayError::LectureNotFound)?;

        let course = self
            .catalog
            .course(&lecture.course_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or(RelayError::CourseNotFound)?;

        let has_grant = match principal {
            Some(principal) if course.requires_purchase() => {
                self.catalog
                    .has_active_grant(&principal.id, &course.id)
                    .await?
            }
            _ => false,
        };

        let decision = decide(&lecture, &course, has_grant);
        debug!(
            "Access decision for lecture={}: allowed={}, principal={:?}",
            lecture_id,
            decision.allowed,
            principal.map(|p| p.id.as_str())
        );

        if !decision.allowed {
            return Err(match principal {
                Some(_) => RelayError::AccessDenied,
                None => RelayError::AuthRequired,
            });
        }

        decision.target_url.ok_or(RelayError::AccessDenied)
    }
}

/// The pure decision rule: allowed if the lecture is a preview, OR the
/// course is free, OR the viewer holds an active grant. Previews play the
/// preview URL, falling back to the primary URL.
pub fn decide(lecture: &Lecture, course: &Course, has_grant: bool) -> AccessDecision {
    let allowed = lecture.is_preview || !course.requires_purchase() || has_grant;

    let target_url = if lecture.is_preview {
        lecture
            .preview_url
            .clone()
            .or_else(|| lecture.video_url.clone())
    } else {
        lecture.video_url.clone()
    };

    AccessDecision {
        allowed,
        target_url,
    }
}

/// In-memory catalog backed by a YAML file. Stands in for the platform's
/// document store when the relay runs standalone.
#[derive(Debug, Default, Deserialize)]
pub struct StaticCatalog {
    #[serde(default, deserialize_with = "deserialize_lectures")]
    lectures: HashMap<String, Lecture>,
    #[serde(default, deserialize_with = "deserialize_courses")]
    courses: HashMap<String, Course>,
    #[serde(default, deserialize_with = "deserialize_grants")]
    grants: HashSet<(String, String)>,
}

impl StaticCatalog {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RelayError::CatalogError(format!(
                "Failed to read catalog file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| RelayError::CatalogError(format!("Failed to parse catalog: {}", e)))
    }

    pub fn with_lecture(mut self, lecture: Lecture) -> Self {
        self.lectures.insert(lecture.id.clone(), lecture);
        self
    }

    pub fn with_course(mut self, course: Course) -> Self {
        self.courses.insert(course.id.clone(), course);
        self
    }

    pub fn with_grant(mut self, user_id: &str, course_id: &str) -> Self {
        self.grants
            .insert((user_id.to_string(), course_id.to_string()));
        self
    }
}

#[async_trait]
impl CourseCatalog for StaticCatalog {
    async fn lecture(&self, lecture_id: &str) -> Result<Option<Lecture>> {
        Ok(self.lectures.get(lecture_id).cloned())
    }

    async fn course(&self, course_id: &str) -> Result<Option<Course>> {
        Ok(self.courses.get(course_id).cloned())
    }

    async fn has_active_grant(&self, user_id: &str, course_id: &str) -> Result<bool> {
        Ok(self
            .grants
            .contains(&(user_id.to_string(), course_id.to_string())))
    }
}

fn deserialize_lectures<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, Lecture>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let list = Vec::<Lecture>::deserialize(deserializer)?;
    Ok(list.into_iter().map(|l| (l.id.clone(), l)).collect())
}

fn deserialize_courses<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, Course>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let list = Vec::<Course>::deserialize(deserializer)?;
    Ok(list.into_iter().map(|c| (c.id.clone(), c)).collect())
}

#[derive(Deserialize)]
struct GrantEntry {
    user_id: String,
    course_id: String,
}

fn deserialize_grants<'de, D>(deserializer: D) -> std::result::Result<HashSet<(String, String)>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let list = Vec::<GrantEntry>::deserialize(deserializer)?;
    Ok(list
        .into_iter()
        .map(|g| (g.user_id, g.course_id))
        .collect())
}
