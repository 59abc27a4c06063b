use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use tracing::info;

use super::domain::{AccessToken, Student, StudentId, StudentProfile};
use super::repository::{ClearanceStore, RepositoryError};

const TOKEN_BYTES: usize = 16;

/// 32 lowercase hex characters from the OS random source.
pub fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedLink {
    pub student_id: StudentId,
    pub unique_token: String,
    pub clearance_link: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub email_dispatched: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkBatch {
    pub generated: Vec<GeneratedLink>,
    pub missing: Vec<StudentId>,
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("access link not found")]
    NotFound,
    #[error("access link expired at {0}")]
    Expired(DateTime<Utc>),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("link dispatch failed: {0}")]
    Transport(String),
}

/// Delivers a freshly minted link to the student.
pub trait LinkDispatcher: Send + Sync {
    fn dispatch(&self, student: &Student, link: &str) -> Result<(), DispatchError>;
}

/// Records the dispatch in the log instead of sending mail.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

impl LinkDispatcher for LoggingDispatcher {
    fn dispatch(&self, student: &Student, link: &str) -> Result<(), DispatchError> {
        info!(student_id = %student.id, email = %student.email, link, "clearance link dispatched");
        Ok(())
    }
}

/// Mints, rotates and resolves per-student portal links.
pub struct AccessLinks {
    store: Arc<dyn ClearanceStore>,
    dispatcher: Arc<dyn LinkDispatcher>,
    base_url: String,
    validity: Duration,
}

impl AccessLinks {
    pub fn new(
        store: Arc<dyn ClearanceStore>,
        dispatcher: Arc<dyn LinkDispatcher>,
        base_url: impl Into<String>,
        validity_days: i64,
    ) -> Self {
        Self {
            store,
            dispatcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            validity: Duration::days(validity_days.max(1)),
        }
    }

    pub fn issue(&self, now: DateTime<Utc>) -> AccessToken {
        AccessToken {
            token: mint_token(),
            generated_at: now,
            expires_at: now + self.validity,
        }
    }

    /// Student record for a first-time submission, with a fresh link.
    pub fn enroll(&self, profile: StudentProfile, now: DateTime<Utc>) -> Student {
        Student::from_profile(profile, self.issue(now), now)
    }

    pub fn link_for(&self, token: &str) -> String {
        format!("{}/clearance/{}", self.base_url, token)
    }

    /// Rotate the token of every listed student. Unknown ids are reported, not fatal,
    /// and a failed dispatch leaves the new token in place.
    pub fn regenerate(
        &self,
        student_ids: &[StudentId],
        send_email: bool,
        now: DateTime<Utc>,
    ) -> Result<LinkBatch, AccessError> {
        let mut batch = LinkBatch {
            generated: Vec::new(),
            missing: Vec::new(),
        };

        for id in student_ids {
            let Some(mut student) = self.store.fetch_student(id)? else {
                batch.missing.push(id.clone());
                continue;
            };
            student.access = self.issue(now);
            student.last_updated = now;
            self.store.update_student(student.clone())?;

            let link = self.link_for(&student.access.token);
            let email_dispatched = send_email
                && match self.dispatcher.dispatch(&student, &link) {
                    Ok(()) => true,
                    Err(error) => {
                        tracing::warn!(student_id = %student.id, %error, "link dispatch failed");
                        false
                    }
                };

            batch.generated.push(GeneratedLink {
                student_id: student.id.clone(),
                unique_token: student.access.token.clone(),
                clearance_link: link,
                generated_at: student.access.generated_at,
                expires_at: student.access.expires_at,
                is_active: true,
                email_dispatched,
            });
        }

        info!(
            generated = batch.generated.len(),
            missing = batch.missing.len(),
            "clearance links regenerated"
        );
        Ok(batch)
    }

    pub fn resolve(&self, token: &str, now: DateTime<Utc>) -> Result<Student, AccessError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AccessError::NotFound);
        }
        let student = self
            .store
            .find_student_by_token(token)?
            .ok_or(AccessError::NotFound)?;
        if student.access.is_expired(now) {
            return Err(AccessError::Expired(student.access.expires_at));
        }
        Ok(student)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_32_lowercase_hex_chars() {
        let token = mint_token();
        assert_eq!(token.len(), 32);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_ne!(token, mint_token());
    }
}
