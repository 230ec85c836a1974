use crate::services::staging::StagingRepository;
use sea_orm::DbErr;

/// Duplicate-name and size-quota checks against the staging state of one
/// (session, case). Both queries are read-only and independent, so callers
/// run them concurrently with content validation and merge every violation
/// into a single report.
#[derive(Clone)]
pub struct SessionQuota {
    staging: StagingRepository,
}

impl SessionQuota {
    pub fn new(staging: StagingRepository) -> Self {
        Self { staging }
    }

    /// True when any candidate name exactly matches a staged draft's name
    /// (case-sensitive). Callers must sanitize candidate names with the
    /// same function used on the staging write path.
    pub async fn has_duplicate_name(
        &self,
        session_key: &str,
        case_id: &str,
        names: &[String],
    ) -> Result<bool, DbErr> {
        let existing = self.staging.names_in_case(session_key, case_id).await?;
        Ok(names.iter().any(|name| existing.contains(name)))
    }

    /// True when the staged total plus the candidate sizes strictly exceeds
    /// the quota. An empty staging scope counts as zero.
    pub async fn would_exceed_quota(
        &self,
        session_key: &str,
        case_id: &str,
        candidate_sizes: &[i64],
        quota_bytes: i64,
    ) -> Result<bool, DbErr> {
        let staged = self.staging.sum_sizes(session_key, case_id).await?;
        let incoming: i64 = candidate_sizes.iter().sum();
        Ok(staged + incoming > quota_bytes)
    }
}
