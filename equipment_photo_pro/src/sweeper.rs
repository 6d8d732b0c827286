//! Equipment Photo Pro - Background Cleanup
//!
//! Deletes expired uploads and dead sessions/codes on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use photo_pro_auth::CleanupReport;
use tokio::task::JoinHandle;

use crate::error::AppResult;
use crate::state::AppState;
use crate::uploads::SweepReport;

/// What one cleanup pass removed
#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub uploads: SweepReport,
    pub auth: CleanupReport,
}

/// One cleanup pass
pub fn run_once(state: &AppState, retention: Duration) -> AppResult<SweepSummary> {
    Ok(SweepSummary {
        uploads: state.uploads.sweep(retention)?,
        auth: state.auth.cleanup()?,
    })
}

/// Start the cleanup loop; the first pass runs immediately
pub fn spawn(state: Arc<AppState>, retention: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let state = state.clone();
            let result = tokio::task::spawn_blocking(move || run_once(&state, retention)).await;

            match result {
                Ok(Ok(summary)) => tracing::debug!(
                    uploads_removed = summary.uploads.removed,
                    sessions_removed = summary.auth.sessions_removed,
                    codes_removed = summary.auth.codes_removed,
                    "cleanup pass finished"
                ),
                Ok(Err(e)) => tracing::warn!("cleanup pass failed: {}", e),
                Err(e) => tracing::error!("cleanup task panicked: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UploadLimits;
    use crate::uploads::UploadStore;
    use photo_pro_auth::{AuthPolicy, AuthService, AuthStore, MemoryMailer, TrialPolicy};
    use tempfile::tempdir;

    fn state(root: &std::path::Path) -> AppState {
        let auth = AuthService::new(
            AuthStore::open_in_memory().unwrap(),
            Arc::new(MemoryMailer::new()),
            AuthPolicy::default(),
            TrialPolicy::default(),
        );
        AppState::new(auth, None, UploadStore::new(root).unwrap(), UploadLimits::default())
    }

    #[test]
    fn test_run_once_removes_expired_uploads() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        state.uploads.write_file("old.jpg", b"data").unwrap();

        let summary = run_once(&state, Duration::ZERO).unwrap();
        assert_eq!(summary.uploads.removed, 1);
        assert!(!state.uploads.exists("old.jpg"));

        state.uploads.write_file("fresh.jpg", b"data").unwrap();
        let summary = run_once(&state, Duration::from_secs(3600)).unwrap();
        assert_eq!(summary.uploads.kept, 1);
        assert!(state.uploads.exists("fresh.jpg"));
    }

    #[tokio::test]
    async fn test_spawned_loop_runs_first_pass() {
        let dir = tempdir().unwrap();
        let state = Arc::new(state(dir.path()));
        state.uploads.write_file("old.jpg", b"data").unwrap();

        let handle = spawn(state.clone(), Duration::ZERO, Duration::from_secs(3600));
        for _ in 0..50 {
            if !state.uploads.exists("old.jpg") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();

        assert!(!state.uploads.exists("old.jpg"));
    }
}
