//! Two-attempt refresh policy and the optional deadline.
//!
//! A call is tried once with the resolved (usually cached) credential. If it
//! fails, the credential is refreshed and the call is tried exactly once more.
//! The second failure is returned as-is; there is no further retry.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{ClientError, Result};
use crate::token::{Credential, TokenManager};

/// Run `action` with the credential from `resolve`; on a retryable failure,
/// get a new credential from `refresh` and run `action` once more.
///
/// `refresh` receives the credential that failed (`None` when `resolve`
/// itself failed). On success the credential that worked is returned next to
/// the action's output.
pub async fn call_with_refresh<T, R, RFut, F, FFut, A, AFut>(
    resolve: R,
    refresh: F,
    mut action: A,
) -> Result<(Credential, T)>
where
    R: FnOnce() -> RFut,
    RFut: Future<Output = Result<Credential>>,
    F: FnOnce(Option<Credential>) -> FFut,
    FFut: Future<Output = Result<Credential>>,
    A: FnMut(Credential) -> AFut,
    AFut: Future<Output = Result<T>>,
{
    let (stale, first_err) = match resolve().await {
        Ok(credential) => match action(credential.clone()).await {
            Ok(out) => return Ok((credential, out)),
            Err(e) => (Some(credential), e),
        },
        Err(e) => (None, e),
    };

    if !first_err.is_retryable() {
        return Err(first_err);
    }
    warn!(error = %first_err, "first attempt failed, refreshing credential");

    let fresh = refresh(stale).await.inspect_err(|e| {
        error!(error = %e, "credential refresh failed");
    })?;
    match action(fresh.clone()).await {
        Ok(out) => {
            info!("retry with refreshed credential succeeded");
            Ok((fresh, out))
        }
        Err(e) => {
            error!(error = %e, "retry with refreshed credential failed");
            Err(e)
        }
    }
}

/// [`call_with_refresh`] wired to a [`TokenManager`].
pub async fn with_token_refresh<T, A, AFut>(tokens: &TokenManager, action: A) -> Result<(Credential, T)>
where
    A: FnMut(Credential) -> AFut,
    AFut: Future<Output = Result<T>>,
{
    call_with_refresh(
        || tokens.resolve(),
        |stale| async move { tokens.refresh(stale.as_ref()).await },
        action,
    )
    .await
}

/// Bound `fut` by `deadline`. `None` waits indefinitely.
///
/// # Errors
/// `Timeout` when the deadline passes first; otherwise whatever `fut` returns.
pub async fn with_deadline<T, Fut>(deadline: Option<Duration>, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "deadline exceeded");
                Err(ClientError::Timeout(limit))
            }
        },
        None => fut.await,
    }
}
