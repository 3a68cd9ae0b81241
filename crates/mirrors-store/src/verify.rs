use crate::crypto::verify_cryptographic;
use crate::layout::MirrorLayout;
use crate::lock::{LockMode, TreeLock};
use crate::report::{TargetVerification, VerificationReport, VerifyMode, VerifyStatus};
use crate::signature::SignatureVerifier;
use crate::structural::verify_structure;
use crate::StoreError;
use mirrors_schema::{Distribution, ErrorKind, Target};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    pub mode: VerifyMode,
    /// Treat unsigned metadata as a failure.
    pub require_signature: bool,
    /// Upper bound on targets verified at once.
    pub max_parallel: usize,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            mode: VerifyMode::Structural,
            require_signature: true,
            max_parallel: std::thread::available_parallelism().map_or(4, usize::from),
        }
    }
}

/// Everything a verification pass reads from.
pub struct VerifyContext<'a> {
    pub layout: &'a MirrorLayout,
    pub distributions: &'a BTreeMap<String, Distribution>,
    pub verifier: Option<&'a dyn SignatureVerifier>,
    pub options: VerifyOptions,
}

/// Verify one target while holding a shared lock on its tree, so a
/// concurrent sync can never be observed half-written.
pub fn verify_target(
    ctx: &VerifyContext<'_>,
    target: &Target,
) -> Result<TargetVerification, StoreError> {
    let mode = ctx.options.mode;
    let Some(dist) = ctx.distributions.get(&target.distribution) else {
        return Ok(TargetVerification::single(
            target,
            mode,
            VerifyStatus::Failed,
            Some(ErrorKind::ConfigInvalid),
            format!("unknown distribution '{}'", target.distribution),
        ));
    };

    let _lock = if ctx.layout.tree_path(target).is_dir() {
        match TreeLock::acquire(&ctx.layout.lock_path(target), LockMode::Shared) {
            Ok(lock) => Some(lock),
            Err(e) => {
                return Ok(TargetVerification::single(
                    target,
                    mode,
                    VerifyStatus::Failed,
                    Some(ErrorKind::Io),
                    e.to_string(),
                ))
            }
        }
    } else {
        None
    };

    let result = match mode {
        VerifyMode::Structural => verify_structure(ctx.layout, dist, target),
        VerifyMode::Cryptographic => {
            let verifier = ctx.verifier.ok_or_else(|| {
                StoreError::VerifierUnavailable(
                    "cryptographic verification needs a signature verifier".to_owned(),
                )
            })?;
            verify_cryptographic(
                ctx.layout,
                dist,
                target,
                verifier,
                ctx.options.require_signature,
            )?
        }
    };

    match result.status {
        VerifyStatus::Verified => info!("{target}: verified ({mode})"),
        VerifyStatus::Missing | VerifyStatus::Failed => {
            warn!("{target}: {} - {}", result.status, result.reason);
        }
    }
    Ok(result)
}

/// Verify `targets` on a pool of at most `max_parallel` threads and collect
/// the results into a report.
///
/// An error while checking one target, such as a verifier that fails to
/// start, becomes that target's `Failed` result; the other targets are
/// still reported.
pub fn verify_targets(
    ctx: &VerifyContext<'_>,
    targets: &[Target],
) -> Result<VerificationReport, StoreError> {
    if ctx.options.mode == VerifyMode::Cryptographic && ctx.verifier.is_none() {
        return Err(StoreError::VerifierUnavailable(
            "cryptographic verification needs a signature verifier".to_owned(),
        ));
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.options.max_parallel.max(1))
        .thread_name(|i| format!("verify-{i}"))
        .build()
        .map_err(|e| StoreError::Pool(e.to_string()))?;

    let results: Vec<TargetVerification> = pool.install(|| {
        targets
            .par_iter()
            .map(|t| {
                verify_target(ctx, t).unwrap_or_else(|e| {
                    warn!("{t}: verification aborted: {e}");
                    TargetVerification::single(
                        t,
                        ctx.options.mode,
                        VerifyStatus::Failed,
                        Some(e.kind()),
                        e.to_string(),
                    )
                })
            })
            .collect()
    });
    Ok(results.into_iter().collect())
}
