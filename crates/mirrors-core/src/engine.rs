use crate::cancel::CancelToken;
use crate::command::{build_plan, SyncPlan};
use crate::scheduler::{JobStream, Scheduler, SchedulerOptions};
use crate::CoreError;
use mirrors_runtime::{select_backend, Sandbox};
use mirrors_schema::{expand_targets, ConfigError, Granularity, MirrorConfig, Target};
use mirrors_store::{
    verify_targets, GpgvVerifier, LockMode, MirrorLayout, SignatureVerifier, StoreError, TreeLock,
    VerificationReport, VerifyContext, VerifyMode, VerifyOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Which targets an operation covers.
#[derive(Debug, Clone, Default)]
pub struct TargetFilter {
    pub distribution: Option<String>,
    pub version: Option<String>,
    pub granularity: Granularity,
}

/// Per-run overrides of the configured sync settings.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub concurrency: Option<usize>,
    pub job_timeout: Option<Duration>,
    /// Sandbox backend name; defaults to the configured container runtime.
    pub backend: Option<String>,
    pub tick: Option<Duration>,
}

/// Entry point for syncing and verifying the mirrors described by one
/// configuration snapshot.
pub struct Engine {
    config: MirrorConfig,
    layout: MirrorLayout,
}

impl Engine {
    pub fn new(config: MirrorConfig) -> Self {
        let layout = MirrorLayout::from_config(&config);
        Self { config, layout }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn layout(&self) -> &MirrorLayout {
        &self.layout
    }

    /// Expand the configured distributions into targets. Disabled
    /// distributions are included so a sync can report them as skipped.
    pub fn targets(&self, filter: &TargetFilter) -> Result<Vec<Target>, CoreError> {
        let mut targets = match &filter.distribution {
            Some(name) => {
                let dist = self.config.distribution(name)?;
                if let Some(version) = &filter.version {
                    if !dist.versions.contains(version) {
                        return Err(ConfigError::InvalidSetting(format!(
                            "version '{version}' is not configured for '{name}'"
                        ))
                        .into());
                    }
                }
                expand_targets([dist], filter.granularity)
            }
            None => expand_targets(self.config.distributions.values(), filter.granularity),
        };
        if let Some(version) = &filter.version {
            targets.retain(|t| &t.version == version);
        }
        Ok(targets)
    }

    /// The configuration and command a sync of `target` would run.
    pub fn plan(&self, target: &Target) -> Result<SyncPlan, CoreError> {
        let dist = self.config.distribution(&target.distribution)?;
        build_plan(dist, target)
    }

    fn scheduler_options(&self, options: &SyncOptions) -> SchedulerOptions {
        let defaults = SchedulerOptions::default();
        SchedulerOptions {
            concurrency: options
                .concurrency
                .unwrap_or(self.config.max_concurrent_syncs)
                .max(1),
            job_timeout: options
                .job_timeout
                .or(self.config.job_timeout_secs.map(Duration::from_secs)),
            tick: options.tick.unwrap_or(defaults.tick),
        }
    }

    /// Sync `targets` with the configured (or overridden) sandbox backend.
    pub fn sync(
        &self,
        targets: Vec<Target>,
        options: &SyncOptions,
        cancel: &CancelToken,
    ) -> Result<JobStream, CoreError> {
        let backend = options
            .backend
            .as_deref()
            .unwrap_or(&self.config.container_runtime);
        let sandbox = select_backend(backend).map_err(|e| {
            if e.is_unavailable() {
                CoreError::SandboxUnavailable(e.to_string())
            } else {
                e.into()
            }
        })?;
        self.sync_with(sandbox, targets, options, cancel)
    }

    /// Sync `targets` with an explicit sandbox backend.
    pub fn sync_with(
        &self,
        sandbox: Arc<dyn Sandbox>,
        targets: Vec<Target>,
        options: &SyncOptions,
        cancel: &CancelToken,
    ) -> Result<JobStream, CoreError> {
        let opts = self.scheduler_options(options);
        info!(
            "syncing {} target(s) with {} (concurrency {})",
            targets.len(),
            sandbox.name(),
            opts.concurrency
        );
        Scheduler::new(sandbox, self.layout.clone(), opts).run(
            &self.config.distributions,
            targets,
            cancel,
        )
    }

    pub fn verify_options(&self, mode: VerifyMode, require_signature: bool) -> VerifyOptions {
        let defaults = VerifyOptions::default();
        VerifyOptions {
            mode,
            require_signature,
            max_parallel: self
                .config
                .max_concurrent_verifications
                .unwrap_or(defaults.max_parallel)
                .max(1),
        }
    }

    /// Verify `targets`, checking signatures with `gpgv` against the
    /// configured keyring in cryptographic mode.
    pub fn verify(
        &self,
        targets: &[Target],
        options: VerifyOptions,
    ) -> Result<VerificationReport, CoreError> {
        match options.mode {
            VerifyMode::Structural => self.verify_with(targets, options, None),
            VerifyMode::Cryptographic => {
                let keyring = self.config.keyring_path.as_ref().ok_or_else(|| {
                    StoreError::VerifierUnavailable(
                        "keyring_path is not set in the configuration".to_owned(),
                    )
                })?;
                if !keyring.is_file() {
                    return Err(StoreError::VerifierUnavailable(format!(
                        "keyring not found at {}",
                        keyring.display()
                    ))
                    .into());
                }
                let verifier = GpgvVerifier::new(keyring);
                self.verify_with(targets, options, Some(&verifier))
            }
        }
    }

    /// Verify `targets` with an explicit signature verifier and fold the
    /// results into the persisted report. Returns this pass's results only.
    pub fn verify_with(
        &self,
        targets: &[Target],
        options: VerifyOptions,
        verifier: Option<&dyn SignatureVerifier>,
    ) -> Result<VerificationReport, CoreError> {
        let ctx = VerifyContext {
            layout: &self.layout,
            distributions: &self.config.distributions,
            verifier,
            options,
        };
        let report = verify_targets(&ctx, targets)?;

        let path = self.layout.report_path();
        let _guard = TreeLock::acquire(&self.layout.report_lock_path(), LockMode::Exclusive)?;
        let merged = VerificationReport::load_or_default(&path)?.merge(report.clone());
        merged.save(&path)?;
        debug!("verification report saved to {}", path.display());
        Ok(report)
    }

    /// The merged report of every verification pass so far.
    pub fn latest_report(&self) -> Result<VerificationReport, CoreError> {
        Ok(VerificationReport::load_or_default(&self.layout.report_path())?)
    }

    /// Whether stale content of `target` may be cleaned up: only once its
    /// latest verification says `Verified`.
    pub fn cleanup_allowed(&self, target: &Target) -> Result<bool, CoreError> {
        Ok(self.latest_report()?.cleanup_allowed(&target.key()))
    }
}
