//! Pipeline driver.
//!
//! Runs stages 1-7 strictly in order, stops at the first failure, then runs
//! cleanup exactly once whatever happened. Cleanup failures are logged and
//! never replace the error that ended the run.
//!
//! Interrupts arrive as a shared flag (set by the binary's signal handler).
//! The driver checks it before every stage; the setup stage also checks it
//! before every command. A stage that fails while the flag is set is
//! reported as [`PipelineError::Interrupted`], since the child tool most
//! likely died from the same signal.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::artifact::{ImageTools, IsoOptions};
use crate::build::context::{BuildConfig, BuildContext};
use crate::config::{load_or_empty, DependencySpec, Format, SetupSpec};
use crate::executor::IsolatedExecutor;
use crate::fetch::{FetchOutcome, Fetcher};
use crate::preflight;
use crate::stages::s03_unpack_rootfs::HOST_RESOLV_CONF;
use crate::stages::s05_setup::SetupSummary;
use crate::stages::{
    s01_fetch, s02_unpack_image, s03_unpack_rootfs, s04_dependencies, s05_setup, s06_repack,
    s07_assemble, s08_cleanup,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preflight,
    Fetch,
    UnpackImage,
    UnpackRootfs,
    Dependencies,
    Setup,
    Repack,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preflight => "preflight",
            Stage::Fetch => "fetch base image",
            Stage::UnpackImage => "unpack image",
            Stage::UnpackRootfs => "unpack root filesystem",
            Stage::Dependencies => "install dependencies",
            Stage::Setup => "setup",
            Stage::Repack => "repack root filesystem",
            Stage::Assemble => "assemble image",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("interrupted during '{stage}'")]
    Interrupted { stage: Stage },

    #[error("stage '{stage}' failed: {source:#}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Interrupted { stage } | PipelineError::StageFailed { stage, .. } => {
                *stage
            }
        }
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, PipelineError::Interrupted { .. })
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub fetch: FetchOutcome,
    pub setup: SetupSummary,
    pub output_image: PathBuf,
}

pub struct Pipeline<'a> {
    config: BuildConfig,
    ctx: BuildContext,
    executor: &'a dyn IsolatedExecutor,
    fetcher: &'a dyn Fetcher,
    tools: &'a dyn ImageTools,
    interrupted: Arc<AtomicBool>,
    host_resolv: PathBuf,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: BuildConfig,
        executor: &'a dyn IsolatedExecutor,
        fetcher: &'a dyn Fetcher,
        tools: &'a dyn ImageTools,
    ) -> Self {
        let ctx = BuildContext::new(&config);
        Self {
            config,
            ctx,
            executor,
            fetcher,
            tools,
            interrupted: Arc::new(AtomicBool::new(false)),
            host_resolv: PathBuf::from(HOST_RESOLV_CONF),
        }
    }

    /// Share the flag a signal handler sets.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    /// Resolver config to seed into the root instead of the host's.
    pub fn with_host_resolv(mut self, path: &Path) -> Self {
        self.host_resolv = path.to_path_buf();
        self
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Run the whole build. `keep` skips removal of the working directories.
    ///
    /// A failed preflight returns before anything is touched, so there is
    /// nothing to clean up.
    pub fn run(&self, keep: bool) -> Result<BuildReport, PipelineError> {
        if self.config.preflight {
            preflight::check_host().map_err(|source| PipelineError::StageFailed {
                stage: Stage::Preflight,
                source,
            })?;
        }

        let result = self.run_stages();

        // Exactly once, on success and failure alike
        if let Err(e) = s08_cleanup::run(&self.ctx, keep) {
            error!("cleanup failed: {e:#}");
        }

        match &result {
            Ok(report) => info!(image = %report.output_image.display(), "build complete"),
            Err(e) => debug!(stage = %e.stage(), "build aborted"),
        }
        result
    }

    fn run_stages(&self) -> Result<BuildReport, PipelineError> {
        let fetch = self.stage(Stage::Fetch, || {
            s01_fetch::run(&self.ctx, self.fetcher, &self.config.iso_url)
        })?;

        self.stage(Stage::UnpackImage, || s02_unpack_image::run(&self.ctx, self.tools))?;

        self.stage(Stage::UnpackRootfs, || {
            s03_unpack_rootfs::run(&self.ctx, self.tools, &self.host_resolv)
        })?;

        self.stage(Stage::Dependencies, || {
            let spec: DependencySpec = load_or_empty(
                &self.ctx.dependencies_file,
                Format::Yaml,
                "dependency spec",
                self.config.strict_config,
            )?;
            s04_dependencies::run(&self.ctx, self.executor, &spec)
        })?;

        let setup = self.stage(Stage::Setup, || {
            let spec: SetupSpec = load_or_empty(
                &self.ctx.setup_file,
                Format::Yaml,
                "setup spec",
                self.config.strict_config,
            )?;
            s05_setup::run(
                &self.ctx,
                self.executor,
                &spec,
                self.config.strict_config,
                &self.interrupted,
            )
        })?;

        self.stage(Stage::Repack, || {
            s06_repack::run(&self.ctx, self.tools, self.executor)
        })?;

        let options = IsoOptions::hybrid(self.config.volume_label.as_str());
        self.stage(Stage::Assemble, || {
            s07_assemble::run(&self.ctx, self.tools, &options)
        })?;

        Ok(BuildReport {
            fetch,
            setup,
            output_image: self.ctx.output_image.clone(),
        })
    }

    fn stage<T>(
        &self,
        stage: Stage,
        body: impl FnOnce() -> anyhow::Result<T>,
    ) -> Result<T, PipelineError> {
        if self.is_interrupted() {
            return Err(PipelineError::Interrupted { stage });
        }

        info!(stage = %stage, "starting");
        match body() {
            Ok(value) => Ok(value),
            Err(source) if self.is_interrupted() => {
                debug!(stage = %stage, "failure after interrupt: {source:#}");
                Err(PipelineError::Interrupted { stage })
            }
            Err(source) => Err(PipelineError::StageFailed { stage, source }),
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}
