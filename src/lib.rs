//! Declarative remastering of casper-based live ISO images.
//!
//! Takes a base installer image, explodes its compressed root filesystem,
//! applies `dependencies.yml`, `setup.yml` and the `files/` overlay inside a
//! chroot, then repacks everything into a new hybrid BIOS/UEFI image.
//!
//! - **Configuration** - [`build::context`] for the run, [`config`] for the
//!   declarative project files
//! - **Typed scripts** - [`component`] renders operations into shell only at
//!   the execution boundary
//! - **Isolated execution** - [`executor`] stages and runs scripts in the root
//! - **Artifacts** - [`artifact`] wraps the host image tools
//! - **Stages** - [`stages`] one module per step, driven by [`pipeline`]
//!
//! # Architecture
//!
//! ```text
//! fetch -> unpack image -> unpack rootfs -> dependencies -> setup
//!       -> repack -> assemble -> cleanup (always, once)
//!
//! pipeline ── IsolatedExecutor (chroot)
//!          ├─ ImageTools (mount, rsync, squashfs-tools, md5sum, xorriso)
//!          └─ Fetcher (wget)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use iso_remaster::{BuildConfig, ChrootExecutor, HostTools, Pipeline, WgetFetcher};
//!
//! let config = BuildConfig::default();
//! let tools = HostTools::new(config.squashfs.clone());
//! let pipeline = Pipeline::new(config, &ChrootExecutor, &WgetFetcher, &tools);
//! pipeline.run(false)?;
//! # Ok::<(), iso_remaster::PipelineError>(())
//! ```

pub mod artifact;
pub mod build;
pub mod component;
pub mod config;
pub mod executor;
pub mod fetch;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod stages;

pub use artifact::{HostTools, ImageTools};
pub use build::context::{BuildConfig, BuildContext};
pub use component::{Op, Script};
pub use executor::{ChrootExecutor, IsolatedExecutor};
pub use fetch::{Fetcher, WgetFetcher};
pub use pipeline::{Pipeline, PipelineError, Stage};
