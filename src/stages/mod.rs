//! Pipeline stages, in execution order.
//!
//! Each stage is a free function taking the [`BuildContext`] and the
//! collaborators it needs. Stages never call each other; ordering, interrupt
//! checks and cleanup belong to [`crate::pipeline`].
//!
//! [`BuildContext`]: crate::build::context::BuildContext

pub mod s01_fetch;
pub mod s02_unpack_image;
pub mod s03_unpack_rootfs;
pub mod s04_dependencies;
pub mod s05_setup;
pub mod s06_repack;
pub mod s07_assemble;
pub mod s08_cleanup;
