//! Stage 4: install packages declared in `dependencies.yml`.
//!
//! The whole spec becomes one script, run once with `set -e`:
//!
//! 1. signing keys
//! 2. `apt-get update` + repositories (only with repositories)
//! 3. `apt-get update` + one `apt-get install` (only with packages)
//! 4. snaps, one by one
//! 5. one `pip3 install`
//!
//! The second index refresh is unconditional when packages are present: a
//! key alone can change what the index resolves.

use anyhow::{Context, Result};
use tracing::info;

use crate::build::context::BuildContext;
use crate::component::{
    add_apt_key, add_apt_repository, apt_install, apt_update, pip_install, snap_install, Script,
};
use crate::config::DependencySpec;
use crate::executor::{run_script, IsolatedExecutor};

/// File name of the staged installer inside `/tmp` of the root.
pub const SCRIPT_NAME: &str = "install_deps.sh";

/// Build the installer script for `spec`.
pub fn install_script(spec: &DependencySpec) -> Script {
    let mut ops = Vec::new();

    ops.extend(spec.apt_keys.iter().map(add_apt_key));

    if !spec.apt_repositories.is_empty() {
        ops.push(apt_update());
        ops.extend(spec.apt_repositories.iter().map(add_apt_repository));
    }

    if !spec.apt_packages.is_empty() {
        ops.push(apt_update());
        ops.push(apt_install(&spec.apt_packages));
    }

    ops.extend(
        spec.snap_packages
            .iter()
            .map(|snap| snap_install(snap.name(), snap.classic())),
    );

    if !spec.pip_packages.is_empty() {
        ops.push(pip_install(&spec.pip_packages));
    }

    Script::new(ops)
}

pub fn run(ctx: &BuildContext, executor: &dyn IsolatedExecutor, spec: &DependencySpec) -> Result<()> {
    let script = install_script(spec);
    if script.is_empty() {
        info!("no dependencies declared");
    } else {
        info!(operations = script.ops().len(), "installing dependencies");
    }

    run_script(executor, &ctx.rootfs_dir, SCRIPT_NAME, &script.render())
        .context("dependency installation failed")?;
    info!("dependencies installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::context::BuildConfig;
    use crate::config::{parse_document, Format};
    use crate::executor::testing::{failed, FakeExecutor};
    use std::path::Path;
    use tempfile::TempDir;

    fn spec(yaml: &str) -> DependencySpec {
        parse_document(yaml, Format::Yaml, Path::new("dependencies.yml")).unwrap()
    }

    #[test]
    fn test_empty_spec_is_preamble_only() {
        let script = install_script(&DependencySpec::default());
        assert!(script.is_empty());
        assert_eq!(script.render(), "#!/bin/bash\nset -e\n");
    }

    #[test]
    fn test_full_spec_order() {
        let spec = spec(
            r#"
apt_keys: [https://example.org/key.asc]
apt_repositories: ["ppa:example/tools"]
apt_packages: [curl, git]
snap_packages:
  - htop
  - { name: code, classic: true }
pip_packages: [requests, pyyaml]
"#,
        );

        assert_eq!(
            install_script(&spec).render(),
            "#!/bin/bash\n\
             set -e\n\
             wget -qO- https://example.org/key.asc | apt-key add -\n\
             apt-get update\n\
             add-apt-repository -y ppa:example/tools\n\
             apt-get update\n\
             DEBIAN_FRONTEND=noninteractive apt-get install -y curl git\n\
             snap install htop\n\
             snap install --classic code\n\
             pip3 install requests pyyaml\n"
        );
    }

    #[test]
    fn test_packages_without_repositories_still_refresh() {
        let spec = spec("apt_packages: [curl]\n");
        assert_eq!(
            install_script(&spec).render(),
            "#!/bin/bash\nset -e\napt-get update\nDEBIAN_FRONTEND=noninteractive apt-get install -y curl\n"
        );
    }

    #[test]
    fn test_run_stages_script_once_and_propagates_failure() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(&BuildConfig {
            output_dir: temp.path().to_path_buf(),
            ..Default::default()
        });
        std::fs::create_dir_all(&ctx.rootfs_dir).unwrap();

        let exec = FakeExecutor::new();
        run(&ctx, &exec, &spec("apt_packages: [curl]\n")).unwrap();
        assert_eq!(exec.calls.borrow().len(), 1);
        assert_eq!(exec.calls.borrow()[0].script, Path::new("/tmp/install_deps.sh"));

        let exec = FakeExecutor::with_responder(|_, _| failed(100, "E: Unable to locate package nope"));
        let err = run(&ctx, &exec, &spec("apt_packages: [nope]\n")).unwrap_err();
        assert!(format!("{err:#}").contains("Unable to locate package"));
        assert!(!ctx.rootfs_dir.join("tmp/install_deps.sh").exists());
    }
}
