//! Build cache signatures.
//!
//! A node's cache key hashes the content signatures of its sources, its own
//! contents signature and a path identifying the node. Which path is used is
//! up to the [`SignatureStrategy`] the environment was created with:
//!
//! - [`ProjectRelative`] uses the path relative to the project root. Targets
//!   live under `.pio/build/<env>/`, so the environment name ends up in every
//!   derived node's key and no two environments ever share a cache entry.
//! - [`BuildDirRelative`] uses the path relative to the environment's own
//!   build directory. All environments lay out their build directory the
//!   same way, so identical inputs produce identical keys regardless of the
//!   environment name, and one environment's results serve the others.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};

use crate::builder::env::BuildEnv;
use crate::builder::node::Node;
use crate::util::fs::{portable, relative_path};
use crate::util::hash::hash_collect;

/// Strategy for the path component of a node's cache key.
pub trait SignatureStrategy: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// The path used in the key for a node at `path`.
    fn node_path(&self, path: &Path, env: &BuildEnv) -> String;

    /// Cache key for `node`. Every source must exist on disk.
    fn signature(&self, node: &Node, env: &BuildEnv) -> Result<String> {
        let mut sigs = Vec::with_capacity(node.sources().len() + 2);
        for source in node.sources() {
            let sig = source.content_hash().with_context(|| {
                format!(
                    "cannot sign {}: source {} is unavailable",
                    node.path().display(),
                    source.path().display()
                )
            })?;
            sigs.push(sig);
        }
        sigs.push(node.contents_sig(env)?);
        sigs.push(self.node_path(node.path(), env));
        Ok(hash_collect(sigs.iter().map(String::as_str)))
    }
}

/// Path relative to the project root.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectRelative;

impl SignatureStrategy for ProjectRelative {
    fn name(&self) -> &'static str {
        "project-relative"
    }

    fn node_path(&self, path: &Path, env: &BuildEnv) -> String {
        portable(&relative_path(env.project_dir(), path))
    }
}

/// Path relative to the environment's build directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildDirRelative;

impl SignatureStrategy for BuildDirRelative {
    fn name(&self) -> &'static str {
        "build-dir-relative"
    }

    fn node_path(&self, path: &Path, env: &BuildEnv) -> String {
        portable(&relative_path(env.build_dir(), path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::task::{Action, TaskDef};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn copy_task() -> TaskDef {
        TaskDef::fixed(
            "GzipFile",
            ".bin.gz",
            ".bin",
            Action::function("gzip", "Compressing $SOURCE", |_, _| Ok(())),
        )
    }

    fn env_for(project: &Path, name: &str, strategy: Arc<dyn SignatureStrategy>) -> BuildEnv {
        let mut env = BuildEnv::new(name, project, format!(".pio/build/{}", name), strategy);
        env.add_builder(copy_task());
        env
    }

    /// `<build_dir>/firmware.bin` with fixed contents, and the node for its
    /// compressed form.
    fn gz_node(env: &BuildEnv, contents: &str) -> Arc<Node> {
        let bin = env.build_dir().join("firmware.bin");
        std::fs::create_dir_all(env.build_dir()).unwrap();
        std::fs::write(&bin, contents).unwrap();
        Node::derived(
            env.build_dir().join("firmware.bin.gz"),
            "GzipFile",
            vec![Node::source(bin)],
        )
    }

    #[test]
    fn test_build_dir_relative_shares_across_envs() {
        let tmp = TempDir::new().unwrap();
        let a = env_for(tmp.path(), "envA", Arc::new(BuildDirRelative));
        let b = env_for(tmp.path(), "envB", Arc::new(BuildDirRelative));

        let sig_a = gz_node(&a, "image").cache_signature(&a).unwrap();
        let sig_b = gz_node(&b, "image").cache_signature(&b).unwrap();
        assert_eq!(sig_a, sig_b);
    }

    #[test]
    fn test_project_relative_differs_across_envs() {
        let tmp = TempDir::new().unwrap();
        let a = env_for(tmp.path(), "envA", Arc::new(ProjectRelative));
        let b = env_for(tmp.path(), "envB", Arc::new(ProjectRelative));

        let sig_a = gz_node(&a, "image").cache_signature(&a).unwrap();
        let sig_b = gz_node(&b, "image").cache_signature(&b).unwrap();
        assert_ne!(sig_a, sig_b);
    }

    #[test]
    fn test_different_relative_path_never_collides() {
        let tmp = TempDir::new().unwrap();
        let env = env_for(tmp.path(), "envA", Arc::new(BuildDirRelative));
        let bin = env.build_dir().join("firmware.bin");
        std::fs::create_dir_all(env.build_dir()).unwrap();
        std::fs::write(&bin, "image").unwrap();

        let one = Node::derived(
            env.build_dir().join("firmware.bin.gz"),
            "GzipFile",
            vec![Node::source(&bin)],
        );
        let other = Node::derived(
            env.build_dir().join("ota").join("firmware.bin.gz"),
            "GzipFile",
            vec![Node::source(&bin)],
        );
        assert_ne!(
            one.cache_signature(&env).unwrap(),
            other.cache_signature(&env).unwrap()
        );
    }

    #[test]
    fn test_different_content_differs() {
        let tmp = TempDir::new().unwrap();
        let a = env_for(tmp.path(), "envA", Arc::new(BuildDirRelative));
        let b = env_for(tmp.path(), "envB", Arc::new(BuildDirRelative));

        let sig_a = gz_node(&a, "image v1").cache_signature(&a).unwrap();
        let sig_b = gz_node(&b, "image v2").cache_signature(&b).unwrap();
        assert_ne!(sig_a, sig_b);
    }

    #[test]
    fn test_signature_is_memoized() {
        let tmp = TempDir::new().unwrap();
        let env = env_for(tmp.path(), "envA", Arc::new(BuildDirRelative));
        let node = gz_node(&env, "image");

        assert!(node.cached_signature().is_none());
        let first = node.cache_signature(&env).unwrap();

        // Changing the source afterwards does not change the memoized key.
        std::fs::write(env.build_dir().join("firmware.bin"), "changed").unwrap();
        assert_eq!(node.cache_signature(&env).unwrap(), first);
        assert_eq!(node.cached_signature(), Some(first.as_str()));
    }

    #[test]
    fn test_missing_source_is_reported() {
        let tmp = TempDir::new().unwrap();
        let env = env_for(tmp.path(), "envA", Arc::new(BuildDirRelative));
        let node = Node::derived(
            env.build_dir().join("firmware.bin.gz"),
            "GzipFile",
            vec![Node::source(env.build_dir().join("firmware.bin"))],
        );
        let err = node.cache_signature(&env).unwrap_err();
        assert!(err.to_string().contains("source"));
    }

    #[test]
    fn test_node_paths() {
        let env = BuildEnv::new(
            "envA",
            "/p",
            ".pio/build/envA",
            Arc::new(BuildDirRelative),
        );
        let target = PathBuf::from("/p/.pio/build/envA/src/main.cpp.o");
        assert_eq!(BuildDirRelative.node_path(&target, &env), "src/main.cpp.o");
        assert_eq!(
            ProjectRelative.node_path(&target, &env),
            ".pio/build/envA/src/main.cpp.o"
        );
        assert_eq!(
            BuildDirRelative.node_path(Path::new("/p/espurna/wifi.cpp"), &env),
            "../../../espurna/wifi.cpp"
        );
    }
}
