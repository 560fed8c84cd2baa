//! Build graph nodes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Result};

use crate::builder::env::BuildEnv;
use crate::builder::task::{Invocation, Mode, TaskDef};
use crate::util::hash::{sha256_bytes, sha256_file};

/// A file in the build graph: either a source that already exists, or a
/// target produced by a named builder from its sources.
#[derive(Debug)]
pub struct Node {
    path: PathBuf,
    builder: Option<String>,
    sources: Vec<Arc<Node>>,
    cachesig: OnceLock<String>,
}

impl Node {
    /// A file that is an input only.
    pub fn source(path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Node {
            path: path.into(),
            builder: None,
            sources: Vec::new(),
            cachesig: OnceLock::new(),
        })
    }

    /// A file produced by `builder` from `sources`.
    pub fn derived(
        path: impl Into<PathBuf>,
        builder: impl Into<String>,
        sources: Vec<Arc<Node>>,
    ) -> Arc<Self> {
        Arc::new(Node {
            path: path.into(),
            builder: Some(builder.into()),
            sources,
            cachesig: OnceLock::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn builder(&self) -> Option<&str> {
        self.builder.as_deref()
    }

    pub fn sources(&self) -> &[Arc<Node>] {
        &self.sources
    }

    pub fn is_derived(&self) -> bool {
        self.builder.is_some()
    }

    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.sources.iter().map(|s| s.path.clone()).collect()
    }

    /// The registered task building this node.
    pub fn task<'e>(&self, env: &'e BuildEnv) -> Result<Option<&'e TaskDef>> {
        match self.builder {
            None => Ok(None),
            Some(ref name) => env
                .builders()
                .get(name)
                .map(Some)
                .ok_or_else(|| anyhow!("no builder named `{}` for {}", name, self.path.display())),
        }
    }

    /// Hash of the file's current bytes. The file must exist.
    pub fn content_hash(&self) -> Result<String> {
        sha256_file(&self.path)
    }

    /// Signature of what this node *is*: its bytes for a source, the action
    /// that produces it for a derived node.
    pub fn contents_sig(&self, env: &BuildEnv) -> Result<String> {
        match self.task(env)? {
            None => self.content_hash(),
            Some(task) => {
                let targets = [self.path.clone()];
                let sources = self.source_paths();
                let inv = Invocation::new(&targets, &sources);
                let action = task.action(&inv, env, Mode::Signature);
                Ok(sha256_bytes(action.signature_contents(env).as_bytes()))
            }
        }
    }

    /// Cache key under the environment's signature strategy, computed once
    /// per node.
    pub fn cache_signature(&self, env: &BuildEnv) -> Result<String> {
        if let Some(sig) = self.cachesig.get() {
            return Ok(sig.clone());
        }
        let sig = env.signature().signature(self, env)?;
        Ok(self.cachesig.get_or_init(|| sig).clone())
    }

    /// Memoized signature, if it was already computed.
    pub fn cached_signature(&self) -> Option<&str> {
        self.cachesig.get().map(String::as_str)
    }
}
