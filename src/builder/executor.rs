//! Sequential node runner.
//!
//! Builds the derived nodes reachable from a set of requested nodes in
//! dependency order, consulting the cache directory before running a task
//! and filling it afterwards. The first failure stops the run, so nothing
//! that depends on a failed node is attempted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::builder::cache::CacheDir;
use crate::builder::env::BuildEnv;
use crate::builder::node::Node;
use crate::builder::task::{Invocation, Mode};
use crate::util::fs::ensure_dir;

/// What happened during a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Targets produced by running their task
    pub built: Vec<PathBuf>,
    /// Targets copied out of the cache
    pub cached: Vec<PathBuf>,
}

impl BuildReport {
    pub fn total(&self) -> usize {
        self.built.len() + self.cached.len()
    }
}

pub struct BuildExecutor<'a> {
    env: &'a BuildEnv,
    cache: Option<&'a CacheDir>,
    verbose: bool,
}

impl<'a> BuildExecutor<'a> {
    pub fn new(env: &'a BuildEnv) -> Self {
        BuildExecutor {
            env,
            cache: None,
            verbose: false,
        }
    }

    pub fn with_cache(mut self, cache: &'a CacheDir) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Build every derived node reachable from `roots`.
    pub fn execute(&self, roots: &[Arc<Node>]) -> Result<BuildReport> {
        let start = Instant::now();
        let order = build_order(roots)?;

        let pb = if !self.verbose && order.len() > 1 {
            let pb = ProgressBar::new(order.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let mut report = BuildReport::default();
        for node in &order {
            if let Some(ref pb) = pb {
                pb.set_message(node.path().display().to_string());
            }
            self.build_node(node, &mut report)
                .with_context(|| format!("building `{}` failed", node.path().display()))?;
            if let Some(ref pb) = pb {
                pb.inc(1);
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        tracing::debug!(
            "built {} and retrieved {} target(s) in {:.2}s",
            report.built.len(),
            report.cached.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(report)
    }

    fn build_node(&self, node: &Node, report: &mut BuildReport) -> Result<()> {
        let task = node
            .task(self.env)?
            .ok_or_else(|| anyhow!("`{}` has no builder", node.path().display()))?;

        for source in node.sources() {
            if !source.path().exists() {
                bail!(
                    "source `{}` is missing, needed by `{}`",
                    source.path().display(),
                    node.path().display()
                );
            }
        }

        let cache = self.cache.filter(|_| !task.has_side_effect());
        let signature = match cache {
            Some(_) => Some(node.cache_signature(self.env)?),
            None => None,
        };

        if let (Some(cache), Some(sig)) = (cache, signature.as_deref()) {
            if cache.fetch(sig, node.path())? {
                tracing::info!("Retrieved `{}` from cache", node.path().display());
                report.cached.push(node.path().to_path_buf());
                return Ok(());
            }
        }

        if let Some(parent) = node.path().parent() {
            ensure_dir(parent)?;
        }

        let targets = [node.path().to_path_buf()];
        let sources = node.source_paths();
        let inv = Invocation::new(&targets, &sources);
        task.action(&inv, self.env, Mode::Execute)
            .execute(&inv, self.env)?;

        if let (Some(cache), Some(sig)) = (cache, signature.as_deref()) {
            cache.push(sig, node.path())?;
        }

        report.built.push(node.path().to_path_buf());
        Ok(())
    }
}

/// Derived nodes reachable from `roots`, each once, sources before targets.
fn build_order(roots: &[Arc<Node>]) -> Result<Vec<Arc<Node>>> {
    let mut graph: DiGraph<Arc<Node>, ()> = DiGraph::new();
    let mut index: HashMap<PathBuf, NodeIndex> = HashMap::new();
    let mut pending: Vec<Arc<Node>> = Vec::new();

    let mut add = |graph: &mut DiGraph<Arc<Node>, ()>, node: &Arc<Node>, pending: &mut Vec<Arc<Node>>| {
        *index.entry(node.path().to_path_buf()).or_insert_with(|| {
            pending.push(node.clone());
            graph.add_node(node.clone())
        })
    };

    for root in roots.iter().filter(|n| n.is_derived()) {
        add(&mut graph, root, &mut pending);
    }

    while let Some(node) = pending.pop() {
        let target = add(&mut graph, &node, &mut pending);
        for source in node.sources().iter().filter(|s| s.is_derived()) {
            let from = add(&mut graph, source, &mut pending);
            graph.update_edge(from, target, ());
        }
    }

    let sorted = toposort(&graph, None).map_err(|cycle| {
        anyhow!(
            "dependency cycle involving `{}`",
            graph[cycle.node_id()].path().display()
        )
    })?;

    Ok(sorted.into_iter().map(|i| graph[i].clone()).collect())
}
