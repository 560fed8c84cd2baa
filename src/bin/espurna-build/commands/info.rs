//! `espurna-build info` command

use anyhow::Result;
use serde_json::json;

use crate::cli::{InfoArgs, ProjectArgs};
use crate::commands::{load_config, setup};
use espurna_build::builder::elf2bin::PatchOutcome;
use espurna_build::util::process::find_executable;

pub fn execute(project: &ProjectArgs, args: InfoArgs) -> Result<()> {
    let config = load_config(project)?;
    let orch = setup(project, &config)?;
    let env = orch.env();
    let plan = orch.install_plan();

    let elf2bin = match orch.elf2bin() {
        PatchOutcome::Patched { script, .. } => script.clone(),
        PatchOutcome::UnknownVersion(version) => format!("framework default ({})", version),
        PatchOutcome::NotInstalled => "framework default (not installed)".to_string(),
        PatchOutcome::NoBuilder => "none".to_string(),
    };

    let tools: Vec<(&str, &str, Option<String>)> = [
        ("cxx", &config.toolchain.cxx),
        ("objcopy", &config.toolchain.objcopy),
        ("python", &config.toolchain.python),
        ("re2c", &config.toolchain.re2c),
    ]
    .into_iter()
    .map(|(role, name)| {
        let found = find_executable(name).map(|p| p.display().to_string());
        (role, name.as_str(), found)
    })
    .collect();

    let sources = orch.discover_sources()?;

    if args.json {
        let value = json!({
            "env": env.name(),
            "project_dir": env.project_dir(),
            "build_dir": env.build_dir(),
            "signatures": env.signature().name(),
            "cache": orch.cache().map(|c| c.root().to_path_buf()),
            "firmware": plan.filename(),
            "destination": plan.destination(),
            "install": plan
                .entries()
                .iter()
                .map(|e| json!({ "source": e.source, "target": e.target }))
                .collect::<Vec<_>>(),
            "aliases": plan.aliases(),
            "builders": env.builders().names().collect::<Vec<_>>(),
            "default_targets": env.default_targets(),
            "single_source": orch.single_source().target(),
            "sources": sources,
            "elf2bin": elf2bin,
            "tools": tools
                .iter()
                .map(|(role, name, found)| json!({ "role": role, "name": name, "path": found }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("environment:  {}", env.name());
    println!("build dir:    {}", env.build_dir().display());
    println!("signatures:   {}", env.signature().name());
    match orch.cache() {
        Some(cache) => println!("cache:        {}", cache.root().display()),
        None => println!("cache:        disabled"),
    }
    println!("firmware:     {}", plan.filename());
    println!("destination:  {}", plan.destination().display());
    println!("elf2bin:      {}", elf2bin);
    println!();

    println!("builders:");
    for task in env.builders().iter() {
        let suffixes = if task.suffix().is_empty() {
            "(by name)".to_string()
        } else {
            format!("{} <- {}", task.suffix(), task.src_suffix())
        };
        println!("  {:<20} {}", task.name(), suffixes);
    }

    println!("default targets:");
    for target in env.default_targets() {
        println!("  {}", target.display());
    }

    println!("sources:");
    for source in &sources {
        println!("  {}", source.display());
    }

    println!("install:");
    for entry in plan.entries() {
        println!("  {} -> {}", entry.source.display(), entry.target.display());
    }

    println!("tools:");
    for (role, name, found) in &tools {
        println!(
            "  {:<8} {}",
            role,
            found.as_deref().unwrap_or(&format!("{} (not found)", name))
        );
    }

    Ok(())
}
