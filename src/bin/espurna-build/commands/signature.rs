//! `espurna-build signature` command

use anyhow::Result;

use crate::cli::{ProjectArgs, SignatureArgs};
use crate::commands::{load_config, setup};

pub fn execute(project: &ProjectArgs, args: SignatureArgs) -> Result<()> {
    let config = load_config(project)?;
    let orch = setup(project, &config)?;

    let target = orch.env().path(&args.target);
    let node = orch.node_for(&target)?;
    println!("{}", node.cache_signature(orch.env())?);
    Ok(())
}
