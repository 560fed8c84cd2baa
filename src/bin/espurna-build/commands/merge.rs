//! `espurna-build merge` command

use anyhow::Result;

use crate::cli::{MergeArgs, ProjectArgs};
use crate::commands::{load_config, setup};

pub fn execute(project: &ProjectArgs, args: MergeArgs) -> Result<()> {
    let config = load_config(project)?;
    let orch = setup(project, &config)?;
    let single = orch.single_source();

    let sources = single.discover()?;
    if args.print {
        print!("{}", single.render(&sources));
        return Ok(());
    }

    single.generate(&sources)?;
    eprintln!(
        "      Merged {} source(s) into {}",
        sources.len(),
        single.target().display()
    );
    Ok(())
}
