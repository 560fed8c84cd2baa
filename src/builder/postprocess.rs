//! Post-link artifact tasks: debug symbol extraction and the compressed
//! firmware image used for OTA uploads.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::{Compression, GzBuilder};

use crate::builder::command::CommandSpec;
use crate::builder::env::BuildEnv;
use crate::builder::task::{Action, TaskDef};
use crate::util::fs::write_atomic_with;

pub const EXTRACT_DEBUG_SYMBOLS: &str = "ExtractDebugSymbols";
pub const GZIP_FILE: &str = "GzipFile";

/// Register both tasks and declare their outputs for the program as default
/// targets.
pub fn add_postprocess(env: &mut BuildEnv) {
    env.add_builder(TaskDef::generator(
        EXTRACT_DEBUG_SYMBOLS,
        ".elf.debug",
        ".elf",
        |_, _, _| {
            Action::command(
                CommandSpec::new("$OBJCOPY").args([
                    "--only-keep-debug",
                    "--compress-debug-sections",
                    "$SOURCE",
                    "$TARGET",
                ]),
                "Extracting debug symbols from $SOURCE",
            )
        },
    ));

    env.add_builder(TaskDef::generator(GZIP_FILE, ".bin.gz", ".bin", |_, _, _| {
        Action::function("gzip", "Compressing $SOURCE", |inv, _| {
            let source = inv.source().context("gzip needs a source")?;
            let target = inv.target().context("gzip needs a target")?;
            gzip_file(source, target)
        })
    }));

    let debug = env.path("${BUILD_DIR}/${PROGNAME}.elf.debug");
    let gzip = env.path("${BUILD_DIR}/${PROGNAME}.bin.gz");
    env.add_default_target(debug);
    env.add_default_target(gzip);
}

/// Compress `reader` into `writer` as a gzip stream.
///
/// The header carries no file name and a zero timestamp, so the same input
/// always produces the same bytes.
pub fn compress_stream<R: Read, W: Write>(reader: &mut R, writer: W) -> io::Result<u64> {
    let mut encoder = GzBuilder::new().mtime(0).write(writer, Compression::best());
    let written = io::copy(reader, &mut encoder)?;
    encoder.finish()?;
    Ok(written)
}

/// Write the gzip-compressed contents of `source` to `target`.
///
/// The target is replaced atomically; a failed run never leaves a partial
/// archive behind.
pub fn gzip_file(source: &Path, target: &Path) -> Result<()> {
    let file = File::open(source)
        .with_context(|| format!("failed to open {}", source.display()))?;
    let mut reader = BufReader::new(file);
    let written = write_atomic_with(target, |out| compress_stream(&mut reader, out))?;
    tracing::debug!(
        "compressed {} bytes from {} into {}",
        written,
        source.display(),
        target.display()
    );
    Ok(())
}
