use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use bob_emit::androidmk::{self, EmitOptions};
use bob_emit::config::BobConfig;
use bob_emit::emit::{EmitCtx, NullSink, StdoutSink};
use bob_emit::module::graph::ModuleGraph;
use bob_emit::module::BuildDescription;
use bob_emit::{Error, Result};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct CliArgs {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Emit the Android.mk fragments and the aggregate Android.inc
    Emit {
        /// Path to a resolved build description TOML
        description: PathBuf,
        /// Directory the fragments are written to
        #[arg(long, default_value = "build/androidmk")]
        build_dir: PathBuf,
        /// Helper scripts directory, relative to the source dir
        #[arg(long, default_value = "scripts")]
        scripts_dir: String,
        /// Also write manifest.json describing the emitted files
        #[arg(long, default_value_t = false)]
        manifest: bool,
    },
    /// Emit, then print the aggregate include order
    Order {
        /// Path to a resolved build description TOML
        description: PathBuf,
        /// Directory the fragments are written to
        #[arg(long, default_value = "build/androidmk")]
        build_dir: PathBuf,
        /// Helper scripts directory, relative to the source dir
        #[arg(long, default_value = "scripts")]
        scripts_dir: String,
    },
    /// Print the description after configuration-value expansion
    Resolve {
        /// Path to a resolved build description TOML
        description: PathBuf,
    },
}

fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let args = CliArgs::parse();
    match args.cmd {
        Command::Emit {
            description,
            build_dir,
            scripts_dir,
            manifest,
        } => cmd_emit(&description, build_dir, scripts_dir, manifest),
        Command::Order {
            description,
            build_dir,
            scripts_dir,
        } => cmd_order(&description, build_dir, scripts_dir),
        Command::Resolve { description } => cmd_resolve(&description),
    }
}

fn cmd_emit(
    description: &Path,
    build_dir: PathBuf,
    scripts_dir: String,
    manifest: bool,
) -> Result<()> {
    let desc = BuildDescription::load(description)?;
    let ctx = EmitCtx::new(Arc::new(StdoutSink));
    let result = androidmk::emit_description(
        desc,
        EmitOptions {
            build_dir: build_dir.clone(),
            scripts_rel: scripts_dir,
        },
        &ctx,
    )?;

    if manifest {
        let text = serde_json::to_string_pretty(&result)
            .map_err(|e| Error::msg(format!("manifest encode error: {e}")))?;
        let path = build_dir.join("manifest.json");
        fs::write(&path, text)
            .map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))?;
    }

    println!(
        "DONE: {} fragments, {}",
        result.fragments.len(),
        result.androidmk.display()
    );
    Ok(())
}

fn cmd_order(description: &Path, build_dir: PathBuf, scripts_dir: String) -> Result<()> {
    let desc = BuildDescription::load(description)?;
    let ctx = EmitCtx::new(Arc::new(NullSink));
    let result = androidmk::emit_description(
        desc,
        EmitOptions {
            build_dir,
            scripts_rel: scripts_dir,
        },
        &ctx,
    )?;
    let text = fs::read_to_string(&result.androidmk).map_err(|e| {
        Error::msg(format!(
            "failed to read {}: {e}",
            result.androidmk.display()
        ))
    })?;
    print!("{text}");
    Ok(())
}

fn cmd_resolve(description: &Path) -> Result<()> {
    let desc = BuildDescription::load(description)?;
    let config = BobConfig::from_value(desc.config.clone());
    let mut graph = ModuleGraph::new(desc.modules)?;
    bob_emit::template::apply_config_templates(&mut graph, &config)?;

    let resolved = BuildDescription {
        config: desc.config,
        modules: graph.into_modules(),
    };
    let text = serde_json::to_string_pretty(&resolved)
        .map_err(|e| Error::msg(format!("encode error: {e}")))?;
    println!("{text}");
    Ok(())
}
