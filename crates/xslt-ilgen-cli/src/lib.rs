mod render;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use xslt_ilgen::{CompilerOptions, compile};
use xslt_ir::IrTree;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "xslt-ilgen", version, about = "Compile XSLT/XPath query IR to a stack-machine program")]
pub struct Cli {
    /// IR tree in its nested JSON form.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
    /// Compiler options as JSON; flags given on the command line win.
    #[arg(long = "options", value_name = "FILE")]
    pub options: Option<PathBuf>,
    /// Emit sequence points for nodes carrying a source span.
    #[arg(long)]
    pub debug: bool,
    /// Skip fold, eliminate and normalize rewrites.
    #[arg(long = "no-speculative")]
    pub no_speculative: bool,
    /// The root expression returns its value instead of writing output.
    #[arg(long)]
    pub values: bool,
    /// Also print the optimized IR tree.
    #[arg(long = "emit-tree")]
    pub emit_tree: bool,
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[arg(long = "no-color")]
    pub no_color: bool,
    /// Write the result to FILE instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long = "log-level", default_value = "warn")]
    pub log_level: String,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    if cli.no_color || cli.output.is_some() {
        owo_colors::set_override(false);
    }

    let rendered = execute(&cli)?;
    match &cli.output {
        Some(path) => fs::write(path, rendered).with_context(|| format!("cannot write {}", path.display()))?,
        None => print!("{rendered}"),
    }
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A subscriber installed by an embedding process stays in place.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

/// Compile the input named by `cli` and render the result.
pub fn execute(cli: &Cli) -> Result<String> {
    let options = resolve_options(cli)?;
    let text = fs::read_to_string(&cli.input).with_context(|| format!("cannot read {}", cli.input.display()))?;
    let tree = IrTree::from_json(&text).with_context(|| format!("invalid IR tree in {}", cli.input.display()))?;
    let graph = tree.to_graph().with_context(|| format!("cannot build IR graph from {}", cli.input.display()))?;
    tracing::info!(input = %cli.input.display(), nodes = graph.len(), ?options, "compiling");

    let compilation = compile(graph, &options)?;
    let optimized = if cli.emit_tree { IrTree::from_graph(&compilation.graph, true) } else { None };

    match cli.format {
        OutputFormat::Text => Ok(render::text(&compilation, optimized.as_ref())),
        OutputFormat::Json => render::json(&compilation, optimized.as_ref()),
    }
}

pub fn resolve_options(cli: &Cli) -> Result<CompilerOptions> {
    let mut options = match &cli.options {
        Some(path) => load_options(path)?,
        None => CompilerOptions::default(),
    };
    if cli.debug {
        options.debug = true;
    }
    if cli.no_speculative {
        options.speculative = false;
    }
    if cli.values {
        options.root_output = false;
    }
    Ok(options)
}

fn load_options(path: &Path) -> Result<CompilerOptions> {
    let text = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid compiler options in {}", path.display()))
}
