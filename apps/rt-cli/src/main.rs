use clap::{Parser, Subcommand};
use rt_builder::{BuildError, ConfigurationBuilder, DataSourceLayout, Pass};
use rt_signals::TypeRegistry;
use rt_tree::{ConfigTree, TreeError};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const APPLICATION_CLASS: &str = "RealTimeApplication";

#[derive(Parser)]
#[command(name = "rt-cli")]
#[command(about = "Real-time application configuration builder", long_about = None)]
struct Cli {
    /// Path of the application node inside the file (default: auto-detect)
    #[arg(long, global = true)]
    root: Option<String>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every builder pass and report the outcome
    Validate {
        /// Application file (YAML, or JSON by extension)
        config: PathBuf,
    },
    /// Build and export the resolved functions and data sources
    Build {
        /// Application file (YAML, or JSON by extension)
        config: PathBuf,
        /// Where to write the resolved functions (default: stdout)
        #[arg(long)]
        functions_out: Option<PathBuf>,
        /// Where to write the resolved data sources (default: stdout)
        #[arg(long)]
        data_out: Option<PathBuf>,
        /// Where to write the resolved state table
        #[arg(long)]
        states_out: Option<PathBuf>,
        /// Where to write the data-source memory layouts as JSON
        #[arg(long)]
        layout_out: Option<PathBuf>,
    },
    /// Rebuild from exported functions, data sources and states
    Rebuild {
        functions: PathBuf,
        data: PathBuf,
        states: PathBuf,
    },
    /// List the structured types declared by an application
    Types {
        /// Application file (YAML, or JSON by extension)
        config: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("{0}")]
    Project(#[from] rt_project::ProjectError),

    #[error("[{kind:?}] {source}")]
    Build {
        kind: rt_builder::ErrorKind,
        source: BuildError,
    },

    #[error("{0}")]
    Signals(#[from] rt_signals::SignalError),

    #[error("{0}")]
    Tree(#[from] TreeError),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("no application node found (use --root)")]
    NoApplication,
}

impl From<BuildError> for CliError {
    fn from(source: BuildError) -> Self {
        CliError::Build {
            kind: source.kind(),
            source,
        }
    }
}

type CliResult<T> = Result<T, CliError>;

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Validate { config } => cmd_validate(&config, cli.root.as_deref()),
        Commands::Build {
            config,
            functions_out,
            data_out,
            states_out,
            layout_out,
        } => cmd_build(
            &config,
            cli.root.as_deref(),
            Outputs {
                functions: functions_out.as_deref(),
                data: data_out.as_deref(),
                states: states_out.as_deref(),
                layout: layout_out.as_deref(),
            },
        ),
        Commands::Rebuild { functions, data, states } => cmd_rebuild(&functions, &data, &states),
        Commands::Types { config } => cmd_types(&config, cli.root.as_deref()),
    };
    if let Err(err) = result {
        eprintln!("✗ {err}");
        std::process::exit(1);
    }
}

/// Load `path` and leave the cursor on the application node.
fn load_application(path: &Path, root: Option<&str>) -> CliResult<ConfigTree> {
    tracing::info!(path = %path.display(), "loading application");
    let mut tree = rt_project::load(path)?;
    if let Some(root) = root {
        tree.move_absolute(root)?;
        return Ok(tree);
    }
    if tree.is_node("Functions") {
        return Ok(tree);
    }
    for node in tree.child_nodes() {
        tree.move_relative(&node)?;
        if tree.read_opt::<String>("Class")?.as_deref() == Some(APPLICATION_CLASS)
            || tree.is_node("Functions")
        {
            return Ok(tree);
        }
        tree.move_to_root();
    }
    Err(CliError::NoApplication)
}

fn cmd_validate(config: &Path, root: Option<&str>) -> CliResult<()> {
    println!("Validating application: {}", config.display());
    let tree = load_application(config, root)?;
    let mut builder = ConfigurationBuilder::new(&tree)?;
    for pass in Pass::ALL {
        builder.run(pass)?;
        println!("  ✓ {pass}");
    }
    let db = builder.database();
    println!(
        "✓ Application is valid ({} functions, {} data sources, {} states)",
        db.functions.len(),
        db.data_sources.len(),
        db.states.len()
    );
    Ok(())
}

fn write_or_print(tree: &ConfigTree, out: Option<&Path>, label: &str) -> CliResult<()> {
    match out {
        Some(path) => {
            rt_project::save_yaml(path, tree)?;
            println!("✓ {label} written to {}", path.display());
        }
        None => {
            println!("# {label}");
            print!("{}", rt_project::to_yaml_string(tree)?);
        }
    }
    Ok(())
}

struct Outputs<'a> {
    functions: Option<&'a Path>,
    data: Option<&'a Path>,
    states: Option<&'a Path>,
    layout: Option<&'a Path>,
}

fn cmd_build(config: &Path, root: Option<&str>, out: Outputs<'_>) -> CliResult<()> {
    let tree = load_application(config, root)?;
    let mut builder = ConfigurationBuilder::new(&tree)?;
    builder.run_all()?;

    let mut functions = ConfigTree::new();
    let mut data = ConfigTree::new();
    builder.copy(&mut functions, &mut data)?;
    write_or_print(&functions, out.functions, "Functions")?;
    write_or_print(&data, out.data, "Data")?;
    if let Some(path) = out.states {
        let mut states = ConfigTree::new();
        builder.copy_states(&mut states)?;
        write_or_print(&states, Some(path), "States")?;
    }
    if let Some(path) = out.layout {
        let layouts: Vec<&DataSourceLayout> = builder
            .database()
            .data_sources
            .values()
            .filter_map(|ds| ds.layout.as_ref())
            .collect();
        std::fs::write(path, serde_json::to_string_pretty(&layouts)?)?;
        println!("✓ Layouts written to {}", path.display());
    }

    let fingerprint = rt_project::layout_fingerprint(&functions, &data)?;
    println!("Layout fingerprint: {fingerprint}");
    Ok(())
}

fn cmd_rebuild(functions: &Path, data: &Path, states: &Path) -> CliResult<()> {
    let functions = rt_project::load(functions)?;
    let data = rt_project::load(data)?;
    let states = rt_project::load(states)?;
    let mut builder = ConfigurationBuilder::from_resolved(&functions, &data, &states)?;
    builder.run_all()?;

    let mut functions = ConfigTree::new();
    let mut data = ConfigTree::new();
    builder.copy(&mut functions, &mut data)?;
    let fingerprint = rt_project::layout_fingerprint(&functions, &data)?;
    println!("✓ Rebuilt from resolved records");
    println!("Layout fingerprint: {fingerprint}");
    Ok(())
}

fn cmd_types(config: &Path, root: Option<&str>) -> CliResult<()> {
    let mut tree = load_application(config, root)?;
    let mut registry = TypeRegistry::new();
    if tree.is_node("Types") {
        tree.move_relative("Types")?;
        registry.load_from_tree(&mut tree)?;
    }
    if registry.is_empty() {
        println!("No structured types declared");
        return Ok(());
    }
    for ty in registry.iter() {
        println!("{} ({} bytes)", ty.name, ty.size);
        for member in &ty.members {
            let dims = if member.dimensions.is_empty() {
                String::new()
            } else {
                format!("{:?}", member.dimensions)
            };
            println!(
                "  +{:<4} {}: {}{}",
                member.byte_offset, member.name, member.type_name, dims
            );
        }
    }
    Ok(())
}
