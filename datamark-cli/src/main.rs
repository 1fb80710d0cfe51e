use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use datamark::{
    navigator, Document, Marking, MarkingContainer, MarkingContext, MarkingStructure, NodeId,
    Schema,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "datamark",
    about = "Attach, inspect and embed handling markings in XML documents",
    version,
    author
)]
struct Cli {
    /// Schema definition (JSON); defaults to the built-in STIX schema
    #[arg(long, global = true)]
    schema: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every marked node with its effective markings
    Show {
        /// Input XML file
        input: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Add a marking and write the document with the marking embedded
    Mark {
        /// Input XML file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        marking: MarkingArgs,

        /// Field of the entity to mark instead of the entity itself
        #[arg(long, requires = "id")]
        field: Option<String>,

        /// Item of a repeated field (0-based)
        #[arg(long, requires = "field")]
        index: Option<usize>,

        /// Also cover every descendant of the target
        #[arg(long, requires = "id")]
        descendants: bool,
    },

    /// Dump the compiled field mapping table as JSON
    Fields,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Id of the entity to mark
    #[arg(long)]
    id: Option<String>,

    /// Mark the whole document
    #[arg(long)]
    global: bool,

    /// Add a marking that covers nothing
    #[arg(long)]
    null: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct MarkingArgs {
    /// Traffic Light Protocol color (RED, AMBER, GREEN, WHITE)
    #[arg(long)]
    tlp: Option<String>,

    /// Free text statement
    #[arg(long)]
    statement: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let context = load_context(cli.schema.as_deref())?;

    match cli.command {
        Commands::Show { input, json } => {
            let store = datamark::parse_path(&input, &context)
                .with_context(|| format!("Failed to parse {}", input.display()))?;
            show(&store, json)?;
        }

        Commands::Mark {
            input,
            output,
            target,
            marking,
            field,
            index,
            descendants,
        } => {
            let mut store = datamark::parse_path(&input, &context)
                .with_context(|| format!("Failed to parse {}", input.display()))?;
            let marking = build_marking(&marking);

            let description = if target.global {
                store.add_global(marking.clone())?;
                "document".to_string()
            } else if target.null {
                store.add_marking(None, marking.clone(), false)?;
                "nothing (null marking)".to_string()
            } else {
                let id = target.id.as_deref().unwrap_or_default();
                let node = resolve_target(store.document(), id, field.as_deref(), index)?;
                store.add_marking(Some(node.into()), marking.clone(), descendants)?;
                describe(store.document(), node)
            };

            let xml = store.to_xml()?;
            std::fs::write(&output, xml)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("✓ Marked {description} with {marking} in {}", output.display());
        }

        Commands::Fields => {
            println!("{}", context.fields().to_json()?);
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_context(schema: Option<&Path>) -> Result<MarkingContext> {
    let Some(path) = schema else {
        return Ok(MarkingContext::stix());
    };
    info!("loading schema from {}", path.display());
    let schema = Schema::from_path(path)
        .with_context(|| format!("Failed to load schema {}", path.display()))?;
    Ok(MarkingContext::new(schema)?)
}

fn build_marking(args: &MarkingArgs) -> Marking {
    let structure = match (&args.tlp, &args.statement) {
        (Some(color), _) => MarkingStructure::tlp(color.to_uppercase()),
        (None, Some(text)) => MarkingStructure::statement(text.clone()),
        (None, None) => MarkingStructure::default(),
    };
    Marking::new().with_structure(structure)
}

fn resolve_target(
    doc: &Document,
    id: &str,
    field: Option<&str>,
    index: Option<usize>,
) -> Result<NodeId> {
    let entity = doc.find_by_id(id)?;
    let Some(name) = field else {
        return Ok(entity);
    };
    let Some(value) = doc.get(entity, name) else {
        bail!("Entity '{id}' has no value for field '{name}'");
    };
    if !doc.is_list(value) {
        return Ok(value);
    }
    let items = doc.items(entity, name);
    let index = index.unwrap_or(0);
    items
        .get(index)
        .copied()
        .with_context(|| format!("Field '{name}' of '{id}' has {} items", items.len()))
}

/// Readable location of a node, e.g. `STIXPackage/indicators/indicator[1]/title`.
fn describe(doc: &Document, node: NodeId) -> String {
    let mut segments = Vec::new();
    let mut current = node;
    while let Some(location) = doc.location(current) {
        match location.index {
            Some(index) => segments.push(format!("{}[{index}]", location.field)),
            None => segments.push(location.field.to_string()),
        }
        current = location.owner;
    }
    segments.push(doc.type_name(current).unwrap_or("?").to_string());
    segments.reverse();
    segments.join("/")
}

fn show(store: &MarkingContainer, as_json: bool) -> Result<()> {
    let doc = store.document();
    let root = doc.root();
    let marked: Vec<(NodeId, Vec<Marking>)> = std::iter::once(root)
        .chain(navigator::walk(doc, root))
        .filter(|node| !doc.is_list(*node))
        .map(|node| (node, store.get_markings(node, false, false)))
        .filter(|(_, markings)| !markings.is_empty())
        .collect();
    let null = doc.embedded_null_markings();

    if as_json {
        let nodes: Vec<_> = marked
            .iter()
            .map(|(node, markings)| {
                json!({
                    "node": describe(doc, *node),
                    "markings": markings,
                })
            })
            .collect();
        let report = json!({ "marked": nodes, "null": null });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if marked.is_empty() && null.is_empty() {
        println!("No markings found");
        return Ok(());
    }
    for (node, markings) in &marked {
        println!("{}", describe(doc, *node));
        for marking in markings {
            println!("  - {marking}");
        }
    }
    for marking in null {
        println!("(null) {marking}");
    }
    Ok(())
}
