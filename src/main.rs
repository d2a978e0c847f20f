//! docforge CLI: inspect documents, manage stored templates and generate
//! synthetic test data from the command line.

use clap::{Parser, Subcommand};
use docforge::error::{DocforgeError, DocforgeResult};
use docforge::model::{base_name, FieldSetting};
use docforge::pipeline::DocumentSession;
use docforge::registry::Registry;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docforge", version, about = "Infer templates from structured documents and mass-generate synthetic files")]
struct Cli {
    /// Template/preset store directory.
    #[arg(long, global = true, default_value = ".docforge")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a document and print the inferred template.
    Parse {
        file: PathBuf,
        /// Print the full template bundle as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Generate synthetic documents from a file or a stored template.
    Generate {
        /// Source document; omit when using --template.
        file: Option<PathBuf>,
        /// Id of a stored template to generate from.
        #[arg(long, conflicts_with = "file")]
        template: Option<String>,
        /// Id of a stored preset to apply before generating.
        #[arg(long)]
        preset: Option<String>,
        /// Number of output documents (rows, for CSV).
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Write all output into one zip archive at this path.
        #[arg(long)]
        zip: Option<PathBuf>,
        /// Output directory for individual files.
        #[arg(long, default_value = "out")]
        out: PathBuf,
    },
    /// Manage the template store.
    #[command(subcommand)]
    Template(TemplateCommand),
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// List stored templates.
    List,
    /// Print a stored template as JSON.
    Show { id: String },
    /// Parse a document and store it as a template.
    Save {
        file: PathBuf,
        /// Display name; defaults to the file name without extension.
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete a stored template and its presets.
    Delete { id: String },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> DocforgeResult<()> {
    let registry = Registry::new(&cli.store);
    match cli.command {
        Command::Parse { file, json } => {
            let session = session_from_file(&file)?;
            if json {
                let payload = session.to_payload("", base_name(session.file_name()));
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .map_err(|err| DocforgeError::InvalidInput(err.to_string()))?
                );
            } else {
                print_summary(&session);
            }
            Ok(())
        }
        Command::Generate {
            file,
            template,
            preset,
            count,
            zip,
            out,
        } => {
            let mut session = match (&file, &template) {
                (Some(path), None) => session_from_file(path)?,
                (None, Some(id)) => DocumentSession::from_template(&registry.load_template(id)?)?,
                _ => {
                    return Err(DocforgeError::InvalidInput(
                        "provide a source file or --template".into(),
                    ))
                }
            };
            if let Some(preset_id) = preset {
                let preset = registry.load_preset(&preset_id)?;
                session.apply_preset(&preset);
            }

            if let Some(zip_path) = zip {
                let bytes = session.generate_archive(count)?;
                fs::write(&zip_path, bytes)?;
                println!("wrote {}", zip_path.display());
            } else {
                let files = session.generate(count)?;
                fs::create_dir_all(&out)?;
                for generated in &files {
                    fs::write(out.join(&generated.name), &generated.bytes)?;
                }
                println!("wrote {} file(s) to {}", files.len(), out.display());
            }
            Ok(())
        }
        Command::Template(command) => run_template(&registry, command),
    }
}

fn run_template(registry: &Registry, command: TemplateCommand) -> DocforgeResult<()> {
    match command {
        TemplateCommand::List => {
            for summary in registry.list_templates()? {
                println!("{}  {}  [{}]  {}", summary.id, summary.name, summary.format, summary.file_name);
            }
            Ok(())
        }
        TemplateCommand::Show { id } => {
            let payload = registry.load_template(&id)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .map_err(|err| DocforgeError::InvalidInput(err.to_string()))?
            );
            Ok(())
        }
        TemplateCommand::Save { file, name } => {
            let session = session_from_file(&file)?;
            let name = name.unwrap_or_else(|| base_name(session.file_name()).to_string());
            let saved = registry.save_template(session.to_payload("", &name))?;
            println!("saved template {}", saved.id);
            Ok(())
        }
        TemplateCommand::Delete { id } => {
            registry.delete_template(&id)?;
            println!("deleted template {}", id);
            Ok(())
        }
    }
}

fn session_from_file(path: &Path) -> DocforgeResult<DocumentSession> {
    let bytes = fs::read(path)?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload");
    DocumentSession::from_bytes(file_name, &bytes)
}

fn print_summary(session: &DocumentSession) {
    println!("format: {}", session.format());

    println!("\nloops:");
    for loop_setting in session.loops() {
        println!("  {}  x{}", loop_setting.id, loop_setting.count);
    }

    println!("\nfields:");
    for field in session.fields() {
        println!("  {}  [{}]  {}", field.id, kind_label(field), field.value);
    }

    println!("\nrelations:");
    for relation in session.relations() {
        println!(
            "  {} -> {}{}",
            relation.master_id,
            relation.dependent_id,
            if relation.enabled { "" } else { "  (disabled)" }
        );
    }
}

fn kind_label(field: &FieldSetting) -> &'static str {
    use docforge::model::FieldKind;
    match field.kind {
        FieldKind::Text => "text",
        FieldKind::Number => "number",
        FieldKind::Date => "date",
        FieldKind::Boolean => "boolean",
        FieldKind::Null => "null",
    }
}
