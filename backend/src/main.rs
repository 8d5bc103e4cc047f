//! Sheetmap CLI - Convert spreadsheet rows to JSON records
//!
//! # Main Commands
//!
//! ```bash
//! sheetmap convert products.xlsx -m mappings.json   # Convert with a mapping file
//! sheetmap convert products.xlsx                    # Use a compatible template
//! sheetmap serve                                    # Start HTTP server (port 3000)
//! ```
//!
//! # Inspection and Management
//!
//! ```bash
//! sheetmap sheets products.xlsx           # List sheets and columns
//! sheetmap preview products.xlsx -n 5     # First rows of a sheet as JSON
//! sheetmap example-mappings               # Show an example mapping file
//! sheetmap history list                   # Stored conversions
//! sheetmap template list                  # Stored mapping templates
//! ```

use clap::{Parser, Subcommand};
use sheetmap::{
    example_mapping_set, read_workbook, convert_sheet, log_info, log_success, log_warning,
    ConversionStore, ConvertOptions, MappingSet, MappingTemplateRegistry, RowWindow, Settings,
    LOG_BROADCASTER, DEFAULT_PREVIEW_ROWS,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sheetmap")]
#[command(about = "Convert spreadsheet rows to JSON records with typed column mappings", long_about = None)]
struct Cli {
    /// Don't echo progress logs to stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the sheets of a workbook with their columns
    Sheets {
        /// Input file (csv, xlsx, xlsm, xlsb, xls, ods)
        input: PathBuf,
    },

    /// Print the first rows of a sheet as JSON
    Preview {
        /// Input file
        input: PathBuf,

        /// Sheet name (default: first sheet)
        #[arg(short, long)]
        sheet: Option<String>,

        /// Number of rows
        #[arg(short = 'n', long, default_value_t = DEFAULT_PREVIEW_ROWS)]
        rows: usize,
    },

    /// Convert a sheet to JSON records
    Convert {
        /// Input file
        input: PathBuf,

        /// Sheet name (default: first sheet)
        #[arg(short, long)]
        sheet: Option<String>,

        /// Mapping file (JSON array of rules)
        #[arg(short, long, conflicts_with = "template")]
        mappings: Option<PathBuf>,

        /// Stored template ID to use
        #[arg(short, long)]
        template: Option<String>,

        /// First row to convert (1-based, inclusive)
        #[arg(long, default_value_t = 1)]
        start_row: usize,

        /// Row to stop at (1-based, exclusive)
        #[arg(long)]
        end_row: Option<usize>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Don't save the result to the conversion history
        #[arg(long)]
        no_save: bool,

        /// Save the mappings used as a template with this name
        #[arg(long)]
        save_template: Option<String>,
    },

    /// Show an example mapping file
    ExampleMappings,

    /// Manage stored conversions
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Manage mapping templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: SHEETMAP_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List stored conversions, newest first
    List,

    /// Print the records of a stored conversion
    Show {
        /// Conversion key
        key: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a stored conversion
    Delete {
        /// Conversion key
        key: String,
    },

    /// Delete all stored conversions
    Clear,

    /// Show store usage
    Size,
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List all stored templates
    List,

    /// Import a mapping JSON file as template
    Import {
        /// Mapping JSON file to import
        file: PathBuf,
        /// Name for the template
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show details of a template
    Show {
        /// Template ID
        id: String,
    },

    /// Delete a template
    Delete {
        /// Template ID
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = Settings::from_env();
    LOG_BROADCASTER.set_echo(!cli.quiet);

    let result = match cli.command {
        Commands::Sheets { input } => cmd_sheets(&input),

        Commands::Preview { input, sheet, rows } => cmd_preview(&input, sheet.as_deref(), rows),

        Commands::Convert {
            input,
            sheet,
            mappings,
            template,
            start_row,
            end_row,
            output,
            no_save,
            save_template,
        } => {
            let args = ConvertArgs {
                sheet,
                mappings,
                template,
                start_row,
                end_row,
                output,
                no_save,
                save_template,
            };
            cmd_convert(&settings, &input, args)
        }

        Commands::ExampleMappings => cmd_example_mappings(),

        Commands::History { action } => cmd_history(&settings, action),

        Commands::Template { action } => cmd_template(&settings, action),

        Commands::Serve { port } => cmd_serve(settings, port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_sheets(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let workbook = read_workbook(input)?;
    if let Some(ref encoding) = workbook.encoding {
        eprintln!("   Encoding: {}", encoding);
    }

    for sheet in &workbook.sheets {
        println!("📄 {} ({} rows)", sheet.name, sheet.row_count());
        if !sheet.headers.is_empty() {
            println!("   Columns: {}", sheet.headers.join(", "));
        }
    }
    Ok(())
}

fn cmd_preview(
    input: &Path,
    sheet: Option<&str>,
    rows: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let workbook = read_workbook(input)?;
    let sheet = workbook.sheet_or_first(sheet)?;

    eprintln!("📄 {} - {} of {} rows", sheet.name, rows.min(sheet.row_count()), sheet.row_count());
    eprintln!("   Columns: {}", sheet.headers.join(", "));

    // Keys in header order
    let preview: Vec<serde_json::Map<String, serde_json::Value>> = sheet
        .preview(rows)
        .iter()
        .map(|row| {
            sheet
                .headers
                .iter()
                .map(|h| (h.clone(), row.get(h).map(|c| c.to_json()).unwrap_or_default()))
                .collect()
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(())
}

struct ConvertArgs {
    sheet: Option<String>,
    mappings: Option<PathBuf>,
    template: Option<String>,
    start_row: usize,
    end_row: Option<usize>,
    output: Option<PathBuf>,
    no_save: bool,
    save_template: Option<String>,
}

fn cmd_convert(
    settings: &Settings,
    input: &Path,
    args: ConvertArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = ConvertOptions {
        window: RowWindow::new(args.start_row, args.end_row)?,
        no_save: args.no_save,
    };

    log_info(format!("📖 Reading {}...", input.display()));
    let workbook = read_workbook(input)?;
    let sheet = workbook.sheet_or_first(args.sheet.as_deref())?;
    log_success(format!(
        "Sheet \"{}\": {} rows, {} columns",
        sheet.name,
        sheet.row_count(),
        sheet.headers.len()
    ));

    let mut registry = MappingTemplateRegistry::with_dir(&settings.template_dir);

    // Mappings: explicit file, explicit template, or best compatible template
    let (mappings, template_id) = match (&args.mappings, &args.template) {
        (Some(path), _) => {
            let content = fs::read_to_string(path)?;
            (MappingSet::import_json(&content)?, None)
        }
        (None, Some(id)) => {
            let template = registry
                .get(id)
                .ok_or_else(|| format!("Template not found: {}", id))?;
            (template.to_mapping_set()?, Some(id.clone()))
        }
        (None, None) => {
            log_info("Looking for a compatible template...");
            let (template, score) = registry
                .find_compatible(&sheet.headers)
                .into_iter()
                .next()
                .ok_or("No mappings given and no compatible template found (use --mappings)")?;
            log_success(format!(
                "Using template \"{}\" (score: {:.0}%)",
                template.name,
                score * 100.0
            ));
            (template.to_mapping_set()?, Some(template.id.clone()))
        }
    };

    let store = ConversionStore::from_settings(settings);
    let output = convert_sheet(sheet, &workbook.filename, &mappings, &options, Some(&store))?;

    if let Some(id) = template_id {
        registry.record_use(&id)?;
    }
    if let Some(name) = args.save_template {
        let id = registry.save(&mappings, &name)?;
        log_success(format!("Mappings saved as template: {}", id));
    }

    let json = output.result.to_json()?;
    write_output(&json, args.output.as_deref())?;

    if output.storage_error.is_some() {
        log_warning("Result was not saved to history");
    }
    Ok(())
}

fn cmd_example_mappings() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", example_mapping_set()?.to_json()?);
    Ok(())
}

async fn cmd_serve(settings: Settings, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings {
        port: port.unwrap_or(settings.port),
        ..settings
    };
    sheetmap::server::start_server(settings).await
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

fn cmd_history(settings: &Settings, action: HistoryAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = ConversionStore::from_settings(settings);

    match action {
        HistoryAction::List => {
            let all = store.list_all();
            if all.is_empty() {
                eprintln!("📋 No conversions stored yet.");
                return Ok(());
            }

            eprintln!("📋 Stored conversions ({}):\n", all.len());
            for c in all {
                let when = chrono::DateTime::from_timestamp_millis(c.result.timestamp)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| c.result.timestamp.to_string());
                println!("  📄 {}", c.key);
                println!("     File: {} / {}", c.result.filename, c.result.sheet);
                println!("     Records: {}", c.result.record_count());
                println!("     Created: {}", when);
                println!();
            }
        }

        HistoryAction::Show { key, output } => {
            let result = store
                .get(&key)
                .ok_or_else(|| format!("Conversion not found: {}", key))?;
            eprintln!("📄 {} ({} records)", result.export_file_name(), result.record_count());
            write_output(&result.to_json()?, output.as_deref())?;
        }

        HistoryAction::Delete { key } => {
            store.delete(&key)?;
            eprintln!("🗑️  Conversion deleted: {}", key);
        }

        HistoryAction::Clear => {
            let removed = store.clear_all()?;
            eprintln!("🗑️  {} conversion(s) deleted", removed);
        }

        HistoryAction::Size => {
            let status = store.storage_status();
            println!("Conversions: {}", status.count);
            println!("Used: {:.2} MB", status.used_mb);
            if let Some(quota) = status.quota_mb {
                println!("Quota: {:.2} MB", quota);
            }
            if status.high {
                println!("⚠️  Storage usage is high, consider clearing old conversions");
            }
        }
    }

    Ok(())
}

fn cmd_template(settings: &Settings, action: TemplateAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = MappingTemplateRegistry::with_dir(&settings.template_dir);

    match action {
        TemplateAction::List => {
            let templates = registry.list();
            if templates.is_empty() {
                eprintln!("📋 No templates stored yet.");
                eprintln!("   Use 'sheetmap template import <file>' to add one.");
                return Ok(());
            }

            eprintln!("📋 Stored templates ({}):\n", templates.len());
            for t in templates {
                println!("  📄 {} ({})", t.name, t.id);
                println!("     Columns: {}", t.columns.join(", "));
                println!("     Uses: {}", t.use_count);
                if let Some(ref last) = t.last_used {
                    println!("     Last used: {}", last);
                }
                println!();
            }
        }

        TemplateAction::Import { file, name } => {
            eprintln!("📥 Importing template from: {}", file.display());
            let id = registry.import(&file, name.as_deref())?;
            eprintln!("✅ Template saved with ID: {}", id);
        }

        TemplateAction::Show { id } => {
            let t = registry
                .get(&id)
                .ok_or_else(|| format!("Template not found: {}", id))?;
            println!("📄 Template: {} ({})\n", t.name, t.id);
            println!("Columns: {}", t.columns.join(", "));
            println!("Created: {}", t.created_at);
            println!("Uses: {}", t.use_count);
            println!("\nMappings:");
            println!("{}", serde_json::to_string_pretty(&t.mappings)?);
        }

        TemplateAction::Delete { id } => {
            registry.delete(&id)?;
            eprintln!("🗑️  Template deleted: {}", id);
        }
    }

    Ok(())
}
