use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::{Path, PathBuf};

// Use library instead of local modules
use case_tracker::{
    count_cases, get_all_case_aggregates, insert_aggregate, load_json, setup_database,
    write_csv_dir, AppConfig, ExportError, TabularExportBuilder,
};

const USAGE: &str = "Usage:
  case-tracker init
  case-tracker import <cases.json>
  case-tracker export <case_id> [out.xlsx]
  case-tracker export-all [out.xlsx]
  case-tracker export-csv <dir>";

fn main() -> Result<()> {
    let config = AppConfig::from_env();
    config.init_tracing();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("init") => run_init(&config),
        Some("import") => {
            let path = args.get(2).context("import needs a JSON file path")?;
            run_import(&config, Path::new(path))
        }
        Some("export") => {
            let case_id: i64 = args
                .get(2)
                .context("export needs a case id")?
                .parse()
                .context("case id must be a number")?;
            run_export(&config, case_id, args.get(3).map(PathBuf::from))
        }
        Some("export-all") => run_export_all(&config, args.get(2).map(PathBuf::from)),
        Some("export-csv") => {
            let dir = args.get(2).context("export-csv needs an output directory")?;
            run_export_csv(&config, Path::new(dir))
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn open_database(config: &AppConfig) -> Result<Connection> {
    let conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn run_init(config: &AppConfig) -> Result<()> {
    println!("🔧 Setting up database...");
    open_database(config)?;
    println!("✓ Database ready at {}", config.database_path.display());
    Ok(())
}

fn run_import(config: &AppConfig, json_path: &Path) -> Result<()> {
    println!("🗄️  Import - JSON → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load JSON
    println!("\n📂 Loading cases...");
    let aggregates = load_json(json_path)?;
    println!("✓ Loaded {} cases from {}", aggregates.len(), json_path.display());

    // 2. Setup database
    let conn = open_database(config)?;

    // 3. Insert cases with their children
    println!("\n💾 Inserting cases...");
    for aggregate in &aggregates {
        insert_aggregate(&conn, aggregate)?;
    }

    // 4. Verify count
    let count = count_cases(&conn)?;
    println!("✓ Database contains {} cases", count);

    Ok(())
}

fn run_export(config: &AppConfig, case_id: i64, out: Option<PathBuf>) -> Result<()> {
    let conn = open_database(config)?;

    let file = match TabularExportBuilder::new().export_single_case(&conn, case_id) {
        Ok(file) => file,
        Err(ExportError::NotFound(id)) => bail!("Case not found: {}", id),
        Err(e) => return Err(e.into()),
    };

    let path = out.unwrap_or_else(|| PathBuf::from(&file.filename));
    file.save(&path)?;
    println!("✓ Exported case {} to {}", case_id, path.display());
    Ok(())
}

fn run_export_all(config: &AppConfig, out: Option<PathBuf>) -> Result<()> {
    let conn = open_database(config)?;

    let file = TabularExportBuilder::new().export_all_cases(&conn)?;

    let path = out.unwrap_or_else(|| PathBuf::from(&file.filename));
    file.save(&path)?;
    println!("✓ Exported {} cases to {}", file.case_count, path.display());
    Ok(())
}

fn run_export_csv(config: &AppConfig, dir: &Path) -> Result<()> {
    let conn = open_database(config)?;

    let cases = get_all_case_aggregates(&conn)?;
    let tables = TabularExportBuilder::new().tables(&cases);

    for path in write_csv_dir(&tables, dir)? {
        println!("✓ Wrote {}", path.display());
    }
    Ok(())
}
