use clap::{Parser as ClapParser, Subcommand};
use log::{error, info, warn};
use simbook::engine::uploader::default_name_for_file;
use simbook::export::ExportPreview;
use simbook::{
    analysis, init_logger, load_simulator_static, project, LogLevel, SimParams, SimulatorRenderer,
    SimulatorUploader,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(ClapParser)]
#[command(name = "simbook")]
#[command(about = "Simulator plugin loader and offline book exporter")]
struct Cli {
    /// Log level
    #[arg(long, value_enum, global = true, default_value = "info")]
    log_level: LogLevel,
    /// Suppress all logs except panics
    #[arg(long, short, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a plugin (editor loader and export technique)
    Check {
        /// Path to the plugin .js file
        file: PathBuf,
        /// Display name; when given, prints the asset JSON that would be uploaded
        #[arg(long)]
        name: Option<String>,
    },
    /// Mount a plugin headlessly and print the rendered fragment
    Preview {
        /// Path to the plugin .js file
        file: PathBuf,
        /// Parameters passed to init/update/render (JSON object)
        #[arg(long)]
        params: Option<String>,
        /// Milliseconds of virtual time to run after mounting
        #[arg(long, default_value_t = 0)]
        ticks: u32,
        /// Reload when the file changes
        #[arg(long)]
        watch: bool,
    },
    /// Export a project to a single offline HTML file
    Export {
        /// Path to the project .json file
        file: PathBuf,
        /// Output path (defaults to <title>_completo.html)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Additional assets to merge (project assets win on equal ids)
        #[arg(long)]
        assets: Option<PathBuf>,
        /// Boot the exported file headlessly and check every simulator block
        #[arg(long)]
        verify: bool,
        /// Skip lint checks
        #[arg(long)]
        no_lint: bool,
    },
    /// Report dangling references and assets that fail to load
    Lint {
        /// Path to the project .json file
        file: PathBuf,
    },
    /// Convert a legacy page array into the current project format
    ImportLegacy {
        /// Path to the legacy .json file
        file: PathBuf,
        /// Output path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.quiet { LogLevel::Off } else { cli.log_level };
    init_logger(&level);

    let result = match cli.command {
        Commands::Check { file, name } => check_plugin(&file, name),
        Commands::Preview {
            file,
            params,
            ticks,
            watch,
        } => preview_plugin(&file, params.as_deref(), ticks, watch),
        Commands::Export {
            file,
            output,
            assets,
            verify,
            no_lint,
        } => export_book(&file, output, assets, verify, !no_lint),
        Commands::Lint { file } => lint_book(&file),
        Commands::ImportLegacy { file, output } => import_legacy(&file, output),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn read_file(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Error reading {}: {}", path.display(), e))
}

fn check_plugin(file: &Path, name: Option<String>) -> Result<(), String> {
    let code = read_file(file)?;
    let uploader = SimulatorUploader::new();

    match uploader.validate(&code) {
        simbook::engine::UploadStatus::Valid { variant, meta } => {
            info!("✅ {} is valid ({})", file.display(), variant.format_label());
            if let Some(meta) = meta {
                info!("   meta: id={} name={}", meta.id, meta.name);
            }
        }
        simbook::engine::UploadStatus::Error(message) => return Err(message),
    }

    if let Err(e) = load_simulator_static(&code) {
        warn!("⚠️ Works in the editor but not in exported books ({}): {}", e.kind(), e);
    }

    if let Some(name) = name {
        let name = if name.is_empty() {
            default_name_for_file(&file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
        } else {
            name
        };
        let asset = uploader.upload(&name, &code).map_err(|e| e.to_string())?;
        let json = serde_json::to_string_pretty(&asset).map_err(|e| format!("JSON error: {}", e))?;
        println!("{}", json);
    }
    Ok(())
}

fn parse_params(params: Option<&str>) -> Result<SimParams, String> {
    match params {
        None => Ok(SimParams::new()),
        Some(text) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err("--params must be a JSON object".to_string()),
            Err(e) => Err(format!("JSON error: {}", e)),
        },
    }
}

fn render_once(renderer: &mut SimulatorRenderer, ticks: u32) {
    if ticks > 0 {
        renderer.tick(ticks);
    }
    println!("{}", renderer.render_html());
}

fn preview_plugin(file: &Path, params: Option<&str>, ticks: u32, watch: bool) -> Result<(), String> {
    let params = parse_params(params)?;
    let code = read_file(file)?;
    let label = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

    let mut renderer = SimulatorRenderer::with_code(label.clone(), &code, params);
    renderer.set_display_name(default_name_for_file(&label));
    renderer.set_visible(true);
    render_once(&mut renderer, ticks);

    if watch {
        watch_plugin(file, &mut renderer, ticks)?;
    }
    Ok(())
}

#[cfg(feature = "native")]
fn watch_plugin(file: &Path, renderer: &mut SimulatorRenderer, ticks: u32) -> Result<(), String> {
    use simbook::hotreload::HotReloader;
    use std::sync::mpsc;

    let target = fs::canonicalize(file).map_err(|e| format!("IO error: {}", e))?;
    let watch_dir = target.parent().unwrap_or_else(|| Path::new("."));
    let hotreloader = HotReloader::new(watch_dir).map_err(|e| format!("Failed to setup hot reloader: {}", e))?;

    let (tx, rx) = mpsc::channel::<PathBuf>();
    hotreloader.set_reload_callback(move |path| {
        tx.send(path.to_path_buf()).ok();
    });

    // JSレルムは Send ではないので、再ロードはこのスレッドで行う
    for changed in rx {
        let changed = fs::canonicalize(&changed).unwrap_or(changed);
        if changed != target {
            continue;
        }
        match fs::read_to_string(&target) {
            Ok(code) => {
                renderer.set_code(&code);
                render_once(renderer, ticks);
            }
            Err(e) => warn!("Could not read {}: {}", target.display(), e),
        }
    }
    Ok(())
}

#[cfg(not(feature = "native"))]
fn watch_plugin(_file: &Path, _renderer: &mut SimulatorRenderer, _ticks: u32) -> Result<(), String> {
    Err("--watch requires the `native` feature".to_string())
}

fn export_book(
    file: &Path,
    output: Option<PathBuf>,
    assets: Option<PathBuf>,
    verify: bool,
    enable_lint: bool,
) -> Result<(), String> {
    let book = simbook::load_book_project(file, enable_lint)?;
    let extra = match assets {
        Some(path) => simbook::load_asset_file(path)?,
        None => Vec::new(),
    };
    let written = simbook::export_project_file(&book, output.as_ref(), &extra)?;

    if verify {
        verify_export(&written, &book)?;
    }
    Ok(())
}

fn verify_export(path: &Path, book: &simbook::BookProject) -> Result<(), String> {
    let html = read_file(path)?;
    let mut preview = ExportPreview::boot(&html)?;

    let mut unresolved = 0;
    for (page_index, block) in book.simulator_blocks() {
        let Some(id) = block.simulator_id.as_deref() else {
            continue;
        };
        if !preview.resolves(id)? {
            unresolved += 1;
            warn!("page {}: '{}' will show a not-found notice", page_index + 1, id);
        }
    }

    info!(
        "🔎 Verified {}: {} simulators compiled, {} unresolved references, first page '{}'",
        path.display(),
        preview.simulator_ids()?.len(),
        unresolved,
        preview.page_label()?
    );
    if !preview.script_errors().is_empty() {
        return Err(format!("Exported runtime raised: {}", preview.script_errors().join("; ")));
    }
    Ok(())
}

fn lint_book(file: &Path) -> Result<(), String> {
    let book = project::load_project_file(file)?.into_project();
    let result = analysis::analyze_project(&book);
    let has_error = simbook::report_diagnostics(&result);

    info!(
        "{} errors, {} warnings, {} notes",
        result.count(analysis::error::DiagnosticLevel::Error),
        result.count(analysis::error::DiagnosticLevel::Warning),
        result.count(analysis::error::DiagnosticLevel::Info)
    );
    if has_error {
        return Err("Lint errors found".to_string());
    }
    Ok(())
}

fn import_legacy(file: &Path, output: Option<PathBuf>) -> Result<(), String> {
    let loaded = project::load_project_file(file)?;
    if !loaded.is_legacy() {
        warn!("{} is already in the current format", file.display());
    }
    let book = loaded.into_project();
    info!("📥 Imported {} pages", book.pages.len());

    match output {
        Some(path) => {
            project::save_project_file(&path, &book)?;
            info!("✅ Project written to {}", path.display());
        }
        None => {
            let json = serde_json::to_string_pretty(&book).map_err(|e| format!("JSON error: {}", e))?;
            println!("{}", json);
        }
    }
    Ok(())
}
