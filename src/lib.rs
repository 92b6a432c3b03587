pub mod analysis;
pub mod dom;
pub mod engine;
pub mod error;
pub mod export;
#[cfg(feature = "native")]
pub mod hotreload;
pub mod project;

use colored::*;
use log::{error, info, warn};
use std::fs;
use std::path::Path;

pub use engine::{
    load_simulator_from_code, load_simulator_static, AssetLibrary, LifecycleState, ModuleVariant,
    RendererView, SimulatorInstance, SimulatorLoader, SimulatorModule, SimulatorRenderer,
    SimulatorUploader,
};
pub use error::{SimulatorError, SimulatorResult};
pub use export::{extract_embedded_project, generate_book_html, ExportPreview};
pub use project::{BookProject, ContentBlock, Page, SimParams, SimulatorAsset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogLevel {
    Off,   // ログを一切表示しない（panicは除く）
    Error, // エラーレベルのみ
    Warn,  // 警告レベル以上
    #[default]
    Info, // 情報レベル以上
    Debug, // デバッグレベル以上
    Trace, // 全てのログ
}

/// ログレベルを初期化する関数
pub fn init_logger(log_level: &LogLevel) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::sync::Once;

    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = match log_level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        };

        let mut builder = Builder::from_default_env();

        if matches!(log_level, LogLevel::Off) {
            // quietモードの場合、何も出力しない（panicは別途処理される）
            builder
                .filter_level(LevelFilter::Off)
                .format(|_, _| Ok(()))
                .try_init()
                .ok();
        } else {
            builder
                .filter_level(level)
                // JSエンジン内部のログを抑制
                .filter_module("boa_engine", LevelFilter::Warn)
                .filter_module("boa_parser", LevelFilter::Warn)
                .filter_module("notify", LevelFilter::Warn)
                .format_timestamp_secs()
                .try_init()
                .ok();
        }
    });
}

/// 診断結果を色付きで出力し、エラーがあったかを返す
pub fn report_diagnostics(result: &analysis::AnalysisResult) -> bool {
    let mut has_error = false;

    for diag in &result.diagnostics {
        let loc = diag.location.as_deref().unwrap_or("");
        match diag.level {
            analysis::error::DiagnosticLevel::Error => {
                has_error = true;
                error!("[{}] {}", diag.level, format!("{} {}", loc, diag.message).red().bold());
            }
            analysis::error::DiagnosticLevel::Warning => {
                warn!("[{}] {}", diag.level, format!("{} {}", loc, diag.message).yellow().bold());
            }
            analysis::error::DiagnosticLevel::Info => {
                info!("[{}] {}", diag.level, format!("{} {}", loc, diag.message).blue());
            }
        }
    }

    has_error
}

/// プロジェクトを読み込み、必要なら診断も行う
pub fn load_book_project<P: AsRef<Path>>(path: P, enable_lint: bool) -> Result<BookProject, String> {
    let loaded = project::load_project_file(&path)?;
    if loaded.is_legacy() {
        warn!("{} uses the legacy format; it was converted in memory", path.as_ref().display());
    }
    let book = loaded.into_project();

    if enable_lint {
        let result = analysis::analyze_project(&book);
        if report_diagnostics(&result) {
            error!("Lint errors found. Use --no-lint to skip lint checks.");
        }
    }

    Ok(book)
}

/// プロジェクトをHTMLへ書き出し、出力パスを返す
pub fn export_project_file<P: AsRef<Path>>(
    project: &BookProject,
    output: Option<P>,
    extra_assets: &[SimulatorAsset],
) -> Result<std::path::PathBuf, String> {
    let html = export::generate_book_html_with_assets(project, extra_assets)?;
    let path = match output {
        Some(path) => path.as_ref().to_path_buf(),
        None => project::export_file_name(&project.meta.title).into(),
    };
    fs::write(&path, html).map_err(|e| format!("IO error: {}", e))?;
    info!("✅ Book written to {}", path.display());
    Ok(path)
}

/// 資産一覧のJSON（配列、または `assets.simulators` を持つプロジェクト）を読む
pub fn load_asset_file<P: AsRef<Path>>(path: P) -> Result<Vec<SimulatorAsset>, String> {
    let source = fs::read_to_string(path).map_err(|e| format!("IO error: {}", e))?;
    let json: serde_json::Value = serde_json::from_str(&source).map_err(|e| format!("JSON error: {}", e))?;
    let list = match json {
        serde_json::Value::Array(_) => json,
        serde_json::Value::Object(mut map) => map
            .remove("assets")
            .and_then(|mut assets| assets.get_mut("simulators").map(serde_json::Value::take))
            .ok_or_else(|| "No simulators found".to_string())?,
        _ => return Err("Formato no reconocido.".to_string()),
    };
    serde_json::from_value(list).map_err(|e| format!("Invalid assets: {}", e))
}
