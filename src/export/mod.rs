// ========================================
// 静的エクスポート
// ========================================
//
// プロジェクト全体（全ページ・全シミュレーター資産）を、単体で動く
// 1つのHTML文書にまとめる。閲覧時には動的 import が使えないため、
// 資産のコードはデータとして埋め込み、閲覧ランタイム（reader.js）が
// 読み込み時に一度だけ関数として組み立てる。

pub mod escape;
pub mod preview;

pub use escape::{escape_html, escape_json_for_script};
pub use preview::ExportPreview;

use crate::engine::library::merge_assets;
use crate::project::{BookProject, SimulatorAsset};
use lazy_static::lazy_static;
use regex::{Captures, Regex};

const BOOK_TEMPLATE: &str = include_str!("book.html");
const BOOK_CSS: &str = include_str!("book.css");
pub const READER_JS: &str = include_str!("reader.js");

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{([A-Z_]+)\}\}").unwrap();
    static ref EMBEDDED_DATA: Regex =
        Regex::new(r"(?s)<script>window\.BOOK_DATA = (.*?);</script>").unwrap();
}

/// `{{NAME}}` を置き換える。未知の名前はそのまま残す。
fn fill_template(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// プロジェクトを `<script>` に埋め込めるJSONにする
pub fn embedded_book_data(project: &BookProject) -> Result<String, String> {
    let json = serde_json::to_string(project).map_err(|e| format!("JSON error: {}", e))?;
    Ok(escape_json_for_script(&json))
}

/// 単体で閲覧できるHTML文書を生成する
pub fn generate_book_html(project: &BookProject) -> Result<String, String> {
    let data = embedded_book_data(project)?;
    let title = escape_html(&project.meta.title);

    let html = fill_template(BOOK_TEMPLATE, |name| match name {
        "TITLE" => Some(title.clone()),
        "STYLES" => Some(BOOK_CSS.to_string()),
        "BOOK_DATA" => Some(data.clone()),
        "READER" => Some(READER_JS.to_string()),
        _ => None,
    });

    log::info!(
        "📦 Exported '{}': {} pages, {} simulators, {} bytes",
        project.meta.title,
        project.pages.len(),
        project.assets.simulators.len(),
        html.len()
    );
    Ok(html)
}

/// クラウド側の資産を統合してからエクスポートする（同じIDはプロジェクト側が優先）
pub fn generate_book_html_with_assets(project: &BookProject, extra: &[SimulatorAsset]) -> Result<String, String> {
    let mut merged = project.clone();
    merged.assets.simulators = merge_assets(extra, &project.assets.simulators);
    log::debug!(
        "Merged assets: {} extra + {} local -> {}",
        extra.len(),
        project.assets.simulators.len(),
        merged.assets.simulators.len()
    );
    generate_book_html(&merged)
}

/// エクスポートHTMLに埋め込まれたプロジェクトを取り出す
pub fn extract_embedded_project(html: &str) -> Result<BookProject, String> {
    let caps = EMBEDDED_DATA
        .captures(html)
        .ok_or_else(|| "No embedded BOOK_DATA found".to_string())?;
    serde_json::from_str(&caps[1]).map_err(|e| format!("JSON error: {}", e))
}
