pub mod legacy;
pub mod types;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::Path;

pub use types::{
    Assets, BlockType, BookMeta, BookProject, ContentBlock, NodeType, Page, SimParams,
    SimulatorAsset, Theme,
};

lazy_static! {
    static ref NON_SLUG: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// 読み込んだプロジェクトがどの形式だったか
#[derive(Debug, Clone)]
pub enum LoadedProject {
    Current(BookProject),
    /// 旧形式から変換済み
    Legacy(BookProject),
}

impl LoadedProject {
    pub fn into_project(self) -> BookProject {
        match self {
            LoadedProject::Current(project) | LoadedProject::Legacy(project) => project,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, LoadedProject::Legacy(_))
    }
}

// プロジェクトJSONをパースする。新形式と旧形式（配列）を自動判別。
pub fn parse_project_json(source: &str) -> Result<LoadedProject, String> {
    let json: Value = serde_json::from_str(source).map_err(|e| format!("JSON error: {}", e))?;

    match json {
        Value::Object(ref map) if map.contains_key("meta") && map.contains_key("pages") => {
            let project: BookProject =
                serde_json::from_value(json).map_err(|e| format!("Invalid project: {}", e))?;
            Ok(LoadedProject::Current(project))
        }
        Value::Array(pages) => {
            log::info!("Legacy format detected, converting...");
            legacy::convert_legacy_pages(pages).map(LoadedProject::Legacy)
        }
        _ => Err("Formato no reconocido.".to_string()),
    }
}

pub fn load_project_file<P: AsRef<Path>>(path: P) -> Result<LoadedProject, String> {
    let source = fs::read_to_string(path).map_err(|e| format!("IO error: {}", e))?;
    parse_project_json(&source)
}

pub fn save_project_file<P: AsRef<Path>>(path: P, project: &BookProject) -> Result<(), String> {
    let json = serde_json::to_string_pretty(project).map_err(|e| format!("JSON error: {}", e))?;
    fs::write(path, json).map_err(|e| format!("IO error: {}", e))
}

/// 書名からクラウド保存用のチャンネルIDを作る
pub fn channel_id(title: &str) -> String {
    NON_SLUG
        .replace_all(&title.trim().to_lowercase(), "_")
        .into_owned()
}

/// エクスポートHTMLのファイル名
pub fn export_file_name(title: &str) -> String {
    let title = if title.is_empty() { "Libro" } else { title };
    format!("{}_completo.html", WHITESPACE.replace_all(title, "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_current_format() {
        let loaded = parse_project_json(
            r#"{"meta":{"title":"T"},"assets":{"simulators":[]},"pages":[]}"#,
        )
        .unwrap();
        assert!(!loaded.is_legacy());
        assert_eq!(loaded.into_project().meta.title, "T");
    }

    #[test]
    fn test_detects_legacy_format() {
        let loaded = parse_project_json(r#"[{"titulo":"A","contenido":"[simulador:q]"}]"#).unwrap();
        assert!(loaded.is_legacy());
        let project = loaded.into_project();
        assert_eq!(project.pages[0].blocks[0].simulator_id.as_deref(), Some("legacy_q"));
    }

    #[test]
    fn test_rejects_unknown_shape() {
        assert_eq!(
            parse_project_json(r#"{"hello":1}"#).unwrap_err(),
            "Formato no reconocido."
        );
        assert!(parse_project_json("{").unwrap_err().starts_with("JSON error"));
    }

    #[test]
    fn test_channel_id_and_file_name() {
        assert_eq!(channel_id("  Mi Libro: Estadística 1 "), "mi_libro_estad_stica_1");
        assert_eq!(export_file_name("Mi  Libro"), "Mi_Libro_completo.html");
        assert_eq!(export_file_name(""), "Libro_completo.html");
    }
}
