// 旧形式（ページ配列 + `[simulador:<id>]` マーカー）からの変換

use super::types::{BookMeta, BookProject, ContentBlock, NodeType, Page, Theme};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// 旧形式のシミュレーター参照に付けるプレフィックス
pub const LEGACY_PREFIX: &str = "legacy_";

lazy_static! {
    static ref SIMULATOR_MARKER: Regex = Regex::new(r"\[simulador:([a-zA-Z0-9_]+)\]").unwrap();
}

#[derive(Debug, Deserialize)]
struct LegacyPage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    titulo: Option<String>,
    #[serde(default)]
    contenido: Option<String>,
    #[serde(default)]
    tipo: Option<String>,
}

/// 旧形式のIDを `legacy_<id>` に変換
pub fn legacy_simulator_id(raw_id: &str) -> String {
    format!("{}{}", LEGACY_PREFIX, raw_id)
}

/// 本文をテキストブロックとシミュレーターブロックに分割
pub fn split_legacy_content(content: &str) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    let mut last_index = 0;

    for captures in SIMULATOR_MARKER.captures_iter(content) {
        let Some(full) = captures.get(0) else { continue };
        let text = content[last_index..full.start()].trim();
        if !text.is_empty() {
            blocks.push(ContentBlock::text(text));
        }
        if let Some(raw_id) = captures.get(1) {
            blocks.push(ContentBlock::simulator(legacy_simulator_id(raw_id.as_str())));
        }
        last_index = full.end();
    }

    let remaining = content[last_index..].trim();
    if !remaining.is_empty() {
        blocks.push(ContentBlock::text(remaining));
    }
    blocks
}

fn convert_page(legacy: LegacyPage) -> Page {
    let mut blocks = split_legacy_content(legacy.contenido.as_deref().unwrap_or(""));
    if blocks.is_empty() {
        blocks.push(ContentBlock::text(""));
    }

    let node_type = match legacy.tipo.as_deref() {
        Some("capitulo") => NodeType::Capitulo,
        Some("portada") => NodeType::Portada,
        _ => NodeType::Seccion,
    };

    let id = match legacy.id {
        Some(Value::String(id)) if !id.is_empty() => id,
        Some(Value::Number(n)) => n.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    };

    Page {
        id,
        node_type,
        title: legacy
            .titulo
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Sin Título".to_string()),
        blocks,
    }
}

/// 旧形式のJSON配列をプロジェクトに変換
///
/// 資産は移行されない。`legacy_<id>` 参照は描画時にプレフィックスを外して再解決される。
pub fn convert_legacy_pages(pages: Vec<Value>) -> Result<BookProject, String> {
    let mut converted = Vec::with_capacity(pages.len());
    for (index, page) in pages.into_iter().enumerate() {
        let legacy: LegacyPage = serde_json::from_value(page)
            .map_err(|e| format!("Legacy page {} is invalid: {}", index, e))?;
        converted.push(convert_page(legacy));
    }
    log::info!("Converted {} legacy pages", converted.len());

    Ok(BookProject {
        meta: BookMeta {
            title: "Libro Importado (Legacy)".to_string(),
            author: "Usuario".to_string(),
            created: chrono::Utc::now().timestamp_millis(),
            theme: Theme::Light,
        },
        assets: Default::default(),
        pages: converted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::types::BlockType;
    use serde_json::json;

    #[test]
    fn test_split_text_and_markers() {
        let blocks = split_legacy_content("Intro  [simulador:dados_1] medio [simulador:abc]  ");

        let shape: Vec<(BlockType, String, Option<String>)> = blocks
            .iter()
            .map(|b| (b.block_type, b.content.clone(), b.simulator_id.clone()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (BlockType::Text, "Intro".to_string(), None),
                (BlockType::Simulator, String::new(), Some("legacy_dados_1".to_string())),
                (BlockType::Text, "medio".to_string(), None),
                (BlockType::Simulator, String::new(), Some("legacy_abc".to_string())),
            ]
        );
    }

    #[test]
    fn test_marker_with_invalid_chars_stays_text() {
        let blocks = split_legacy_content("ver [simulador:a-b]");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "ver [simulador:a-b]");
    }

    #[test]
    fn test_convert_pages_defaults() {
        let project = convert_legacy_pages(vec![
            json!({ "id": "c1", "titulo": "Capítulo 1", "tipo": "capitulo", "contenido": "[simulador:x1]" }),
            json!({ "id": 7, "contenido": "" }),
        ])
        .unwrap();

        assert_eq!(project.pages.len(), 2);
        assert_eq!(project.pages[0].node_type, NodeType::Capitulo);
        assert_eq!(project.pages[0].blocks[0].simulator_id.as_deref(), Some("legacy_x1"));
        assert_eq!(project.pages[1].id, "7");
        assert_eq!(project.pages[1].title, "Sin Título");
        assert_eq!(project.pages[1].node_type, NodeType::Seccion);
        assert_eq!(project.pages[1].blocks.len(), 1);
        assert!(project.assets.simulators.is_empty());
    }
}
