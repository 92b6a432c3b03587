// ========================================
// 教科書プロジェクトのデータモデル
// ========================================
//
// JSONのフィールド名はオーサリングツールが保存する形式（camelCase）に合わせる。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// シミュレーターに渡すパラメータ（ブロックの `simConfig`）
pub type SimParams = Map<String, Value>;

/// アップロード済みシミュレーターのコード資産
///
/// 保存後は不変。再アップロードは新しい資産を作る。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorAsset {
    pub id: String,
    pub name: String,
    pub code: String,
    pub version: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Text,
    Image,
    Simulator,
    Latex,
}

/// ページ内の1ブロック（文章 or シミュレーター参照）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    #[serde(default)]
    pub content: String,
    /// 資産コレクションへの弱参照。解決できないこともある（legacy_ 付きIDなど）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_config: Option<SimParams>,
}

impl ContentBlock {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            block_type: BlockType::Text,
            content: content.into(),
            simulator_id: None,
            sim_config: None,
        }
    }

    pub fn simulator(simulator_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            block_type: BlockType::Simulator,
            content: String::new(),
            simulator_id: Some(simulator_id.into()),
            sim_config: Some(SimParams::new()),
        }
    }

    pub fn is_simulator(&self) -> bool {
        self.block_type == BlockType::Simulator
    }

    /// `simConfig` が無ければ空のパラメータ
    pub fn params(&self) -> SimParams {
        self.sim_config.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Portada,
    Capitulo,
    #[default]
    Seccion,
    Subseccion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    pub title: String,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMeta {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub theme: Theme,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Assets {
    #[serde(default)]
    pub simulators: Vec<SimulatorAsset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookProject {
    pub meta: BookMeta,
    #[serde(default)]
    pub assets: Assets,
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl BookProject {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            meta: BookMeta {
                title: title.into(),
                author: author.into(),
                created: chrono::Utc::now().timestamp_millis(),
                theme: Theme::Light,
            },
            assets: Assets::default(),
            pages: Vec::new(),
        }
    }

    /// 全ページのシミュレーターブロックを (ページ番号, ブロック) で列挙
    pub fn simulator_blocks(&self) -> impl Iterator<Item = (usize, &ContentBlock)> {
        self.pages.iter().enumerate().flat_map(|(index, page)| {
            page.blocks
                .iter()
                .filter(|block| block.is_simulator())
                .map(move |block| (index, block))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_json_uses_camel_case() {
        let mut block = ContentBlock::simulator("sim_abc");
        block.id = "b1".to_string();
        let json = serde_json::to_value(&block).unwrap();

        assert_eq!(json["type"], "simulator");
        assert_eq!(json["simulatorId"], "sim_abc");
        assert!(json["simConfig"].is_object());
    }

    #[test]
    fn test_project_without_assets_deserializes() {
        let json = r#"{
            "meta": { "title": "Libro", "author": "Profe", "created": 1, "theme": "dark" },
            "pages": [ { "id": "p1", "type": "capitulo", "title": "Uno", "blocks": [
                { "id": "b1", "type": "text", "content": "hola" }
            ] } ]
        }"#;
        let project: BookProject = serde_json::from_str(json).unwrap();

        assert!(project.assets.simulators.is_empty());
        assert_eq!(project.meta.theme, Theme::Dark);
        assert_eq!(project.pages[0].node_type, NodeType::Capitulo);
        assert_eq!(project.pages[0].blocks[0].simulator_id, None);
    }

    #[test]
    fn test_simulator_blocks_are_listed_with_page_index() {
        let mut project = BookProject::new("Libro", "Profe");
        project.pages.push(Page {
            id: "p1".into(),
            node_type: NodeType::Seccion,
            title: "A".into(),
            blocks: vec![ContentBlock::text("x"), ContentBlock::simulator("sim_1")],
        });
        project.pages.push(Page {
            id: "p2".into(),
            node_type: NodeType::Seccion,
            title: "B".into(),
            blocks: vec![ContentBlock::simulator("legacy_2")],
        });

        let refs: Vec<(usize, Option<&str>)> = project
            .simulator_blocks()
            .map(|(page, block)| (page, block.simulator_id.as_deref()))
            .collect();
        assert_eq!(refs, vec![(0, Some("sim_1")), (1, Some("legacy_2"))]);
    }
}
