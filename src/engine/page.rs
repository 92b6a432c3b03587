// 1ページ分のライブプレビュー。ブロックごとに失敗を閉じ込める。

use super::library::AssetLibrary;
use super::renderer::SimulatorRenderer;
use crate::error::SimulatorError;
use crate::export::escape_html;
use crate::project::{BlockType, ContentBlock, Page};

/// 見つからないIDの表示（IDをそのまま含める）
pub fn resolution_error_fragment(id: &str) -> String {
    let error = SimulatorError::Resolution(id.to_string());
    format!("<div class=\"feedback-incorrect\">⚠️ {}</div>", escape_html(&error.to_string()))
}

/// `simulatorId` が空のブロックの表示
pub fn unassigned_fragment() -> String {
    "<div class=\"feedback-incorrect\">⚠️ Sin simulador asignado</div>".to_string()
}

/// 文章ブロックは改行を `<br>` にしてそのまま出す（LaTeXは閲覧側で組版）
pub fn text_block_html(content: &str) -> String {
    format!("<div class=\"text-block\">{}</div>", content.replace('\n', "<br>"))
}

#[derive(Debug)]
enum BlockSlot {
    Static(String),
    Simulator(SimulatorRenderer),
}

#[derive(Debug)]
pub struct PagePreview {
    title: String,
    slots: Vec<(String, BlockSlot)>,
}

impl PagePreview {
    pub fn build(page: &Page, library: &AssetLibrary) -> Self {
        let slots = page
            .blocks
            .iter()
            .map(|block| (block.id.clone(), Self::slot_for(block, library)))
            .collect();
        Self {
            title: page.title.clone(),
            slots,
        }
    }

    fn slot_for(block: &ContentBlock, library: &AssetLibrary) -> BlockSlot {
        match block.block_type {
            BlockType::Simulator => {
                let Some(id) = block.simulator_id.as_deref().filter(|id| !id.is_empty()) else {
                    return BlockSlot::Static(unassigned_fragment());
                };
                match library.resolve(id) {
                    Some(asset) => {
                        let mut renderer = SimulatorRenderer::new(block.id.clone());
                        renderer.set_display_name(asset.name.clone());
                        renderer.set_params(block.params());
                        renderer.set_code(&asset.code);
                        BlockSlot::Simulator(renderer)
                    }
                    None => {
                        log::warn!("Simulator '{}' not found for block {}", id, block.id);
                        BlockSlot::Static(resolution_error_fragment(id))
                    }
                }
            }
            BlockType::Image => BlockSlot::Static(format!(
                "<div class=\"image-block\"><img src=\"{}\"></div>",
                escape_html(&block.content)
            )),
            BlockType::Text | BlockType::Latex => BlockSlot::Static(text_block_html(&block.content)),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn simulator(&mut self, block_id: &str) -> Option<&mut SimulatorRenderer> {
        self.slots.iter_mut().find_map(|(id, slot)| match slot {
            BlockSlot::Simulator(renderer) if id == block_id => Some(renderer),
            _ => None,
        })
    }

    /// すべてのシミュレーターの表示フラグを揃える
    pub fn set_all_visible(&mut self, visible: bool) {
        for (_, slot) in self.slots.iter_mut() {
            if let BlockSlot::Simulator(renderer) = slot {
                renderer.set_visible(visible);
            }
        }
    }

    pub fn tick(&mut self, ms: u32) {
        for (_, slot) in self.slots.iter_mut() {
            if let BlockSlot::Simulator(renderer) = slot {
                renderer.tick(ms);
            }
        }
    }

    pub fn render_html(&mut self) -> String {
        let mut html = format!("<h2>{}</h2>", escape_html(&self.title));
        for (_, slot) in self.slots.iter_mut() {
            match slot {
                BlockSlot::Static(fragment) => html.push_str(fragment),
                BlockSlot::Simulator(renderer) => html.push_str(&renderer.render_html()),
            }
        }
        html
    }
}
