// ========================================
// シミュレーター描画シェル
// ========================================
//
// 表示フラグ（既定は非表示）を持ち、コード・パラメータ・表示フラグの
// いずれかが変わるたびにライフサイクル制御へ転送する。

use super::lifecycle::{LifecycleState, SimulatorInstance};
use crate::export::escape_html;
use crate::project::SimParams;

/// 呼び出し側に見せる状態
#[derive(Debug, Clone, PartialEq)]
pub enum RendererView {
    /// モジュールがまだ無い
    Loading,
    /// ロード・形式エラー（メッセージはそのまま）
    Error(String),
    Ready {
        title: String,
        visible: bool,
        format_label: String,
        /// 表示中のみ
        content_html: Option<String>,
    },
}

impl RendererView {
    /// トグルボタンの文言
    pub fn toggle_label(&self) -> Option<String> {
        match self {
            RendererView::Ready { title, visible, .. } => Some(if *visible {
                format!("Ocultar {}", title)
            } else {
                format!("Abrir {}", title)
            }),
            _ => None,
        }
    }

    /// エクスポートHTMLと同じクラス名でHTML片にする
    pub fn render_html(&self) -> String {
        match self {
            RendererView::Loading => "<div class=\"loading\">Cargando...</div>".to_string(),
            RendererView::Error(message) => {
                format!("<div class=\"feedback-incorrect\">Error: {}</div>", escape_html(message))
            }
            RendererView::Ready {
                visible,
                format_label,
                content_html,
                ..
            } => {
                let label = self.toggle_label().unwrap_or_default();
                let button_class = if *visible { "btn-sim btn-sim-rojo" } else { "btn-sim" };
                let mut html = format!(
                    "<div class=\"simulador-wrapper\"><button class=\"{}\">{}</button>",
                    button_class,
                    escape_html(&label)
                );
                if *visible {
                    html.push_str(&format!(
                        "<div class=\"simulador-box\"><div class=\"simulador-content\">{}</div><div class=\"text-muted\">Formato: {}</div></div>",
                        content_html.as_deref().unwrap_or(""),
                        escape_html(format_label)
                    ));
                }
                html.push_str("</div>");
                html
            }
        }
    }
}

#[derive(Debug)]
pub struct SimulatorRenderer {
    instance: SimulatorInstance,
    params: SimParams,
    visible: bool,
}

impl SimulatorRenderer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            instance: SimulatorInstance::new(label),
            params: SimParams::new(),
            visible: false,
        }
    }

    /// コード・パラメータを指定して作る（表示は閉じた状態）
    pub fn with_code(label: impl Into<String>, code: &str, params: SimParams) -> Self {
        let mut renderer = Self::new(label);
        renderer.params = params;
        renderer.set_code(code);
        renderer
    }

    pub fn instance(&self) -> &SimulatorInstance {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut SimulatorInstance {
        &mut self.instance
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.instance.set_display_name(name);
    }

    /// コードが変わった場合のみ再ロード
    pub fn set_code(&mut self, code: &str) {
        if self.instance.load(code) {
            self.forward();
        }
    }

    pub fn set_params(&mut self, params: SimParams) {
        if self.params != params {
            self.params = params;
            self.forward();
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            self.visible = visible;
            self.forward();
        }
    }

    pub fn toggle(&mut self) -> bool {
        self.set_visible(!self.visible);
        self.visible
    }

    fn forward(&mut self) {
        self.instance.sync(&self.params, self.visible);
    }

    pub fn tick(&mut self, ms: u32) {
        self.instance.tick(ms);
    }

    pub fn view(&mut self) -> RendererView {
        match self.instance.state() {
            LifecycleState::Unloaded | LifecycleState::Loading | LifecycleState::Destroyed => {
                return RendererView::Loading;
            }
            LifecycleState::LoadFailed => {
                let message = self
                    .instance
                    .load_error()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                return RendererView::Error(message);
            }
            _ => {}
        }

        let Some(module) = self.instance.module() else {
            return RendererView::Loading;
        };
        let title = module.display_name().to_string();
        let format_label = module.variant().format_label().to_string();
        let content_html = if self.visible {
            self.instance.content_html()
        } else {
            None
        };

        RendererView::Ready {
            title,
            visible: self.visible,
            format_label,
            content_html,
        }
    }

    pub fn render_html(&mut self) -> String {
        self.view().render_html()
    }
}

impl Drop for SimulatorRenderer {
    fn drop(&mut self) {
        self.instance.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NATIVE: &str = "export default { meta: { id: 'm', name: 'Dados', inputs: [] }, init(c, p) { c.innerHTML = '<b>' + (p.caras || 6) + '</b>'; }, update(c, p) { c.innerHTML = '<b>' + (p.caras || 6) + '</b>'; } };";

    #[test]
    fn test_hidden_by_default() {
        let mut renderer = SimulatorRenderer::with_code("r", NATIVE, SimParams::new());
        let view = renderer.view();

        assert_eq!(view.toggle_label().as_deref(), Some("Abrir Dados"));
        assert!(matches!(view, RendererView::Ready { visible: false, content_html: None, .. }));
        assert_eq!(renderer.instance().state(), LifecycleState::Loaded);
    }

    #[test]
    fn test_toggle_mounts_and_shows_format() {
        let mut renderer = SimulatorRenderer::with_code("r", NATIVE, SimParams::new());
        assert!(renderer.toggle());

        let view = renderer.view();
        assert_eq!(view.toggle_label().as_deref(), Some("Ocultar Dados"));
        match &view {
            RendererView::Ready { format_label, content_html, .. } => {
                assert_eq!(format_label, "Nativo V2");
                assert_eq!(content_html.as_deref(), Some("<b>6</b>"));
            }
            other => panic!("unexpected view: {:?}", other),
        }
        let html = view.render_html();
        assert!(html.contains("btn-sim btn-sim-rojo"));
        assert!(html.contains("Formato: Nativo V2"));
    }

    #[test]
    fn test_params_forwarded_when_visible() {
        let mut renderer = SimulatorRenderer::with_code("r", NATIVE, SimParams::new());
        renderer.set_visible(true);
        renderer.set_params(json!({ "caras": 20 }).as_object().cloned().unwrap());

        assert_eq!(renderer.instance_mut().content_html().as_deref(), Some("<b>20</b>"));
    }

    #[test]
    fn test_error_view_shows_message_verbatim() {
        let mut renderer = SimulatorRenderer::with_code("r", "export default { nada: true };", SimParams::new());
        match renderer.view() {
            RendererView::Error(message) => assert!(message.contains("init")),
            other => panic!("unexpected view: {:?}", other),
        }
        assert!(renderer.render_html().starts_with("<div class=\"feedback-incorrect\">Error: "));
    }

    #[test]
    fn test_loading_view_before_code() {
        let mut renderer = SimulatorRenderer::new("r");
        assert_eq!(renderer.view(), RendererView::Loading);
        assert_eq!(renderer.render_html(), "<div class=\"loading\">Cargando...</div>");
    }

    #[test]
    fn test_legacy_title_uses_display_name() {
        let mut renderer = SimulatorRenderer::with_code("r", "export default { render: () => '' };", SimParams::new());
        assert_eq!(renderer.view().toggle_label().as_deref(), Some("Abrir Simulador Importado"));

        renderer.set_display_name("Ruleta");
        match renderer.view() {
            RendererView::Ready { title, format_label, .. } => {
                assert_eq!(title, "Ruleta");
                assert_eq!(format_label, "Legacy V1");
            }
            other => panic!("unexpected view: {:?}", other),
        }
    }
}
