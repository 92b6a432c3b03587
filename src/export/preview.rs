// エクスポートHTMLをヘッドレスに起動して、閲覧ランタイムの動作を確かめる。

use crate::dom::{install_host_document, js_error_message, HostDocument};
use crate::engine::lifecycle::SCRIPT_CLEANUP_DELAY_MS;
use boa_engine::{Context, Source};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref BODY: Regex = Regex::new(r"(?is)<body[^>]*>(.*)</body>").unwrap();
    static ref SCRIPT_TAG: Regex = Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script>").unwrap();
}

pub struct ExportPreview {
    context: Context,
    document: HostDocument,
    script_errors: Vec<String>,
}

impl std::fmt::Debug for ExportPreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportPreview")
            .field("script_errors", &self.script_errors)
            .finish()
    }
}

impl ExportPreview {
    /// 本文を組み立て、外部 `src` を持たないスクリプトを順に実行し、読み込み完了を通知する
    pub fn boot(html: &str) -> Result<Self, String> {
        let mut context = Context::default();
        let document = install_host_document(&mut context).map_err(|e| js_error_message(&e, &mut context))?;

        let body = BODY
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| SCRIPT_TAG.replace_all(m.as_str(), "").into_owned())
            .ok_or_else(|| "Exported document has no <body>".to_string())?;
        let body_element = document.body(&mut context).map_err(|e| js_error_message(&e, &mut context))?;
        body_element
            .set_inner_html(&mut context, &body)
            .map_err(|e| js_error_message(&e, &mut context))?;

        let mut script_errors = Vec::new();
        for caps in SCRIPT_TAG.captures_iter(html) {
            let attributes = caps.get(1).map_or("", |m| m.as_str());
            if attributes.to_ascii_lowercase().contains("src=") {
                log::debug!("Skipping external script");
                continue;
            }
            let source = caps.get(2).map_or("", |m| m.as_str());
            if let Err(e) = context.eval(Source::from_bytes(source)) {
                let message = js_error_message(&e, &mut context);
                log::warn!("Inline script failed: {}", message);
                script_errors.push(message);
            }
        }

        document.ready(&mut context).map_err(|e| js_error_message(&e, &mut context))?;
        let mut preview = Self {
            context,
            document,
            script_errors,
        };
        preview.tick(SCRIPT_CLEANUP_DELAY_MS)?;
        Ok(preview)
    }

    /// インラインスクリプトと閲覧ランタイムの例外
    pub fn script_errors(&self) -> &[String] {
        &self.script_errors
    }

    pub fn tick(&mut self, ms: u32) -> Result<(), String> {
        let report = self
            .document
            .advance(&mut self.context, ms)
            .map_err(|e| js_error_message(&e, &mut self.context))?;
        self.script_errors.extend(report.errors);
        let injected = self
            .document
            .drain_script_errors(&mut self.context)
            .map_err(|e| js_error_message(&e, &mut self.context))?;
        self.script_errors.extend(injected);
        if let Err(e) = self.document.forward_console(&mut self.context) {
            log::debug!("console forwarding failed: {}", js_error_message(&e, &mut self.context));
        }
        Ok(())
    }

    /// 閲覧ランタイムのレルムで式を評価しJSONで返す
    pub fn evaluate(&mut self, expression: &str) -> Result<Value, String> {
        let value = self
            .context
            .eval(Source::from_bytes(expression))
            .map_err(|e| js_error_message(&e, &mut self.context))?;
        if value.is_undefined() {
            return Ok(Value::Null);
        }
        value
            .to_json(&mut self.context)
            .map_err(|e| js_error_message(&e, &mut self.context))
    }

    fn element_property(&mut self, id: &str, property: &str) -> Result<Value, String> {
        let id = serde_json::to_string(id).map_err(|e| e.to_string())?;
        self.evaluate(&format!(
            "(function () {{ const el = document.getElementById({}); return el ? el.{} : null; }})()",
            id, property
        ))
    }

    fn element_string(&mut self, id: &str, property: &str) -> Result<String, String> {
        Ok(self
            .element_property(id, property)?
            .as_str()
            .map(str::to_string)
            .unwrap_or_default())
    }

    /// 現在のページの本文
    pub fn content_html(&mut self) -> Result<String, String> {
        self.element_string("book-content", "innerHTML")
    }

    pub fn content_text(&mut self) -> Result<String, String> {
        self.element_string("book-content", "textContent")
    }

    /// `Página i de n`
    pub fn page_label(&mut self) -> Result<String, String> {
        self.element_string("page-num", "textContent")
    }

    pub fn is_disabled(&mut self, button_id: &str) -> Result<bool, String> {
        Ok(self.element_property(button_id, "disabled")?.as_bool().unwrap_or(false))
    }

    fn click(&mut self, id: &str) -> Result<(), String> {
        let target = self
            .document
            .element_by_id(&mut self.context, id)
            .map_err(|e| js_error_message(&e, &mut self.context))?
            .ok_or_else(|| format!("#{} not found", id))?;
        target
            .click(&mut self.context)
            .map_err(|e| js_error_message(&e, &mut self.context))?;
        self.tick(SCRIPT_CLEANUP_DELAY_MS)
    }

    pub fn next(&mut self) -> Result<(), String> {
        self.click("btn-next")
    }

    pub fn prev(&mut self) -> Result<(), String> {
        self.click("btn-prev")
    }

    /// 閲覧ランタイムが組み立てたシミュレーターのID一覧
    pub fn simulator_ids(&mut self) -> Result<Vec<String>, String> {
        let value = self.evaluate("window.BOOK_READER ? window.BOOK_READER.simulatorIds() : []")?;
        serde_json::from_value(value).map_err(|e| e.to_string())
    }

    /// 閲覧ランタイムでIDが解決できるか（`legacy_` 除去を含む）
    pub fn resolves(&mut self, id: &str) -> Result<bool, String> {
        let id = serde_json::to_string(id).map_err(|e| e.to_string())?;
        let value = self.evaluate(&format!(
            "!!(window.BOOK_READER && window.BOOK_READER.resolve({}))",
            id
        ))?;
        Ok(value.as_bool().unwrap_or(false))
    }
}
