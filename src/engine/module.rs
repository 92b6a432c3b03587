use crate::dom::{call_method, js_error_message, js_str, js_to_string, DomElement, HostDocument, TimerReport};
use crate::error::{SimulatorError, SimulatorResult};
use crate::project::SimParams;
use boa_engine::{Context, JsObject, JsValue, Source};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 表示名が無いときの汎用名
pub const FALLBACK_DISPLAY_NAME: &str = "Simulador";

/// プラグインの任意メタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorMeta {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub inputs: Vec<Value>,
}

/// プラグインの形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleVariant {
    /// `init(container, params)` / `update` / `destroy`
    Mounting,
    /// `render(params, displayName) -> string`（旧形式）
    RenderString,
}

impl ModuleVariant {
    pub fn format_label(&self) -> &'static str {
        match self {
            ModuleVariant::Mounting => "Nativo V2",
            ModuleVariant::RenderString => "Legacy V1",
        }
    }
}

/// 形式ごとの呼び出し先。ロード後に形式が変わることはない。
#[derive(Debug, Clone)]
pub enum ModuleKind {
    Mounting {
        init: JsObject,
        update: Option<JsObject>,
        destroy: Option<JsObject>,
    },
    RenderString {
        render: JsObject,
    },
}

impl ModuleKind {
    pub fn variant(&self) -> ModuleVariant {
        match self {
            ModuleKind::Mounting { .. } => ModuleVariant::Mounting,
            ModuleKind::RenderString { .. } => ModuleVariant::RenderString,
        }
    }
}

/// コンパイル済みシミュレーター
///
/// 専用のJSレルムを所有する。永続化はされず、必要なたびに資産のコードから作り直す。
pub struct SimulatorModule {
    pub(crate) kind: ModuleKind,
    pub(crate) exports: JsObject,
    meta: Option<SimulatorMeta>,
    placeholder_meta: bool,
    display_name: Option<String>,
    pub(crate) document: HostDocument,
    pub(crate) context: Context,
}

impl fmt::Debug for SimulatorModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatorModule")
            .field("variant", &self.variant())
            .field("meta", &self.meta)
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl SimulatorModule {
    pub(crate) fn new(
        kind: ModuleKind,
        exports: JsObject,
        meta: Option<SimulatorMeta>,
        placeholder_meta: bool,
        document: HostDocument,
        context: Context,
    ) -> Self {
        Self {
            kind,
            exports,
            meta,
            placeholder_meta,
            display_name: None,
            document,
            context,
        }
    }

    pub fn variant(&self) -> ModuleVariant {
        self.kind.variant()
    }

    pub fn meta(&self) -> Option<&SimulatorMeta> {
        self.meta.as_ref()
    }

    pub fn has_update(&self) -> bool {
        matches!(self.kind, ModuleKind::Mounting { update: Some(_), .. })
    }

    pub fn has_destroy(&self) -> bool {
        matches!(self.kind, ModuleKind::Mounting { destroy: Some(_), .. })
    }

    /// 呼び出し側が知っている名前（資産名など）。プラグイン自身の `meta.name` が優先される。
    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = Some(name.into());
    }

    /// `meta.name` → 呼び出し側の名前 → 汎用名。仮メタの名前は呼び出し側の名前に負ける。
    pub fn display_name(&self) -> &str {
        let caller_name = self.display_name.as_deref().filter(|n| !n.is_empty());
        if self.meta.is_none() || self.placeholder_meta {
            if let Some(name) = caller_name {
                return name;
            }
        }
        self.meta
            .as_ref()
            .map(|meta| meta.name.as_str())
            .filter(|name| !name.is_empty())
            .or(caller_name)
            .unwrap_or(FALLBACK_DISPLAY_NAME)
    }

    pub fn host_document(&self) -> &HostDocument {
        &self.document
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub(crate) fn create_container(&mut self, label: &str) -> SimulatorResult<DomElement> {
        self.document
            .create_container(&mut self.context, label)
            .map_err(|e| SimulatorError::Load(js_error_message(&e, &mut self.context)))
    }

    fn params_value(&mut self, params: &SimParams) -> SimulatorResult<JsValue> {
        JsValue::from_json(&Value::Object(params.clone()), &mut self.context)
            .map_err(|e| SimulatorError::Mount(js_error_message(&e, &mut self.context)))
    }

    fn call(&mut self, function: &JsObject, args: &[JsValue]) -> SimulatorResult<JsValue> {
        let this = JsValue::from(self.exports.clone());
        let result = function.call(&this, args, &mut self.context);
        self.context.run_jobs();
        result.map_err(|e| SimulatorError::Mount(js_error_message(&e, &mut self.context)))
    }

    pub(crate) fn invoke_init(&mut self, container: &DomElement, params: &SimParams) -> SimulatorResult<()> {
        let ModuleKind::Mounting { init, .. } = &self.kind else {
            return Ok(());
        };
        let init = init.clone();
        let params = self.params_value(params)?;
        self.call(&init, &[container.as_value(), params])?;
        Ok(())
    }

    /// `update` が無ければ何もしない
    pub(crate) fn invoke_update(&mut self, container: &DomElement, params: &SimParams) -> SimulatorResult<()> {
        let ModuleKind::Mounting { update: Some(update), .. } = &self.kind else {
            return Ok(());
        };
        let update = update.clone();
        let params = self.params_value(params)?;
        self.call(&update, &[container.as_value(), params])?;
        Ok(())
    }

    pub(crate) fn invoke_destroy(&mut self, container: &DomElement) -> SimulatorResult<()> {
        let ModuleKind::Mounting { destroy: Some(destroy), .. } = &self.kind else {
            return Ok(());
        };
        let destroy = destroy.clone();
        self.call(&destroy, &[container.as_value()])?;
        Ok(())
    }

    /// 旧形式の `render(params, displayName)` を呼んで文字列を得る
    pub(crate) fn invoke_render(&mut self, params: &SimParams) -> SimulatorResult<String> {
        let ModuleKind::RenderString { render } = &self.kind else {
            return Err(SimulatorError::Mount("El simulador no tiene función render()".to_string()));
        };
        let render = render.clone();
        let params = self.params_value(params)?;
        let name = js_str(self.display_name());
        let output = self.call(&render, &[params, name])?;
        js_to_string(&output, &mut self.context)
            .map_err(|e| SimulatorError::Mount(js_error_message(&e, &mut self.context)))
    }

    pub(crate) fn inject_script(&mut self, script: &str, cleanup_delay_ms: u32) -> SimulatorResult<()> {
        self.document
            .inject_script(&mut self.context, script, cleanup_delay_ms)
            .map_err(|e| SimulatorError::Mount(js_error_message(&e, &mut self.context)))?;
        match self.document.drain_script_errors(&mut self.context) {
            Ok(errors) => {
                if let Some(first) = errors.first() {
                    log::warn!("Script of '{}' raised: {}", self.display_name(), first);
                }
            }
            Err(e) => log::debug!("script error drain failed: {}", e),
        }
        Ok(())
    }

    /// 仮想時計を進め、console 出力を転送する
    pub fn advance(&mut self, ms: u32) -> SimulatorResult<TimerReport> {
        let report = self
            .document
            .advance(&mut self.context, ms)
            .map_err(|e| SimulatorError::Mount(js_error_message(&e, &mut self.context)))?;
        for error in &report.errors {
            log::warn!("Timer of '{}' raised: {}", self.display_name(), error);
        }
        self.forward_console();
        Ok(report)
    }

    pub fn forward_console(&mut self) {
        if let Err(e) = self.document.forward_console(&mut self.context) {
            log::debug!("console forwarding failed: {}", e);
        }
    }

    /// モジュールのレルムで式を評価しJSONとして返す（診断・テスト用）
    pub fn evaluate(&mut self, expression: &str) -> SimulatorResult<Value> {
        let value = self
            .context
            .eval(Source::from_bytes(expression))
            .map_err(|e| SimulatorError::Mount(js_error_message(&e, &mut self.context)))?;
        if value.is_undefined() {
            return Ok(Value::Null);
        }
        value
            .to_json(&mut self.context)
            .map_err(|e| SimulatorError::Mount(js_error_message(&e, &mut self.context)))
    }

    /// `exports` 上のメソッドを直接呼ぶ（ユーザー操作のシミュレーション用）
    pub fn call_export(&mut self, name: &str, args: &[JsValue]) -> SimulatorResult<JsValue> {
        let exports = self.exports.clone();
        let result = call_method(&exports, name, args, &mut self.context);
        result.map_err(|e| SimulatorError::Mount(js_error_message(&e, &mut self.context)))
    }
}
