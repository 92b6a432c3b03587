// ========================================
// 形式判定（Format Validator）
// ========================================
//
// 名前ではなく機能の有無で判定する。`init` があれば新形式、
// 無くて `render` があれば旧形式、どちらも無ければ拒否。

use super::module::{ModuleKind, SimulatorMeta};
use crate::dom::js_error_message;
use crate::error::{SimulatorError, SimulatorResult};
use crate::project::legacy::LEGACY_PREFIX;
use boa_engine::{js_string, Context, JsError, JsObject, JsString, JsValue};
use std::sync::atomic::{AtomicI64, Ordering};

/// 旧形式でメタデータが無いときの仮の名前（アップロード時に上書きされる前提）
pub const PLACEHOLDER_NAME: &str = "Simulador Importado";
pub const PLACEHOLDER_VERSION: &str = "0.0.0";

pub const FORMAT_ERROR_MESSAGE: &str =
    "Formato inválido: el simulador debe exportar 'init' (Nativo V2) o 'render' (Legacy V1)";

static LAST_TOKEN: AtomicI64 = AtomicI64::new(0);

/// ミリ秒時刻ベースで単調増加するトークン
pub fn next_placeholder_token() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let mut last = LAST_TOKEN.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_TOKEN.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

pub fn placeholder_meta() -> SimulatorMeta {
    SimulatorMeta {
        id: format!("{}{}", LEGACY_PREFIX, next_placeholder_token()),
        name: PLACEHOLDER_NAME.to_string(),
        version: Some(PLACEHOLDER_VERSION.to_string()),
        inputs: Vec::new(),
    }
}

/// 判定結果
#[derive(Debug, Clone)]
pub struct Classified {
    pub kind: ModuleKind,
    pub exports: JsObject,
    pub meta: Option<SimulatorMeta>,
    /// `meta` が仮の値（呼び出し側の名前で置き換えてよい）
    pub placeholder: bool,
}

fn callable_member(object: &JsObject, name: &str, context: &mut Context) -> SimulatorResult<Option<JsObject>> {
    let value = object
        .get(JsString::from(name), context)
        .map_err(|e| load_error(&e, context))?;
    Ok(value.as_callable().cloned())
}

fn load_error(error: &JsError, context: &mut Context) -> SimulatorError {
    SimulatorError::Load(js_error_message(error, context))
}

fn read_meta(object: &JsObject, context: &mut Context) -> SimulatorResult<Option<SimulatorMeta>> {
    let value = object
        .get(js_string!("meta"), context)
        .map_err(|e| load_error(&e, context))?;
    if !value.is_object() {
        return Ok(None);
    }
    let json = value.to_json(context).map_err(|e| load_error(&e, context))?;
    match serde_json::from_value::<SimulatorMeta>(json) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) => {
            log::warn!("Ignoring malformed simulator meta: {}", e);
            Ok(None)
        }
    }
}

fn write_meta(object: &JsObject, meta: &SimulatorMeta, context: &mut Context) -> SimulatorResult<()> {
    let json = serde_json::to_value(meta).map_err(|e| SimulatorError::Load(e.to_string()))?;
    let value = JsValue::from_json(&json, context).map_err(|e| load_error(&e, context))?;
    object
        .set(js_string!("meta"), value, true, context)
        .map_err(|e| load_error(&e, context))?;
    Ok(())
}

/// コンパイル済みの値を判定する
pub fn classify(candidate: &JsValue, context: &mut Context) -> SimulatorResult<Classified> {
    let Some(exports) = candidate.as_object().cloned() else {
        return Err(SimulatorError::Format(FORMAT_ERROR_MESSAGE.to_string()));
    };

    let init = callable_member(&exports, "init", context)?;
    let render = callable_member(&exports, "render", context)?;
    let mut meta = read_meta(&exports, context)?;
    let mut placeholder = false;

    let kind = match (init, render) {
        (Some(init), _) => ModuleKind::Mounting {
            init,
            update: callable_member(&exports, "update", context)?,
            destroy: callable_member(&exports, "destroy", context)?,
        },
        (None, Some(render)) => {
            if meta.is_none() {
                let placeholder_meta = placeholder_meta();
                log::debug!("Legacy simulator without meta, using {}", placeholder_meta.id);
                write_meta(&exports, &placeholder_meta, context)?;
                meta = Some(placeholder_meta);
                placeholder = true;
            }
            ModuleKind::RenderString { render }
        }
        (None, None) => return Err(SimulatorError::Format(FORMAT_ERROR_MESSAGE.to_string())),
    };

    Ok(Classified {
        kind,
        exports,
        meta,
        placeholder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::module::ModuleVariant;
    use boa_engine::Source;

    fn classify_source(source: &str) -> (SimulatorResult<Classified>, Context) {
        let mut context = Context::default();
        let value = context.eval(Source::from_bytes(source)).unwrap();
        (classify(&value, &mut context), context)
    }

    #[test]
    fn test_init_wins_over_render() {
        let (result, _) = classify_source("({ init() {}, render() { return '' } })");
        assert_eq!(result.unwrap().kind.variant(), ModuleVariant::Mounting);
    }

    #[test]
    fn test_render_only_gets_placeholder_meta() {
        let (result, mut context) = classify_source("globalThis.m = ({ render() { return 'x' } }); m");
        let classified = result.unwrap();
        assert_eq!(classified.kind.variant(), ModuleVariant::RenderString);
        assert!(classified.placeholder);

        let meta = classified.meta.unwrap();
        assert!(meta.id.starts_with("legacy_"));
        assert_eq!(meta.name, PLACEHOLDER_NAME);
        assert_eq!(meta.version.as_deref(), Some("0.0.0"));

        let written = context.eval(Source::from_bytes("m.meta.name")).unwrap();
        assert_eq!(written.as_string().unwrap().to_std_string_escaped(), PLACEHOLDER_NAME);
    }

    #[test]
    fn test_existing_meta_is_kept() {
        let (result, _) =
            classify_source("({ meta: { id: 'm1', name: 'Péndulo', inputs: [] }, render() { return '' } })");
        let classified = result.unwrap();
        assert!(!classified.placeholder);
        let meta = classified.meta.unwrap();
        assert_eq!(meta.id, "m1");
        assert_eq!(meta.name, "Péndulo");
    }

    #[test]
    fn test_neither_capability_is_format_error() {
        let (result, _) = classify_source("({ draw() {} })");
        let err = result.unwrap_err();
        assert_eq!(err.kind(), "FormatError");
        assert!(err.to_string().contains("init"));
        assert!(err.to_string().contains("render"));

        let (result, _) = classify_source("42");
        assert_eq!(result.unwrap_err().kind(), "FormatError");
    }

    #[test]
    fn test_non_function_init_does_not_count() {
        let (result, _) = classify_source("({ init: 1, render() { return '' } })");
        assert_eq!(result.unwrap().kind.variant(), ModuleVariant::RenderString);
    }

    #[test]
    fn test_placeholder_tokens_are_monotonic() {
        let a = next_placeholder_token();
        let b = next_placeholder_token();
        let c = next_placeholder_token();
        assert!(a < b && b < c);
    }
}
