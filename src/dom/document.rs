use boa_engine::{js_string, Context, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue, Source};
use serde::Deserialize;

/// レルムごとに評価するホストドキュメント（window / document / タイマー / console）
pub const DOM_PRELUDE_JS: &str = include_str!("prelude.js");

/// 仮想時計を進めた結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimerReport {
    pub ran: usize,
    pub errors: Vec<String>,
    pub pending: usize,
}

#[derive(Deserialize)]
struct RawTimerReport {
    #[serde(default)]
    ran: f64,
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    pending: f64,
}

/// プレリュードをレルムに評価し、ホスト側ハンドルを返す
pub fn install_host_document(context: &mut Context) -> JsResult<HostDocument> {
    context.eval(Source::from_bytes(DOM_PRELUDE_JS))?;
    let global = context.global_object();
    let host = expect_object(global.get(js_string!("__simbookHost"), context)?, "__simbookHost")?;
    let document = expect_object(global.get(js_string!("document"), context)?, "document")?;
    Ok(HostDocument { host, document })
}

fn type_error(message: &str) -> JsError {
    JsNativeError::typ().with_message(message.to_string()).into()
}

/// ホスト側が返したJSONを型付きで読む
fn from_host_json<T: serde::de::DeserializeOwned>(value: serde_json::Value, what: &str) -> JsResult<T> {
    serde_json::from_value(value).map_err(|e| type_error(&format!("{} returned malformed data: {}", what, e)))
}

fn expect_object(value: JsValue, what: &str) -> JsResult<JsObject> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| type_error(&format!("{} is not an object", what)))
}

pub(crate) fn js_str(text: &str) -> JsValue {
    JsValue::from(JsString::from(text))
}

pub(crate) fn js_to_string(value: &JsValue, context: &mut Context) -> JsResult<String> {
    Ok(value.to_string(context)?.to_std_string_escaped())
}

/// `object[name](...args)` を `this = object` で呼ぶ
pub(crate) fn call_method(
    object: &JsObject,
    name: &str,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let method = object.get(JsString::from(name), context)?;
    let Some(function) = method.as_callable() else {
        return Err(type_error(&format!("{} is not a function", name)));
    };
    function.call(&JsValue::from(object.clone()), args, context)
}

/// 例外をユーザー向けメッセージに変換（`err.message` 相当）
pub(crate) fn js_error_message(error: &JsError, context: &mut Context) -> String {
    if let Ok(native) = error.try_native(context) {
        let message = native.message().to_string();
        return if message.is_empty() { native.to_string() } else { message };
    }
    match error.as_opaque() {
        Some(value) => js_to_string(value, context).unwrap_or_else(|_| error.to_string()),
        None => error.to_string(),
    }
}

/// ホストドキュメント上の要素ハンドル
#[derive(Debug, Clone)]
pub struct DomElement {
    element: JsObject,
}

impl DomElement {
    pub fn as_value(&self) -> JsValue {
        JsValue::from(self.element.clone())
    }

    pub fn inner_html(&self, context: &mut Context) -> JsResult<String> {
        let value = self.element.get(js_string!("innerHTML"), context)?;
        js_to_string(&value, context)
    }

    pub fn text_content(&self, context: &mut Context) -> JsResult<String> {
        let value = self.element.get(js_string!("textContent"), context)?;
        js_to_string(&value, context)
    }

    pub fn set_inner_html(&self, context: &mut Context, html: &str) -> JsResult<()> {
        self.element
            .set(js_string!("innerHTML"), js_str(html), true, context)?;
        Ok(())
    }

    pub fn clear(&self, context: &mut Context) -> JsResult<()> {
        self.set_inner_html(context, "")
    }

    pub fn click(&self, context: &mut Context) -> JsResult<()> {
        call_method(&self.element, "click", &[], context)?;
        Ok(())
    }

    pub fn flag(&self, context: &mut Context, name: &str) -> JsResult<bool> {
        Ok(self.element.get(JsString::from(name), context)?.to_boolean())
    }

    pub fn query_selector(&self, context: &mut Context, selector: &str) -> JsResult<Option<DomElement>> {
        let found = call_method(&self.element, "querySelector", &[js_str(selector)], context)?;
        Ok(found.as_object().cloned().map(|element| DomElement { element }))
    }
}

/// ドキュメントとホスト制御オブジェクトへのハンドル
#[derive(Debug, Clone)]
pub struct HostDocument {
    host: JsObject,
    document: JsObject,
}

impl HostDocument {
    /// `document.body` に接続されたシミュレーター用コンテナを作る
    pub fn create_container(&self, context: &mut Context, label: &str) -> JsResult<DomElement> {
        let value = call_method(&self.host, "createContainer", &[js_str(label)], context)?;
        Ok(DomElement {
            element: expect_object(value, "container")?,
        })
    }

    pub fn body(&self, context: &mut Context) -> JsResult<DomElement> {
        let value = self.document.get(js_string!("body"), context)?;
        Ok(DomElement {
            element: expect_object(value, "document.body")?,
        })
    }

    pub fn element_by_id(&self, context: &mut Context, id: &str) -> JsResult<Option<DomElement>> {
        let found = call_method(&self.document, "getElementById", &[js_str(id)], context)?;
        Ok(found.as_object().cloned().map(|element| DomElement { element }))
    }

    /// スクリプト片をグローバルスコープで実行し、キャリアを `cleanup_delay_ms` 後に外す
    pub fn inject_script(&self, context: &mut Context, script: &str, cleanup_delay_ms: u32) -> JsResult<()> {
        call_method(
            &self.host,
            "injectScript",
            &[js_str(script), JsValue::from(cleanup_delay_ms)],
            context,
        )?;
        Ok(())
    }

    /// `DOMContentLoaded` と `load` を発火
    pub fn ready(&self, context: &mut Context) -> JsResult<()> {
        call_method(&self.host, "ready", &[], context)?;
        Ok(())
    }

    /// 仮想時計を進めて期限の来たタイマーを実行
    pub fn advance(&self, context: &mut Context, ms: u32) -> JsResult<TimerReport> {
        let value = call_method(&self.host, "advance", &[JsValue::from(ms)], context)?;
        context.run_jobs();
        let raw: RawTimerReport = from_host_json(value.to_json(context)?, "advance")?;
        Ok(TimerReport {
            ran: raw.ran as usize,
            errors: raw.errors,
            pending: raw.pending as usize,
        })
    }

    /// プラグインの `console.*` 出力を log クレートへ流す
    pub fn forward_console(&self, context: &mut Context) -> JsResult<usize> {
        let value = call_method(&self.host, "drainLogs", &[], context)?;
        let entries: Vec<(String, String)> = from_host_json(value.to_json(context)?, "drainLogs")?;
        for (level, message) in &entries {
            let level = match level.as_str() {
                "error" => log::Level::Error,
                "warn" => log::Level::Warn,
                "debug" => log::Level::Debug,
                "trace" => log::Level::Trace,
                _ => log::Level::Info,
            };
            log::log!(level, "[plugin] {}", message);
        }
        Ok(entries.len())
    }

    /// 挿入スクリプトで捕捉された例外
    pub fn drain_script_errors(&self, context: &mut Context) -> JsResult<Vec<String>> {
        let value = call_method(&self.host, "drainScriptErrors", &[], context)?;
        from_host_json(value.to_json(context)?, "drainScriptErrors")
    }
}
