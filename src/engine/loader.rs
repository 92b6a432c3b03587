// ========================================
// コードローダー
// ========================================
//
// 作者が書いたプラグインのテキストを、ロードごとに新しいJSレルムで
// ESモジュールとして評価し、default export を取り出す。
// レルムを共有しないので、別々のロード間で状態は漏れない。

use super::module::SimulatorModule;
use super::validator::classify;
use crate::dom::{install_host_document, js_error_message, js_str, HostDocument};
use crate::error::{SimulatorError, SimulatorResult};
use boa_engine::builtins::promise::PromiseState;
use boa_engine::{js_string, Context, JsError, JsValue, Module, Source};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

const OBJECT_URL_SCHEME: &str = "blob:simbook/";

type UrlRegistry = Rc<RefCell<HashMap<String, usize>>>;

/// コンパイル中だけ存在する一時URL。Drop で必ず解放される。
struct ObjectUrl {
    url: String,
    registry: UrlRegistry,
}

impl ObjectUrl {
    fn create(registry: &UrlRegistry, code: &str) -> Self {
        let url = format!("{}{}", OBJECT_URL_SCHEME, uuid::Uuid::new_v4());
        registry.borrow_mut().insert(url.clone(), code.len());
        log::trace!("created {} ({} bytes)", url, code.len());
        Self {
            url,
            registry: Rc::clone(registry),
        }
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        self.registry.borrow_mut().remove(&self.url);
        log::trace!("revoked {}", self.url);
    }
}

/// `export default` を最初の1箇所だけ `return` に置き換える（エクスポート用の弱い手法）
pub fn rewrite_default_export(code: &str) -> String {
    code.replacen("export default", "return", 1)
}

fn load_error(error: &JsError, context: &mut Context) -> SimulatorError {
    SimulatorError::Load(js_error_message(error, context))
}

/// 新しいレルムにホストドキュメントを入れて返す
fn fresh_realm() -> SimulatorResult<(Context, HostDocument)> {
    let mut context = Context::default();
    let document = install_host_document(&mut context).map_err(|e| load_error(&e, &mut context))?;
    Ok((context, document))
}

/// 判定して `SimulatorModule` を組み立てる
fn finish(candidate: JsValue, document: HostDocument, mut context: Context) -> SimulatorResult<SimulatorModule> {
    let classified = classify(&candidate, &mut context)?;
    // 評価中の console 出力をここで流す
    if let Err(e) = document.forward_console(&mut context) {
        log::debug!("console forwarding failed: {}", e);
    }
    Ok(SimulatorModule::new(
        classified.kind,
        classified.exports,
        classified.meta,
        classified.placeholder,
        document,
        context,
    ))
}

/// シミュレーターのローダー
///
/// 一時URLの登録簿はインスタンスごとに持つ。
#[derive(Debug, Default)]
pub struct SimulatorLoader {
    urls: UrlRegistry,
}

impl SimulatorLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在有効な一時URLの数（ロード完了後は常に0）
    pub fn live_urls(&self) -> usize {
        self.urls.borrow().len()
    }

    /// プラグインのコードをESモジュールとしてロードする
    pub fn load(&self, code: &str) -> SimulatorResult<SimulatorModule> {
        let object_url = ObjectUrl::create(&self.urls, code);
        let (mut context, document) = fresh_realm()?;

        let source = Source::from_bytes(code.as_bytes()).with_path(Path::new(&object_url.url));
        let module = Module::parse(source, None, &mut context).map_err(|e| load_error(&e, &mut context))?;

        let promise = module.load_link_evaluate(&mut context);
        context.run_jobs();
        match promise.state() {
            PromiseState::Fulfilled(_) => {}
            PromiseState::Rejected(reason) => {
                let error = JsError::from_opaque(reason);
                return Err(load_error(&error, &mut context));
            }
            PromiseState::Pending => {
                return Err(SimulatorError::Load(
                    "La evaluación del módulo no terminó".to_string(),
                ));
            }
        }

        let namespace = module.namespace(&mut context);
        let candidate = namespace
            .get(js_string!("default"), &mut context)
            .map_err(|e| load_error(&e, &mut context))?;

        drop(object_url);
        let loaded = finish(candidate, document, context)?;
        log::debug!("Loaded simulator '{}' ({:?})", loaded.display_name(), loaded.variant());
        Ok(loaded)
    }

    /// エクスポートHTMLと同じ手法でロードする
    ///
    /// `export default` を `return` に書き換えて関数本体として実行する。
    /// 単一の default export 以外（import を含むモジュールなど）には対応しない。
    pub fn load_static(&self, code: &str) -> SimulatorResult<SimulatorModule> {
        let (mut context, document) = fresh_realm()?;
        let body = rewrite_default_export(code);

        let constructor = context
            .global_object()
            .get(js_string!("Function"), &mut context)
            .map_err(|e| load_error(&e, &mut context))?;
        let Some(constructor) = constructor.as_constructor().cloned() else {
            return Err(SimulatorError::Load("Function constructor unavailable".to_string()));
        };
        let factory = constructor
            .construct(&[js_str(&body)], None, &mut context)
            .map_err(|e| load_error(&e, &mut context))?;
        let candidate = factory
            .call(&JsValue::undefined(), &[], &mut context)
            .map_err(|e| load_error(&e, &mut context))?;
        context.run_jobs();

        finish(candidate, document, context)
    }
}

/// 使い捨てのローダーでロードする
pub fn load_simulator_from_code(code: &str) -> SimulatorResult<SimulatorModule> {
    SimulatorLoader::new().load(code)
}

pub fn load_simulator_static(code: &str) -> SimulatorResult<SimulatorModule> {
    SimulatorLoader::new().load_static(code)
}
