// ========================================
// ライフサイクル制御
// ========================================
//
// 1つの描画インスタンスの状態遷移:
//   Unloaded → Loading → {Loaded, LoadFailed}
//   Loaded → Mounted → Unmounted → Mounted ... → Destroyed
//
// ロードは世代番号で管理し、古い世代の結果は捨てる（中断はしない）。

use super::loader::SimulatorLoader;
use super::module::{ModuleVariant, SimulatorModule};
use crate::dom::{js_error_message, DomElement, TimerReport};
use crate::error::{SimulatorError, SimulatorResult};
use crate::export::escape_html;
use crate::project::SimParams;
use lazy_static::lazy_static;
use regex::Regex;

/// 旧形式の `<script>` キャリアを外すまでの遅延
pub const SCRIPT_CLEANUP_DELAY_MS: u32 = 10;

lazy_static! {
    static ref SCRIPT_REGION: Regex = Regex::new(r"(?s)<script>(.*?)</script>").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unloaded,
    Loading,
    Loaded,
    LoadFailed,
    Mounted,
    Unmounted,
    Destroyed,
}

/// 進行中のロードを表す券。完了時に世代を照合する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    code: String,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

/// `render()` の出力を、最初の `<script>` 領域とそれ以外に分ける
pub fn split_render_output(output: &str) -> (String, Option<String>) {
    match SCRIPT_REGION.captures(output) {
        Some(caps) => {
            let script = caps.get(1).map(|m| m.as_str().to_string());
            (SCRIPT_REGION.replacen(output, 1, "").into_owned(), script)
        }
        None => (output.to_string(), None),
    }
}

/// コンテナに表示する失敗メッセージ
pub fn failure_fragment(message: &str) -> String {
    format!("<div class=\"feedback-incorrect\">Error: {}</div>", escape_html(message))
}

/// 1つのシミュレーターブロックの実行インスタンス
#[derive(Debug)]
pub struct SimulatorInstance {
    label: String,
    state: LifecycleState,
    generation: u64,
    code: Option<String>,
    module: Option<SimulatorModule>,
    container: Option<DomElement>,
    display_name: Option<String>,
    load_error: Option<SimulatorError>,
    last_error: Option<SimulatorError>,
    mounted_params: Option<SimParams>,
    loader: SimulatorLoader,
}

impl SimulatorInstance {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: LifecycleState::Unloaded,
            generation: 0,
            code: None,
            module: None,
            container: None,
            display_name: None,
            load_error: None,
            last_error: None,
            mounted_params: None,
            loader: SimulatorLoader::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn module(&self) -> Option<&SimulatorModule> {
        self.module.as_ref()
    }

    pub fn module_mut(&mut self) -> Option<&mut SimulatorModule> {
        self.module.as_mut()
    }

    pub fn container(&self) -> Option<&DomElement> {
        self.container.as_ref()
    }

    pub fn load_error(&self) -> Option<&SimulatorError> {
        self.load_error.as_ref()
    }

    /// 直近の mount / update / destroy の失敗
    pub fn last_error(&self) -> Option<&SimulatorError> {
        self.last_error.as_ref()
    }

    pub fn is_mounted(&self) -> bool {
        self.state == LifecycleState::Mounted
    }

    /// 表示名の上書き。ロード済みモジュールと今後のロードの両方に効く。
    pub fn set_display_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if let Some(module) = self.module.as_mut() {
            module.set_display_name(name.clone());
        }
        self.display_name = Some(name);
    }

    /// コードが変わったときだけ新しい世代のロードを開始する
    pub fn begin_load(&mut self, code: &str) -> Option<LoadTicket> {
        if self.state == LifecycleState::Destroyed {
            return None;
        }
        if self.state != LifecycleState::Unloaded && self.code.as_deref() == Some(code) {
            return None;
        }

        if self.is_mounted() {
            self.unmount();
        }
        self.module = None;
        self.container = None;
        self.load_error = None;
        self.last_error = None;
        self.generation += 1;
        self.code = Some(code.to_string());
        self.state = LifecycleState::Loading;
        log::debug!("[{}] loading generation {}", self.label, self.generation);

        Some(LoadTicket {
            generation: self.generation,
            code: code.to_string(),
        })
    }

    /// ロード結果を反映する。世代が古ければ捨てて `false`。
    pub fn complete_load(&mut self, ticket: LoadTicket, result: SimulatorResult<SimulatorModule>) -> bool {
        if self.state == LifecycleState::Destroyed || ticket.generation != self.generation {
            log::debug!(
                "[{}] discarding stale load (generation {}, current {})",
                self.label,
                ticket.generation,
                self.generation
            );
            return false;
        }

        match result.and_then(|mut module| {
            let container = module.create_container(&self.label)?;
            Ok((module, container))
        }) {
            Ok((mut module, container)) => {
                if let Some(name) = &self.display_name {
                    module.set_display_name(name.clone());
                }
                log::info!("✅ [{}] '{}' loaded ({})", self.label, module.display_name(), module.variant().format_label());
                self.module = Some(module);
                self.container = Some(container);
                self.state = LifecycleState::Loaded;
            }
            Err(e) => {
                log::warn!("❌ [{}] {}: {}", self.label, e.kind(), e);
                self.load_error = Some(e);
                self.state = LifecycleState::LoadFailed;
            }
        }
        true
    }

    /// 同期ロード（begin → load → complete）
    pub fn load(&mut self, code: &str) -> bool {
        let Some(ticket) = self.begin_load(code) else {
            return false;
        };
        let result = self.loader.load(ticket.code());
        self.complete_load(ticket, result)
    }

    /// パラメータと表示フラグに合わせて状態を揃える
    pub fn sync(&mut self, params: &SimParams, visible: bool) {
        match (self.state, visible) {
            (LifecycleState::Loaded | LifecycleState::Unmounted, true) => self.mount(params),
            (LifecycleState::Mounted, false) => self.unmount(),
            (LifecycleState::Mounted, true) => {
                if self.mounted_params.as_ref() != Some(params) {
                    self.update(params);
                }
            }
            _ => {}
        }
    }

    fn mount(&mut self, params: &SimParams) {
        let (Some(module), Some(container)) = (self.module.as_mut(), self.container.as_ref()) else {
            return;
        };
        self.last_error = None;

        let result = mount_module(module, container, params);
        if let Err(e) = result {
            log::error!("[{}] {}: {}", self.label, e.kind(), e);
            show_failure(module, container, &e);
            self.last_error = Some(e);
        }

        self.state = LifecycleState::Mounted;
        self.mounted_params = Some(params.clone());
        self.pump(SCRIPT_CLEANUP_DELAY_MS);
    }

    fn update(&mut self, params: &SimParams) {
        let can_update = self
            .module
            .as_ref()
            .is_some_and(|m| m.variant() == ModuleVariant::Mounting && m.has_update());

        if !can_update {
            // update の無い形式は作り直す
            self.unmount();
            self.mount(params);
            return;
        }

        let (Some(module), Some(container)) = (self.module.as_mut(), self.container.as_ref()) else {
            return;
        };
        if let Err(e) = module.invoke_update(container, params) {
            log::error!("[{}] {}: {}", self.label, e.kind(), e);
            show_failure(module, container, &e);
            self.last_error = Some(e);
        }
        self.mounted_params = Some(params.clone());
        self.pump(SCRIPT_CLEANUP_DELAY_MS);
    }

    /// `destroy` を呼んでからコンテナを空にする
    pub fn unmount(&mut self) {
        if !self.is_mounted() {
            return;
        }
        if let (Some(module), Some(container)) = (self.module.as_mut(), self.container.as_ref()) {
            if let Err(e) = module.invoke_destroy(container) {
                log::error!("[{}] destroy failed: {}", self.label, e);
                self.last_error = Some(e);
            }
            if let Err(e) = container.clear(module.context_mut()) {
                let message = js_error_message(&e, module.context_mut());
                log::error!("[{}] could not clear container: {}", self.label, message);
            }
            module.forward_console();
        }
        self.state = LifecycleState::Unmounted;
        self.mounted_params = None;
    }

    /// 終端状態。モジュールのレルムを破棄する。
    pub fn destroy(&mut self) {
        self.unmount();
        self.module = None;
        self.container = None;
        self.state = LifecycleState::Destroyed;
        log::debug!("[{}] destroyed", self.label);
    }

    /// 仮想時計を進める
    pub fn tick(&mut self, ms: u32) -> Option<TimerReport> {
        let module = self.module.as_mut()?;
        match module.advance(ms) {
            Ok(report) => Some(report),
            Err(e) => {
                log::warn!("[{}] timer error: {}", self.label, e);
                None
            }
        }
    }

    fn pump(&mut self, ms: u32) {
        self.tick(ms);
    }

    pub fn content_html(&mut self) -> Option<String> {
        let module = self.module.as_mut()?;
        let container = self.container.as_ref()?;
        container.inner_html(module.context_mut()).ok()
    }

    pub fn text_content(&mut self) -> Option<String> {
        let module = self.module.as_mut()?;
        let container = self.container.as_ref()?;
        container.text_content(module.context_mut()).ok()
    }

    /// コンテナ内の要素をクリックする（操作の再現用）
    pub fn click(&mut self, selector: &str) -> SimulatorResult<bool> {
        let (Some(module), Some(container)) = (self.module.as_mut(), self.container.as_ref()) else {
            return Ok(false);
        };
        let context = module.context_mut();
        let target = container
            .query_selector(context, selector)
            .map_err(|e| SimulatorError::Mount(js_error_message(&e, context)))?;
        let Some(target) = target else {
            return Ok(false);
        };
        target
            .click(context)
            .map_err(|e| SimulatorError::Mount(js_error_message(&e, context)))?;
        context.run_jobs();
        module.forward_console();
        Ok(true)
    }
}

fn mount_module(module: &mut SimulatorModule, container: &DomElement, params: &SimParams) -> SimulatorResult<()> {
    container
        .clear(module.context_mut())
        .map_err(|e| SimulatorError::Mount(js_error_message(&e, module.context_mut())))?;

    match module.variant() {
        ModuleVariant::Mounting => {
            module.invoke_init(container, params)?;
            module.invoke_update(container, params)?;
        }
        ModuleVariant::RenderString => {
            let output = module.invoke_render(params)?;
            let (markup, script) = split_render_output(&output);
            container
                .set_inner_html(module.context_mut(), &markup)
                .map_err(|e| SimulatorError::Mount(js_error_message(&e, module.context_mut())))?;
            if let Some(script) = script {
                module.inject_script(&script, SCRIPT_CLEANUP_DELAY_MS)?;
            }
        }
    }
    Ok(())
}

fn show_failure(module: &mut SimulatorModule, container: &DomElement, error: &SimulatorError) {
    let fragment = failure_fragment(&error.to_string());
    if let Err(e) = container.set_inner_html(module.context_mut(), &fragment) {
        log::error!("could not render failure fragment: {}", js_error_message(&e, module.context_mut()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::loader::load_simulator_from_code;
    use serde_json::json;

    const COUNTING: &str = r#"
        globalThis.calls = { init: 0, update: 0, destroy: 0 };
        export default {
            init(c, p) { calls.init++; c.innerHTML = '<span class="v"></span>'; },
            update(c, p) { calls.update++; c.querySelector('.v').textContent = String(p.n ?? 0); },
            destroy(c) { calls.destroy++; }
        };
    "#;

    fn params(value: serde_json::Value) -> SimParams {
        value.as_object().cloned().unwrap_or_default()
    }

    fn loaded(code: &str) -> SimulatorInstance {
        let mut instance = SimulatorInstance::new("test");
        assert!(instance.load(code));
        instance
    }

    fn calls(instance: &mut SimulatorInstance) -> serde_json::Value {
        instance.module_mut().unwrap().evaluate("calls").unwrap()
    }

    #[test]
    fn test_text_content_scenario() {
        let mut instance = loaded("export default {init:(c,p)=>{c.textContent='x'}}");
        instance.sync(&SimParams::new(), true);

        assert_eq!(instance.state(), LifecycleState::Mounted);
        assert_eq!(instance.text_content().unwrap(), "x");
    }

    #[test]
    fn test_not_mounted_while_hidden() {
        let mut instance = loaded(COUNTING);
        instance.sync(&SimParams::new(), false);

        assert_eq!(instance.state(), LifecycleState::Loaded);
        assert_eq!(calls(&mut instance), json!({ "init": 0, "update": 0, "destroy": 0 }));
    }

    #[test]
    fn test_visibility_toggles_remount_each_time() {
        let mut instance = loaded(COUNTING);
        let p = params(json!({ "n": 3 }));

        for visible in [false, true, false, true] {
            instance.sync(&p, visible);
        }
        assert_eq!(calls(&mut instance), json!({ "init": 2, "update": 2, "destroy": 1 }));
        assert_eq!(instance.text_content().unwrap(), "3");

        instance.sync(&p, false);
        assert_eq!(calls(&mut instance), json!({ "init": 2, "update": 2, "destroy": 2 }));
        assert_eq!(instance.content_html().unwrap(), "");
    }

    #[test]
    fn test_param_change_calls_update_only() {
        let mut instance = loaded(COUNTING);
        instance.sync(&params(json!({ "n": 1 })), true);
        instance.sync(&params(json!({ "n": 2 })), true);
        instance.sync(&params(json!({ "n": 2 })), true);

        assert_eq!(calls(&mut instance), json!({ "init": 1, "update": 2, "destroy": 0 }));
        assert_eq!(instance.text_content().unwrap(), "2");
    }

    #[test]
    fn test_mounting_without_update_remounts_on_param_change() {
        let mut instance = loaded(
            "globalThis.inits = 0; export default { init(c, p) { inits++; c.textContent = 'n=' + p.n; } };",
        );
        instance.sync(&params(json!({ "n": 1 })), true);
        instance.sync(&params(json!({ "n": 5 })), true);

        assert_eq!(instance.module_mut().unwrap().evaluate("inits").unwrap(), json!(2));
        assert_eq!(instance.text_content().unwrap(), "n=5");
    }

    #[test]
    fn test_render_string_injects_markup_and_script() {
        let mut instance = loaded(
            r#"export default {
                render: (p, name) => `<h4>${name}</h4><span id="out">-</span><script>document.getElementById('out').textContent = 'v' + ${p.v};</script>`
            };"#,
        );
        instance.set_display_name("Caída libre");
        instance.sync(&params(json!({ "v": 7 })), true);

        let html = instance.content_html().unwrap();
        assert_eq!(html, "<h4>Caída libre</h4><span id=\"out\">v7</span>");
        let scripts = instance
            .module_mut()
            .unwrap()
            .evaluate("document.querySelectorAll('script').length")
            .unwrap();
        assert_eq!(scripts, json!(0));
    }

    #[test]
    fn test_render_string_visibility_toggle_leaves_one_copy() {
        let mut instance = loaded(
            r#"globalThis.runs = 0;
            export default {
                render: () => '<ul id="l"></ul><script>runs++; document.getElementById("l").innerHTML += "<li>" + runs + "</li>";</script>'
            };"#,
        );
        let p = SimParams::new();
        for visible in [true, false, true] {
            instance.sync(&p, visible);
        }

        let module = instance.module_mut().unwrap();
        assert_eq!(module.evaluate("runs").unwrap(), json!(2));
        assert_eq!(module.evaluate("document.querySelectorAll('script').length").unwrap(), json!(0));
        assert_eq!(module.evaluate("document.querySelectorAll('#l').length").unwrap(), json!(1));
        assert_eq!(instance.content_html().unwrap(), "<ul id=\"l\"><li>2</li></ul>");
    }

    #[test]
    fn test_render_string_remounts_on_param_change() {
        let mut instance = loaded("export default { render: (p) => '<b>' + p.v + '</b>' };");
        instance.sync(&params(json!({ "v": 1 })), true);
        instance.sync(&params(json!({ "v": 2 })), true);

        assert_eq!(instance.content_html().unwrap(), "<b>2</b>");
    }

    #[test]
    fn test_init_throw_renders_failure_fragment() {
        let mut instance = loaded("export default { init() { throw new Error('sin datos'); } };");
        instance.sync(&SimParams::new(), true);

        assert_eq!(instance.state(), LifecycleState::Mounted);
        assert_eq!(instance.last_error().unwrap().kind(), "MountError");
        assert_eq!(
            instance.content_html().unwrap(),
            "<div class=\"feedback-incorrect\">Error: sin datos</div>"
        );

        instance.sync(&SimParams::new(), false);
        assert_eq!(instance.content_html().unwrap(), "");
    }

    #[test]
    fn test_destroy_error_is_recorded_and_container_cleared() {
        let mut instance =
            loaded("export default { init(c) { c.textContent = 'on'; }, destroy() { throw new Error('x'); } };");
        instance.sync(&SimParams::new(), true);
        instance.sync(&SimParams::new(), false);

        assert_eq!(instance.state(), LifecycleState::Unmounted);
        assert_eq!(instance.content_html().unwrap(), "");
        assert!(instance.last_error().is_some());
    }

    #[test]
    fn test_load_failure_state() {
        let mut instance = SimulatorInstance::new("bad");
        instance.load("export default {");

        assert_eq!(instance.state(), LifecycleState::LoadFailed);
        assert_eq!(instance.load_error().unwrap().kind(), "LoadError");
        instance.sync(&SimParams::new(), true);
        assert_eq!(instance.state(), LifecycleState::LoadFailed);
    }

    #[test]
    fn test_same_code_does_not_reload() {
        let mut instance = loaded(COUNTING);
        assert!(instance.begin_load(COUNTING).is_none());
        assert!(!instance.load(COUNTING));
    }

    #[test]
    fn test_stale_load_is_discarded() {
        let mut instance = SimulatorInstance::new("race");
        let first = instance.begin_load("export default { init(c) { c.textContent = 'old'; } };").unwrap();
        let second = instance.begin_load("export default { init(c) { c.textContent = 'new'; } };").unwrap();

        let newer = load_simulator_from_code(second.code());
        let older = load_simulator_from_code(first.code());
        assert!(instance.complete_load(second, newer));
        assert!(!instance.complete_load(first, older));

        instance.sync(&SimParams::new(), true);
        assert_eq!(instance.text_content().unwrap(), "new");
    }

    #[test]
    fn test_code_change_tears_down_mounted_module() {
        let mut instance = loaded(COUNTING);
        instance.sync(&SimParams::new(), true);
        assert!(instance.load("export default { init(c) { c.textContent = 'v2'; } };"));

        assert_eq!(instance.state(), LifecycleState::Loaded);
        instance.sync(&SimParams::new(), true);
        assert_eq!(instance.text_content().unwrap(), "v2");
    }

    #[test]
    fn test_timers_run_on_tick() {
        let mut instance = loaded(
            "export default { init(c) { c.textContent = '0'; setTimeout(() => { c.textContent = '1'; }, 100); } };",
        );
        instance.sync(&SimParams::new(), true);
        assert_eq!(instance.text_content().unwrap(), "0");

        instance.tick(100);
        assert_eq!(instance.text_content().unwrap(), "1");
    }

    #[test]
    fn test_click_reaches_plugin_listener() {
        let mut instance = loaded(
            r#"export default { init(c) {
                c.innerHTML = '<button class="go">+</button><span class="n">0</span>';
                let n = 0;
                c.querySelector('.go').addEventListener('click', () => { c.querySelector('.n').textContent = String(++n); });
            } };"#,
        );
        instance.sync(&SimParams::new(), true);
        assert!(instance.click(".go").unwrap());
        assert!(instance.click(".go").unwrap());
        assert!(!instance.click(".missing").unwrap());

        assert_eq!(instance.text_content().unwrap(), "+2");
    }

    #[test]
    fn test_destroyed_is_terminal() {
        let mut instance = loaded(COUNTING);
        instance.sync(&SimParams::new(), true);
        instance.destroy();

        assert_eq!(instance.state(), LifecycleState::Destroyed);
        assert!(instance.module().is_none());
        assert!(instance.begin_load("export default { init() {} };").is_none());
    }

    #[test]
    fn test_split_render_output_first_script_only() {
        let (markup, script) = split_render_output("<p>a</p><script>one()</script><script>two()</script>");
        assert_eq!(markup, "<p>a</p><script>two()</script>");
        assert_eq!(script.as_deref(), Some("one()"));

        let (markup, script) = split_render_output("<p>\n</p>");
        assert_eq!(markup, "<p>\n</p>");
        assert!(script.is_none());
    }
}
