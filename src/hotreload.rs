use log::{error, info};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

type ReloadCallback = Box<dyn Fn(&Path) + Send + 'static>;

/// 監視対象の拡張子（プラグインとプロジェクト）
const WATCHED_EXTENSIONS: [&str; 2] = ["js", "json"];

pub struct HotReloader {
    _watcher: RecommendedWatcher,
    reload_callback: Arc<Mutex<Option<ReloadCallback>>>,
}

impl HotReloader {
    /// 新しいホットリローダーを作成
    pub fn new<P: AsRef<Path>>(watch_path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let (tx, rx): (Sender<notify::Result<Event>>, Receiver<notify::Result<Event>>) = mpsc::channel();

        let config = Config::default().with_poll_interval(Duration::from_millis(100));

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.send(res) {
                    error!("Error sending watch event: {}", e);
                }
            },
            config,
        )?;

        watcher.watch(watch_path.as_ref(), RecursiveMode::NonRecursive)?;

        info!("🔥 Hot reload enabled for: {}", watch_path.as_ref().display());

        let reload_callback: Arc<Mutex<Option<ReloadCallback>>> = Arc::new(Mutex::new(None));

        // ファイル監視を別スレッドで開始
        let callback_clone = Arc::clone(&reload_callback);
        thread::spawn(move || {
            loop {
                match rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(Ok(event)) => {
                        let Some(path) = reload_target(&event) else {
                            continue;
                        };
                        info!("🔄 {} changed, reloading...", path.display());

                        // 書き込み完了を待つ
                        thread::sleep(Duration::from_millis(100));

                        if let Ok(callback_guard) = callback_clone.lock() {
                            if let Some(ref cb) = *callback_guard {
                                cb(&path);
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        error!("Watch error: {:?}", e);
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        error!("Watcher disconnected");
                        break;
                    }
                }
            }
        });

        Ok(HotReloader {
            _watcher: watcher,
            reload_callback,
        })
    }

    /// リロード時のコールバック関数を設定（変更されたファイルのパスを受け取る）
    pub fn set_reload_callback<F>(&self, callback: F)
    where
        F: Fn(&Path) + Send + 'static,
    {
        match self.reload_callback.lock() {
            Ok(mut cb) => *cb = Some(Box::new(callback)),
            Err(e) => error!("Reload callback lock poisoned: {}", e),
        }
    }
}

fn is_watched(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| WATCHED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// ファイル変更イベントがリロードをトリガーすべきかを判断し、対象パスを返す
fn reload_target(event: &Event) -> Option<PathBuf> {
    use notify::EventKind;

    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) => event.paths.iter().find(|path| is_watched(path)).cloned(),
        _ => None,
    }
}
