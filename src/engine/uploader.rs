// アップロード窓口: コードを一度ロードして検証してから資産を作る。

use super::library::AssetLibrary;
use super::loader::SimulatorLoader;
use super::module::{ModuleVariant, SimulatorMeta};
use crate::error::{SimulatorError, SimulatorResult};
use crate::project::SimulatorAsset;

pub const ASSET_ID_PREFIX: &str = "sim_";
pub const INITIAL_ASSET_VERSION: &str = "1.0";

/// 検証結果
#[derive(Debug, Clone, PartialEq)]
pub enum UploadStatus {
    Valid {
        variant: ModuleVariant,
        meta: Option<SimulatorMeta>,
    },
    Error(String),
}

impl UploadStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, UploadStatus::Valid { .. })
    }
}

/// ファイル名から既定の表示名を作る（`mi_simulador.js` → `mi simulador`）
pub fn default_name_for_file(file_name: &str) -> String {
    file_name.replacen(".js", "", 1).replace('_', " ")
}

/// 新しい資産ID（`sim_` + UUIDの先頭8文字）
pub fn new_asset_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", ASSET_ID_PREFIX, &uuid[..8])
}

#[derive(Debug, Default)]
pub struct SimulatorUploader {
    loader: SimulatorLoader,
}

impl SimulatorUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// ロード + 形式判定を行う。エラーはライブ描画と同じ分類。
    pub fn validate(&self, code: &str) -> UploadStatus {
        match self.loader.load(code) {
            Ok(module) => UploadStatus::Valid {
                variant: module.variant(),
                meta: module.meta().cloned(),
            },
            Err(e) => {
                log::warn!("Upload rejected ({}): {}", e.kind(), e);
                UploadStatus::Error(e.to_string())
            }
        }
    }

    /// 検証を通ったコードから新しい資産を作る
    pub fn upload(&self, name: &str, code: &str) -> SimulatorResult<SimulatorAsset> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SimulatorError::InvalidAsset(
                "El simulador necesita un nombre".to_string(),
            ));
        }

        let mut module = self.loader.load(code)?;
        module.set_display_name(name);

        let asset = SimulatorAsset {
            id: new_asset_id(),
            name: name.to_string(),
            code: code.to_string(),
            version: INITIAL_ASSET_VERSION.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        log::info!(
            "⬆️ Uploaded '{}' as {} ({})",
            module.display_name(),
            asset.id,
            module.variant().format_label()
        );
        Ok(asset)
    }

    /// アップロードしてライブラリへ追加する
    pub fn upload_into(&self, library: &mut AssetLibrary, name: &str, code: &str) -> SimulatorResult<String> {
        let asset = self.upload(name, code)?;
        let id = asset.id.clone();
        library.add(asset);
        Ok(id)
    }
}
