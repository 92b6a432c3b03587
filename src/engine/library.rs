use crate::project::legacy::LEGACY_PREFIX;
use crate::project::SimulatorAsset;
use std::collections::HashMap;

/// IDがどう解決されたか
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a> {
    /// IDがそのまま一致
    Exact(&'a SimulatorAsset),
    /// `legacy_` を外したIDで一致
    Alias(&'a SimulatorAsset),
}

impl<'a> Resolution<'a> {
    pub fn asset(&self) -> &'a SimulatorAsset {
        match self {
            Resolution::Exact(asset) | Resolution::Alias(asset) => asset,
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, Resolution::Alias(_))
    }
}

/// 完全一致 → `legacy_` 除去の順で探し、どちらで当たったかも返す
pub fn resolve_detailed<'a>(assets: &'a [SimulatorAsset], id: &str) -> Option<Resolution<'a>> {
    if let Some(asset) = assets.iter().rev().find(|asset| asset.id == id) {
        return Some(Resolution::Exact(asset));
    }
    let stripped = id.strip_prefix(LEGACY_PREFIX)?;
    assets
        .iter()
        .rev()
        .find(|asset| asset.id == stripped)
        .map(Resolution::Alias)
}

/// どちらの方法で当たったかは呼び出し側に伝えない
pub fn resolve_simulator<'a>(assets: &'a [SimulatorAsset], id: &str) -> Option<&'a SimulatorAsset> {
    resolve_detailed(assets, id).map(|resolution| resolution.asset())
}

/// クラウドとローカルの資産を統合する（同じIDはローカル優先、順序は初出順）
pub fn merge_assets(cloud: &[SimulatorAsset], local: &[SimulatorAsset]) -> Vec<SimulatorAsset> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, SimulatorAsset> = HashMap::new();

    for asset in cloud.iter().chain(local.iter()) {
        if !by_id.contains_key(&asset.id) {
            order.push(asset.id.clone());
        }
        by_id.insert(asset.id.clone(), asset.clone());
    }

    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}

/// プロジェクトのシミュレーター資産コレクション
///
/// 追加のみ。再アップロードは同じIDでも新しい資産として積まれ、後のものが勝つ。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetLibrary {
    assets: Vec<SimulatorAsset>,
}

impl AssetLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_assets(assets: Vec<SimulatorAsset>) -> Self {
        Self { assets }
    }

    pub fn add(&mut self, asset: SimulatorAsset) {
        log::info!("📦 Asset added: {} ({})", asset.name, asset.id);
        self.assets.push(asset);
    }

    pub fn resolve(&self, id: &str) -> Option<&SimulatorAsset> {
        resolve_simulator(&self.assets, id)
    }

    pub fn resolve_detailed(&self, id: &str) -> Option<Resolution<'_>> {
        resolve_detailed(&self.assets, id)
    }

    pub fn assets(&self) -> &[SimulatorAsset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn into_assets(self) -> Vec<SimulatorAsset> {
        self.assets
    }
}
