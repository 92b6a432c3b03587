use thiserror::Error;

/// シミュレーターの読み込み・実行時エラー
///
/// どのエラーも発生元のブロックに閉じ込められ、ページ送りやエクスポート全体を止めない。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulatorError {
    /// コードのコンパイル・評価に失敗した
    #[error("{0}")]
    Load(String),
    /// コンパイルは成功したが `init` も `render` も公開していない
    #[error("{0}")]
    Format(String),
    /// `init` / `update` / `render` / `destroy` の呼び出しが例外を投げた
    #[error("{0}")]
    Mount(String),
    /// 参照されたシミュレーターIDが見つからない
    #[error("Simulador no encontrado ({0})")]
    Resolution(String),
    /// アップロード時の入力不備（表示名など）
    #[error("{0}")]
    InvalidAsset(String),
}

impl SimulatorError {
    pub fn kind(&self) -> &'static str {
        match self {
            SimulatorError::Load(_) => "LoadError",
            SimulatorError::Format(_) => "FormatError",
            SimulatorError::Mount(_) => "MountError",
            SimulatorError::Resolution(_) => "ResolutionError",
            SimulatorError::InvalidAsset(_) => "InvalidAsset",
        }
    }
}

pub type SimulatorResult<T> = Result<T, SimulatorError>;
