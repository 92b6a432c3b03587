pub mod library;
pub mod lifecycle;
pub mod loader;
pub mod module;
pub mod page;
pub mod renderer;
pub mod uploader;
pub mod validator;

pub use library::{merge_assets, resolve_detailed, resolve_simulator, AssetLibrary, Resolution};
pub use lifecycle::{LifecycleState, LoadTicket, SimulatorInstance};
pub use loader::{load_simulator_from_code, load_simulator_static, SimulatorLoader};
pub use module::{ModuleKind, ModuleVariant, SimulatorMeta, SimulatorModule};
pub use page::PagePreview;
pub use renderer::{RendererView, SimulatorRenderer};
pub use uploader::{default_name_for_file, SimulatorUploader, UploadStatus};
