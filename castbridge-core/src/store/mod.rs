pub mod extraction;
pub mod history;
pub mod settings;

pub use extraction::ExtractionStore;
pub use history::{CastEntry, HistoryStore};
pub use settings::{Settings, SettingsStore};
