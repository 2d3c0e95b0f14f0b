pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{header, info, muted, section, success, warn};
pub use progress::ScanProgress;
pub use table::{call_table, definition_table, stats_table, CallRow, DefinitionRow, TableBuilder};
pub use theme::{theme, Theme};
