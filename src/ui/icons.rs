pub struct Icons;

impl Icons {
    pub const LENS: &str = "🔍";
    pub const CHECK: &str = "✅";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const FILE: &str = "📄";
    pub const ACTION: &str = "⚡";
    pub const CALL: &str = "🔗";
}
