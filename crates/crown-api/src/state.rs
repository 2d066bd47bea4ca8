use std::path::PathBuf;
use std::sync::Arc;

use crown_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// Root directory for uploaded media (avatars, listing images, logos).
    pub media_dir: PathBuf,
}
