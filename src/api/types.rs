//! Shared state handed to every handler.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::api::ApiError;
use crate::vision::{TextGenerator, VisionAnnotator};

/// Shared application context, cloned into each handler via `State`.
///
/// The SQLite connection sits behind a mutex; handlers take the lock
/// only for synchronous repository calls and never hold it across an
/// await point.
#[derive(Clone)]
pub struct ApiContext {
    db: Arc<Mutex<Connection>>,
    pub annotator: Arc<dyn VisionAnnotator>,
    pub generator: Arc<dyn TextGenerator>,
}

impl ApiContext {
    pub fn new(
        conn: Connection,
        annotator: Arc<dyn VisionAnnotator>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            annotator,
            generator,
        }
    }

    pub fn lock_db(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".into()))
    }
}
