use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::{ApiError, ApiResult};

#[derive(Debug)]
enum Database {
    /// One connection for the process lifetime.
    Shared(Mutex<Connection>),
    /// Re-opened per request so external writes to the file are picked up
    /// (`--watch`).
    PerRequest(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AppState {
    db: Arc<Database>,
}

impl AppState {
    pub fn shared(conn: Connection) -> Self {
        Self {
            db: Arc::new(Database::Shared(Mutex::new(conn))),
        }
    }

    pub fn per_request(path: PathBuf) -> Self {
        Self {
            db: Arc::new(Database::PerRequest(path)),
        }
    }

    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> ApiResult<T>) -> ApiResult<T> {
        match &*self.db {
            Database::Shared(mutex) => {
                let conn = mutex.lock()?;
                f(&conn)
            }
            Database::PerRequest(path) => {
                let conn = Connection::open(path).map_err(ApiError::from)?;
                f(&conn)
            }
        }
    }
}
