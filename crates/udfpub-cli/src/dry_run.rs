//! Stand-ins that log instead of calling remote services

use std::path::Path;
use tracing::info;
use udfpub_core::{ObjectStore, RemoteError, Warehouse};

#[derive(Debug, Default)]
pub struct DryRunWarehouse {
    pub statements: Vec<String>,
}

impl Warehouse for DryRunWarehouse {
    fn submit(&mut self, statement: &str) -> Result<(), RemoteError> {
        info!("[dry-run] would run:\n{}", statement);
        self.statements.push(statement.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DryRunStore {
    pub uploads: Vec<String>,
}

impl ObjectStore for DryRunStore {
    fn upload(&mut self, bucket: &str, destination: &str, local: &Path) -> Result<(), RemoteError> {
        if !local.is_file() {
            return Err(RemoteError::Rejected(format!(
                "{} is not a readable file",
                local.display()
            )));
        }
        let uri = format!("gs://{}/{}", bucket, destination);
        info!("[dry-run] would upload {} to {}", local.display(), uri);
        self.uploads.push(uri);
        Ok(())
    }
}
