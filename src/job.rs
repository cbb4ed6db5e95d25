//! One invocation of the round trip: fetch the storage secret, make sure the
//! container exists, write a fresh record batch, then read it back and
//! rewrite it with an updated status.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::JobConfig;
use crate::infra::blob::{Container, ContainerStatus, StorageConnector, ensure_container};
use crate::infra::keys::SecretStore;
use crate::output::{from_csv, to_csv};
use crate::record::{AccountStatusRecord, STATUS_PENDING, STATUS_UPDATED, build_records};

/// Container every run writes to.
pub const CONTAINER_NAME: &str = "useraccountspoc";

/// Prefix of every blob name; the rest is the UTC write time.
pub const BLOB_PREFIX: &str = "useraccountspoc";

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Blob name for a write at `now`: `useraccountspoc-YYYYMMDDHHMMSS.csv`.
///
/// Names only have second resolution, so two runs within the same second
/// target the same blob and the later one overwrites the earlier.
pub fn blob_name(now: DateTime<Utc>) -> String {
    format!("{BLOB_PREFIX}-{}.csv", now.format("%Y%m%d%H%M%S"))
}

/// What goes into the generated record and what the update pass writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParameters {
    pub account_name: String,
    pub group_name: String,
    pub status: String,
    pub updated_status: String,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            account_name: "My Account".to_string(),
            group_name: "My Group".to_string(),
            status: STATUS_PENDING.to_string(),
            updated_status: STATUS_UPDATED.to_string(),
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub container: String,
    pub container_status: ContainerStatus,
    pub blob_name: String,
    pub records_written: usize,
    pub records_updated: usize,
}

/// Serializes `records` and uploads them as `blob`, replacing any existing
/// content. Returns once the upload has completed.
pub async fn write_records(
    container: &Container<'_>,
    blob: &str,
    records: &[AccountStatusRecord],
) -> Result<()> {
    let body = to_csv(records)?;
    container
        .upload(blob, body, CSV_CONTENT_TYPE)
        .await
        .with_context(|| format!("Failed to upload '{blob}'"))?;
    Ok(())
}

/// Downloads `blob`, sets every record's status to `new_status` and uploads
/// the result over the same blob. Returns the number of records rewritten.
pub async fn update_status(container: &Container<'_>, blob: &str, new_status: &str) -> Result<usize> {
    let content = container
        .download(blob)
        .await
        .with_context(|| format!("Failed to download '{blob}'"))?;
    let mut records = from_csv(&content).with_context(|| format!("'{blob}' is not a valid record file"))?;

    for record in &mut records {
        record.status = new_status.to_string();
    }
    debug!(blob, records = records.len(), new_status, "Statuses rewritten");

    write_records(container, blob, &records).await?;
    Ok(records.len())
}

/// Runs one invocation against the given secret store and storage backend.
///
/// Any failure aborts the run; nothing is retried at this level.
#[tracing::instrument(
    skip_all,
    fields(account = %config.storage_account_name, secret = %config.secret_name)
)]
pub async fn run(
    config: &JobConfig,
    params: &RunParameters,
    secrets: &dyn SecretStore,
    connector: &dyn StorageConnector,
) -> Result<RunReport> {
    info!(started_at = %Utc::now(), "Run started");

    let access_key = secrets
        .get_secret(&config.secret_name)
        .await
        .with_context(|| format!("Failed to retrieve secret '{}'", config.secret_name))?;

    let store = connector
        .connect(&config.storage_account_name, access_key)
        .await
        .with_context(|| format!("Failed to connect to storage account '{}'", config.storage_account_name))?;

    let container = ensure_container(store.as_ref(), CONTAINER_NAME)
        .await
        .with_context(|| format!("Failed to provision container '{CONTAINER_NAME}'"))?;

    let records = build_records(&params.account_name, &params.group_name, &params.status);
    info!(records = records.len(), "Number of records before adding");

    let blob = blob_name(Utc::now());
    write_records(&container, &blob, &records).await?;
    info!(blob = %blob, container = %container.name(), "CSV file uploaded");

    let updated = update_status(&container, &blob, &params.updated_status).await?;
    info!(records = updated, blob = %blob, "Number of records after updating");

    Ok(RunReport {
        container: container.name().to_string(),
        container_status: container.status(),
        blob_name: blob,
        records_written: records.len(),
        records_updated: updated,
    })
}
