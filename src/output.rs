//! CSV encoding and decoding for [`AccountStatusRecord`] batches.
//!
//! Files always start with the header row, even when the batch is empty, and
//! reading rejects files whose header does not match it.

use anyhow::{Result, bail};
use csv::{ReaderBuilder, WriterBuilder};
use tracing::debug;

use crate::record::AccountStatusRecord;

/// Column names, in file order.
pub const HEADER: [&str; 4] = ["AccountName", "UtcDateTime", "GroupName", "Status"];

/// Serializes `records` into an in-memory CSV document.
pub fn to_csv(records: &[AccountStatusRecord]) -> Result<Vec<u8>> {
    // headers are written by hand so an empty batch still gets one
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(HEADER)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("{}", e.error()))?;
    debug!(records = records.len(), bytes = bytes.len(), "Encoded CSV");
    Ok(bytes)
}

/// Parses a CSV document produced by [`to_csv`].
///
/// # Errors
///
/// Fails if the header row is missing or differs from [`HEADER`], or if any
/// row does not have exactly four fields.
pub fn from_csv(bytes: &[u8]) -> Result<Vec<AccountStatusRecord>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(bytes);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        bail!("CSV content has no header row");
    }
    if headers.iter().ne(HEADER.iter().copied()) {
        bail!(
            "unexpected CSV header '{}', expected '{}'",
            headers.iter().collect::<Vec<_>>().join(","),
            HEADER.join(",")
        );
    }

    let records = reader
        .deserialize()
        .collect::<std::result::Result<Vec<AccountStatusRecord>, _>>()?;
    debug!(records = records.len(), "Decoded CSV");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(account: &str, status: &str) -> AccountStatusRecord {
        AccountStatusRecord {
            account_name: account.to_string(),
            utc_timestamp: "2024-01-02T03:04:05".to_string(),
            group_name: "My Group".to_string(),
            status: status.to_string(),
        }
    }

    #[test]
    fn test_header_then_one_row() {
        let bytes = to_csv(&[record("My Account", "Pending")]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines, vec![
            "AccountName,UtcDateTime,GroupName,Status",
            "My Account,2024-01-02T03:04:05,My Group,Pending",
        ]);
    }

    #[test]
    fn test_empty_batch_still_has_header() {
        let bytes = to_csv(&[]).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "AccountName,UtcDateTime,GroupName,Status\n");
        assert!(from_csv(b"AccountName,UtcDateTime,GroupName,Status\n").unwrap().is_empty());
    }

    #[test]
    fn test_embedded_delimiters_are_quoted() {
        let original = vec![record("Doe, Jane", "say \"hi\""), record("plain", "Pending")];
        let bytes = to_csv(&original).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();

        assert!(text.contains("\"Doe, Jane\""));
        assert!(text.contains("\"say \"\"hi\"\"\""));
        assert_eq!(from_csv(&bytes).unwrap(), original);
    }

    #[test]
    fn test_wrong_header_is_rejected() {
        let err = from_csv(b"Name,When,Group,Status\na,b,c,d\n").unwrap_err();
        assert!(err.to_string().contains("unexpected CSV header"));
    }

    #[test]
    fn test_empty_content_is_rejected() {
        assert!(from_csv(b"").is_err());
    }

    #[test]
    fn test_short_row_is_rejected() {
        let content = b"AccountName,UtcDateTime,GroupName,Status\nonly,three,fields\n";
        assert!(from_csv(content).is_err());
    }
}
