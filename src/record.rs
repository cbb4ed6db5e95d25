//! The account status row written to and read back from storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status given to freshly generated records.
pub const STATUS_PENDING: &str = "Pending";

/// Status written by the update pass.
pub const STATUS_UPDATED: &str = "UpdatedStatus";

/// Second-precision UTC format used for [`AccountStatusRecord::utc_timestamp`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One row of the account status table.
///
/// Field order is the column order of the serialized file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatusRecord {
    #[serde(rename = "AccountName")]
    pub account_name: String,
    #[serde(rename = "UtcDateTime")]
    pub utc_timestamp: String,
    #[serde(rename = "GroupName")]
    pub group_name: String,
    #[serde(rename = "Status")]
    pub status: String,
}

/// Builds the single-record batch written by each run, stamped with the
/// current UTC time.
pub fn build_records(account_name: &str, group_name: &str, status: &str) -> Vec<AccountStatusRecord> {
    build_records_at(Utc::now(), account_name, group_name, status)
}

/// Same as [`build_records`] with an explicit clock reading.
pub fn build_records_at(
    now: DateTime<Utc>,
    account_name: &str,
    group_name: &str,
    status: &str,
) -> Vec<AccountStatusRecord> {
    vec![AccountStatusRecord {
        account_name: account_name.to_string(),
        utc_timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
        group_name: group_name.to_string(),
        status: status.to_string(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone};

    #[test]
    fn test_build_records_returns_exactly_one() {
        let records = build_records("My Account", "My Group", STATUS_PENDING);
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.account_name, "My Account");
        assert_eq!(r.group_name, "My Group");
        assert_eq!(r.status, "Pending");
    }

    #[test]
    fn test_timestamp_is_close_to_now() {
        let before = Utc::now();
        let records = build_records("a", "g", "s");
        let after = Utc::now();

        let parsed = NaiveDateTime::parse_from_str(&records[0].utc_timestamp, TIMESTAMP_FORMAT)
            .unwrap()
            .and_utc();

        // second precision truncates, so allow one second of slack on the low side
        assert!(parsed >= before - chrono::Duration::seconds(1));
        assert!(parsed <= after);
    }

    #[test]
    fn test_timestamp_has_second_precision() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
            + chrono::Duration::milliseconds(987);
        let records = build_records_at(now, "a", "g", "s");
        assert_eq!(records[0].utc_timestamp, "2024-03-09T07:05:01");
    }

    #[test]
    fn test_caller_supplied_status_is_kept() {
        let records = build_records("a", "g", "Suspended");
        assert_eq!(records[0].status, "Suspended");
    }
}
