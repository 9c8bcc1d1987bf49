use super::Reconciler;
use crate::cloud::{CnameRecord, RecordChange};
use crate::constants::DNS_RECORD_TTL;
use crate::error::Result;
use log::debug;

impl Reconciler<'_> {
    /// Point the CNAME `name` at `target`. Upserts need no prior read.
    pub async fn ensure_cname(&self, zone_id: &str, name: &str, target: &str) -> Result<()> {
        let record = CnameRecord {
            name: name.to_string(),
            value: target.to_string(),
            ttl: DNS_RECORD_TTL,
        };
        self.cloud
            .change_cname(zone_id, RecordChange::Upsert, &record)
            .await
    }

    /// Delete the CNAME `name`. Deletion must name the record's current value, so it is read
    /// first.
    pub async fn remove_cname(&self, zone_id: &str, name: &str) -> Result<()> {
        match self.cloud.find_cname(zone_id, name).await? {
            Some(record) => {
                self.cloud
                    .change_cname(zone_id, RecordChange::Delete, &record)
                    .await
            }
            None => {
                debug!("No CNAME record '{}' in zone '{}'", name, zone_id);
                Ok(())
            }
        }
    }
}
