//! Request identifiers each workload is expected to have seen.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::Mutex;

/// Shared, append-only ledger filled during fan-out.
///
/// Every append holds the ledger's own lock; order of appends across
/// workloads carries no meaning.
#[derive(Debug, Default)]
pub struct AccessLogLedger {
    entries: Mutex<BTreeMap<String, Vec<String>>>,
}

impl AccessLogLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes `id` to both ends of a probe.
    pub async fn record(&self, src: &str, dst: &str, id: &str) {
        let mut entries = self.entries.lock().await;
        entries
            .entry(src.to_owned())
            .or_default()
            .push(id.to_owned());
        if dst != src {
            entries
                .entry(dst.to_owned())
                .or_default()
                .push(id.to_owned());
        }
    }

    /// Freezes the current contents.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            entries: self.entries.lock().await.clone(),
        }
    }

    /// Consumes the ledger once no writer is left.
    pub fn into_snapshot(self) -> LedgerSnapshot {
        LedgerSnapshot {
            entries: self.entries.into_inner(),
        }
    }
}

/// Read-only view of a completed ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    entries: BTreeMap<String, Vec<String>>,
}

impl LedgerSnapshot {
    /// Identifiers attributed to `workload`, in no particular order.
    pub fn ids_for(&self, workload: &str) -> &[String] {
        self.entries
            .get(workload)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn workloads(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Identifier count per workload.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.entries
            .iter()
            .map(|(w, ids)| (w.clone(), ids.len()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Vec<String>)> for LedgerSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
