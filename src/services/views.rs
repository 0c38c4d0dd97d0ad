//! Turns raw ledger scans into the lists the dashboard shows.
//!
//! Scans come back in no particular order and may repeat an account, so
//! every view is de-duplicated by address and sorted here.

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use crate::models::{Account, Address, FileRecord, SharedAccessGrant};

#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub address: Address,
    pub record: FileRecord,
}

/// A grant joined with its parent file. `file` is `None` when the parent
/// record could not be fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedEntry {
    pub address: Address,
    pub grant: SharedAccessGrant,
    pub file: Option<FileEntry>,
}

/// Decodes scanned accounts, dropping (and logging) any that do not decode
/// as `T`. Later duplicates of an address replace earlier ones.
pub fn decode_unique<T: Account>(raw: Vec<(Address, Vec<u8>)>) -> BTreeMap<Address, T> {
    let mut out = BTreeMap::new();
    for (address, data) in raw {
        match T::from_account_data(&data) {
            Ok(value) => {
                out.insert(address, value);
            }
            Err(e) => warn!("skipping account {} ({}): {}", address, T::NAME, e),
        }
    }
    out
}

/// Files owned by `owner`, newest first, ties broken by name.
pub fn owned_files(raw: Vec<(Address, Vec<u8>)>, owner: &Address) -> Vec<FileEntry> {
    let mut files: Vec<FileEntry> = decode_unique::<FileRecord>(raw)
        .into_iter()
        .filter(|(_, record)| record.owner == *owner)
        .map(|(address, record)| FileEntry { address, record })
        .collect();
    files.sort_by(|a, b| {
        b.record
            .created_at
            .cmp(&a.record.created_at)
            .then_with(|| a.record.file_name.cmp(&b.record.file_name))
    });
    files
}

/// Grants that are active and unexpired at `now`, most recent grant first.
pub fn live_grants(raw: Vec<(Address, Vec<u8>)>, now: i64) -> Vec<(Address, SharedAccessGrant)> {
    let mut grants: Vec<(Address, SharedAccessGrant)> = decode_unique::<SharedAccessGrant>(raw)
        .into_iter()
        .filter(|(_, grant)| grant.is_live_at(now))
        .collect();
    grants.sort_by(|a, b| b.1.granted_at.cmp(&a.1.granted_at).then_with(|| a.0.cmp(&b.0)));
    grants
}

/// Result of looking up a grant's parent file record.
#[derive(Debug, Clone, PartialEq)]
pub enum Parent {
    Found(FileRecord),
    /// The ledger has no account at the parent address.
    Missing,
    /// The fetch itself failed.
    Unavailable,
}

/// Attaches parent records to grants. A grant whose parent no longer exists
/// is no longer valid and is dropped; a grant whose parent could not be
/// fetched is kept with `file: None`.
pub fn join_parents(
    grants: Vec<(Address, SharedAccessGrant)>,
    parents: &HashMap<Address, Parent>,
) -> Vec<SharedEntry> {
    grants
        .into_iter()
        .filter_map(|(address, grant)| {
            let file = match parents.get(&grant.file) {
                Some(Parent::Found(record)) => Some(FileEntry { address: grant.file, record: record.clone() }),
                Some(Parent::Missing) => {
                    debug!("grant {} points at missing file {}", address, grant.file);
                    return None;
                }
                Some(Parent::Unavailable) | None => None,
            };
            Some(SharedEntry { address, grant, file })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccessLevel, FileStatus};

    fn record(owner: Address, name: &str, created_at: i64) -> FileRecord {
        FileRecord {
            owner,
            file_name: name.to_string(),
            file_size: 1,
            content_hash: [0; 32],
            chunk_count: 1,
            created_at,
            primary_cid: None,
            merkle_root: None,
            status: FileStatus::Uploading,
            is_public: false,
        }
    }

    fn grant(file: Address, granted_at: i64, expires_at: Option<i64>, is_active: bool) -> SharedAccessGrant {
        SharedAccessGrant {
            file,
            grantee: Address::from_label("bob"),
            grantor: Address::from_label("alice"),
            access_level: AccessLevel::Read,
            expires_at,
            is_active,
            granted_at,
        }
    }

    fn raw<T: Account>(items: Vec<(Address, T)>) -> Vec<(Address, Vec<u8>)> {
        items.into_iter().map(|(a, v)| (a, v.to_account_data().unwrap())).collect()
    }

    #[test]
    fn owned_files_sorted_deduped_and_filtered() {
        let alice = Address::from_label("alice");
        let a = Address::from_label("a");
        let b = Address::from_label("b");
        let c = Address::from_label("c");
        let mut scan = raw(vec![
            (a, record(alice, "old.txt", 10)),
            (b, record(alice, "new.txt", 20)),
            (c, record(Address::from_label("bob"), "theirs.txt", 30)),
        ]);
        scan.push(scan[1].clone());
        scan.push((Address::from_label("junk"), vec![1, 2, 3]));

        let files = owned_files(scan, &alice);
        let names: Vec<_> = files.iter().map(|f| f.record.file_name.as_str()).collect();
        assert_eq!(names, vec!["new.txt", "old.txt"]);
    }

    #[test]
    fn expired_and_inactive_grants_are_dropped() {
        let file = Address::from_label("file");
        let scan = raw(vec![
            (Address::from_label("g1"), grant(file, 5, None, true)),
            (Address::from_label("g2"), grant(file, 6, Some(50), true)),
            (Address::from_label("g3"), grant(file, 7, Some(500), true)),
            (Address::from_label("g4"), grant(file, 8, None, false)),
        ]);
        let live = live_grants(scan, 100);
        let ids: Vec<_> = live.iter().map(|(a, _)| *a).collect();
        assert_eq!(ids, vec![Address::from_label("g3"), Address::from_label("g1")]);
    }

    #[test]
    fn unavailable_parent_yields_none_and_missing_parent_drops() {
        let alice = Address::from_label("alice");
        let present = Address::from_label("present");
        let failed = Address::from_label("failed");
        let gone = Address::from_label("gone");
        let grants = vec![
            (Address::from_label("g1"), grant(present, 3, None, true)),
            (Address::from_label("g2"), grant(failed, 2, None, true)),
            (Address::from_label("g3"), grant(gone, 1, None, true)),
        ];
        let mut parents = HashMap::new();
        parents.insert(present, Parent::Found(record(alice, "a.txt", 1)));
        parents.insert(failed, Parent::Unavailable);
        parents.insert(gone, Parent::Missing);

        let joined = join_parents(grants, &parents);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].file.as_ref().map(|f| f.record.file_name.as_str()), Some("a.txt"));
        assert_eq!(joined[1].address, Address::from_label("g2"));
        assert!(joined[1].file.is_none());
    }
}
