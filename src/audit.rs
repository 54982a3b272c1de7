//! Append-only history of everything done to a slip
use super::error::StoreError;
use super::roles::ActorId;
use super::slip::TimeStamp;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct HistoryEntry {
    #[n(0)]
    pub seq: u32,
    #[n(1)]
    pub actor: ActorId,
    #[n(2)]
    pub action: String,
    #[n(3)]
    pub at: TimeStamp,
    #[n(4)]
    pub note: Option<String>,
    #[n(5)]
    pub digest: String, // sha256 over the previous digest and this entry
}

#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct AuditTrail {
    #[n(0)]
    entries: Vec<HistoryEntry>,
}

// what gets hashed for an entry, chained to its predecessor
#[derive(minicbor::Encode)]
struct Link<'a> {
    #[n(0)]
    previous: &'a str,
    #[n(1)]
    slip_id: u64,
    #[n(2)]
    seq: u32,
    #[n(3)]
    actor: &'a ActorId,
    #[n(4)]
    action: &'a str,
    #[n(5)]
    at: TimeStamp,
    #[n(6)]
    note: Option<&'a str>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        slip_id: u64,
        actor: &ActorId,
        action: &str,
        note: Option<&str>,
        at: TimeStamp,
    ) -> Result<&HistoryEntry, StoreError> {
        let seq = self.entries.len() as u32 + 1;
        let previous = self.entries.last().map(|e| e.digest.as_str()).unwrap_or("");
        let digest = Self::digest(&Link {
            previous,
            slip_id,
            seq,
            actor,
            action,
            at,
            note,
        })?;

        self.entries.push(HistoryEntry {
            seq,
            actor: actor.clone(),
            action: action.to_string(),
            at,
            note: note.map(str::to_string),
            digest,
        });
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Recomputes the digest chain. False if any entry was altered,
    /// removed or reordered after it was written.
    pub fn verify(&self, slip_id: u64) -> bool {
        let mut previous = "";
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.seq != i as u32 + 1 {
                return false;
            }
            let expected = Self::digest(&Link {
                previous,
                slip_id,
                seq: entry.seq,
                actor: &entry.actor,
                action: &entry.action,
                at: entry.at,
                note: entry.note.as_deref(),
            });
            match expected {
                Ok(digest) if digest == entry.digest => previous = &entry.digest,
                _ => return false,
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    fn digest(link: &Link<'_>) -> Result<String, StoreError> {
        let cbor = minicbor::to_vec(link).map_err(|e| StoreError::Encode(e.to_string()))?;
        Ok(sha256::digest(&cbor))
    }
}
