//! Bounded registry of connected clients.
//!
//! Slots are addressed by index. A freed slot is reused by the next claim,
//! lowest index first. The table keeps an active index bound so the engine
//! can stop scanning at the highest occupied slot.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::peer::Peer;

/// One occupied slot as seen from outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub index: usize,
    pub address: String,
}

/// Read-only view of the table, safe to share with other threads.
///
/// The engine publishes a fresh snapshot after every claim and release;
/// readers never block it and never see a half-written slot.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    inner: Arc<ArcSwap<Vec<RosterEntry>>>,
}

impl Roster {
    pub fn load(&self) -> Arc<Vec<RosterEntry>> {
        self.inner.load_full()
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, entries: Vec<RosterEntry>) {
        self.inner.store(Arc::new(entries));
    }
}

/// Returned by [`ClientTable::claim`] when every slot is taken. Carries the
/// connection back so the caller can close it.
#[derive(Debug)]
pub struct TableFull<C>(pub C);

#[derive(Debug)]
pub struct ClientTable<C> {
    slots: Vec<Option<Peer<C>>>,
    occupied: usize,
    bound: Option<usize>,
    roster: Roster,
}

impl<C> ClientTable<C> {
    pub fn new(capacity: usize) -> Self {
        Self::with_roster(capacity, Roster::default())
    }

    pub fn with_roster(capacity: usize, roster: Roster) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        let table = Self {
            slots,
            occupied: 0,
            bound: None,
            roster,
        };
        table.publish();
        table
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Highest index that may be occupied. Every occupied slot is at or
    /// below it; it can briefly overshoot after a release.
    pub fn bound(&self) -> Option<usize> {
        self.bound
    }

    pub fn roster(&self) -> Roster {
        self.roster.clone()
    }

    pub fn claim(&mut self, conn: C, addr: String) -> Result<usize, TableFull<C>> {
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            return Err(TableFull(conn));
        };

        self.slots[index] = Some(Peer::new(conn, addr));
        self.occupied += 1;
        if self.bound.is_none_or(|bound| index > bound) {
            self.bound = Some(index);
        }
        self.publish();
        Ok(index)
    }

    pub fn release(&mut self, index: usize) -> Option<Peer<C>> {
        let peer = self.slots.get_mut(index)?.take()?;
        self.occupied -= 1;

        if self.bound == Some(index) {
            // Walk down past trailing free slots. Each slot is stepped over
            // at most once per claim, so this stays amortized O(1).
            self.bound = self.slots[..index].iter().rposition(Option::is_some);
        }
        self.publish();
        Some(peer)
    }

    pub fn get(&self, index: usize) -> Option<&Peer<C>> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Peer<C>> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Occupied slots in ascending index order.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &Peer<C>)> {
        self.scan_range()
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|peer| (i, peer)))
    }

    pub fn occupied_mut(&mut self) -> impl Iterator<Item = (usize, &mut Peer<C>)> {
        let end = self.bound.map_or(0, |b| b + 1);
        self.slots[..end]
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|peer| (i, peer)))
    }

    pub fn snapshot(&self) -> Vec<RosterEntry> {
        self.occupied()
            .map(|(index, peer)| RosterEntry {
                index,
                address: peer.addr.clone(),
            })
            .collect()
    }

    fn scan_range(&self) -> &[Option<Peer<C>>] {
        let end = self.bound.map_or(0, |b| b + 1);
        &self.slots[..end]
    }

    fn publish(&self) {
        self.roster.publish(self.snapshot());
    }
}
