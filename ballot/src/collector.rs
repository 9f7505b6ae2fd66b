//! The collector's destination handler and the tally it maintains

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use ballot_common::{
    Acknowledge, Destination, Envelope, EnvelopeId, ReceiveError, Vote, incoming, internal,
};
use dashmap::{DashMap, mapref::entry::Entry};

/// Votes received, keyed by the envelope that carried them
///
/// Keying by envelope id makes applying a vote idempotent: a redelivered
/// envelope finds its vote already recorded and changes nothing.
#[derive(Debug, Default)]
pub struct Tally {
    votes: DashMap<EnvelopeId, Vote>,
}

impl Tally {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `vote` under `id`, returning `false` if `id` was already
    /// recorded
    pub fn apply(&self, id: EnvelopeId, vote: Vote) -> bool {
        match self.votes.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(vote);
                true
            }
        }
    }

    pub fn contains(&self, id: &EnvelopeId) -> bool {
        self.votes.contains_key(id)
    }

    /// Votes per candidate, per election
    pub fn counts(&self) -> BTreeMap<String, BTreeMap<String, usize>> {
        let mut counts: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();

        for entry in &self.votes {
            let vote = entry.value();
            *counts
                .entry(vote.election.clone())
                .or_default()
                .entry(vote.candidate.clone())
                .or_default() += 1;
        }

        counts
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Write the current counts to the log
    pub fn log_summary(&self) {
        internal!(level = INFO, "Tally holds {} votes", self.len());
        for (election, candidates) in self.counts() {
            for (candidate, count) in candidates {
                internal!(level = INFO, "{election}: {candidate} = {count}");
            }
        }
    }
}

/// Applies delivered votes to a [`Tally`] and acks them
///
/// A payload that does not decode is refused without an ack, so the
/// producer keeps retrying it. A vote already in the tally is acked again,
/// since the earlier ack may be the one that was lost.
#[derive(Debug, Clone)]
pub struct TallyHandler {
    tally: Arc<Tally>,
}

impl TallyHandler {
    pub const fn new(tally: Arc<Tally>) -> Self {
        Self { tally }
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }
}

#[async_trait]
impl Destination for TallyHandler {
    async fn receive(
        &self,
        envelope: Envelope,
        callback: Arc<dyn Acknowledge>,
    ) -> Result<(), ReceiveError> {
        let id = envelope.id();

        let vote = Vote::from_payload(envelope.payload()).inspect_err(|e| {
            incoming!(level = WARN, "Refusing envelope {id}, payload is not a vote: {e}");
        })?;

        if self.tally.apply(id, vote) {
            incoming!(level = DEBUG, "Counted vote in envelope {id}");
        } else {
            incoming!(level = DEBUG, "Envelope {id} already counted, acknowledging again");
        }

        callback.ack(&id).await.map_err(|e| {
            internal!(level = WARN, "Vote {id} counted but its ack failed: {e}");
            ReceiveError::Unavailable(e.to_string())
        })
    }
}
