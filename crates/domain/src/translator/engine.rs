use serde::{Deserialize, Serialize};

/// One `{threshold, offset}` rewrite record.
///
/// `threshold` is the raw sender-side sequence number up to which the
/// previous offset still applies; `offset` takes over for bytes the
/// sender produces past it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub threshold: u32,
    pub offset: i32,
}

/// Two-generation sequence/acknowledgment offset tracker for one flow
/// direction of a proxied TCP connection.
///
/// When a module rewrite changes a segment's payload length mid-stream,
/// data already in flight (including retransmissions of it) must keep
/// translating under the old cumulative offset; only bytes produced past
/// the rewrite point see the new one. The sender's own byte counter is
/// the only reliable signal for "past this point", so the pending record
/// is keyed on a raw sequence threshold and activated lazily, the first
/// time a translated value lies beyond it.
///
/// Acknowledgment numbers report positions in this same stream as seen
/// by the peer, which received shifted sequence numbers; their
/// translation is the mirror image (subtract instead of add).
///
/// Translation itself never alters the two records; only
/// [`record_rewrite`](Self::record_rewrite) writes them. The lazy switch
/// moves the active-generation selector and nothing else, so translated
/// values are a pure function of the recorded rewrites.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SeqAckTranslator {
    gens: [Generation; 2],
    active: usize,
}

impl SeqAckTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a payload length change of `delta` bytes observed at raw
    /// sequence `at`, in a segment whose payload was `len` bytes before
    /// the rewrite.
    ///
    /// Writes the inactive generation only: `threshold = at + len - 1`,
    /// `offset = active.offset + delta`. The active generation keeps
    /// serving until the sender passes the new threshold. A zero `delta`
    /// still refreshes the threshold but cannot change any translated
    /// value.
    pub fn record_rewrite(&mut self, at: u32, len: u32, delta: i32) {
        let pending = 1 - self.active;
        self.gens[pending] = Generation {
            threshold: at.wrapping_add(len).wrapping_sub(1),
            offset: self.gens[self.active].offset.wrapping_add(delta),
        };
    }

    /// Translate a raw sequence number from this direction's stream.
    pub fn translate_seq(&mut self, raw: u32) -> u32 {
        self.advance(raw);
        let active = self.gens[self.active];
        if active.offset != 0 && raw > active.threshold.wrapping_sub(active.offset as u32) {
            raw.wrapping_add(active.offset as u32)
        } else {
            raw
        }
    }

    /// Translate a raw acknowledgment number the peer reported against
    /// this direction's stream.
    pub fn translate_ack(&mut self, raw: u32) -> u32 {
        self.advance(raw);
        let active = self.gens[self.active];
        if active.offset != 0 && raw > active.threshold.wrapping_sub(active.offset as u32) {
            raw.wrapping_sub(active.offset as u32)
        } else {
            raw
        }
    }

    /// Switch to the pending generation once the sender has passed it.
    fn advance(&mut self, raw: u32) {
        let pending = 1 - self.active;
        if self.gens[pending].threshold > self.gens[self.active].threshold
            && raw > self.gens[pending].threshold
        {
            self.active = pending;
        }
    }

    /// Cumulative offset currently being applied.
    pub fn active_generation(&self) -> Generation {
        self.gens[self.active]
    }

    /// Rewrite recorded but not yet reached by the sender.
    pub fn pending_generation(&self) -> Generation {
        self.gens[1 - self.active]
    }
}
