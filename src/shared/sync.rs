/// Multi-party rendezvous used for cross-partition isolation and for the
/// repartition fence.
///
/// A `Rendezvous` is a cloneable handle to one barrier generation: every
/// participant calls [`Rendezvous::wait`], all are released together, and
/// exactly one of them is told it arrived last. Handles allocated per use are
/// freed when the last clone drops; the scheduler also keeps two long-lived
/// pairs that are reused across repartitions (`std::sync::Barrier` resets
/// itself once a generation completes).
use std::sync::{Arc, Barrier};

#[derive(Clone)]
pub struct Rendezvous {
    barrier: Arc<Barrier>,
    parties: usize,
}

impl Rendezvous {
    /// Creates a rendezvous for `parties` participants. `parties` must be at
    /// least 1; a single-party rendezvous never blocks.
    pub fn new(parties: usize) -> Self {
        Self {
            barrier: Arc::new(Barrier::new(parties)),
            parties,
        }
    }

    /// Blocks until all parties have arrived. Returns `true` for the one
    /// participant nominated as the last arriver.
    pub fn wait(&self) -> bool {
        self.barrier.wait().is_leader()
    }

    pub fn parties(&self) -> usize {
        self.parties
    }
}

impl std::fmt::Debug for Rendezvous {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendezvous")
            .field("parties", &self.parties)
            .finish()
    }
}
