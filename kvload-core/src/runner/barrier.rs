use std::sync::{Condvar, Mutex};

#[derive(Debug)]
struct Arrivals {
    arrived: usize,
    parties: usize,
}

/// A one-shot barrier that releases everyone once all parties have arrived.
///
/// Unlike [`std::sync::Barrier`], parties that will never show up can be
/// withdrawn with [`forfeit`](Self::forfeit), so a thread that failed to spawn
/// does not leave the others waiting forever.
#[derive(Debug)]
pub(crate) struct ArrivalBarrier {
    arrivals: Mutex<Arrivals>,
    released: Condvar,
}

impl ArrivalBarrier {
    pub fn new(parties: usize) -> Self {
        Self {
            arrivals: Mutex::new(Arrivals {
                arrived: 0,
                parties,
            }),
            released: Condvar::new(),
        }
    }

    /// Signals arrival and blocks until every remaining party has arrived.
    pub fn wait(&self) {
        let mut arrivals = self.arrivals.lock().unwrap();
        arrivals.arrived += 1;
        if arrivals.arrived >= arrivals.parties {
            self.released.notify_all();
            return;
        }

        let _released = self
            .released
            .wait_while(arrivals, |a| a.arrived < a.parties)
            .unwrap();
    }

    /// Withdraws `count` parties that will never arrive.
    pub fn forfeit(&self, count: usize) {
        let mut arrivals = self.arrivals.lock().unwrap();
        arrivals.parties = arrivals.parties.saturating_sub(count);
        if arrivals.arrived >= arrivals.parties {
            self.released.notify_all();
        }
    }
}
