// Tick loop of the host server and the hooks it calls into

use crate::ledger::Ledger;
use crate::server::{HostEnv, Server};

/// Extension points the host calls during its tick and load sequence.
pub trait ServerHooks {
    /// Start of a tick, before any instance ticks. Queued work is applied here.
    fn on_before_tick(&mut self, env: &mut HostEnv);

    /// After every live instance has ticked.
    fn on_after_children_tick(&mut self, env: &mut HostEnv);

    /// Right after the root save data exists, before any instance is created.
    fn on_level_data_constructed(&mut self, env: &mut HostEnv, ledger: Ledger);
}

impl Server {
    /// Advance one tick with no request handlers.
    pub fn run_tick(&mut self) {
        self.run_tick_with(|_| {});
    }

    /// Advance one tick. `requests` runs during the children phase, so every
    /// lifecycle request it makes is ticketed for the next tick.
    ///
    /// Tick sequence:
    /// 1. Drain tickets (creates, then removals)
    /// 2. Tick every live instance
    /// 3. Run request handlers
    /// 4. Prune disconnected observers
    pub fn run_tick_with<R>(&mut self, requests: impl FnOnce(&mut Server) -> R) -> R {
        self.env.tick += 1;
        let tick = self.env.tick;

        self.lifecycle.on_before_tick(&mut self.env);

        self.env.ticking_instances = true;
        self.lifecycle.tick_live(&self.env);
        let result = requests(self);
        self.env.ticking_instances = false;

        self.lifecycle.on_after_children_tick(&mut self.env);

        tracing::debug!(
            target: "tick",
            tick = tick,
            live = self.lifecycle.live().count() as u64,
            queued = self.lifecycle.tickets().len() as u64,
        );
        result
    }

    /// Run `n` ticks without requests.
    pub fn run_ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.run_tick();
        }
    }
}
