use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use core_affinity::CoreId;
use crossbeam_channel::{bounded, Sender};
use rlimit::{setrlimit, Resource};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::SharedMetrics;
use crate::report::{ReportSchedule, Reporter};
use crate::ring::RingConfig;
use crate::worker::{PacketRing, Worker};

/// Fan-out group id shared by every ring socket of this process.
pub fn fanout_group_id() -> u16 {
    (std::process::id() & 0xffff) as u16
}

/// One TPACKET_V3 ring per CPU, joined into a per-CPU fan-out group.
pub struct RingBackend {
    workers: Vec<Worker>,
    shared: Arc<SharedMetrics>,
}

impl RingBackend {
    pub fn start(config: &Config) -> Result<RingBackend> {
        let ring_config = config.ring_config();
        ring_config.validate(crate::util::page_size())?;

        if let Err(err) = setrlimit(Resource::MEMLOCK, rlimit::INFINITY, rlimit::INFINITY) {
            warn!(%err, "could not raise the locked memory limit");
        }

        let cores = core_affinity::get_core_ids().ok_or(Error::NoCpus)?;
        if cores.is_empty() {
            return Err(Error::NoCpus);
        }
        let (cores, unmatched) = fanout_order(cores);
        if unmatched > 0 {
            warn!(
                unmatched,
                "some ring workers are pinned to a CPU whose traffic goes to another socket"
            );
        }

        let group = fanout_group_id();
        info!(
            workers = cores.len(),
            group,
            block_size = ring_config.block_size,
            blocks = ring_config.block_nr,
            "setting up packet rings"
        );

        let shared = Arc::new(SharedMetrics::new());
        let workers = open_rings(&ring_config, config.interface(), group, &cores)?
            .into_iter()
            .zip(cores)
            .map(|(ring, cpu)| Worker::new(cpu, ring, shared.clone()))
            .collect();

        Ok(RingBackend { workers, shared })
    }

    /// Runs the workers and the reporter until a worker fails.
    pub fn run(self) -> Result<()> {
        let (tx, rx) = bounded(self.workers.len());

        for worker in self.workers {
            spawn_worker(worker, tx.clone())?;
        }
        drop(tx);

        let shared = self.shared.clone();
        thread::Builder::new()
            .name("reporter".to_string())
            .spawn(move || report_loop(&shared))?;

        match rx.recv() {
            Ok((_, Err(err))) => Err(err),
            Ok((cpu, Ok(()))) => Err(Error::WorkerExited { cpu }),
            // Every worker sends before exiting, so this needs all of them gone without a word.
            Err(_) => Err(Error::WorkerExited { cpu: 0 }),
        }
    }
}

/// Orders `cores` so that the worker at position `i` is pinned to a CPU whose traffic lands on
/// the `i`-th socket to join the group.
///
/// PACKET_FANOUT_CPU picks socket `cpu % n` among `n` sockets in join order. Positions no core
/// maps to are filled with the remaining cores in id order; their count is returned alongside.
pub fn fanout_order(mut cores: Vec<CoreId>) -> (Vec<CoreId>, usize) {
    cores.sort_by_key(|core| core.id);
    let n = cores.len();

    let mut slots: Vec<Option<CoreId>> = vec![None; n];
    let mut spare = Vec::new();
    for core in cores {
        let slot = &mut slots[core.id % n];
        if slot.is_none() {
            *slot = Some(core);
        } else {
            spare.push(core);
        }
    }

    let unmatched = spare.len();
    let mut spare = spare.into_iter();
    let ordered = slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| spare.next()))
        .collect();
    (ordered, unmatched)
}

fn open_rings(
    config: &RingConfig,
    interface: Option<&str>,
    group: u16,
    cores: &[CoreId],
) -> Result<Vec<PacketRing>> {
    let mut rings = Vec::with_capacity(cores.len());
    for core in cores {
        let ring = PacketRing::open(config, interface, group)?;
        debug!(cpu = core.id, "opened packet ring");
        rings.push(ring);
    }
    Ok(rings)
}

fn spawn_worker(worker: Worker, tx: Sender<(usize, Result<()>)>) -> Result<()> {
    let cpu = worker.cpu();
    thread::Builder::new()
        .name(format!("ring-cpu{}", cpu))
        .spawn(move || {
            let r = panic::catch_unwind(AssertUnwindSafe(|| worker.run()))
                .unwrap_or_else(|_| Err(Error::WorkerExited { cpu }));
            let _ = tx.send((cpu, r));
        })?;
    Ok(())
}

/// Prints the shared counters once a second. Never touches ring memory.
fn report_loop(shared: &SharedMetrics) {
    let start = Instant::now();
    let mut schedule = ReportSchedule::starting_at(start);
    let mut reporter = Reporter::new(start);

    loop {
        let due = schedule.advance();
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
        reporter.tick(shared, due);
    }
}
