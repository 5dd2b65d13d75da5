//! Serialized access to a transport.
//!
//! Everything above the transport talks to the master through [`Link`]. Two
//! implementations exist: a transport behind a `parking_lot::Mutex`, where
//! callers take turns on their own threads, and a [`LinkHandle`] to a
//! [`LinkWorker`] thread that owns the transport and runs requests in arrival
//! order.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use master_protocol::Frame;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::error::{CommunicationError, LinkResult};
use crate::transport::{LinkStats, Request, Transport};

/// A serialized request/reply path to the master.
pub trait Link: Send + Sync {
    /// Send a request and wait for its reply payload.
    fn send(&self, request: Request) -> LinkResult<Vec<u8>>;

    /// Forward pending event frames to subscribers without sending anything.
    fn poll_events(&self) -> LinkResult<()>;

    /// Receive every event frame from now on.
    fn subscribe_events(&self) -> Receiver<Frame>;

    /// Transport counters.
    fn stats(&self) -> LinkStats;
}

impl<C: Channel> Link for Mutex<Transport<C>> {
    fn send(&self, request: Request) -> LinkResult<Vec<u8>> {
        self.lock().send(&request)
    }

    fn poll_events(&self) -> LinkResult<()> {
        self.lock().poll_events()
    }

    fn subscribe_events(&self) -> Receiver<Frame> {
        self.lock().subscribe_events()
    }

    fn stats(&self) -> LinkStats {
        self.lock().stats()
    }
}

impl<L: Link + ?Sized> Link for Arc<L> {
    fn send(&self, request: Request) -> LinkResult<Vec<u8>> {
        (**self).send(request)
    }

    fn poll_events(&self) -> LinkResult<()> {
        (**self).poll_events()
    }

    fn subscribe_events(&self) -> Receiver<Frame> {
        (**self).subscribe_events()
    }

    fn stats(&self) -> LinkStats {
        (**self).stats()
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn send(&self, request: Request) -> LinkResult<Vec<u8>> {
        (**self).send(request)
    }

    fn poll_events(&self) -> LinkResult<()> {
        (**self).poll_events()
    }

    fn subscribe_events(&self) -> Receiver<Frame> {
        (**self).subscribe_events()
    }

    fn stats(&self) -> LinkStats {
        (**self).stats()
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Messages processed by the worker thread.
enum WorkerCommand {
    Send(Request, Sender<LinkResult<Vec<u8>>>),
    Poll(Sender<LinkResult<()>>),
    Subscribe(Sender<Receiver<Frame>>),
    Stats(Sender<LinkStats>),
    Shutdown,
}

/// Cloneable handle to a [`LinkWorker`].
#[derive(Clone)]
pub struct LinkHandle {
    cmd_tx: Sender<WorkerCommand>,
}

impl LinkHandle {
    fn call<T>(&self, build: impl FnOnce(Sender<T>) -> WorkerCommand) -> Option<T> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx.send(build(reply_tx)).ok()?;
        reply_rx.recv().ok()
    }
}

impl Link for LinkHandle {
    fn send(&self, request: Request) -> LinkResult<Vec<u8>> {
        self.call(|tx| WorkerCommand::Send(request, tx))
            .unwrap_or_else(|| Err(CommunicationError::ChannelClosed.into()))
    }

    fn poll_events(&self) -> LinkResult<()> {
        self.call(WorkerCommand::Poll)
            .unwrap_or_else(|| Err(CommunicationError::ChannelClosed.into()))
    }

    fn subscribe_events(&self) -> Receiver<Frame> {
        // A stopped worker yields a receiver that never delivers.
        self.call(WorkerCommand::Subscribe)
            .unwrap_or_else(|| crossbeam_channel::never())
    }

    fn stats(&self) -> LinkStats {
        self.call(WorkerCommand::Stats).unwrap_or_default()
    }
}

/// Thread owning a transport.
///
/// The thread exits on [`shutdown`](LinkWorker::shutdown) or once the worker
/// and every handle are dropped.
pub struct LinkWorker {
    handle: LinkHandle,
    thread: JoinHandle<()>,
}

impl LinkWorker {
    /// Move the transport onto a new thread.
    pub fn spawn<C: Channel + 'static>(transport: Transport<C>) -> std::io::Result<Self> {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let family = transport.config().family;
        let thread = thread::Builder::new()
            .name(format!("master-link-{}", family))
            .spawn(move || worker_main(transport, cmd_rx))?;
        info!(%family, "link worker started");
        Ok(LinkWorker {
            handle: LinkHandle { cmd_tx },
            thread,
        })
    }

    /// A handle for sending requests.
    pub fn handle(&self) -> LinkHandle {
        self.handle.clone()
    }

    /// Check if the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Stop the thread after the requests queued before this call.
    pub fn shutdown(self) {
        let _ = self.handle.cmd_tx.send(WorkerCommand::Shutdown);
        if self.thread.join().is_err() {
            tracing::warn!("link worker panicked");
        }
    }
}

fn worker_main<C: Channel>(mut transport: Transport<C>, cmd_rx: Receiver<WorkerCommand>) {
    // Ends when every sender is gone.
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            WorkerCommand::Send(request, reply) => {
                let _ = reply.send(transport.send(&request));
            }
            WorkerCommand::Poll(reply) => {
                let _ = reply.send(transport.poll_events());
            }
            WorkerCommand::Subscribe(reply) => {
                let _ = reply.send(transport.subscribe_events());
            }
            WorkerCommand::Stats(reply) => {
                let _ = reply.send(transport.stats());
            }
            WorkerCommand::Shutdown => break,
        }
    }
    debug!("link worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedMaster;
    use crate::transport::TransportConfig;
    use master_protocol::{CoreCommand, HardwareFamily, CORE_STATUS};

    fn worker() -> (LinkWorker, crate::sim::SimHandle) {
        let (sim, handle) = SimulatedMaster::new(HardwareFamily::Core);
        let transport = Transport::new(sim, TransportConfig::for_family(HardwareFamily::Core));
        (LinkWorker::spawn(transport).expect("spawn"), handle)
    }

    #[test]
    fn test_worker_serves_many_handles() {
        let (worker, sim) = worker();
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let link = worker.handle();
                thread::spawn(move || {
                    for _ in 0..25 {
                        link.send(Request::core(&CoreCommand::FirmwareVersion)).expect("send");
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().expect("caller thread");
        }
        assert_eq!(sim.command_count(CORE_STATUS), 100);
        assert_eq!(worker.handle().stats().requests, 100);
        worker.shutdown();
    }

    #[test]
    fn test_handle_after_shutdown() {
        let (worker, _) = worker();
        let link = worker.handle();
        worker.shutdown();
        let err = link.send(Request::core(&CoreCommand::FirmwareVersion)).unwrap_err();
        assert!(err.is_closed());
        assert!(link.subscribe_events().try_recv().is_err());
    }

    #[test]
    fn test_mutex_link_events() {
        let (sim, handle) = SimulatedMaster::new(HardwareFamily::Core);
        let link = Arc::new(Mutex::new(Transport::new(
            sim,
            TransportConfig::for_family(HardwareFamily::Core),
        )));
        let events = link.subscribe_events();
        handle.inject_eeprom_activation();
        link.poll_events().expect("poll");
        assert_eq!(events.try_recv().expect("event").tag, 0);
    }

    #[test]
    fn test_worker_forwards_events() {
        let (worker, sim) = worker();
        let link = worker.handle();
        let events = link.subscribe_events();
        sim.inject_eeprom_activation();
        link.poll_events().expect("poll");
        assert!(events.recv_timeout(std::time::Duration::from_secs(1)).is_ok());
        worker.shutdown();
    }
}
