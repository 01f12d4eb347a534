//! Background edge-event delivery
//!
//! An [`EventPoller`] owns the listener set of one port. The first listener
//! starts a thread that waits on the line group descriptor with a bounded
//! `poll`, drains the queued `gpio_v2_line_event` records, optionally runs
//! them through a [`DebounceFilter`] and calls every listener in turn.
//! While a deferred filter holds an event the poll is shortened to the
//! filter's deadline. Removing the last listener stops the thread; it
//! notices within one poll timeout. An error or hangup on the descriptor
//! also ends the thread.
//!
//! Once [`EventPoller::remove_listener`] returns, the removed listener is not
//! called again. A listener may remove itself (or any other listener) from
//! inside its own callback.

use crate::debounce::DebounceFilter;
use crate::error::{LinuxGpioError, Result};

use sbcio_core::{Edge, GpioEvent, GpioListener, ListenerId};
use sbcio_sys::marshal::{deserialize_list, NativeStruct};
use sbcio_sys::poll::wait_readable;
use sbcio_sys::uapi::gpio::{LineEvent, LineEventKind};
use sbcio_sys::{FileDescriptor, SysError};

use nix::errno::Errno;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Events drained per read
const EVENT_BATCH: usize = 16;

thread_local! {
    // Listener set whose fan-out is running on this thread, by address
    static DISPATCHING: Cell<usize> = const { Cell::new(0) };
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct Listeners {
    entries: Mutex<Vec<(ListenerId, GpioListener)>>,
    // Held for the whole of a fan-out
    dispatch: Mutex<()>,
}

impl Listeners {
    fn is_registered(&self, id: ListenerId) -> bool {
        lock(&self.entries).iter().any(|(i, _)| *i == id)
    }

    fn dispatch(self: &Arc<Self>, event: &GpioEvent) {
        let _guard = lock(&self.dispatch);
        let snapshot: Vec<(ListenerId, GpioListener)> = lock(&self.entries).clone();

        let previous = DISPATCHING.with(|d| d.replace(Arc::as_ptr(self) as usize));
        for (id, listener) in snapshot {
            if self.is_registered(id) {
                listener(event);
            }
        }
        DISPATCHING.with(|d| d.set(previous));
    }

    /// Block until no fan-out is in progress on another thread
    fn quiesce(self: &Arc<Self>) {
        let me = Arc::as_ptr(self) as usize;
        if DISPATCHING.with(|d| d.get()) == me {
            return;
        }
        drop(lock(&self.dispatch));
    }
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn stop(self) {
        self.running.store(false, Ordering::Release);
        if self.handle.thread().id() == thread::current().id() {
            // Stopped from a listener; the loop exits after this fan-out
            return;
        }
        if self.handle.join().is_err() {
            log::warn!("gpio: event poller thread panicked");
        }
    }
}

/// Listener registry and event thread for one line group
pub struct EventPoller {
    name: String,
    fd: Arc<FileDescriptor>,
    timeout: Duration,
    debounce: Option<DebounceFilter>,
    listeners: Arc<Listeners>,
    next_id: AtomicU64,
    worker: Mutex<Option<Worker>>,
}

impl EventPoller {
    /// `debounce` filters events in software; `None` delivers every edge
    pub fn new(
        name: impl Into<String>,
        fd: Arc<FileDescriptor>,
        timeout: Duration,
        debounce: Option<DebounceFilter>,
    ) -> Self {
        Self {
            name: name.into(),
            fd,
            timeout,
            debounce,
            listeners: Arc::default(),
            next_id: AtomicU64::new(1),
            worker: Mutex::new(None),
        }
    }

    pub fn add_listener(&self, listener: GpioListener) -> Result<ListenerId> {
        let mut worker = lock(&self.worker);
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners.entries).push((id, listener));

        if worker.is_none() {
            match self.spawn() {
                Ok(w) => *worker = Some(w),
                Err(e) => {
                    lock(&self.listeners.entries).retain(|(i, _)| *i != id);
                    return Err(e);
                }
            }
        }
        log::debug!("gpio: {}: added listener {}", self.name, id.0);
        Ok(id)
    }

    /// Returns whether `id` was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let (removed, stopped) = {
            let mut worker = lock(&self.worker);
            let mut entries = lock(&self.listeners.entries);
            let before = entries.len();
            entries.retain(|(i, _)| *i != id);
            let removed = entries.len() < before;
            let stopped = if removed && entries.is_empty() {
                worker.take()
            } else {
                None
            };
            (removed, stopped)
        };

        if removed {
            self.listeners.quiesce();
            log::debug!("gpio: {}: removed listener {}", self.name, id.0);
        }
        if let Some(worker) = stopped {
            worker.stop();
            log::debug!("gpio: {}: event poller stopped", self.name);
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners.entries).len()
    }

    /// Whether the event thread is (still) meant to be running
    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .is_some_and(|w| w.running.load(Ordering::Acquire) && !w.handle.is_finished())
    }

    /// Drop every listener and stop the thread
    pub fn stop(&self) {
        let worker = {
            let mut worker = lock(&self.worker);
            lock(&self.listeners.entries).clear();
            worker.take()
        };
        self.listeners.quiesce();
        if let Some(worker) = worker {
            worker.stop();
        }
    }

    fn spawn(&self) -> Result<Worker> {
        let running = Arc::new(AtomicBool::new(true));
        let context = PollLoop {
            name: self.name.clone(),
            fd: self.fd.clone(),
            timeout: self.timeout,
            filter: self.debounce.clone().map(|mut f| {
                f.reset();
                f
            }),
            listeners: self.listeners.clone(),
            running: running.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("gpio-event-poller-{}", self.name))
            .spawn(move || context.run())
            .map_err(LinuxGpioError::Spawn)?;
        log::debug!("gpio: {}: event poller started", self.name);
        Ok(Worker { running, handle })
    }
}

impl Drop for EventPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PollLoop {
    name: String,
    fd: Arc<FileDescriptor>,
    timeout: Duration,
    filter: Option<DebounceFilter>,
    listeners: Arc<Listeners>,
    running: Arc<AtomicBool>,
}

impl PollLoop {
    fn run(mut self) {
        let event_size = LineEvent::layout().size;
        let mut buf = vec![0u8; EVENT_BATCH * event_size];

        while self.running.load(Ordering::Acquire) {
            match wait_readable(&self.fd, self.wait_time()) {
                Ok(true) => {}
                Ok(false) => {
                    self.flush_held();
                    continue;
                }
                Err(e) if e.is_interrupted() => continue,
                Err(e @ SysError::PollCondition { .. }) => {
                    log::error!("gpio: {}: line descriptor failed: {}", self.name, e);
                    break;
                }
                Err(e) => {
                    log::error!("gpio: {}: poll failed: {}", self.name, e);
                    break;
                }
            }

            let n = match self.fd.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.is_interrupted() || e.errno() == Some(Errno::EAGAIN) => continue,
                Err(e) => {
                    log::error!("gpio: {}: reading events failed: {}", self.name, e);
                    break;
                }
            };

            let events = match deserialize_list::<LineEvent>(&buf[..n], n / event_size) {
                Ok(events) => events,
                Err(e) => {
                    log::warn!("gpio: {}: malformed event record: {}", self.name, e);
                    continue;
                }
            };
            let now = Instant::now();
            for event in events {
                self.deliver(event, now);
            }
        }
        self.running.store(false, Ordering::Release);
    }

    /// Poll timeout, cut short by a held event's deadline
    fn wait_time(&self) -> Duration {
        match self.filter.as_ref().and_then(DebounceFilter::deadline) {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(self.timeout),
            None => self.timeout,
        }
    }

    fn flush_held(&mut self) {
        let released = self
            .filter
            .as_mut()
            .and_then(|f| f.flush(Instant::now()));
        if let Some(event) = released {
            self.dispatch(event);
        }
    }

    fn deliver(&mut self, event: LineEvent, now: Instant) {
        let edge = match event.kind {
            LineEventKind::RisingEdge => Edge::Rising,
            LineEventKind::FallingEdge => Edge::Falling,
            LineEventKind::Unknown(id) => {
                log::warn!("gpio: {}: ignoring event id {}", self.name, id);
                return;
            }
        };

        let event = GpioEvent {
            edge,
            timestamp_ns: event.timestamp_ns,
            offset: event.offset,
            seqno: event.seqno,
            line_seqno: event.line_seqno,
        };

        let (released, deferred) = match self.filter.as_mut() {
            Some(filter) => (filter.offer(event, now), filter.strategy().is_deferred()),
            None => (Some(event), false),
        };
        match released {
            Some(released) => self.dispatch(released),
            None if deferred => {}
            None => log::trace!(
                "gpio: {}: debounced {} edge on line {} at {}",
                self.name,
                edge,
                event.offset,
                event.timestamp_ns
            ),
        }
    }

    fn dispatch(&self, event: GpioEvent) {
        log::trace!(
            "gpio: {}: {} edge on line {} at {}",
            self.name,
            event.edge,
            event.offset,
            event.timestamp_ns
        );
        self.listeners.dispatch(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::DebounceStrategy;
    use nix::poll::PollFlags;
    use sbcio_sys::marshal::serialize_array;
    use sbcio_sys::testing::FakeKernel;
    use std::sync::mpsc;

    const TIMEOUT: Duration = Duration::from_millis(10);
    const WAIT: Duration = Duration::from_secs(2);

    fn line_event(kind: LineEventKind, timestamp_ns: u64, seqno: u32) -> LineEvent {
        LineEvent {
            timestamp_ns,
            kind,
            offset: 17,
            seqno,
            line_seqno: seqno,
        }
    }

    fn setup(debounce: Option<DebounceFilter>) -> (Arc<FakeKernel>, i32, EventPoller) {
        let kernel = FakeKernel::new();
        let raw = kernel.reserve_fd();
        let fd = Arc::new(FileDescriptor::from_raw(kernel.clone(), raw));
        let poller = EventPoller::new("test", fd, TIMEOUT, debounce);
        (kernel, raw, poller)
    }

    fn channel_listener() -> (GpioListener, mpsc::Receiver<GpioEvent>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let listener: GpioListener = Arc::new(move |event: &GpioEvent| {
            let _ = tx.lock().unwrap().send(*event);
        });
        (listener, rx)
    }

    #[test]
    fn test_lifecycle_follows_listeners() {
        let (_kernel, _raw, poller) = setup(None);
        assert!(!poller.is_running());

        let (first, _rx1) = channel_listener();
        let (second, _rx2) = channel_listener();
        let a = poller.add_listener(first).unwrap();
        assert!(poller.is_running());
        let b = poller.add_listener(second).unwrap();
        assert_eq!(poller.listener_count(), 2);

        assert!(poller.remove_listener(a));
        assert!(poller.is_running());
        assert!(poller.remove_listener(b));
        assert!(!poller.is_running());
        assert!(!poller.remove_listener(b));
    }

    #[test]
    fn test_events_reach_listener() {
        let (kernel, raw, poller) = setup(None);
        let (listener, rx) = channel_listener();
        poller.add_listener(listener).unwrap();

        kernel.push_readable(
            raw,
            serialize_array(&[
                line_event(LineEventKind::RisingEdge, 1_000, 1),
                line_event(LineEventKind::FallingEdge, 2_000, 2),
            ]),
        );

        let first = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(first.edge, Edge::Rising);
        assert_eq!(first.offset, 17);
        assert_eq!(first.timestamp_ns, 1_000);
        let second = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(second.edge, Edge::Falling);
        assert_eq!(second.seqno, 2);
    }

    #[test]
    fn test_no_events_after_removal() {
        let (kernel, raw, poller) = setup(None);
        let (listener, rx) = channel_listener();
        let id = poller.add_listener(listener).unwrap();

        kernel.push_readable(raw, serialize_array(&[line_event(LineEventKind::RisingEdge, 5, 1)]));
        rx.recv_timeout(WAIT).unwrap();

        assert!(poller.remove_listener(id));
        kernel.push_readable(raw, serialize_array(&[line_event(LineEventKind::RisingEdge, 9, 2)]));
        thread::sleep(TIMEOUT * 5);
        assert!(rx.try_recv().is_err());
        assert!(kernel.has_readable(raw));
    }

    #[test]
    fn test_software_debounce() {
        const W: u64 = 1_000_000;
        let burst = [0, 1, W + 1, W + 2]
            .iter()
            .enumerate()
            .map(|(i, t)| line_event(LineEventKind::RisingEdge, *t, i as u32 + 1))
            .collect::<Vec<_>>();

        let (kernel, raw, poller) = setup(Some(DebounceFilter::new(W)));
        let (listener, rx) = channel_listener();
        poller.add_listener(listener).unwrap();
        kernel.push_readable(raw, serialize_array(&burst));
        assert_eq!(rx.recv_timeout(WAIT).unwrap().timestamp_ns, 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap().timestamp_ns, W + 1);
        thread::sleep(TIMEOUT * 5);
        assert!(rx.try_recv().is_err());

        let (kernel, raw, poller) = setup(None);
        let (listener, rx) = channel_listener();
        poller.add_listener(listener).unwrap();
        kernel.push_readable(raw, serialize_array(&burst));
        for _ in 0..4 {
            rx.recv_timeout(WAIT).unwrap();
        }
    }

    #[test]
    fn test_trailing_edge_releases_after_quiet() {
        const W: Duration = Duration::from_millis(30);
        let filter =
            DebounceFilter::with_strategy(DebounceStrategy::TrailingEdge, W.as_nanos() as u64);
        let (kernel, raw, poller) = setup(Some(filter));
        let (listener, rx) = channel_listener();
        poller.add_listener(listener).unwrap();

        let pushed = Instant::now();
        kernel.push_readable(
            raw,
            serialize_array(&[
                line_event(LineEventKind::RisingEdge, 100, 1),
                line_event(LineEventKind::FallingEdge, 200, 2),
                line_event(LineEventKind::RisingEdge, 300, 3),
            ]),
        );
        let event = rx.recv_timeout(WAIT).unwrap();
        assert!(pushed.elapsed() >= W);
        assert_eq!(event.seqno, 3);
        assert_eq!(event.edge, Edge::Rising);
        thread::sleep(W * 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_hangup_stops_thread() {
        let (kernel, raw, poller) = setup(None);
        let (listener, _rx) = channel_listener();
        poller.add_listener(listener).unwrap();
        assert!(poller.is_running());

        kernel.raise_poll_condition(raw, PollFlags::POLLHUP);
        let deadline = Instant::now() + WAIT;
        while poller.is_running() && Instant::now() < deadline {
            thread::sleep(TIMEOUT);
        }
        assert!(!poller.is_running());
        assert_eq!(poller.listener_count(), 1);
    }

    #[test]
    fn test_listener_removes_itself() {
        let (kernel, raw, poller) = setup(None);
        let poller = Arc::new(poller);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let own_id = Arc::new(Mutex::new(None::<ListenerId>));

        let listener: GpioListener = {
            let poller = Arc::downgrade(&poller);
            let own_id = own_id.clone();
            Arc::new(move |event: &GpioEvent| {
                let _ = tx.lock().unwrap().send(event.seqno);
                if let (Some(poller), Some(id)) = (poller.upgrade(), *own_id.lock().unwrap()) {
                    poller.remove_listener(id);
                }
            })
        };
        *own_id.lock().unwrap() = Some(poller.add_listener(listener).unwrap());

        kernel.push_readable(
            raw,
            serialize_array(&[
                line_event(LineEventKind::RisingEdge, 10, 1),
                line_event(LineEventKind::RisingEdge, 20, 2),
            ]),
        );
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);
        thread::sleep(TIMEOUT * 5);
        assert!(rx.try_recv().is_err());
        assert_eq!(poller.listener_count(), 0);
        assert!(!poller.is_running());
    }

    #[test]
    fn test_interrupted_poll_is_retried() {
        let (kernel, raw, poller) = setup(None);
        kernel.fail_next_poll(Errno::EINTR);
        let (listener, rx) = channel_listener();
        poller.add_listener(listener).unwrap();
        kernel.push_readable(raw, serialize_array(&[line_event(LineEventKind::FallingEdge, 3, 1)]));
        assert_eq!(rx.recv_timeout(WAIT).unwrap().edge, Edge::Falling);
    }

    #[test]
    fn test_restart_after_stop() {
        let (kernel, raw, poller) = setup(None);
        let (listener, _rx) = channel_listener();
        let id = poller.add_listener(listener).unwrap();
        poller.remove_listener(id);
        assert!(!poller.is_running());

        let (listener, rx) = channel_listener();
        poller.add_listener(listener).unwrap();
        assert!(poller.is_running());
        kernel.push_readable(raw, serialize_array(&[line_event(LineEventKind::RisingEdge, 4, 7)]));
        assert_eq!(rx.recv_timeout(WAIT).unwrap().seqno, 7);
    }
}
