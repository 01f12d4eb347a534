//! Software debounce strategies
//!
//! A [`DebounceFilter`] sits between the line group descriptor and the
//! listeners. Leading-edge and throttled filters decide on each event as it
//! arrives, using kernel timestamps only. Trailing-edge and stability filters
//! hold back the latest event of a burst and release it once the lines have
//! been quiet for the window; the poller calls [`DebounceFilter::flush`] when
//! [`DebounceFilter::deadline`] passes.
//!
//! One filter serves a whole port, so a burst spanning several lines
//! collapses to a single held event.

use sbcio_core::{Edge, GpioEvent};

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// How a burst of edges is reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebounceStrategy {
    /// Deliver the first edge, then drop edges until `window` has passed
    /// since the last delivered one
    #[default]
    LeadingEdge,
    /// Deliver the last edge of a burst once no edge arrived for `window`
    TrailingEdge,
    /// Deliver at most one edge per `window`-long slot, slots counted from
    /// the first delivered edge
    Throttled,
    /// Like [`TrailingEdge`](Self::TrailingEdge), but only when the settled
    /// edge differs from the one last delivered for that line
    Stability,
}

impl DebounceStrategy {
    /// Whether events are held until the lines go quiet
    pub fn is_deferred(self) -> bool {
        matches!(self, DebounceStrategy::TrailingEdge | DebounceStrategy::Stability)
    }
}

impl FromStr for DebounceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leading" | "leading-edge" => Ok(DebounceStrategy::LeadingEdge),
            "trailing" | "trailing-edge" => Ok(DebounceStrategy::TrailingEdge),
            "throttle" | "throttled" => Ok(DebounceStrategy::Throttled),
            "stable" | "stability" => Ok(DebounceStrategy::Stability),
            _ => Err(format!("Unknown debounce strategy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Held {
    event: GpioEvent,
    arrived: Instant,
}

/// Per-port debounce state
#[derive(Debug, Clone)]
pub struct DebounceFilter {
    strategy: DebounceStrategy,
    window_ns: u64,
    last_accepted: Option<u64>,
    // First delivered timestamp; throttle slots count from here
    origin: Option<u64>,
    held: Option<Held>,
    settled: HashMap<u32, Edge>,
}

impl DebounceFilter {
    /// Leading-edge filter
    pub fn new(window_ns: u64) -> Self {
        Self::with_strategy(DebounceStrategy::LeadingEdge, window_ns)
    }

    pub fn with_strategy(strategy: DebounceStrategy, window_ns: u64) -> Self {
        Self {
            strategy,
            window_ns,
            last_accepted: None,
            origin: None,
            held: None,
            settled: HashMap::new(),
        }
    }

    pub fn from_micros(strategy: DebounceStrategy, micros: u32) -> Self {
        Self::with_strategy(strategy, u64::from(micros) * 1000)
    }

    pub fn strategy(&self) -> DebounceStrategy {
        self.strategy
    }

    pub fn window_ns(&self) -> u64 {
        self.window_ns
    }

    fn window(&self) -> Duration {
        Duration::from_nanos(self.window_ns)
    }

    /// Feed one event that arrived at `now`
    ///
    /// Returns the event to deliver, if any. For deferred strategies this is
    /// the previously held event when the new one starts a fresh burst.
    pub fn offer(&mut self, event: GpioEvent, now: Instant) -> Option<GpioEvent> {
        match self.strategy {
            DebounceStrategy::LeadingEdge => self.leading(event),
            DebounceStrategy::Throttled => self.throttled(event),
            DebounceStrategy::TrailingEdge | DebounceStrategy::Stability => {
                let window_ns = self.window_ns;
                let closed = self.held.filter(|h| {
                    event.timestamp_ns.saturating_sub(h.event.timestamp_ns) > window_ns
                });
                self.held = Some(Held {
                    event,
                    arrived: now,
                });
                closed.and_then(|h| self.settle(h.event))
            }
        }
    }

    /// Release the held event once the lines were quiet for the window
    pub fn flush(&mut self, now: Instant) -> Option<GpioEvent> {
        let held = self.held?;
        if now.saturating_duration_since(held.arrived) < self.window() {
            return None;
        }
        self.held = None;
        self.settle(held.event)
    }

    /// When [`flush`](Self::flush) will next release an event
    pub fn deadline(&self) -> Option<Instant> {
        self.held.map(|h| h.arrived + self.window())
    }

    /// Forget all history, e.g. when the event thread restarts
    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.origin = None;
        self.held = None;
        self.settled.clear();
    }

    fn leading(&mut self, event: GpioEvent) -> Option<GpioEvent> {
        let ts = event.timestamp_ns;
        let accepted = match self.last_accepted {
            None => true,
            Some(last) => ts.saturating_sub(last) > self.window_ns,
        };
        if !accepted {
            return None;
        }
        self.last_accepted = Some(ts);
        Some(event)
    }

    fn throttled(&mut self, event: GpioEvent) -> Option<GpioEvent> {
        let ts = event.timestamp_ns;
        let origin = *self.origin.get_or_insert(ts);
        let slot = |t: u64| t.saturating_sub(origin) / self.window_ns.max(1);
        let accepted = match self.last_accepted {
            None => true,
            Some(last) => slot(ts) > slot(last),
        };
        if !accepted {
            return None;
        }
        self.last_accepted = Some(ts);
        Some(event)
    }

    fn settle(&mut self, event: GpioEvent) -> Option<GpioEvent> {
        if self.strategy == DebounceStrategy::Stability {
            let previous = self.settled.insert(event.offset, event.edge);
            if previous == Some(event.edge) {
                return None;
            }
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u64 = 5_000_000;

    fn edge(edge: Edge, timestamp_ns: u64) -> GpioEvent {
        GpioEvent {
            edge,
            timestamp_ns,
            offset: 4,
            seqno: 0,
            line_seqno: 0,
        }
    }

    fn rising(timestamp_ns: u64) -> GpioEvent {
        edge(Edge::Rising, timestamp_ns)
    }

    fn accepted(filter: &mut DebounceFilter, stamps: &[u64]) -> Vec<u64> {
        let now = Instant::now();
        stamps
            .iter()
            .filter_map(|t| filter.offer(rising(*t), now))
            .map(|e| e.timestamp_ns)
            .collect()
    }

    #[test]
    fn test_first_and_third_accepted() {
        let mut filter = DebounceFilter::new(W);
        assert_eq!(accepted(&mut filter, &[0, 1, W + 1, W + 2]), vec![0, W + 1]);
    }

    #[test]
    fn test_far_event_accepted() {
        let mut filter = DebounceFilter::new(W);
        // W + 1 past the last accepted event
        assert_eq!(
            accepted(&mut filter, &[0, 1, W + 1, 2 * W + 2]),
            vec![0, W + 1, 2 * W + 2]
        );
    }

    #[test]
    fn test_exact_window_suppressed() {
        let mut filter = DebounceFilter::new(W);
        assert_eq!(accepted(&mut filter, &[100, 100 + W, 101 + W]), vec![100, 101 + W]);
    }

    #[test]
    fn test_reset_and_micros() {
        let mut filter = DebounceFilter::from_micros(DebounceStrategy::LeadingEdge, 5000);
        assert_eq!(filter.window_ns(), W);
        assert_eq!(accepted(&mut filter, &[10, 11]), vec![10]);
        filter.reset();
        assert_eq!(accepted(&mut filter, &[11]), vec![11]);
    }

    #[test]
    fn test_throttle_keeps_a_steady_rate() {
        let mut filter = DebounceFilter::with_strategy(DebounceStrategy::Throttled, W);
        let stamps = [0, W / 2, W + W / 5, 2 * W, 2 * W + 1, 3 * W];
        assert_eq!(accepted(&mut filter, &stamps), vec![0, W + W / 5, 2 * W, 3 * W]);

        // leading edge measures from the last delivery instead
        let mut filter = DebounceFilter::new(W);
        assert_eq!(accepted(&mut filter, &stamps), vec![0, W + W / 5, 3 * W]);
    }

    #[test]
    fn test_trailing_edge_waits_for_quiet() {
        let mut filter = DebounceFilter::with_strategy(DebounceStrategy::TrailingEdge, W);
        let start = Instant::now();
        assert!(filter.offer(rising(0), start).is_none());
        assert!(filter.offer(edge(Edge::Falling, 10), start).is_none());
        assert!(filter.offer(rising(20), start).is_none());
        assert_eq!(filter.deadline(), Some(start + Duration::from_nanos(W)));

        assert!(filter.flush(start + Duration::from_nanos(W - 1)).is_none());
        let out = filter.flush(start + Duration::from_nanos(W)).unwrap();
        assert_eq!(out.timestamp_ns, 20);
        assert!(filter.deadline().is_none());
        assert!(filter.flush(start + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_trailing_edge_new_burst_releases_held() {
        let mut filter = DebounceFilter::with_strategy(DebounceStrategy::TrailingEdge, W);
        let now = Instant::now();
        assert!(filter.offer(rising(0), now).is_none());
        assert!(filter.offer(rising(1), now).is_none());
        // events queued while the thread was busy still split into bursts
        assert_eq!(filter.offer(rising(W + 2), now).unwrap().timestamp_ns, 1);
        assert_eq!(
            filter.flush(now + Duration::from_nanos(W)).unwrap().timestamp_ns,
            W + 2
        );
    }

    #[test]
    fn test_stability_drops_glitches() {
        let mut filter = DebounceFilter::with_strategy(DebounceStrategy::Stability, W);
        let start = Instant::now();
        let later = |n: u64| start + Duration::from_nanos(n * W);

        filter.offer(rising(0), start);
        assert_eq!(filter.flush(later(1)).unwrap().edge, Edge::Rising);

        // a glitch that settles back on rising is not a change
        filter.offer(edge(Edge::Falling, 10 * W), later(2));
        filter.offer(rising(10 * W + 5), later(2));
        assert!(filter.flush(later(3)).is_none());

        filter.offer(edge(Edge::Falling, 20 * W), later(4));
        assert_eq!(filter.flush(later(5)).unwrap().edge, Edge::Falling);
    }

    #[test]
    fn test_stability_tracks_lines_separately() {
        let mut filter = DebounceFilter::with_strategy(DebounceStrategy::Stability, W);
        let start = Instant::now();
        filter.offer(rising(0), start);
        assert!(filter.flush(start + Duration::from_nanos(W)).is_some());

        let other = GpioEvent {
            offset: 5,
            ..rising(10 * W)
        };
        filter.offer(other, start);
        assert_eq!(filter.flush(start + Duration::from_nanos(W)).unwrap().offset, 5);
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!("trailing".parse(), Ok(DebounceStrategy::TrailingEdge));
        assert_eq!("Throttled".parse(), Ok(DebounceStrategy::Throttled));
        assert_eq!("stable".parse(), Ok(DebounceStrategy::Stability));
        assert_eq!("leading-edge".parse(), Ok(DebounceStrategy::LeadingEdge));
        assert!("bounce".parse::<DebounceStrategy>().is_err());
        assert!(DebounceStrategy::Stability.is_deferred());
        assert!(!DebounceStrategy::Throttled.is_deferred());
    }
}
