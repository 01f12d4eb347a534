//! GPIO port contract and edge events

use crate::config::GpioPortConfig;
use crate::device::Device;

use std::fmt;
use std::sync::Arc;

/// Direction of a level change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Rising,
    Falling,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Rising => f.write_str("rising"),
            Edge::Falling => f.write_str("falling"),
        }
    }
}

/// An edge reported on one line of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioEvent {
    pub edge: Edge,
    /// Kernel timestamp in nanoseconds (monotonic clock unless configured otherwise)
    pub timestamp_ns: u64,
    /// Line offset on the chip
    pub offset: u32,
    /// Sequence number across the whole port
    pub seqno: u32,
    /// Sequence number for this line
    pub line_seqno: u32,
}

/// Callback invoked on the port's event thread
pub type GpioListener = Arc<dyn Fn(&GpioEvent) + Send + Sync>;

/// Handle returned by [`GpioPort::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// A group of lines read and written as one bit-packed value
///
/// Bit *i* of a value corresponds to `config().pins[i]`.
pub trait GpioPort: Device<Config = GpioPortConfig> {
    /// Current level of every line
    fn read(&self) -> Result<u64, Self::Error>;

    /// Drive every line
    fn write(&self, value: u64) -> Result<(), Self::Error>;

    /// Register an edge listener
    ///
    /// Listeners run sequentially on a background thread, in the order edges
    /// arrive. The thread starts with the first listener.
    fn add_listener(&self, listener: GpioListener) -> Result<ListenerId, Self::Error>;

    /// Unregister a listener, returning whether it was registered
    ///
    /// Once this returns, the listener is not invoked again. Removing the
    /// last listener stops the background thread.
    fn remove_listener(&self, id: ListenerId) -> Result<bool, Self::Error>;
}
