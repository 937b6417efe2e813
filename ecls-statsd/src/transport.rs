use std::io;
use std::net::{Ipv4Addr, UdpSocket};
#[cfg(unix)]
use std::os::unix::net::UnixDatagram;
use std::panic::RefUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use cadence::MetricSink;

/// An error returned when the statsd transport cannot be opened.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The address uses a scheme other than `udp` or `unixgram`.
    #[error("invalid scheme '{0}', expected one of 'udp', 'unixgram'")]
    UnsupportedScheme(String),
    /// Binding or connecting the socket failed.
    #[error("failed to connect to statsd at {addr}")]
    Connect {
        /// The configured address.
        addr: String,
        /// The socket error.
        #[source]
        source: io::Error,
    },
}

enum Remote {
    Udp(UdpSocket),
    #[cfg(unix)]
    UnixDatagram(UnixDatagram),
}

impl Remote {
    fn connect(addr: &str) -> Result<Self, TransportError> {
        let connect_error = |source| TransportError::Connect {
            addr: addr.to_owned(),
            source,
        };

        // Try treating the address as a fully-qualified URL, where the scheme is the transport identifier.
        if let Some((scheme, path)) = addr.split_once("://") {
            return match scheme {
                "udp" => Self::connect_udp(path).map_err(connect_error),
                #[cfg(unix)]
                "unixgram" => {
                    let connect = || -> io::Result<_> {
                        let socket = UnixDatagram::unbound()?;
                        socket.connect(path)?;
                        socket.set_nonblocking(true)?;
                        Ok(Self::UnixDatagram(socket))
                    };
                    connect().map_err(connect_error)
                }
                _ => Err(TransportError::UnsupportedScheme(scheme.to_owned())),
            };
        }

        // If there is no scheme, fall back to a UDP socket
        Self::connect_udp(addr).map_err(connect_error)
    }

    fn connect_udp(addr: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(addr)?;
        socket.set_nonblocking(true)?;

        Ok(Self::Udp(socket))
    }

    fn send(&self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Udp(socket) => socket.send(buf).map(drop),
            #[cfg(unix)]
            Self::UnixDatagram(socket) => socket.send(buf).map(drop),
        }
    }
}

struct Buffer {
    data: Vec<u8>,
    capacity: usize,
}

/// A [`MetricSink`] that packs metric lines into datagrams.
///
/// Lines are joined with `\n` until the next line would exceed the maximum datagram size. The
/// pending datagram is sent when it is full and on [`flush`](MetricSink::flush). A single line
/// larger than the datagram size is sent on its own.
///
/// Supported addresses are `host:port` and `udp://host:port` for UDP, and `unixgram:///path` for
/// Unix datagram sockets.
pub struct DatagramSink {
    remote: Remote,
    buffer: Mutex<Buffer>,
}

impl DatagramSink {
    /// Opens the socket for the given address.
    pub fn connect(addr: &str, max_datagram_size: usize) -> Result<Self, TransportError> {
        Ok(Self {
            remote: Remote::connect(addr)?,
            buffer: Mutex::new(Buffer {
                data: Vec::with_capacity(max_datagram_size),
                capacity: max_datagram_size,
            }),
        })
    }
}

impl MetricSink for DatagramSink {
    fn emit(&self, metric: &str) -> io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let metric_len = metric.len();

        if !buffer.data.is_empty() && buffer.data.len() + 1 + metric_len > buffer.capacity {
            // Message bigger than space left in buffer. Flush the buffer.
            let result = self.remote.send(&buffer.data);
            buffer.data.clear();
            result?;
        }

        if metric_len > buffer.capacity {
            // Message too big for the entire buffer, send it on its own.
            self.remote.send(metric.as_bytes())?;
            return Ok(metric_len);
        }

        if !buffer.data.is_empty() {
            buffer.data.push(b'\n');
        }
        buffer.data.extend_from_slice(metric.as_bytes());

        Ok(metric_len)
    }

    fn flush(&self) -> io::Result<()> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        if buffer.data.is_empty() {
            return Ok(());
        }

        let result = self.remote.send(&buffer.data);
        buffer.data.clear();
        result
    }
}

/// A shared handle to the metric sink all namespace sinks write to.
///
/// Cloning the transport shares the underlying socket and datagram buffer.
#[derive(Clone)]
pub struct MetricsTransport(Arc<dyn MetricSink + Send + Sync + RefUnwindSafe>);

impl MetricsTransport {
    /// Wraps a cadence metric sink.
    pub fn new<T>(sink: T) -> Self
    where
        T: MetricSink + Send + Sync + RefUnwindSafe + 'static,
    {
        Self(Arc::new(sink))
    }

    /// Connects a [`DatagramSink`] to the given address.
    pub fn connect(addr: &str, max_datagram_size: usize) -> Result<Self, TransportError> {
        let sink = DatagramSink::connect(addr, max_datagram_size)?;
        ecls_log::info!("reporting metrics to statsd at {addr}");
        Ok(Self::new(sink))
    }
}

impl MetricSink for MetricsTransport {
    fn emit(&self, metric: &str) -> io::Result<usize> {
        self.0.emit(metric)
    }

    fn flush(&self) -> io::Result<()> {
        self.0.flush()
    }
}

impl std::fmt::Debug for MetricsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MetricsTransport").finish()
    }
}

/// Creates a transport that captures every emitted metric line.
///
/// Each received item is one metric line. Lines are not joined into datagrams.
#[cfg(feature = "test")]
pub fn capturing_transport() -> (crossbeam_channel::Receiver<Vec<u8>>, MetricsTransport) {
    let (rx, sink) = cadence::SpyMetricSink::new();
    (rx, MetricsTransport::new(sink))
}
