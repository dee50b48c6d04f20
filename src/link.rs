//! Networked bus: a TCP hub relaying newline-delimited JSON frames between
//! processes, and the client side that lets a synchronous node loop use it
//! as a [`Transport`].

use crate::bus::{BusFrame, Transport, TransportError};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_BUS_HOST: &str = "127.0.0.1";
pub const DEFAULT_BUS_PORT: u16 = 9000;

const HUB_BROADCAST_BUFFER_SIZE: usize = 1024;
const LINK_QUEUE_DEPTH: usize = 256;

/// Parse a relayed line, rejecting frames whose length has no DLC.
fn parse_frame(line: &str) -> Option<BusFrame> {
    match serde_json::from_str::<BusFrame>(line) {
        Ok(frame) => match BusFrame::new(frame.id, &frame.data) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("Dropping relayed frame: {}", e);
                None
            }
        },
        Err(e) => {
            warn!("Dropping malformed line: {}", e);
            None
        }
    }
}

/// Broadcast hub. Every line a client sends goes to every other client.
#[derive(Debug)]
pub struct BusHub {
    listener: TcpListener,
    relay: broadcast::Sender<(u64, String)>,
    next_client: Arc<AtomicU64>,
}

impl BusHub {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (relay, _) = broadcast::channel(HUB_BROADCAST_BUFFER_SIZE);

        Ok(Self {
            listener,
            relay,
            next_client: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until the task is dropped.
    pub async fn run(self) -> io::Result<()> {
        info!("Bus hub listening on {}", self.listener.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let client_id = self.next_client.fetch_add(1, Ordering::Relaxed);
                    info!("Node {} connected from {}", client_id, addr);

                    let relay = self.relay.clone();
                    let relay_rx = self.relay.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) = handle_node(stream, client_id, relay, relay_rx).await {
                            warn!("Node {} error: {}", client_id, e);
                        }
                        info!("Node {} disconnected", client_id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_node(
    stream: TcpStream,
    client_id: u64,
    relay: broadcast::Sender<(u64, String)>,
    mut relay_rx: broadcast::Receiver<(u64, String)>,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);

    let forward_task = tokio::spawn(async move {
        loop {
            match relay_rx.recv().await {
                Ok((from, line)) => {
                    if from == client_id {
                        continue;
                    }
                    if writer.write_all(line.as_bytes()).await.is_err() || writer.write_all(b"\n").await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Node {} lagged, {} frames lost", client_id, missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut line = String::new();
    loop {
        line.clear();
        if buf_reader.read_line(&mut line).await? == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || parse_frame(trimmed).is_none() {
            continue;
        }
        // No receivers only means no other node is attached yet
        let _ = relay.send((client_id, trimmed.to_string()));
    }

    forward_task.abort();
    Ok(())
}

/// Background tasks owned by a [`LinkTransport`]'s connection.
#[derive(Debug)]
pub struct LinkTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl LinkTasks {
    pub fn abort(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

pub struct BusLink;

impl BusLink {
    /// Connect to a hub. The returned transport never blocks; the socket is
    /// serviced by the returned tasks on the tokio runtime.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<(LinkTransport, LinkTasks)> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, mut writer) = stream.into_split();

        let (inbound_tx, inbound_rx) = mpsc::channel::<BusFrame>(LINK_QUEUE_DEPTH);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<BusFrame>(LINK_QUEUE_DEPTH);

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(frame) = parse_frame(line.trim()) {
                            if inbound_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Bus link read error: {}", e);
                        break;
                    }
                }
            }
            debug!("Bus link reader stopped");
        });

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let line = match serde_json::to_string(&frame) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Failed to encode frame: {}", e);
                        continue;
                    }
                };
                if writer.write_all(line.as_bytes()).await.is_err() || writer.write_all(b"\n").await.is_err() {
                    break;
                }
            }
            debug!("Bus link writer stopped");
        });

        let transport = LinkTransport {
            outbound: outbound_tx,
            inbound: inbound_rx,
            pending: VecDeque::new(),
            closed: false,
        };

        Ok((transport, LinkTasks { reader, writer }))
    }
}

#[derive(Debug)]
pub struct LinkTransport {
    outbound: mpsc::Sender<BusFrame>,
    inbound: mpsc::Receiver<BusFrame>,
    pending: VecDeque<BusFrame>,
    closed: bool,
}

impl LinkTransport {
    pub fn is_closed(&self) -> bool {
        self.closed && self.pending.is_empty()
    }
}

impl Transport for LinkTransport {
    fn send(&mut self, id: u32, payload: &[u8]) -> Result<(), TransportError> {
        let frame = BusFrame::new(id, payload)?;
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::TxQueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::Disconnected,
        })
    }

    fn poll_available(&mut self) -> usize {
        loop {
            match self.inbound.try_recv() {
                Ok(frame) => self.pending.push_back(frame),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        self.pending.len()
    }

    fn receive(&mut self) -> nb::Result<BusFrame, TransportError> {
        if self.pending.is_empty() {
            self.poll_available();
        }

        match self.pending.pop_front() {
            Some(frame) => Ok(frame),
            None if self.closed => Err(nb::Error::Other(TransportError::Disconnected)),
            None => Err(nb::Error::WouldBlock),
        }
    }
}
