//! Single-worker command dispatcher
//!
//! The camera server handles one command at a time and answers strictly in
//! order, so all traffic goes through one worker task that owns the
//! connection. Callers hold a cheap, cloneable [`Dispatcher`] handle, queue
//! commands over an unbounded channel and await their own result on a
//! oneshot channel.
//!
//! Each queued command moves through `Queued -> Executing -> Completed` or
//! `Failed`. A failure is delivered to the caller that submitted the command
//! and the worker moves on to the next one. Transport faults also drop the
//! connection; the next command reconnects.
//!
//! Completion notices (Done, 2007) name the command they belong to. A notice
//! for another function number is held by the worker until an
//! [`await_result`](Dispatcher::await_result) for that number collects it,
//! or until that command is sent again. A notice for the current function
//! number that arrives before the command's Ack is left over from an earlier
//! run of the same command and is discarded.

use crate::error::{Result, SiError};
use crate::io::codec::{self, Incoming};
use crate::io::connection::Connector;
use crate::io::frame_reader::{FrameReader, DEFAULT_READ_TIMEOUT};
use crate::io::reconnect::{connect_with_retry, ReconnectConfig};
use crate::protocol::command::CommandPacket;
use crate::protocol::commands::CameraCommand;
use crate::protocol::data::{DataBody, DataPacket};
use crate::protocol::response::{ResultKind, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Camera id placed in every command header
    pub cam_id: u8,
    /// Bound on each socket read once a response has started
    pub read_timeout: Duration,
    /// Caller-side bound on waiting for a result (None = wait indefinitely)
    pub reply_timeout: Option<Duration>,
    /// Policy for (re)establishing the connection
    pub reconnect: ReconnectConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            cam_id: 0,
            read_timeout: DEFAULT_READ_TIMEOUT,
            reply_timeout: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[derive(Debug)]
enum Operation {
    /// Transmit a command and wait for its result
    Command {
        packet: CommandPacket,
        expected: ResultKind,
        no_ack: bool,
    },
    /// Wait for a deferred result without transmitting anything
    AwaitResult {
        func_number: u16,
        expected: ResultKind,
        limit: Option<Duration>,
    },
}

impl Operation {
    fn func_number(&self) -> u16 {
        match self {
            Operation::Command { packet, .. } => packet.func_number,
            Operation::AwaitResult { func_number, .. } => *func_number,
        }
    }
}

#[derive(Debug)]
struct CommandRecord {
    operation: Operation,
    reply: oneshot::Sender<Result<Response>>,
}

#[derive(Debug)]
enum Job {
    Run(CommandRecord),
    Shutdown,
}

/// Handle for submitting commands to the worker
///
/// # Examples
///
/// ```no_run
/// use si_camera_rust::io::{ConnectionConfig, Dispatcher, DispatcherConfig, TcpConnector};
/// use si_camera_rust::protocol::commands::GetStatusFromCamera;
///
/// # async fn example() -> si_camera_rust::Result<()> {
/// let connector = TcpConnector::new(ConnectionConfig::new("192.168.1.20:2055"));
/// let dispatcher = Dispatcher::spawn(connector, DispatcherConfig::default());
///
/// let status = dispatcher
///     .execute(&GetStatusFromCamera)
///     .await?
///     .into_camera_status()?;
/// println!("CCD temperature word: {}", status.ccd_temp());
///
/// dispatcher.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Job>,
    cam_id: u8,
    reply_timeout: Option<Duration>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Dispatcher {
    /// Start the worker task
    ///
    /// Must be called within a Tokio runtime. The connection is opened on the
    /// first command, not here.
    pub fn spawn<C: Connector>(connector: C, config: DispatcherConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            connector,
            reconnect: config.reconnect.clone(),
            read_timeout: config.read_timeout,
            conn: None,
            held: HashMap::new(),
        };
        let handle = tokio::spawn(worker.run(rx));

        debug!(cam_id = config.cam_id, "Dispatcher started");

        Dispatcher {
            tx,
            cam_id: config.cam_id,
            reply_timeout: config.reply_timeout,
            worker: Arc::new(Mutex::new(Some(handle))),
        }
    }

    pub fn cam_id(&self) -> u8 {
        self.cam_id
    }

    /// Execute a command and return its result
    ///
    /// Positive Acks are consumed; the result is the Data or Image that
    /// follows. A negative Ack fails with [`SiError::Rejected`].
    pub async fn execute<C: CameraCommand + ?Sized>(&self, command: &C) -> Result<Response> {
        let packet = command.packet(self.cam_id)?;
        self.submit(Operation::Command {
            packet,
            expected: command.expected(),
            no_ack: false,
        })
        .await
    }

    /// Execute a command and resolve as soon as it is acknowledged
    ///
    /// Resolves with `Response::Ack(true)`. The command's eventual result is
    /// left on the stream; collect it with [`await_result`](Self::await_result).
    pub async fn execute_no_ack<C: CameraCommand + ?Sized>(&self, command: &C) -> Result<Response> {
        let packet = command.packet(self.cam_id)?;
        self.submit(Operation::Command {
            packet,
            expected: command.expected(),
            no_ack: true,
        })
        .await
    }

    /// Wait for the next result packet without sending anything
    ///
    /// Used to collect the deferred result of a command previously submitted
    /// with [`execute_no_ack`](Self::execute_no_ack).
    pub async fn await_result(&self, func_number: u16, expected: ResultKind) -> Result<Response> {
        self.submit(Operation::AwaitResult {
            func_number,
            expected,
            limit: None,
        })
        .await
    }

    /// Like [`await_result`](Self::await_result), bounded on the worker
    ///
    /// Fails with [`SiError::Timeout`] if no packet starts arriving within
    /// `limit`. The connection is kept and the worker moves on.
    pub async fn await_result_within(
        &self,
        func_number: u16,
        expected: ResultKind,
        limit: Duration,
    ) -> Result<Response> {
        self.submit(Operation::AwaitResult {
            func_number,
            expected,
            limit: Some(limit),
        })
        .await
    }

    async fn submit(&self, operation: Operation) -> Result<Response> {
        let func_number = operation.func_number();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job::Run(CommandRecord { operation, reply }))
            .map_err(|_| SiError::DispatcherClosed)?;

        match self.reply_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(result) => result.map_err(|_| SiError::DispatcherClosed)?,
                Err(_) => {
                    warn!(func_number = func_number, "No reply within {:?}", limit);
                    Err(SiError::Timeout(format!(
                        "no reply to function {} within {:?}",
                        func_number, limit
                    )))
                }
            },
            None => rx.await.map_err(|_| SiError::DispatcherClosed)?,
        }
    }

    /// Stop the worker after the commands already queued have completed
    ///
    /// Commands submitted after this call fail with
    /// [`SiError::DispatcherClosed`].
    pub async fn shutdown(&self) {
        if self.tx.send(Job::Shutdown).is_err() {
            debug!("Dispatcher already stopped");
        }

        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Dispatcher worker ended abnormally");
            }
        }
    }
}

struct Worker<C: Connector> {
    connector: C,
    reconnect: ReconnectConfig,
    read_timeout: Duration,
    conn: Option<FrameReader<C::Stream>>,
    /// Completion notices that arrived while another command was waiting
    held: HashMap<u16, DataPacket>,
}

impl<C: Connector> Worker<C> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = rx.recv().await {
            let CommandRecord { operation, reply } = match job {
                Job::Run(record) => record,
                Job::Shutdown => {
                    rx.close();
                    while let Some(job) = rx.recv().await {
                        if let Job::Run(record) = job {
                            let _ = record.reply.send(Err(SiError::DispatcherClosed));
                        }
                    }
                    break;
                }
            };

            let func_number = operation.func_number();
            let result = self.exchange(operation).await;

            if let Err(e) = &result {
                if e.is_connection_fault() && self.conn.take().is_some() {
                    warn!(func_number = func_number, error = %e, "Dropping camera connection");
                    self.held.clear();
                }
            }

            if reply.send(result).is_err() {
                debug!(func_number = func_number, "Caller no longer waiting for result");
            }
        }

        if self.conn.take().is_some() {
            info!("Camera connection closed");
        }
        debug!("Dispatcher worker stopped");
    }

    async fn exchange(&mut self, operation: Operation) -> Result<Response> {
        if let Operation::AwaitResult { func_number, .. } = &operation {
            if let Some(packet) = self.held.remove(func_number) {
                debug!(func_number = *func_number, "Result was already received");
                return Ok(Response::from_data(packet));
            }
        }

        let reader = match self.conn.take() {
            Some(reader) => reader,
            None => {
                let stream = connect_with_retry(&self.connector, &self.reconnect).await?;
                FrameReader::with_read_timeout(stream, self.read_timeout)
            }
        };
        let reader = self.conn.insert(reader);

        match operation {
            Operation::Command {
                packet,
                expected,
                no_ack,
            } => {
                if self.held.remove(&packet.func_number).is_some() {
                    debug!(
                        func_number = packet.func_number,
                        "Discarding unclaimed result of an earlier run"
                    );
                }
                codec::send_command(reader.get_mut(), &packet).await?;
                let pending = Pending {
                    func_number: packet.func_number,
                    expected,
                    no_ack,
                    acked: false,
                    deadline: None,
                };
                await_response(reader, &mut self.held, pending).await
            }
            Operation::AwaitResult {
                func_number,
                expected,
                limit,
            } => {
                let pending = Pending {
                    func_number,
                    expected,
                    no_ack: false,
                    acked: true,
                    deadline: limit.map(|limit| Instant::now() + limit),
                };
                await_response(reader, &mut self.held, pending).await
            }
        }
    }
}

/// What the worker is waiting for on the stream
struct Pending {
    func_number: u16,
    expected: ResultKind,
    no_ack: bool,
    acked: bool,
    deadline: Option<Instant>,
}

async fn await_response<R>(
    reader: &mut FrameReader<R>,
    held: &mut HashMap<u16, DataPacket>,
    mut pending: Pending,
) -> Result<Response>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let func_number = pending.func_number;
    let expected = pending.expected;

    loop {
        match pending.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, reader.wait_readable())
                .await
                .map_err(|_| {
                    SiError::Timeout(format!("no result for function {}", func_number))
                })??,
            None => reader.wait_readable().await?,
        }

        match codec::read_packet(reader).await? {
            Incoming::Ack(ack) if !ack.accept => {
                warn!(func_number = func_number, "Command rejected by camera");
                return Err(SiError::Rejected { func_number });
            }
            Incoming::Ack(_) if pending.no_ack => return Ok(Response::Ack(true)),
            Incoming::Ack(_) => {
                pending.acked = true;
                debug!(func_number = func_number, "Command accepted, awaiting result");
            }
            Incoming::Data(packet) => {
                let done_for = match &packet.body {
                    DataBody::Done(done) => Some(done.func_number),
                    _ => None,
                };
                if let Some(done_for) = done_for {
                    if done_for != func_number {
                        warn!(
                            func_number = func_number,
                            done_for = done_for,
                            "Holding completion notice of another command"
                        );
                        held.insert(done_for, packet);
                        continue;
                    }
                    if !pending.acked {
                        warn!(
                            func_number = func_number,
                            "Discarding completion notice that precedes the Ack"
                        );
                        continue;
                    }
                }
                if expected != ResultKind::Data(packet.data_type()) {
                    warn!(
                        func_number = func_number,
                        expected = ?expected,
                        data_type = ?packet.data_type(),
                        "Result type differs from the expected one"
                    );
                }
                return Ok(Response::from_data(packet));
            }
            Incoming::ImageFragment(head, payload) => {
                if expected != ResultKind::Image {
                    warn!(func_number = func_number, expected = ?expected, "Unexpected image transfer");
                }
                let image = codec::read_image(reader, head, payload).await?;
                return Ok(Response::Image(image));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::commands::{
        Acquire, GetImageHeader, InquireAcquisitionStatus, ResetCamera, SetCooler,
        TerminateAcquisition,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    /// Hands the device end of every new connection to the test
    struct DuplexConnector {
        peers: mpsc::UnboundedSender<DuplexStream>,
        connects: Arc<AtomicUsize>,
    }

    impl Connector for DuplexConnector {
        type Stream = DuplexStream;

        async fn connect(&self) -> Result<DuplexStream> {
            let (client, device) = tokio::io::duplex(4096);
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.peers
                .send(device)
                .map_err(|_| SiError::Io(std::io::ErrorKind::ConnectionRefused.into()))?;
            Ok(client)
        }
    }

    fn setup(
        config: DispatcherConfig,
    ) -> (
        Dispatcher,
        mpsc::UnboundedReceiver<DuplexStream>,
        Arc<AtomicUsize>,
    ) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connects = Arc::new(AtomicUsize::new(0));
        let connector = DuplexConnector {
            peers,
            connects: connects.clone(),
        };
        (Dispatcher::spawn(connector, config), rx, connects)
    }

    async fn read_command(device: &mut DuplexStream) -> (u16, Vec<u8>) {
        let mut header = [0u8; 6];
        device.read_exact(&mut header).await.unwrap();
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let mut body = vec![0u8; length - 6];
        device.read_exact(&mut body).await.unwrap();
        (u16::from_be_bytes([body[0], body[1]]), body[2..].to_vec())
    }

    fn ack(accept: bool) -> Vec<u8> {
        vec![0, 0, 0, 8, 129, 0, 0, accept as u8]
    }

    fn data(data_type: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((16 + payload.len()) as u32).to_be_bytes());
        buf.extend_from_slice(&[131, 0, 0, 0, 0, 0]);
        buf.extend_from_slice(&data_type.to_be_bytes());
        buf.extend_from_slice(&(payload.len() as i32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[tokio::test]
    async fn test_ack_then_done() {
        let (dispatcher, mut peers, _) = setup(DispatcherConfig::default());

        let device = tokio::spawn(async move {
            let mut device = peers.recv().await.unwrap();
            let (func, params) = read_command(&mut device).await;
            assert_eq!(func, 1046);
            assert_eq!(params, vec![1]);
            device.write_all(&ack(true)).await.unwrap();
            device.write_all(&data(2007, &1046u16.to_be_bytes())).await.unwrap();
            device
        });

        let done = dispatcher
            .execute(&SetCooler { on: true })
            .await
            .unwrap()
            .into_done()
            .unwrap();
        assert_eq!(done.func_number, 1046);
        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_image_header_unwrapped() {
        let (dispatcher, mut peers, _) = setup(DispatcherConfig::default());

        let device = tokio::spawn(async move {
            let mut device = peers.recv().await.unwrap();
            read_command(&mut device).await;
            device.write_all(&ack(true)).await.unwrap();
            device.write_all(&data(2006, b"SIMPLE = T\0")).await.unwrap();
            device
        });

        let response = dispatcher.execute(&GetImageHeader { buffer: 1 }).await.unwrap();
        assert_eq!(response, Response::Header("SIMPLE = T".to_string()));
        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_ack_then_await_result() {
        let (dispatcher, mut peers, _) = setup(DispatcherConfig::default());

        let device = tokio::spawn(async move {
            let mut device = peers.recv().await.unwrap();
            let (func, _) = read_command(&mut device).await;
            assert_eq!(func, 1037);
            device.write_all(&ack(true)).await.unwrap();
            device.write_all(&data(2007, &1037u16.to_be_bytes())).await.unwrap();
            device
        });

        let response = dispatcher.execute_no_ack(&Acquire).await.unwrap();
        assert_eq!(response, Response::Ack(true));

        let done = dispatcher
            .await_result(1037, ResultKind::DONE)
            .await
            .unwrap()
            .into_done()
            .unwrap();
        assert_eq!(done.func_number, 1037);
        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_done_of_other_command_is_held() {
        let (dispatcher, mut peers, _) = setup(DispatcherConfig::default());

        let device = tokio::spawn(async move {
            let mut device = peers.recv().await.unwrap();
            let (func, _) = read_command(&mut device).await;
            assert_eq!(func, 1037);
            device.write_all(&ack(true)).await.unwrap();

            // Acquire completes before the status poll is answered
            let (func, _) = read_command(&mut device).await;
            assert_eq!(func, 1017);
            device.write_all(&data(2007, &1037u16.to_be_bytes())).await.unwrap();
            device.write_all(&ack(true)).await.unwrap();
            device
                .write_all(&data(2004, &[0, 100, 0, 100, 0, 0, 0, 0]))
                .await
                .unwrap();
            device
        });

        dispatcher.execute_no_ack(&Acquire).await.unwrap();

        let status = dispatcher
            .execute(&InquireAcquisitionStatus)
            .await
            .unwrap()
            .into_acquisition_status()
            .unwrap();
        assert!(status.is_exposure_done());

        let done = dispatcher
            .await_result(1037, ResultKind::DONE)
            .await
            .unwrap()
            .into_done()
            .unwrap();
        assert_eq!(done.func_number, 1037);
        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_done_before_ack_is_discarded() {
        let (dispatcher, mut peers, _) = setup(DispatcherConfig::default());

        let device = tokio::spawn(async move {
            let mut device = peers.recv().await.unwrap();
            read_command(&mut device).await;
            // Left over from an earlier cooler command
            device.write_all(&data(2007, &1046u16.to_be_bytes())).await.unwrap();
            device.write_all(&ack(true)).await.unwrap();
            device.write_all(&data(2007, &1046u16.to_be_bytes())).await.unwrap();

            read_command(&mut device).await;
            device.write_all(&ack(true)).await.unwrap();
            device.write_all(&data(2007, &1063u16.to_be_bytes())).await.unwrap();
            device
        });

        let first = dispatcher.execute(&SetCooler { on: false }).await.unwrap();
        assert_eq!(first.into_done().unwrap().func_number, 1046);

        // The stream is still in step for the next command
        let second = dispatcher.execute(&ResetCamera).await.unwrap();
        assert_eq!(second.into_done().unwrap().func_number, 1063);
        device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resent_command_drops_held_result() {
        let (dispatcher, mut peers, _) = setup(DispatcherConfig::default());

        let device = tokio::spawn(async move {
            let mut device = peers.recv().await.unwrap();
            read_command(&mut device).await;
            device.write_all(&ack(true)).await.unwrap();
            device.write_all(&data(2007, &1037u16.to_be_bytes())).await.unwrap();

            read_command(&mut device).await;
            device.write_all(&ack(true)).await.unwrap();
            device.write_all(&data(2007, &1046u16.to_be_bytes())).await.unwrap();

            // Second acquisition never completes
            read_command(&mut device).await;
            device.write_all(&ack(true)).await.unwrap();
            device
        });

        // The first acquisition's notice is picked up while the cooler
        // command waits, then never collected
        dispatcher.execute_no_ack(&Acquire).await.unwrap();
        dispatcher.execute(&SetCooler { on: true }).await.unwrap();
        dispatcher.execute_no_ack(&Acquire).await.unwrap();

        let pending = dispatcher
            .await_result_within(1037, ResultKind::DONE, Duration::from_secs(5))
            .await;
        assert!(matches!(pending, Err(SiError::Timeout(_))));
        device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_await_keeps_connection() {
        let (dispatcher, mut peers, connects) = setup(DispatcherConfig::default());

        let device = tokio::spawn(async move {
            let mut device = peers.recv().await.unwrap();
            read_command(&mut device).await;
            device.write_all(&ack(true)).await.unwrap();

            read_command(&mut device).await;
            device.write_all(&ack(true)).await.unwrap();
            device.write_all(&data(2007, &1046u16.to_be_bytes())).await.unwrap();
            device
        });

        dispatcher.execute_no_ack(&TerminateAcquisition).await.unwrap();
        let result = dispatcher
            .await_result_within(1018, ResultKind::DONE, Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(SiError::Timeout(_))));

        let done = dispatcher.execute(&SetCooler { on: true }).await.unwrap();
        assert_eq!(done.into_done().unwrap().func_number, 1046);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_fault_reconnects() {
        let (dispatcher, mut peers, connects) = setup(DispatcherConfig::default());

        let device = tokio::spawn(async move {
            // First connection closes right after reading the command
            let mut first = peers.recv().await.unwrap();
            read_command(&mut first).await;
            drop(first);

            let mut second = peers.recv().await.unwrap();
            read_command(&mut second).await;
            second.write_all(&ack(true)).await.unwrap();
            second.write_all(&data(2007, &1063u16.to_be_bytes())).await.unwrap();
            second
        });

        let first = dispatcher.execute(&ResetCamera).await;
        assert!(matches!(first, Err(SiError::ConnectionClosed { .. })));

        let second = dispatcher
            .execute(&ResetCamera)
            .await
            .unwrap();
        assert_eq!(second.into_done().unwrap().func_number, 1063);
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_timeout() {
        let (dispatcher, mut peers, _) = setup(DispatcherConfig {
            reply_timeout: Some(Duration::from_secs(2)),
            ..Default::default()
        });

        let _device = tokio::spawn(async move {
            let mut device = peers.recv().await.unwrap();
            read_command(&mut device).await;
            // Never answer
            tokio::time::sleep(Duration::from_secs(3600)).await;
            device
        });

        let result = dispatcher.execute(&Acquire).await;
        assert!(matches!(result, Err(SiError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_commands_after_shutdown_fail() {
        let (dispatcher, _peers, _) = setup(DispatcherConfig::default());
        let other = dispatcher.clone();

        dispatcher.shutdown().await;
        let result = other.execute(&Acquire).await;
        assert!(matches!(result, Err(SiError::DispatcherClosed)));
    }
}
