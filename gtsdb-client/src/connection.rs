//! GTSDB connection management
//!
//! A [`Connection`] owns the write half of the stream and a background read
//! loop that feeds every inbound line to the [`ResponseRouter`].
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Closing -> Disconnected
//! ```

use crate::error::{ClientError, ClientResult};
use crate::router::ResponseRouter;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Resources that exist only while connected
struct Live {
    addr: String,
    writer: BoxedWriter,
    read_task: JoinHandle<()>,
    router: Arc<ResponseRouter>,
}

/// A single stream to a GTSDB server
pub struct Connection {
    status: Arc<Mutex<ConnectionState>>,
    live: Mutex<Option<Live>>,
}

impl Connection {
    /// Create a disconnected connection
    pub fn new() -> Self {
        Self {
            status: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            live: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.status.lock().await
    }

    /// Address of the current stream, if connected
    pub async fn addr(&self) -> Option<String> {
        self.live.lock().await.as_ref().map(|live| live.addr.clone())
    }

    /// Open a TCP stream to `host:port` and start the read loop
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        connect_timeout: Duration,
        router: Arc<ResponseRouter>,
    ) -> ClientResult<()> {
        let addr = format!("{host}:{port}");
        self.begin_connect(&addr).await?;

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ClientError::connection_failed(&addr, "connection timeout"))
            .and_then(|result| {
                result.map_err(|e| ClientError::connection_failed(&addr, e.to_string()))
            });

        match stream {
            Ok(stream) => {
                self.attach(addr, stream, router).await;
                Ok(())
            }
            Err(e) => {
                *self.status.lock().await = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Attach an already-established stream and start the read loop
    pub async fn connect_stream<S>(
        &self,
        label: impl Into<String>,
        stream: S,
        router: Arc<ResponseRouter>,
    ) -> ClientResult<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let addr = label.into();
        self.begin_connect(&addr).await?;
        self.attach(addr, stream, router).await;
        Ok(())
    }

    async fn begin_connect(&self, addr: &str) -> ClientResult<()> {
        let mut status = self.status.lock().await;
        if *status != ConnectionState::Disconnected {
            return Err(ClientError::connection_failed(addr, "already connected"));
        }
        *status = ConnectionState::Connecting;
        Ok(())
    }

    async fn attach<S>(&self, addr: String, stream: S, router: Arc<ResponseRouter>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);

        // Publish Connected before the read loop can see EOF
        let mut live = self.live.lock().await;
        *self.status.lock().await = ConnectionState::Connected;

        let read_task = tokio::spawn(run_read_loop(
            BufReader::new(reader),
            router.clone(),
            self.status.clone(),
        ));

        *live = Some(Live {
            addr: addr.clone(),
            writer: Box::new(writer),
            read_task,
            router,
        });

        info!("Connected to {}", addr);
    }

    /// Write a complete protocol message
    pub async fn write(&self, data: &str) -> ClientResult<()> {
        if self.state().await != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }

        let mut live = self.live.lock().await;
        let live = live.as_mut().ok_or(ClientError::NotConnected)?;

        live.writer.write_all(data.as_bytes()).await?;
        live.writer.flush().await?;
        Ok(())
    }

    /// Shut the stream down. Closing a closed connection is a no-op.
    pub async fn close(&self) -> ClientResult<()> {
        let Some(mut live) = self.live.lock().await.take() else {
            *self.status.lock().await = ConnectionState::Disconnected;
            return Ok(());
        };

        *self.status.lock().await = ConnectionState::Closing;

        // Best effort: the peer may already be gone
        if let Err(e) = live.writer.shutdown().await {
            debug!("Shutdown of {} reported: {}", live.addr, e);
        }
        live.read_task.abort();
        live.router.fail_pending(ClientError::ConnectionClosed).await;

        *self.status.lock().await = ConnectionState::Disconnected;
        info!("Closed connection to {}", live.addr);
        Ok(())
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(live) = self.live.get_mut().take() {
            live.read_task.abort();
        }
    }
}

/// Read the next newline-terminated line, without its terminator
pub async fn read_line<R>(reader: &mut R) -> ClientResult<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;

    if n == 0 {
        return Err(ClientError::ConnectionClosed);
    }

    let len = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(len);
    Ok(line)
}

async fn run_read_loop<R>(
    mut reader: R,
    router: Arc<ResponseRouter>,
    status: Arc<Mutex<ConnectionState>>,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_line(&mut reader).await {
            Ok(line) => {
                let outcome = router.route_line(line).await;
                debug!("Routed inbound line: {:?}", outcome);
            }
            Err(e) => {
                match &e {
                    ClientError::ConnectionClosed => info!("Server closed the connection"),
                    other => warn!("Read loop failed: {}", other),
                }

                // Mark the stream dead before failing the query so that no new
                // request can slip in behind it.
                {
                    let mut status = status.lock().await;
                    if *status == ConnectionState::Connected {
                        *status = ConnectionState::Disconnected;
                    }
                }
                router.fail_pending(e).await;
                break;
            }
        }
    }
}
