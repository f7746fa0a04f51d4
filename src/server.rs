use crate::{
    auth::{Authenticator, CredentialStore},
    commands::encode_reply,
    protocol::ReplyCode,
    relay::RelayLink,
    session::{Action, Session},
};
use anyhow::{Context, Result, anyhow, bail};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{self, AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time,
};
use tracing::{debug, error, info, warn};

/// Size of the buffer used to read handshake bytes
const READ_BUF_SIZE: usize = 4096;

/// Pause after a failed accept, e.g. while out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Socks5Server represents a SOCKS5 server and houses related
/// configuration data
pub struct Socks5Server {
    pub listen_addr: String,
    authenticator: Arc<dyn Authenticator>,
    listener: Option<TcpListener>,
}

/// Socks5Server implementation block
impl Socks5Server {
    /// new is a constructor for the Socks5Server type. Until an
    /// authenticator is supplied every login is refused.
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            authenticator: Arc::new(CredentialStore::new()),
            listener: None,
        }
    }

    /// with_authenticator sets the credential lookup shared by every session
    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Arc::new(authenticator);
        self
    }

    /// bind to the listen address; may only be called once
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if self.listener.is_some() {
            bail!("[ERR] listener already bound");
        }

        // Instantiate tokio listener
        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .with_context(|| format!("[ERR] failed to bind {}", self.listen_addr))?;
        let addr = listener.local_addr()?;

        // DEBUG
        info!("SOCKS5 proxy listening on {:?}", addr);

        self.listener = Some(listener);
        Ok(addr)
    }

    /// local_addr returns the bound address, if bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// run handles server spinup and listens for incoming connections
    pub async fn run(mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow!("[ERR] listener not bound"))?;

        serve(listener, Arc::clone(&self.authenticator)).await;
        Ok(())
    }
}

/// Accept is a source of inbound client connections
trait Accept {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Accept for TcpListener {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// serve accepts clients forever, spawning a task per connection. A failed
/// accept is logged and retried after ACCEPT_BACKOFF.
async fn serve<A: Accept>(listener: A, authenticator: Arc<dyn Authenticator>) {
    // Listen for connections to proxy
    loop {
        // Accept incoming connection
        let (inbound, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("accept failed: {e}");
                time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        // Clone for this connection
        let authenticator = Arc::clone(&authenticator);

        // Spawn async task
        tokio::spawn(async move {
            // DEBUG
            info!("new client: {}", peer_addr);

            // Send connection to connection handler
            if let Err(e) = handle_connection(inbound, authenticator).await {
                error!("connection error ({peer_addr}): {e:#}");
            }
        });
    }
}

/// Stage is what a client connection is currently doing
enum Stage {
    Handshake(TcpStream, Session),
    Relay(RelayLink<TcpStream, TcpStream>),
    Closed,
}

/// handle_connection drives one client connection from greeting to relay
async fn handle_connection(
    stream: TcpStream,
    authenticator: Arc<dyn Authenticator>,
) -> Result<()> {
    let mut stage = Stage::Handshake(stream, Session::new(authenticator));

    loop {
        stage = match stage {
            Stage::Handshake(client, session) => handshake(client, session).await?,
            Stage::Relay(link) => {
                link.run().await;
                Stage::Closed
            }
            Stage::Closed => return Ok(()),
        };
    }
}

/// handshake reads client bytes into the session and carries out its
/// actions until the relay is installed or the client is gone
async fn handshake(mut client: TcpStream, mut session: Session) -> Result<Stage> {
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        let n = client.read(&mut buf).await?;
        if n == 0 {
            debug!("client closed during handshake ({:?})", session.phase());
            return Ok(Stage::Closed);
        }

        for action in session.feed(&buf[..n]) {
            match action {
                Action::Reply(bytes) => client.write_all(&bytes).await?,
                Action::Close => {
                    let _ = client.shutdown().await;
                    return Ok(Stage::Closed);
                }
                Action::Connect(destination) => {
                    info!("connecting to {destination}");

                    match destination.connect().await {
                        Ok(target) => {
                            client.write_all(&encode_reply(ReplyCode::Succeeded)).await?;
                            let early_data = session.establish();
                            return Ok(Stage::Relay(RelayLink::new(client, target, early_data)));
                        }
                        Err(e) => {
                            warn!("connect to {destination} failed: {e}");
                            client.write_all(&session.outbound_failed()).await?;
                            let _ = client.shutdown().await;
                            return Ok(Stage::Closed);
                        }
                    }
                }
            }
        }
    }
}
