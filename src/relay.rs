use bytes::Bytes;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Size of the buffer each pump reads into
const RELAY_BUF_SIZE: usize = 16 * 1024;

/// One side of the link
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Leg {
    Client,
    Target,
}

/// RelayStats summarises a finished relay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayStats {
    pub from_client: u64,
    pub from_target: u64,
    /// The leg whose connection hit EOF or failed first
    pub closed_by: Leg,
    /// Set when the teardown was caused by an I/O error on `closed_by`
    pub error: Option<io::ErrorKind>,
}

/// How a pump stopped
enum PumpEnd {
    Eof,
    ReadFailed(io::Error),
    WriteFailed(io::Error),
}

/// RelayLink bridges a client and its target with two unidirectional
/// pumps. When either pump stops, both connections are closed.
pub struct RelayLink<C, T> {
    client: C,
    target: T,
    early_data: Bytes,
}

impl<C, T> RelayLink<C, T>
where
    C: AsyncRead + AsyncWrite + Unpin,
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// new pairs the two connections. `early_data` holds client bytes that
    /// arrived before the relay was installed and goes to the target first.
    pub fn new(client: C, target: T, early_data: Bytes) -> Self {
        Self {
            client,
            target,
            early_data,
        }
    }

    /// run relays until one side closes or fails, then drops both
    pub async fn run(self) -> RelayStats {
        let (mut client_read, mut client_write) = io::split(self.client);
        let (mut target_read, mut target_write) = io::split(self.target);

        let mut from_client = 0u64;
        let mut from_target = 0u64;

        let (closed_by, error) = match target_write.write_all(&self.early_data).await {
            Err(e) => (Leg::Target, Some(e)),
            Ok(()) => {
                from_client += self.early_data.len() as u64;

                // Read failures belong to the source leg, write failures to
                // the destination leg
                tokio::select! {
                    end = pump(&mut client_read, &mut target_write, &mut from_client) => match end {
                        PumpEnd::Eof => (Leg::Client, None),
                        PumpEnd::ReadFailed(e) => (Leg::Client, Some(e)),
                        PumpEnd::WriteFailed(e) => (Leg::Target, Some(e)),
                    },
                    end = pump(&mut target_read, &mut client_write, &mut from_target) => match end {
                        PumpEnd::Eof => (Leg::Target, None),
                        PumpEnd::ReadFailed(e) => (Leg::Target, Some(e)),
                        PumpEnd::WriteFailed(e) => (Leg::Client, Some(e)),
                    },
                }
            }
        };

        if let Some(e) = &error {
            warn!("relay {closed_by:?} connection failed: {e}");
        }

        // DEBUG
        info!(
            "connection closed by {:?}: {} bytes from client, {} bytes from target",
            closed_by, from_client, from_target
        );

        RelayStats {
            from_client,
            from_target,
            closed_by,
            error: error.map(|e| e.kind()),
        }
    }
}

/// pump forwards chunks from `reader` to `writer` until EOF or an error
/// on either side
async fn pump<R, W>(reader: &mut R, writer: &mut W, counter: &mut u64) -> PumpEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUF_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return PumpEnd::Eof,
            Ok(n) => n,
            Err(e) => return PumpEnd::ReadFailed(e),
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            return PumpEnd::WriteFailed(e);
        }
        *counter += n as u64;
    }
}
