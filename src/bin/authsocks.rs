use anyhow::Result;
use authsocks::{CredentialStore, Socks5Server};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "A SOCKS5 proxy with username/password authentication", long_about = None)]
struct Args {
    /// Address to bind
    host: String,

    /// Port to listen on
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    // Seed the credential store
    let users = CredentialStore::new().with_user("login", "password");

    // Bracket IPv6 literals so host:port stays parseable
    let listen_addr = if args.host.contains(':') {
        format!("[{}]:{}", args.host, args.port)
    } else {
        format!("{}:{}", args.host, args.port)
    };

    // Instantiate server
    let server = Socks5Server::new(listen_addr).with_authenticator(users);

    // Run it
    info!("Starting SOCKS5 proxy: {}", server.listen_addr);
    server.run().await
}
