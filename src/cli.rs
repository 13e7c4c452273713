//! Command line interface for the relaycore router binary.
//!
//! Kept free of crate imports so `build.rs` can render a man page from it.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `relaycore` binary.
#[derive(Debug, Parser)]
#[command(name = "relaycore", version, about = "Length-prefixed echo router")]
pub struct Cli {
    /// Address to accept connections on.
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    pub listen: SocketAddr,

    /// Largest chunk body accepted or produced, in bytes.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    pub max_chunk_len: usize,

    /// Size of the fragments replies are written in, in bytes.
    #[arg(long, default_value_t = 8 * 1024)]
    pub fragment_size: usize,

    /// Maximum requests handed to the visitor per drain turn.
    #[arg(long, default_value_t = 32)]
    pub bulk_size: usize,

    /// Lanes batch items are spread across per connection.
    #[arg(long, default_value_t = 4)]
    pub batch_lanes: usize,

    /// Replies owed to a peer before the router stops reading from it.
    #[arg(long, default_value_t = 1024)]
    pub max_pending_replies: usize,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn defaults_apply() {
        let cli = Cli::parse_from(["relaycore"]);
        assert_eq!(cli.listen.port(), 7878);
        assert_eq!(cli.fragment_size, 8192);
        assert_eq!(cli.max_pending_replies, 1024);
        assert!(cli.metrics_addr.is_none());
    }

    #[test]
    fn parses_listen_and_limits() {
        let cli = Cli::parse_from([
            "relaycore",
            "--listen",
            "0.0.0.0:9000",
            "--max-chunk-len",
            "4096",
            "--fragment-size",
            "512",
            "--max-pending-replies",
            "16",
        ]);
        assert_eq!(cli.listen.port(), 9000);
        assert_eq!(cli.max_chunk_len, 4096);
        assert_eq!(cli.fragment_size, 512);
        assert_eq!(cli.max_pending_replies, 16);
    }
}
