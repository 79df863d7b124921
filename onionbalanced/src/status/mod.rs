//! Read-only status channel over a Unix domain socket.
//!
//! Every client that connects receives a plain text summary of the
//! managed services and their instances, then the connection is closed:
//!
//! ```text
//! $ socat - unix-connect:/var/run/onionbalance/control
//! uweyln7jhkyaokka.onion 2016-05-01 11:08:56
//!   r523s7jx65ckitf4.onion [offline]
//!   v2q7ujuleky7odph.onion 2016-05-01 11:00:00 3 IPs [up at 11:05:02]
//! ```

pub mod error;
pub mod handler;
pub mod render;
pub mod server;

pub use error::StatusError;
pub use handler::handle_connection;
pub use render::{render_lines, render_status};
pub use server::StatusSocket;
