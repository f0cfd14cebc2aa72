//! Message keeper - remote message storage over gRPC
//!
//! A server keeps messages in a SQLite table and exposes two operations,
//! save and find-by-substring. A client reads a text file and, for every
//! line, saves it and then searches by a random substring of it.
//!
//! ## Architecture
//!
//! 1. The server starts a name registry and binds the message service
//!    under `//MessageKeeper`
//! 2. The client asks the registry where `//MessageKeeper` lives
//! 3. The client calls SaveMessage then FindMessages for each line
//!
//! ## Usage
//!
//! Start the server:
//! ```bash
//! cargo run --bin message-keeper-server -- 1099 localhost 2099
//! ```
//!
//! Run the client:
//! ```bash
//! cargo run --bin message-keeper-client -- localhost 1099 messages.txt
//! ```

fn main() {
    println!("Message keeper");
    println!();
    println!("Use the following binaries:");
    println!("  cargo run --bin message-keeper-server -- --help");
    println!("  cargo run --bin message-keeper-client -- --help");
}
