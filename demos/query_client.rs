//! Minimal blocking client: send one query, print the verdict.
//!
//! ```bash
//! cargo run --example query_client -- 127.0.0.1:44445 "hello world"
//! ```

use std::env;
use std::io::{Read, Write};
use std::net::TcpStream;

fn main() -> std::io::Result<()> {
    let mut args = env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:44445".to_string());
    let query = args.next().unwrap_or_else(|| "hello world".to_string());

    let mut stream = TcpStream::connect(&addr)?;
    stream.write_all(query.as_bytes())?;
    stream.write_all(b"\n")?;

    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    print!("{response}");

    Ok(())
}
