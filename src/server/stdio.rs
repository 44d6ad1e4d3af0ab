//! Newline-delimited JSON-RPC loop over stdin/stdout.
//!
//! One frame per line. Logging goes to stderr only; stdout carries
//! nothing but response frames, otherwise clients desynchronize.

use std::io::{self, BufRead, BufReader, Write};

use tracing::{debug, error, warn};

use crate::error::Result;
use crate::server::rpc::{Request, Response, RpcError};
use crate::server::tools::ToolServer;

/// Fallback frame when even error serialization fails.
const FALLBACK: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// Run the tool server until stdin closes.
///
/// # Errors
///
/// Returns an error only on stdout write failure; malformed input lines
/// produce parse-error frames and the loop continues.
pub fn run(mut server: ToolServer) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let reader = BufReader::new(stdin.lock());
    let mut stdout = stdout.lock();

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                error!("failed to read stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!("unparseable request: {e}");
                write_frame(&mut stdout, &Response::error(None, RpcError::parse_error()))?;
                continue;
            }
        };

        debug!(method = %request.method, "handling request");
        if let Some(response) = server.handle_request(request) {
            write_frame(&mut stdout, &response)?;
        }
    }

    Ok(())
}

fn write_frame(stdout: &mut impl Write, response: &Response) -> Result<()> {
    match serde_json::to_string(response) {
        Ok(json) => {
            writeln!(stdout, "{json}")?;
        }
        Err(e) => {
            error!("failed to serialize response: {e}");
            writeln!(stdout, "{FALLBACK}")?;
        }
    }
    stdout.flush()?;
    Ok(())
}
