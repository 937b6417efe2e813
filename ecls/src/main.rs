//! The ECLS bridge binary.
//!
//! Subscribes to the Mashery event stream over a websocket, derives statsd metrics from every
//! API traffic event and reports them to a statsd server in fixed intervals. The metrics are
//! grouped into three namespaces:
//!
//!  - `service`: per service, package, plan, endpoint and method.
//!  - `developer`: per API key.
//!  - `endpoint`: per HTTP method and request path.
//!
//! Each namespace records the response size as a gauge, the response status code and string as
//! counters, and the execution time as a timing.
//!
//! # Usage
//!
//! ```bash
//! # Connect to a full URL
//! ecls "wss://streaming-api.mashery.com/ecls/subscribe/<id>/<name>?key=<key>"
//!
//! # Or assemble the URL from its parts
//! ECLS_KEY=<key> ecls run --host streaming-api.mashery.com --path /ecls/subscribe/<id>/<name>
//!
//! # Inspect or create the config file
//! ecls config show -c .ecls
//! ecls config init -c .ecls
//! ```
//!
//! The process exits with `0` after a shutdown by signal and with `1` after a failure.

mod cli;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(code) => code,
        Err(err) => {
            ecls_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
