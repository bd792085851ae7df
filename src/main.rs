//! Binary entrypoint that launches the gateway.

use std::process::ExitCode;

use monica_bridge::start_gateway;

/// Start the OpenAI-compatible gateway in front of the Monica backend.
fn main() -> ExitCode {
    start_gateway::run()
}
