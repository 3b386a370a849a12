use clap::Parser;
use hwsign::cli::Shell;
use hwsign::device::{BridgeTransport, TerminalPrompt};
use hwsign::types::NetworkContext;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum NetworkArg {
    Mainnet,
    Testnet,
    Regtest,
}

/// Hardware-wallet transaction signing shell
#[derive(Parser, Debug)]
#[command(name = "hwsign", version, about)]
struct Options {
    /// Base URL of the device connect bridge
    #[arg(long, default_value = "http://127.0.0.1:21325")]
    bridge_url: String,

    /// Network to operate on
    #[arg(long, value_enum, default_value_t = NetworkArg::Mainnet)]
    network: NetworkArg,

    /// Regtest node host (with --network regtest)
    #[arg(long, default_value = "localhost")]
    regtest_host: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let options = Options::parse();

    if options.debug {
        hwsign::utils::logging::enable_debug();
    }

    let ctx = match options.network {
        NetworkArg::Mainnet => NetworkContext::mainnet(),
        NetworkArg::Testnet => NetworkContext::testnet(),
        NetworkArg::Regtest => NetworkContext::regtest(&options.regtest_host),
    };

    // Any value in the environment switches caching on, as the warning
    // banner in the shell explains.
    let cache_passphrase = std::env::var("CACHE_PASSPHRASE").is_ok();

    let prompt = TerminalPrompt::new(cache_passphrase);
    let transport = match BridgeTransport::new(&options.bridge_url, Box::new(prompt)) {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut shell = match Shell::new(&transport, ctx, cache_passphrase) {
        Ok(shell) => shell,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match shell.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // A disconnected device ends the session; nothing useful is left
            // to do without it.
            eprintln!("{}", e);
            eprintln!("Device unreachable. Exiting.");
            ExitCode::FAILURE
        }
    }
}
