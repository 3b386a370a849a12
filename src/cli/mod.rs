//! Interactive command shell
//!
//! Reads commands from stdin, dispatches them, prints errors, and returns
//! to the prompt. Only a device disconnect ends the loop; every other
//! failure is printed and the operator tries again.

use crate::device::DeviceTransport;
use crate::error::{ErrorCode, HwsignError, HwsignResult};
use crate::net::NetworkClient;
use crate::signer::{Signer, SingleSigner};
use crate::tx::Dispatcher;
use crate::types::NetworkContext;
use crate::wallet::{parse_path, resolve_path, AddressBook, DEFAULT_ACCOUNT_ROOT};
use bitcoin::Address;
use std::io::{self, BufRead, Write};
use std::str::FromStr;

/// Addresses derived by `loadaddrs`
const ADDRESS_BOOK_SIZE: u32 = 4096;
const ADDRESS_BOOK_CHUNK: u32 = 512;

pub struct Shell<'a> {
    transport: &'a dyn DeviceTransport,
    net: NetworkClient,
    ctx: NetworkContext,
    book: AddressBook,
    cache_passphrase: bool,
}

impl<'a> Shell<'a> {
    pub fn new(
        transport: &'a dyn DeviceTransport,
        ctx: NetworkContext,
        cache_passphrase: bool,
    ) -> HwsignResult<Self> {
        Ok(Self {
            transport,
            net: NetworkClient::new()?,
            ctx,
            book: AddressBook::new(),
            cache_passphrase,
        })
    }

    fn print_banner(&self) {
        println!();
        println!("Direct hardware-wallet transaction signing.");
        if self.cache_passphrase {
            println!();
            println!("WARNING: currently configured to cache the passphrase in memory so it doesnt prompt on every device operation.");
        }
        println!();
        println!("Note: \"loadaddrs\" loads the devices addresses into memory for use as options in other commands");
        println!();
        println!("Commands supported:");
        println!();
        println!("loadaddrs");
        println!("getaddr <hd-path or address index or address>");
        println!("signtx <hd-path or address index or address to withdraw> <address to send funds to> <optional: amount in sats, defaults to *all* funds>");
        println!("make-register <name> <destination address>");
        println!("make-update <name> <zonefile>");
        println!("set-reg-test [host]");
        println!("quit");
        println!();
    }

    /// Run the prompt loop until EOF, `quit`, or a fatal device error.
    pub fn run(&mut self) -> HwsignResult<()> {
        self.print_banner();

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("CMD> ");
            io::stdout().flush()?;

            let line = match lines.next() {
                Some(line) => line?,
                None => break,
            };
            let words: Vec<&str> = line.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }
            if matches!(words[0], "quit" | "exit") {
                break;
            }

            if let Err(e) = self.dispatch(&words) {
                if e.is_fatal() {
                    return Err(e);
                }
                println!("{}", e);
                println!("ERROR OCCURRED IN LAST COMMAND.");
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, words: &[&str]) -> HwsignResult<()> {
        match words[0] {
            "loadaddrs" => self.cmd_loadaddrs(),
            "getaddr" => match words.get(1) {
                Some(spec) => self.cmd_getaddr(spec),
                None => usage("getaddr <hd-path or address index or address>"),
            },
            "signtx" => match (words.get(1), words.get(2)) {
                (Some(from), Some(to)) => {
                    let amount = words
                        .get(3)
                        .map(|raw| {
                            raw.parse::<u64>().map_err(|_| {
                                HwsignError::parse_error(format!("Invalid amount: {}", raw))
                            })
                        })
                        .transpose()?;
                    self.cmd_signtx(from, to, amount)
                }
                _ => usage("signtx <from> <to-address> [amount-sats]"),
            },
            "make-register" => match (words.get(1), words.get(2)) {
                (Some(name), Some(destination)) => self.cmd_register(name, destination),
                _ => usage("make-register <name> <destination address>"),
            },
            "make-update" => match (words.get(1), words.get(2)) {
                (Some(name), Some(_)) => {
                    let zonefile = words[2..].join(" ");
                    self.cmd_update(name, &zonefile)
                }
                _ => usage("make-update <name> <zonefile>"),
            },
            "set-reg-test" => {
                let host = words.get(1).copied().unwrap_or("localhost");
                self.ctx = NetworkContext::regtest(host);
                println!("Switched to regtest against {}", host);
                Ok(())
            }
            "help" => {
                self.print_banner();
                Ok(())
            }
            other => {
                println!("Unknown command: {}", other);
                Ok(())
            }
        }
    }

    fn cmd_loadaddrs(&mut self) -> HwsignResult<()> {
        let root = parse_path(DEFAULT_ACCOUNT_ROOT)?;
        let xpub = self.transport.get_xpub(&root, self.ctx.coin_name()?)?;

        let mut loaded = 0;
        while loaded < ADDRESS_BOOK_SIZE {
            self.book.populate(&xpub, &self.ctx, loaded, ADDRESS_BOOK_CHUNK)?;
            loaded += ADDRESS_BOOK_CHUNK;
            println!("...");
        }
        println!("Loaded addresses!");
        Ok(())
    }

    fn cmd_getaddr(&mut self, spec: &str) -> HwsignResult<()> {
        let path = resolve_path(spec, &self.book)?;
        println!("Using derivation path: {}", crate::wallet::format_path(&path));

        let signer = SingleSigner::create(self.transport, &self.ctx, path)?;
        println!("Address = {}", signer.address());

        let utxos = self.net.get_utxos(&self.ctx, signer.address())?;
        let balance: u64 = utxos.iter().map(|u| u.value).sum();
        println!(
            "Balance = {} sats across {} outputs",
            balance,
            utxos.len()
        );
        Ok(())
    }

    fn cmd_signtx(&mut self, from: &str, to: &str, amount: Option<u64>) -> HwsignResult<()> {
        let path = resolve_path(from, &self.book)?;
        let to = checked_address(to, &self.ctx)?;

        let signer = SingleSigner::create(self.transport, &self.ctx, path)?;
        println!("Sending from {}", signer.address());

        let txid = Dispatcher::new(self.transport, &mut self.net).send_payment(
            &self.ctx,
            &signer,
            &to,
            amount,
        )?;
        println!("Broadcast accepted: {}", txid);
        Ok(())
    }

    fn cmd_register(&mut self, name: &str, destination: &str) -> HwsignResult<()> {
        let destination = checked_address(destination, &self.ctx)?;

        let root = parse_path(&format!("{}/0", DEFAULT_ACCOUNT_ROOT))?;
        let signer = SingleSigner::create(self.transport, &self.ctx, root)?;

        let (preorder, register) = Dispatcher::new(self.transport, &mut self.net).register_name(
            &self.ctx,
            &signer,
            name,
            &destination,
        )?;
        println!("Preorder accepted: {}", preorder);
        println!("Register accepted: {}", register);
        Ok(())
    }

    fn cmd_update(&mut self, name: &str, zonefile: &str) -> HwsignResult<()> {
        let root = parse_path(&format!("{}/0", DEFAULT_ACCOUNT_ROOT))?;
        let signer = SingleSigner::create(self.transport, &self.ctx, root)?;

        let txid = Dispatcher::new(self.transport, &mut self.net).update_name(
            &self.ctx,
            &signer,
            name,
            zonefile,
        )?;
        println!("Update accepted: {}", txid);
        Ok(())
    }
}

fn usage(text: &str) -> HwsignResult<()> {
    println!("Usage: {}", text);
    Ok(())
}

fn checked_address(raw: &str, ctx: &NetworkContext) -> HwsignResult<Address> {
    Address::from_str(raw)?
        .require_network(ctx.network)
        .map_err(|e| HwsignError::new(ErrorCode::InvalidAddress, e.to_string()))
}
