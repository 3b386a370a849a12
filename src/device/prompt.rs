//! Operator prompt port
//!
//! PIN and passphrase challenges reach the operator through this seam. The
//! terminal implementation masks input; tests script their answers.

use crate::error::HwsignResult;
use std::cell::RefCell;
use zeroize::Zeroizing;

/// Answers device challenges on behalf of the operator.
pub trait OperatorPrompt {
    fn pin(&self) -> HwsignResult<String>;
    fn passphrase(&self) -> HwsignResult<String>;
}

/// Interactive terminal prompt with masked input.
pub struct TerminalPrompt {
    cache_passphrase: bool,
    cached: RefCell<Option<Zeroizing<String>>>,
}

impl TerminalPrompt {
    /// `cache_passphrase` keeps the first passphrase in process memory for
    /// the rest of the session so the operator is not re-prompted on every
    /// device operation. The tradeoff is surfaced at startup.
    pub fn new(cache_passphrase: bool) -> Self {
        Self {
            cache_passphrase,
            cached: RefCell::new(None),
        }
    }
}

impl OperatorPrompt for TerminalPrompt {
    fn pin(&self) -> HwsignResult<String> {
        println!("Please enter PIN.");
        println!("Key in numbers from grid below, corresponding to your pin on device:");
        println!();
        println!("7 8 9");
        println!("4 5 6");
        println!("1 2 3");
        let pin = rpassword::prompt_password("?> ")?;
        Ok(pin.trim().to_string())
    }

    fn passphrase(&self) -> HwsignResult<String> {
        if self.cache_passphrase {
            if let Some(cached) = self.cached.borrow().as_ref() {
                return Ok(cached.to_string());
            }
        }

        println!("Please enter passphrase.");
        let passphrase = rpassword::prompt_password("?> ")?;
        let passphrase = passphrase.trim().to_string();

        if self.cache_passphrase {
            *self.cached.borrow_mut() = Some(Zeroizing::new(passphrase.clone()));
        }
        Ok(passphrase)
    }
}
