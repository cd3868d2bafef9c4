//! Fidelity broker driven through the retail web UI.
//!
//! Each session owns one browser on a WebDriver server. The order ticket is
//! stateful: `select_account` → `enter_symbol` → `quote` → `preview` →
//! `place` operate on whatever the previous step left on screen.

pub mod page;
pub mod webdriver;

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use brokerbot::registry::join_account_columns;
use brokerbot::{AccountId, AccountRecord, Decimal, OrderTicket, OrderType, Quote, Side, Symbol};
use log::{debug, info, warn};
use serde_json::json;

use crate::Broker;
use crate::error::BrokerError;
use crate::types::*;
use webdriver::{By, KEY_RETURN, WebDriver};

/// Tunables for a Fidelity session.
#[derive(Clone, Debug)]
pub struct FidelityOptions {
    pub webdriver_url: String,
    pub headless: bool,
    pub page_load_timeout: Duration,
    pub element_timeout: Duration,
    /// How long to wait for the summary page after submitting the login form.
    pub login_redirect_timeout: Duration,
    /// Pause between characters when typing credentials.
    pub keystroke_delay: Duration,
    /// Where screenshots are written.
    pub diagnostics_dir: PathBuf,
}

impl Default for FidelityOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            headless: true,
            page_load_timeout: Duration::from_secs(20),
            element_timeout: Duration::from_secs(10),
            login_redirect_timeout: Duration::from_secs(30),
            keystroke_delay: Duration::from_millis(50),
            diagnostics_dir: PathBuf::from("diagnostics"),
        }
    }
}

/// Time for the ticket to react to a click before the next read.
const SETTLE: Duration = Duration::from_secs(1);
/// The preview dialog renders after `readyState` flips.
const PREVIEW_SETTLE: Duration = Duration::from_secs(3);
/// How long a TOTP prompt may take to appear after the login click.
const TOTP_PROMPT_WAIT: Duration = Duration::from_secs(5);

/// One logged-in Fidelity web session.
pub struct FidelitySession {
    label: String,
    driver: WebDriver,
    options: FidelityOptions,
}

impl FidelitySession {
    /// Open a browser and log in.
    ///
    /// On failure a screenshot is saved (best effort) and the browser is
    /// closed before the error is returned.
    pub fn login(label: &str, credential: &Credential, options: FidelityOptions) -> Result<Self, BrokerError> {
        let driver = WebDriver::start(
            &options.webdriver_url,
            options.headless,
            options.page_load_timeout + Duration::from_secs(10),
        )?;
        let mut session = Self {
            label: label.to_string(),
            driver,
            options,
        };

        info!("Logging in to {label}...");
        if let Err(e) = session.sign_in(credential) {
            if let Err(capture_err) = session.capture("login-error") {
                debug!("{label}: no login screenshot: {capture_err}");
            }
            // Dropping the session closes the browser.
            return Err(e);
        }
        info!("Logged in to {label}");
        Ok(session)
    }

    fn sign_in(&self, credential: &Credential) -> Result<(), BrokerError> {
        let d = &self.driver;
        let opts = &self.options;

        d.goto(page::LOGIN_URL)?;
        d.wait_page_loaded(opts.page_load_timeout)?;

        let user = d.wait_clickable(&By::css(page::USERNAME_INPUT), opts.element_timeout)?;
        d.type_slowly(&user, &credential.login, opts.keystroke_delay)?;
        let pass = d.wait_clickable(&By::css(page::PASSWORD_INPUT), opts.element_timeout)?;
        d.type_slowly(&pass, &credential.secret, opts.keystroke_delay)?;
        d.click(&d.find(&By::css(page::LOGIN_BUTTON))?)?;
        d.wait_page_loaded(opts.element_timeout)?;

        if let Some(code) = credential.one_time_code()? {
            self.submit_totp(&code)?;
        }

        let url = self.driver.current_url()?;
        if !page::is_summary_page(&url) {
            if page::is_error_page(&url) {
                return Err(BrokerError::Auth(format!(
                    "{}: login failed, got error page {url}",
                    self.label
                )));
            }
            debug!("{}: waiting for portfolio summary", self.label);
            self.driver
                .wait_url_contains("summary", self.options.login_redirect_timeout)
                .map_err(|e| BrokerError::Auth(format!("{}: no summary page after login: {e}", self.label)))?;
        }

        self.leave_old_view();
        Ok(())
    }

    fn submit_totp(&self, code: &str) -> Result<(), BrokerError> {
        let d = &self.driver;
        let input = match d.wait_clickable(&By::css(page::TOTP_INPUT), TOTP_PROMPT_WAIT) {
            Ok(el) => el,
            Err(BrokerError::Timeout(_)) => {
                debug!("{}: no TOTP prompt shown", self.label);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        d.send_keys(&input, code)?;
        d.click(&d.find(&By::css(page::TOTP_CONTINUE))?)?;
        d.wait_page_loaded(self.options.page_load_timeout)
    }

    /// Opt out of the legacy site layout. Failure is only a warning.
    fn leave_old_view(&self) {
        let d = &self.driver;
        let result = (|| -> Result<(), BrokerError> {
            let url = d.current_url()?;
            if !page::is_old_view(&url) {
                return Ok(());
            }
            info!("{}: old view detected at {url}", self.label);
            d.click(&d.find(&By::css(page::OLD_VIEW_OPT_OUT))?)?;
            d.wait_page_loaded(self.options.element_timeout)?;
            d.wait_url_contains("digital", self.options.login_redirect_timeout)?;
            info!("{}: disabled old view", self.label);
            Ok(())
        })();
        if let Err(e) = result {
            warn!("{}: failed to disable old view ({e}); continuing", self.label);
        }
    }

    fn class_texts(&self, class: &str) -> Result<Vec<String>, BrokerError> {
        let value = self.driver.execute(page::CLASS_TEXT_SCRIPT, vec![json!(class)])?;
        serde_json::from_value(value)
            .map_err(|e| BrokerError::Parse(format!("{class} texts: {e}")))
    }

    fn grid_rows(&self) -> Result<Vec<BTreeMap<String, String>>, BrokerError> {
        let value = self
            .driver
            .execute(
                page::GRID_ROWS_SCRIPT,
                vec![json!(page::GRID_CENTER_SELECTOR), json!(page::GRID_PINNED_SELECTOR)],
            )?;
        serde_json::from_value(value).map_err(|e| BrokerError::Parse(format!("grid rows: {e}")))
    }

    /// Click the error dialog's close button if one is showing.
    fn dismiss_error_dialog(&self) -> Result<bool, BrokerError> {
        match self.driver.try_find(&By::xpath(page::ERROR_DIALOG_CLOSE))? {
            Some(close) => {
                self.driver.js_click(&close)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn type_into(&self, selector: &str, text: &str) -> Result<(), BrokerError> {
        let el = self.driver.find(&By::css(selector))?;
        self.driver.clear(&el)?;
        self.driver.send_keys(&el, text)
    }
}

impl Broker for FidelitySession {
    fn provider(&self) -> &str {
        "Fidelity"
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn list_accounts(&mut self) -> Result<Vec<AccountRecord>, BrokerError> {
        let discovery = |e: BrokerError| BrokerError::AccountDiscovery(format!("{}: {e}", self.label));
        let d = &self.driver;
        d.goto(page::POSITIONS_URL).map_err(discovery)?;
        d.wait_page_loaded(self.options.element_timeout).map_err(discovery)?;
        d.wait_for(
            &By::css(&format!(".{}", page::ACCOUNT_NUMBER_CLASS)),
            self.options.element_timeout,
        )
        .map_err(discovery)?;

        let ids = self.class_texts(page::ACCOUNT_NUMBER_CLASS).map_err(discovery)?;
        let balances = self.class_texts(page::ACCOUNT_BALANCE_CLASS).map_err(discovery)?;
        let names = self.class_texts(page::ACCOUNT_NAME_CLASS).map_err(discovery)?;
        debug!("{}: accounts {ids:?}, balances {balances:?}, names {names:?}", self.label);

        Ok(join_account_columns(&ids, &balances, &names)?)
    }

    fn positions(&mut self, account: &AccountId) -> Result<Vec<Position>, BrokerError> {
        let d = &self.driver;
        d.goto(&format!("{}#{}", page::POSITIONS_URL, account))?;
        d.wait_page_loaded(self.options.element_timeout)?;
        d.wait_for(
            &By::css(&format!(".{}", page::GRID_PINNED_CLASS)),
            self.options.element_timeout,
        )?;

        let pinned = self.class_texts(page::GRID_PINNED_CLASS)?.join("  ");
        let rows = self.grid_rows()?;
        page::positions_from_grid(&pinned, &rows)
    }

    fn latest_price(&mut self, _symbol: &Symbol) -> Result<Option<Decimal>, BrokerError> {
        // The positions grid already carries the last price.
        Ok(None)
    }

    fn select_account(&mut self, account: &AccountId) -> Result<(), BrokerError> {
        let d = &self.driver;
        let timeout = self.options.element_timeout;
        d.goto(page::TRADE_URL)?;
        d.wait_page_loaded(timeout)?;

        let dropdown = d.wait_for(&By::css(page::ACCOUNT_DROPDOWN), timeout)?;
        d.js_click(&dropdown)?;
        let list = d.wait_for(&By::css(page::ACCOUNT_LIST), timeout)?;

        for option in d.find_all_in(&list, &By::css("li"))? {
            let text = d.text(&option)?;
            if page::account_option_matches(&text, account.as_str()) {
                d.click(&option)?;
                thread::sleep(SETTLE);
                debug!("{}: selected account {text}", self.label);
                return Ok(());
            }
        }
        Err(BrokerError::Element(format!(
            "account {account} not in the ticket's account list"
        )))
    }

    fn enter_symbol(&mut self, symbol: &Symbol) -> Result<(), BrokerError> {
        let d = &self.driver;
        let input = d.wait_clickable(&By::css(page::SYMBOL_INPUT), self.options.element_timeout)?;
        d.clear(&input)?;
        d.send_keys(&input, symbol.as_str())?;
        d.send_keys(&input, &KEY_RETURN.to_string())?;
        thread::sleep(SETTLE);

        if d.try_find(&By::css(page::SYMBOL_NOT_FOUND_ALERT))?.is_some() {
            return Err(BrokerError::SymbolNotFound(symbol.to_string()));
        }
        Ok(())
    }

    fn quote(&mut self, _symbol: &Symbol) -> Result<Quote, BrokerError> {
        let d = &self.driver;
        let ask_el = d.wait_for(&By::css(page::ASK_PRICE), self.options.element_timeout)?;
        let ask = page::parse_price(&d.text(&ask_el)?)?;
        let bid = page::parse_price(&d.text(&d.find(&By::css(page::BID_PRICE))?)?)?;
        Ok(Quote::new(ask, bid))
    }

    fn preview(&mut self, ticket: &OrderTicket) -> Result<(), BrokerError> {
        let d = &self.driver;
        let side_button = match ticket.side {
            Side::Buy => page::BUY_BUTTON,
            Side::Sell => page::SELL_BUTTON,
        };
        d.click(&d.find(&By::css(side_button))?)?;
        self.type_into(page::QUANTITY_INPUT, &ticket.quantity.normalize().to_string())?;

        match ticket.order_type {
            OrderType::Market => d.click(&d.find(&By::css(page::MARKET_BUTTON))?)?,
            OrderType::Limit(price) => {
                d.click(&d.find(&By::css(page::LIMIT_BUTTON))?)?;
                self.type_into(page::LIMIT_PRICE_INPUT, &price.normalize().to_string())?;
            }
        }

        d.wait_page_loaded(self.options.element_timeout)?;
        thread::sleep(SETTLE);
        d.click(&d.find(&By::css(page::PREVIEW_BUTTON))?)?;
        d.wait_page_loaded(self.options.element_timeout)?;
        thread::sleep(PREVIEW_SETTLE);

        // A warning dialog may cover the preview; clear it so the place
        // button is reachable.
        if self.dismiss_error_dialog()? {
            debug!("{}: dismissed preview dialog", self.label);
        }
        Ok(())
    }

    fn place(&mut self, ticket: &OrderTicket) -> Result<Placement, BrokerError> {
        let d = &self.driver;
        let button = d.try_find(&By::css(page::PLACE_BUTTON))?;
        let mut dialog = false;
        match &button {
            Some(button) => {
                d.click(button)?;
                d.wait_page_loaded(self.options.element_timeout)?;
                thread::sleep(SETTLE);
            }
            None => {
                // The preview was refused; an error dialog should follow.
                match d.wait_for(&By::xpath(page::ERROR_DIALOG_CLOSE), self.options.element_timeout) {
                    Ok(_) => dialog = true,
                    Err(BrokerError::Timeout(_)) => {}
                    Err(e) => return Err(e),
                }
                if dialog {
                    self.dismiss_error_dialog()?;
                }
            }
        }
        page::placement_after_preview(button.is_some(), dialog, ticket)
    }

    fn capture(&mut self, label: &str) -> Result<Option<PathBuf>, BrokerError> {
        let png = self.driver.screenshot_png()?;
        let dir = &self.options.diagnostics_dir;
        fs::create_dir_all(dir)
            .map_err(|e| BrokerError::Other(format!("cannot create {}: {e}", dir.display())))?;
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let path = dir.join(page::screenshot_file_name(&self.label, &stamp, label));
        fs::write(&path, png)
            .map_err(|e| BrokerError::Other(format!("cannot write {}: {e}", path.display())))?;
        info!("{}: saved screenshot {}", self.label, path.display());
        Ok(Some(path))
    }

    fn logout(&mut self) -> Result<(), BrokerError> {
        self.driver.quit()
    }
}

