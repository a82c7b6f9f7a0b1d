//! WebDriver-backed [`Portal`] over a Chrome session driven by fantoccini.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::session::{self, SavedCookie};
use super::{CardHtml, Portal, StepError};
use crate::config::Settings;

const ADVANCED_SEARCH_TAB: &str = "li[title='جستجوی پیشرفته']";
const UNIVERSITY_INPUT: &str = "input[placeholder='نام دانشگاه مورد نظر را وارد کنید']";
const SEARCH_BUTTON_TEXT: &str = "جستجوی موارد انتخاب شده";
const RESULTS_MARKER: &str = "//div[contains(., 'نتایج جستجو')]";
const CARD_SELECTOR: &str = "div.card.bg-base-100.shadow-xl.mb-4, .result-professor";
const GROUP_CANDIDATES: &str = "//button | //h2 | //h3 | //div[contains(@class, 'collapse-title')]";

const SUGGESTION_DELAY: Duration = Duration::from_secs(4);
const SUGGESTION_WAIT: Duration = Duration::from_secs(3);
const RESULTS_WAIT: Duration = Duration::from_secs(60);
const CARDS_WAIT: Duration = Duration::from_secs(10);
const SETTLE: Duration = Duration::from_millis(500);

pub struct BrowserPortal {
    client: Client,
    portal_url: String,
}

impl BrowserPortal {
    pub async fn connect(settings: &Settings, headless: bool) -> Result<Self> {
        let mut args = vec!["--window-size=1400,1000".to_string()];
        if headless {
            args.push("--headless=new".to_string());
        }
        let mut caps = serde_json::Map::new();
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&settings.webdriver_url)
            .await
            .with_context(|| format!("Failed to reach WebDriver at {}", settings.webdriver_url))?;
        info!("Browser session started (headless: {})", headless);
        Ok(Self { client, portal_url: settings.portal_url.clone() })
    }

    /// Load saved cookies into the browser. Cookies only apply to the origin
    /// that is open, so the portal is visited first.
    pub async fn restore_session(&mut self, cookies: &[SavedCookie]) -> Result<()> {
        self.client.goto(&self.portal_url).await?;
        for cookie in cookies {
            if let Err(e) = self.client.add_cookie(cookie.to_cookie()).await {
                warn!("Could not restore cookie {}: {}", cookie.name, e);
            }
        }
        info!("Restored {} cookies", cookies.len());
        Ok(())
    }

    /// Open the portal and switch to the advanced search tab.
    pub async fn open(&mut self) -> Result<()> {
        self.client.goto(&self.portal_url).await?;
        let tab = self
            .client
            .wait()
            .at_most(RESULTS_WAIT)
            .for_element(Locator::Css(ADVANCED_SEARCH_TAB))
            .await
            .context("Advanced search tab never appeared; is the session still logged in?")?;
        tab.click().await?;
        tokio::time::sleep(SETTLE).await;
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }

    async fn wait_for(&self, locator: Locator<'_>, at_most: Duration, what: &str) -> Result<Element, StepError> {
        self.client
            .wait()
            .at_most(at_most)
            .for_element(locator)
            .await
            .map_err(|e| match e {
                CmdError::WaitTimeout => StepError::Timeout(what.to_string()),
                other => StepError::Driver(other),
            })
    }

    async fn pick_university(&mut self, university: &str) -> Result<(), StepError> {
        let input = self.wait_for(Locator::Css(UNIVERSITY_INPUT), SUGGESTION_WAIT, "university input").await?;
        input.click().await?;
        input.clear().await?;
        input.send_keys(university).await?;
        // the dropdown only fetches suggestions once typing pauses
        tokio::time::sleep(SUGGESTION_DELAY).await;
        input.send_keys(" ").await?;

        let suggestion = format!("//li[contains(., {})]", xpath_literal(university));
        match self.wait_for(Locator::XPath(&suggestion), SUGGESTION_WAIT, "university suggestion").await {
            Ok(item) => item.click().await?,
            Err(StepError::Timeout(_)) => debug!("No suggestion list for {}, keeping typed text", university),
            Err(e) => return Err(e),
        }
        self.client
            .execute("if (document.activeElement) { document.activeElement.blur(); }", vec![])
            .await?;
        Ok(())
    }

    /// Click the search button, escalating through a forced enable and a
    /// synthetic event dispatch when the normal click is swallowed.
    async fn submit_search(&mut self) -> Result<(), StepError> {
        let xpath = format!("//button[contains(., {})]", xpath_literal(SEARCH_BUTTON_TEXT));
        let button = self.wait_for(Locator::XPath(&xpath), SUGGESTION_WAIT, "search button").await?;

        let first = match button.click().await {
            Ok(()) => return Ok(()),
            Err(e) => e.to_string(),
        };
        debug!("Plain click on search button failed: {}", first);

        let script = "const b = document.evaluate(arguments[0], document, null, \
                      XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue; \
                      if (!b) { return false; } \
                      b.disabled = false; b.removeAttribute('disabled'); b.click(); return true;";
        if self.client.execute(script, vec![Value::from(xpath.clone())]).await? == Value::Bool(true) {
            return Ok(());
        }

        let script = "const b = document.evaluate(arguments[0], document, null, \
                      XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue; \
                      if (!b) { return false; } \
                      for (const t of ['mousedown', 'mouseup', 'click']) { \
                        b.dispatchEvent(new MouseEvent(t, { bubbles: true, cancelable: true, view: window })); \
                      } \
                      return true;";
        if self.client.execute(script, vec![Value::from(xpath)]).await? == Value::Bool(true) {
            return Ok(());
        }

        Err(StepError::ClickRejected { target: SEARCH_BUTTON_TEXT.to_string(), reason: first })
    }

    async fn find_group(&mut self, title: &str) -> Result<Element, StepError> {
        let literal = xpath_literal(title);
        let candidates = [
            format!("//button[contains(normalize-space(.), {literal})]"),
            format!("//*[@title={literal}]"),
            format!("//*[normalize-space(text())={literal}]"),
        ];
        for xpath in &candidates {
            match self.client.find(Locator::XPath(xpath)).await {
                Ok(el) => return Ok(el),
                Err(e) if e.is_no_such_element() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StepError::NotFound(title.to_string()))
    }

    async fn scroll_into_view(&self, el: &Element) -> Result<(), StepError> {
        let arg = serde_json::to_value(el).map_err(|e| StepError::NotFound(e.to_string()))?;
        self.client
            .execute("arguments[0].scrollIntoView({block: 'center'});", vec![arg])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Portal for BrowserPortal {
    async fn search_university(&mut self, university: &str) -> Result<Vec<String>, StepError> {
        self.pick_university(university).await?;
        self.submit_search().await?;
        self.client.execute("window.scrollTo(0, document.body.scrollHeight);", vec![]).await?;
        self.wait_for(Locator::XPath(RESULTS_MARKER), RESULTS_WAIT, "search results").await?;
        tokio::time::sleep(SETTLE).await;

        let mut texts = Vec::new();
        for el in self.client.find_all(Locator::XPath(GROUP_CANDIDATES)).await? {
            match el.text().await {
                Ok(text) => texts.push(text),
                Err(e) => debug!("Skipping unreadable header: {}", e),
            }
        }
        Ok(texts)
    }

    async fn expand_group(&mut self, title: &str) -> Result<Vec<CardHtml>, StepError> {
        let header = self.find_group(title).await?;
        self.scroll_into_view(&header).await?;
        header.click().await.map_err(|e| StepError::ClickRejected {
            target: title.to_string(),
            reason: e.to_string(),
        })?;

        match self.wait_for(Locator::Css(CARD_SELECTOR), CARDS_WAIT, "professor cards").await {
            Ok(_) => {}
            Err(StepError::Timeout(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        let mut cards = Vec::new();
        for card in self.client.find_all(Locator::Css(CARD_SELECTOR)).await? {
            cards.push(card.html(false).await.map_err(StepError::from));
        }
        Ok(cards)
    }

    async fn collapse_group(&mut self, title: &str) -> Result<(), StepError> {
        let header = self.find_group(title).await?;
        header.click().await?;
        Ok(())
    }
}

/// Open a visible browser on the portal, let the user sign in by hand, then
/// save the session cookies.
pub async fn login(settings: &Settings) -> Result<()> {
    let portal = BrowserPortal::connect(settings, false).await?;
    portal.client.goto(&portal.portal_url).await?;

    println!("Sign in to the portal in the browser window, then press Enter here.");
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| ())
    })
    .await??;

    let cookies: Vec<SavedCookie> = portal
        .client
        .get_all_cookies()
        .await?
        .iter()
        .map(SavedCookie::from_cookie)
        .collect();
    session::save(&settings.session_path, &cookies)?;
    info!("Saved {} cookies to {}", cookies.len(), settings.session_path.display());
    portal.close().await
}

/// Quote text as an XPath string literal. XPath 1.0 has no escape sequence,
/// so text holding both quote kinds is built with `concat()`.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{text}'");
    }
    if !text.contains('"') {
        return format!("\"{text}\"");
    }
    let parts: Vec<String> = text.split('\'').map(|p| format!("'{p}'")).collect();
    format!("concat({})", parts.join(", \"'\", "))
}
