use std::time::Duration;

use async_trait::async_trait;
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use thirtyfour::{CapabilitiesHelper, Proxy};
use tracing::{debug, info, warn};

use crate::config::BrowserSettings;
use crate::error::{CardError, ScrapeError};
use crate::feed::FeedSurface;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A WebDriver-controlled Chrome pointed at the maps search page.
pub struct BrowserSession {
    driver: WebDriver,
    settings: BrowserSettings,
    scroll_px: i64,
}

impl BrowserSession {
    pub async fn open(settings: &BrowserSettings, scroll_px: i64) -> Result<Self, ScrapeError> {
        let session_err = |source| ScrapeError::Session {
            url: settings.webdriver_url.clone(),
            source,
        };

        let mut caps = DesiredCapabilities::chrome();
        caps.add_arg("--disable-blink-features=AutomationControlled")
            .map_err(session_err)?;
        if settings.headless {
            caps.add_arg("--headless=new").map_err(session_err)?;
        }
        if let Some(proxy) = &settings.proxy {
            caps.set_proxy(Proxy::Manual {
                ftp_proxy: None,
                http_proxy: Some(proxy.clone()),
                ssl_proxy: Some(proxy.clone()),
                socks_proxy: None,
                socks_version: None,
                socks_username: None,
                socks_password: None,
                no_proxy: None,
            })
            .map_err(session_err)?;
        }

        let driver = WebDriver::new(settings.webdriver_url.as_str(), caps)
            .await
            .map_err(session_err)?;
        info!("WebDriver session started at {}", settings.webdriver_url);

        Ok(BrowserSession {
            driver,
            settings: settings.clone(),
            scroll_px,
        })
    }

    pub async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        let nav_err = |source| ScrapeError::NavigationTimeout {
            url: url.to_string(),
            source,
        };
        self.driver
            .set_page_load_timeout(Duration::from_secs(self.settings.navigation_timeout_secs))
            .await
            .map_err(nav_err)?;
        self.driver.goto(url).await.map_err(nav_err)?;
        Ok(())
    }

    /// Type the query into the search box and submit it.
    pub async fn search(&self, query: &str) -> Result<(), ScrapeError> {
        let selector = &self.settings.search_box_selector;
        let search_err = |source| ScrapeError::SearchBox {
            selector: selector.clone(),
            source,
        };

        let input = self
            .driver
            .query(By::Css(selector.as_str()))
            .wait(self.feed_timeout(), POLL_INTERVAL)
            .first()
            .await
            .map_err(search_err)?;
        input.clear().await?;
        input.send_keys(query).await?;
        input.send_keys(Key::Enter + "").await?;
        info!("Submitted search: {}", query);
        Ok(())
    }

    /// Block until the result feed renders.
    pub async fn wait_for_feed(&self) -> Result<(), ScrapeError> {
        self.driver
            .query(By::Css(self.settings.feed_selector.as_str()))
            .wait(self.feed_timeout(), POLL_INTERVAL)
            .first()
            .await
            .map_err(|e| self.feed_missing(e))?;
        Ok(())
    }

    /// Navigate, search and wait for the feed. The usual entry sequence.
    pub async fn open_results(&self, query: &str) -> Result<(), ScrapeError> {
        self.navigate(&self.settings.maps_url).await?;
        self.search(query).await?;
        info!("Waiting for results...");
        self.wait_for_feed().await
    }

    /// End the WebDriver session. Errors are logged, never returned.
    pub async fn close(self) {
        if let Err(e) = self.driver.quit().await {
            warn!("Failed to close browser session: {}", e);
        } else {
            debug!("Browser session closed");
        }
    }

    fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.feed_timeout_secs)
    }

    fn feed_missing(&self, source: WebDriverError) -> ScrapeError {
        ScrapeError::FeedNotFound {
            selector: self.settings.feed_selector.clone(),
            source: Box::new(source),
        }
    }

    fn end_marker_xpath(&self) -> String {
        format!(
            "//*[contains(text(), {})]",
            xpath_literal(&self.settings.end_marker)
        )
    }
}

#[async_trait]
impl FeedSurface for BrowserSession {
    type Item = WebElement;

    async fn materialized(&self) -> Result<Vec<WebElement>, ScrapeError> {
        Ok(self
            .driver
            .find_all(By::Css(self.settings.card_selector.as_str()))
            .await?)
    }

    async fn load_more(&self) -> Result<(), ScrapeError> {
        let feed = self
            .driver
            .find(By::Css(self.settings.feed_selector.as_str()))
            .await
            .map_err(|e| self.feed_missing(e))?;

        self.driver
            .action_chain()
            .move_to_element_center(&feed)
            .perform()
            .await?;
        self.driver
            .execute(
                "arguments[0].scrollBy(0, arguments[1]);",
                vec![feed.to_json()?, serde_json::json!(self.scroll_px)],
            )
            .await?;
        Ok(())
    }

    async fn end_of_list(&self) -> Result<bool, ScrapeError> {
        let hits = self
            .driver
            .find_all(By::XPath(self.end_marker_xpath().as_str()))
            .await?;
        Ok(!hits.is_empty())
    }

    async fn card_text(&self, item: &WebElement) -> Result<String, CardError> {
        item.text().await.map_err(|e| CardError::Text(Box::new(e)))
    }
}

/// Quote `s` as an XPath 1.0 string literal. XPath has no escapes, so
/// strings holding both quote kinds go through `concat()`.
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        return format!("'{}'", s);
    }
    if !s.contains('"') {
        return format!("\"{}\"", s);
    }
    let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
    format!("concat({})", parts.join(", \"'\", "))
}
