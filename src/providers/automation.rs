/*!
 * Web automation backend.
 *
 * Drives a simulated user session against a provider's chat web UI: the
 * composed prompt is pasted into the recognized input region, submitted,
 * and the screen is polled for visual markers until the response is ready
 * to copy out through the clipboard. There is no structured response
 * channel, so extraction is best-effort: whatever lands on the clipboard
 * is returned as a successful but unverified result, and semantic
 * validation stays with the caller.
 */

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::time::{sleep, Instant};

use crate::app_config::{AutomationConfig, CompletionSignal, ProviderKind};
use crate::automation::{Anchor, AnchorSet, KeyPress, MatchRegion, Region, ScreenDriver};
use crate::errors::ErrorKind;
use crate::job::prompts;

use super::{ProviderClient, ProviderResult};

/// Pixel radius around the action icons in which the copy button must sit
const COPY_SEARCH_RADIUS: u32 = 100;
/// Scroll nudges attempted before giving up on reaching the response tail
const SCROLL_ATTEMPTS: u32 = 5;
/// Settle time after clicks and pastes
const SETTLE: Duration = Duration::from_millis(500);

/// Drives one provider's chat surface through a `ScreenDriver`
pub struct AutomationClient<D: ScreenDriver> {
    driver: D,
    kind: ProviderKind,
    config: AutomationConfig,
    anchors: AnchorSet,
}

impl<D: ScreenDriver> std::fmt::Debug for AutomationClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationClient")
            .field("provider", &self.kind.display_name())
            .finish()
    }
}

impl<D: ScreenDriver> AutomationClient<D> {
    pub fn new(driver: D, kind: ProviderKind, config: AutomationConfig, anchors: AnchorSet) -> Self {
        Self {
            driver,
            kind,
            config,
            anchors,
        }
    }

    fn threshold(&self) -> f64 {
        self.config.match_threshold
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms.max(100))
    }

    /// Match one anchor against a fresh capture
    fn locate(&self, anchor: &Anchor, search: Option<Region>) -> Option<MatchRegion> {
        let screen = match self.driver.capture(None) {
            Ok(screen) => screen,
            Err(e) => {
                warn!("Screen capture failed: {}", e);
                return None;
            }
        };
        anchor.find_in(&screen, self.threshold(), search)
    }

    /// Wait for the input box anchor to appear, confirming the target tab
    /// is focused and ready
    async fn bootstrap(&self) -> Result<MatchRegion, ProviderResult> {
        let deadline = Instant::now() + Duration::from_secs(self.config.bootstrap_timeout_secs);
        loop {
            if let Some(found) = self.locate(&self.anchors.input_box, None) {
                debug!(
                    "{} input box anchored at {:?} (score {:.3})",
                    self.kind.display_name(),
                    found.region,
                    found.score
                );
                return Ok(found);
            }
            if Instant::now() >= deadline {
                return Err(ProviderResult::failure_with(
                    ErrorKind::UiState,
                    format!(
                        "{} input box not found within {}s",
                        self.kind.display_name(),
                        self.config.bootstrap_timeout_secs
                    ),
                ));
            }
            sleep(Duration::from_millis(500)).await;
        }
    }

    /// Paste the prompt into the recognized input region and submit it
    async fn submit(&self, input: MatchRegion, prompt: &str) -> Result<(), ProviderResult> {
        let screen_err =
            |e: crate::errors::ScreenError| ProviderResult::failure_with(ErrorKind::UiState, e.to_string());

        let (x, y) = input.center();
        let y = y + self.config.input_click_offset(self.kind);
        self.driver.click(x, y).map_err(screen_err)?;
        sleep(SETTLE).await;

        // Replace whatever is left in the box from a previous record
        self.driver.press(KeyPress::SelectAll).map_err(screen_err)?;
        self.driver.set_clipboard(prompt).map_err(screen_err)?;
        self.driver.press(KeyPress::Paste).map_err(screen_err)?;
        sleep(SETTLE).await;

        match self.locate_send_button() {
            Some(send) => {
                let (sx, sy) = send.center();
                self.driver.click(sx, sy).map_err(screen_err)?;
            }
            None => {
                debug!("Send button not found, submitting with Enter");
                self.driver.press(KeyPress::Enter).map_err(screen_err)?;
            }
        }
        Ok(())
    }

    fn locate_send_button(&self) -> Option<MatchRegion> {
        self.anchors
            .send_button
            .as_ref()
            .and_then(|anchor| self.locate(anchor, None))
    }

    /// Poll the screen until the response is complete, an error banner is
    /// recognized, or the wait budget runs out
    async fn await_response(&self, max_wait: Duration) -> Result<(), ProviderResult> {
        let deadline = Instant::now() + max_wait;
        let mut elapsed_polls = 0u32;
        loop {
            if let Some(error_anchor) = &self.anchors.error_banner {
                if let Some(found) = self.locate(error_anchor, None) {
                    return Err(ProviderResult::failure_with(
                        ErrorKind::Provider,
                        format!(
                            "{} error banner recognized (score {:.3})",
                            self.kind.display_name(),
                            found.score
                        ),
                    ));
                }
            }

            let complete = match self.config.completion {
                CompletionSignal::BusyClears => self.locate(&self.anchors.busy, None).is_none(),
                CompletionSignal::MarkerAppears => self
                    .anchors
                    .response_ready
                    .as_ref()
                    .and_then(|anchor| self.locate(anchor, None))
                    .is_some(),
            };
            if complete {
                debug!("{} response complete", self.kind.display_name());
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(ProviderResult::failure_with(
                    ErrorKind::Timeout,
                    format!(
                        "{} response not complete within {:?}",
                        self.kind.display_name(),
                        max_wait
                    ),
                ));
            }

            elapsed_polls += 1;
            if elapsed_polls % 6 == 0 {
                info!(
                    "Still waiting on {} ({} polls)",
                    self.kind.display_name(),
                    elapsed_polls
                );
            }
            sleep(self.poll_interval()).await;
        }
    }

    /// Nudge the conversation to its tail until the action icons are visible
    async fn scroll_to_actions(&self) -> Option<MatchRegion> {
        let (width, height) = self.driver.screen_size();
        for attempt in 0..SCROLL_ATTEMPTS {
            // Focus the conversation pane before scrolling; alternate the
            // click point in case an overlay sits mid-screen
            let focus_y = if attempt % 2 == 0 {
                height as i32 / 2
            } else {
                height as i32 * 2 / 3
            };
            let _ = self.driver.click(width as i32 / 2, focus_y);
            let _ = self.driver.press(KeyPress::End);
            sleep(Duration::from_millis(300)).await;

            if let Some(found) = self.locate(&self.anchors.action_icons, None) {
                debug!("Action icons visible after {} scroll attempt(s)", attempt + 1);
                return Some(found);
            }
        }
        None
    }

    /// Copy the response out through the clipboard
    async fn extract(&self, actions: MatchRegion) -> Result<String, ProviderResult> {
        let search = Region::around(
            actions.center(),
            COPY_SEARCH_RADIUS,
            self.driver.screen_size(),
        );
        let Some(copy) = self.locate(&self.anchors.copy_button, Some(search)) else {
            return Err(ProviderResult::failure_with(
                ErrorKind::UiState,
                format!("{} copy button not found", self.kind.display_name()),
            ));
        };

        // Clear the clipboard first so a stale payload cannot masquerade
        // as this record's response
        let _ = self.driver.set_clipboard("");
        let (x, y) = copy.center();
        self.driver
            .click(x, y)
            .map_err(|e| ProviderResult::failure_with(ErrorKind::UiState, e.to_string()))?;
        sleep(SETTLE).await;

        let text = self
            .driver
            .clipboard()
            .map_err(|e| ProviderResult::failure_with(ErrorKind::UiState, e.to_string()))?;
        if text.trim().is_empty() {
            return Err(ProviderResult::failure_with(
                ErrorKind::Provider,
                "clipboard empty after copy",
            ));
        }
        Ok(text)
    }

    /// Delete the conversation so the next record starts from a clean chat.
    /// Best-effort: a failed cleanup never fails the record.
    async fn cleanup(&self) {
        if self.anchors.menu_button.is_none() {
            return;
        }
        let (width, height) = self.driver.screen_size();
        // Conversation menus live in the top strip of the window
        let top_strip = match self.kind {
            ProviderKind::Perplexity => Region::new(width / 2, 0, width / 2, 150),
            _ => Region::new(0, 0, width / 2, 150.min(height)),
        };

        let steps: [(&Option<Anchor>, Option<Region>); 3] = [
            (&self.anchors.menu_button, Some(top_strip)),
            (&self.anchors.delete_button, None),
            (&self.anchors.confirm_button, None),
        ];
        for (anchor, search) in steps {
            let Some(anchor) = anchor.as_ref() else {
                warn!("Cleanup anchor missing, leaving conversation in place");
                return;
            };
            let Some(found) = self.locate(anchor, search) else {
                warn!("Cleanup anchor '{}' not found on screen", anchor.name);
                return;
            };
            let (x, y) = found.center();
            if self.driver.click(x, y).is_err() {
                return;
            }
            sleep(SETTLE).await;
        }
        debug!("{} conversation deleted", self.kind.display_name());
    }
}

#[async_trait]
impl<D: ScreenDriver> ProviderClient for AutomationClient<D> {
    async fn translate(
        &self,
        source_text: &str,
        prompt_template: &str,
        _model: &str,
        _api_key: &str,
        timeout: Duration,
    ) -> ProviderResult {
        let prompt = prompts::render(prompt_template, source_text);
        let max_wait = timeout.min(Duration::from_secs(self.config.max_wait_secs));

        let input = match self.bootstrap().await {
            Ok(input) => input,
            Err(failure) => return failure,
        };
        if let Err(failure) = self.submit(input, &prompt).await {
            return failure;
        }
        if let Err(failure) = self.await_response(max_wait).await {
            self.cleanup().await;
            return failure;
        }

        let Some(actions) = self.scroll_to_actions().await else {
            self.cleanup().await;
            return ProviderResult::failure_with(
                ErrorKind::UiState,
                format!("{} action icons not found", self.kind.display_name()),
            );
        };

        let extracted = self.extract(actions).await;
        self.cleanup().await;

        match extracted {
            Ok(text) => ProviderResult::ok(text),
            Err(failure) => failure,
        }
    }

    fn requires_credentials(&self) -> bool {
        false
    }

    fn name(&self) -> String {
        format!("{} (web)", self.kind.display_name())
    }
}
