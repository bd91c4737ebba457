/*!
 * Driven web session tests against a scripted screen.
 *
 * The session logic is exercised end to end: anchor bootstrap, prompt
 * paste, submit, busy polling, response extraction through the clipboard,
 * and every failure mode the session can classify.
 */

use std::time::Duration;

use aibridge::app_config::{AutomationConfig, ProviderKind};
use aibridge::automation::KeyPress;
use aibridge::errors::ErrorKind;
use aibridge::providers::automation::AutomationClient;
use aibridge::providers::ProviderClient;

use crate::common::fake_screen::{fake_anchor_set, FakeDriver, FakeState};

fn test_config() -> AutomationConfig {
    AutomationConfig {
        poll_interval_ms: 10,
        bootstrap_timeout_secs: 1,
        max_wait_secs: 300,
        match_threshold: 0.85,
        ..AutomationConfig::default()
    }
}

fn client(driver: FakeDriver, with_error_banner: bool) -> AutomationClient<FakeDriver> {
    AutomationClient::new(
        driver,
        ProviderKind::Gemini,
        test_config(),
        fake_anchor_set(with_error_banner),
    )
}

async fn translate(client: &AutomationClient<FakeDriver>, timeout: Duration) -> aibridge::ProviderResult {
    client
        .translate("source text", "Translate: {text}", "", "", timeout)
        .await
}

#[tokio::test]
async fn test_session_withHealthyScreen_shouldExtractResponse() {
    let driver = FakeDriver::new(FakeState::default());
    let state = driver.state();
    let client = client(driver, false);

    let result = translate(&client, Duration::from_secs(5)).await;
    assert_eq!(result.error, None);
    assert_eq!(result.text.as_deref(), Some("1. translated line"));

    let state = state.lock();
    // The prompt was pasted through the clipboard, not typed
    assert!(state.keys.contains(&KeyPress::SelectAll));
    assert!(state.keys.contains(&KeyPress::Paste));
    assert!(!state.clicks.is_empty());
}

#[tokio::test]
async fn test_session_withMissingInputBox_shouldClassifyUiStateError() {
    let driver = FakeDriver::new(FakeState {
        input_visible: false,
        ..FakeState::default()
    });
    let mut config = test_config();
    config.bootstrap_timeout_secs = 0;
    let client = AutomationClient::new(
        driver,
        ProviderKind::Gemini,
        config,
        fake_anchor_set(false),
    );

    let result = translate(&client, Duration::from_secs(1)).await;
    assert_eq!(result.error, Some(ErrorKind::UiState));
}

#[tokio::test]
async fn test_session_withBusyNeverClearing_shouldTimeOut() {
    let driver = FakeDriver::new(FakeState {
        busy_captures_after_send: u32::MAX,
        ..FakeState::default()
    });
    let client = client(driver, false);

    let result = translate(&client, Duration::from_millis(150)).await;
    assert_eq!(result.error, Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn test_session_withErrorBanner_shouldClassifyProviderError() {
    let driver = FakeDriver::new(FakeState {
        error_visible: true,
        ..FakeState::default()
    });
    let client = client(driver, true);

    let result = translate(&client, Duration::from_secs(5)).await;
    assert_eq!(result.error, Some(ErrorKind::Provider));
    assert!(result.detail.unwrap().contains("error banner"));
}

#[tokio::test]
async fn test_session_withGarbledClipboard_shouldStillSucceedUnverified() {
    // Extraction is best-effort: a partial/garbled copy is a Done result,
    // semantic validation is the caller's business
    let driver = FakeDriver::new(FakeState {
        response: "�garbled ĉontent".to_string(),
        ..FakeState::default()
    });
    let client = client(driver, false);

    let result = translate(&client, Duration::from_secs(5)).await;
    assert_eq!(result.error, None);
    assert_eq!(result.text.as_deref(), Some("�garbled ĉontent"));
}

#[tokio::test]
async fn test_session_withEmptyClipboard_shouldClassifyProviderError() {
    let driver = FakeDriver::new(FakeState {
        response: String::new(),
        ..FakeState::default()
    });
    let client = client(driver, false);

    let result = translate(&client, Duration::from_secs(5)).await;
    assert_eq!(result.error, Some(ErrorKind::Provider));
}

#[test]
fn test_automation_client_shouldNotConsumeCredentials() {
    let driver = FakeDriver::new(FakeState::default());
    let client = client(driver, false);
    assert!(!client.requires_credentials());
}
