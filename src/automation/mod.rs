/*!
 * Screen-level building blocks for the web automation backend.
 *
 * The backend has no structured protocol to talk to: UI state is detected
 * by matching reference anchor images against screen captures, and actions
 * are synthesized input events. Everything above the `ScreenDriver` trait
 * is pure and testable; the real desktop driver lives behind the `desktop`
 * cargo feature.
 */

pub mod screen;
pub mod vision;

pub use screen::{KeyPress, ScreenDriver};
pub use vision::{Anchor, AnchorSet, MatchRegion, Region};

#[cfg(feature = "desktop")]
pub use screen::DesktopDriver;
