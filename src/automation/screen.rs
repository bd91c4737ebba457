/*!
 * Screen driver abstraction.
 *
 * The automation client only ever talks to this trait: captures come back
 * as grayscale frames for anchor matching, actions go out as synthesized
 * input. Tests script the trait directly; real desktops are driven by
 * `DesktopDriver`, compiled in with `--features desktop`.
 */

use image::GrayImage;

use crate::errors::ScreenError;

use super::vision::Region;

/// Key presses the automation session needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    /// Submit fallback when no send button is found
    Enter,
    /// Jump to the end of the conversation
    End,
    /// Select-all before replacing the input box content
    SelectAll,
    /// Paste the clipboard into the focused element
    Paste,
    /// Copy the current selection
    Copy,
}

/// Minimal surface the automation session needs from a desktop
pub trait ScreenDriver: Send + Sync {
    /// Full screen size in pixels
    fn screen_size(&self) -> (u32, u32);

    /// Capture the screen, or only `region` when given
    fn capture(&self, region: Option<Region>) -> Result<GrayImage, ScreenError>;

    /// Click at absolute screen coordinates
    fn click(&self, x: i32, y: i32) -> Result<(), ScreenError>;

    /// Press one key or chord
    fn press(&self, key: KeyPress) -> Result<(), ScreenError>;

    /// Replace the clipboard content
    fn set_clipboard(&self, text: &str) -> Result<(), ScreenError>;

    /// Read the clipboard content
    fn clipboard(&self) -> Result<String, ScreenError>;
}

#[cfg(feature = "desktop")]
pub use desktop::DesktopDriver;

#[cfg(feature = "desktop")]
mod desktop {
    use super::*;

    use arboard::Clipboard;
    use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
    use image::imageops;
    use parking_lot::Mutex;

    /// Real desktop backend: xcap captures, enigo input, arboard clipboard
    pub struct DesktopDriver {
        enigo: Mutex<Enigo>,
        clipboard: Mutex<Clipboard>,
        size: (u32, u32),
    }

    impl DesktopDriver {
        pub fn new() -> Result<Self, ScreenError> {
            let enigo = Enigo::new(&Settings::default())
                .map_err(|e| ScreenError::Input(e.to_string()))?;
            let clipboard =
                Clipboard::new().map_err(|e| ScreenError::Clipboard(e.to_string()))?;
            let monitor = primary_monitor()?;
            let size = (monitor.width(), monitor.height());
            Ok(Self {
                enigo: Mutex::new(enigo),
                clipboard: Mutex::new(clipboard),
                size,
            })
        }
    }

    fn primary_monitor() -> Result<xcap::Monitor, ScreenError> {
        let monitors =
            xcap::Monitor::all().map_err(|e| ScreenError::Capture(e.to_string()))?;
        monitors
            .into_iter()
            .find(|m| m.is_primary())
            .ok_or_else(|| ScreenError::Capture("no primary monitor".to_string()))
    }

    impl ScreenDriver for DesktopDriver {
        fn screen_size(&self) -> (u32, u32) {
            self.size
        }

        fn capture(&self, region: Option<Region>) -> Result<GrayImage, ScreenError> {
            let monitor = primary_monitor()?;
            let frame = monitor
                .capture_image()
                .map_err(|e| ScreenError::Capture(e.to_string()))?;
            let gray = image::DynamicImage::ImageRgba8(frame).to_luma8();
            Ok(match region {
                Some(r) => imageops::crop_imm(&gray, r.left, r.top, r.width, r.height).to_image(),
                None => gray,
            })
        }

        fn click(&self, x: i32, y: i32) -> Result<(), ScreenError> {
            let mut enigo = self.enigo.lock();
            enigo
                .move_mouse(x, y, Coordinate::Abs)
                .map_err(|e| ScreenError::Input(e.to_string()))?;
            enigo
                .button(Button::Left, Direction::Click)
                .map_err(|e| ScreenError::Input(e.to_string()))
        }

        fn press(&self, key: KeyPress) -> Result<(), ScreenError> {
            let mut enigo = self.enigo.lock();
            let input = |e: enigo::InputError| ScreenError::Input(e.to_string());
            match key {
                KeyPress::Enter => enigo.key(Key::Return, Direction::Click).map_err(input),
                KeyPress::End => enigo.key(Key::End, Direction::Click).map_err(input),
                KeyPress::SelectAll => chord(&mut enigo, Key::Unicode('a')),
                KeyPress::Paste => chord(&mut enigo, Key::Unicode('v')),
                KeyPress::Copy => chord(&mut enigo, Key::Unicode('c')),
            }
        }

        fn set_clipboard(&self, text: &str) -> Result<(), ScreenError> {
            self.clipboard
                .lock()
                .set_text(text.to_string())
                .map_err(|e| ScreenError::Clipboard(e.to_string()))
        }

        fn clipboard(&self) -> Result<String, ScreenError> {
            self.clipboard
                .lock()
                .get_text()
                .map_err(|e| ScreenError::Clipboard(e.to_string()))
        }
    }

    /// Ctrl+<key> press/release pair
    fn chord(enigo: &mut Enigo, key: Key) -> Result<(), ScreenError> {
        let input = |e: enigo::InputError| ScreenError::Input(e.to_string());
        enigo.key(Key::Control, Direction::Press).map_err(input)?;
        let result = enigo.key(key, Direction::Click).map_err(input);
        enigo
            .key(Key::Control, Direction::Release)
            .map_err(input)?;
        result
    }
}
