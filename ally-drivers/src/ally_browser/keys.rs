//! Browser key names to WebDriver key code points.
use fantoccini::key::Key;

/// Resolve a browser key name (`Enter`, `ArrowUp`, `KeyA`, `Digit3`, `F5`,
/// `Control`, or any single character) to the WebDriver code point.
pub fn webdriver_key(name: &str) -> Option<char> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(c);
    }

    let special = match name {
        "Enter" => Key::Enter,
        "Tab" => Key::Tab,
        "Backspace" => Key::Backspace,
        "Delete" => Key::Delete,
        "Escape" => Key::Escape,
        "Home" => Key::Home,
        "End" => Key::End,
        "Insert" => Key::Insert,
        "PageUp" => Key::PageUp,
        "PageDown" => Key::PageDown,
        "ArrowLeft" => Key::Left,
        "ArrowRight" => Key::Right,
        "ArrowUp" => Key::Up,
        "ArrowDown" => Key::Down,
        "Control" => Key::Control,
        "Shift" => Key::Shift,
        "Alt" => Key::Alt,
        "Meta" => Key::Meta,
        "F1" => Key::F1,
        "F2" => Key::F2,
        "F3" => Key::F3,
        "F4" => Key::F4,
        "F5" => Key::F5,
        "F6" => Key::F6,
        "F7" => Key::F7,
        "F8" => Key::F8,
        "F9" => Key::F9,
        "F10" => Key::F10,
        "F11" => Key::F11,
        "F12" => Key::F12,
        "Space" => return Some(' '),
        "Backquote" => return Some('`'),
        "Minus" => return Some('-'),
        "Equal" => return Some('='),
        "Backslash" => return Some('\\'),
        other => return code_key(other),
    };
    Some(special.into())
}

/// `KeyA`..`KeyZ` and `Digit0`..`Digit9`.
fn code_key(name: &str) -> Option<char> {
    let tail = name
        .strip_prefix("Key")
        .filter(|t| t.len() == 1 && t.chars().all(|c| c.is_ascii_uppercase()))
        .map(|t| t.to_ascii_lowercase())
        .or_else(|| {
            name.strip_prefix("Digit")
                .filter(|t| t.len() == 1 && t.chars().all(|c| c.is_ascii_digit()))
                .map(str::to_string)
        })?;
    tail.chars().next()
}
