//! Key names as the model writes them, normalised to browser key names.
use crate::ToolError;

pub const MODIFIERS: [&str; 4] = ["Control", "Meta", "Alt", "Shift"];

const NAMED_KEYS: &[&str] = &[
    "Backquote",
    "Minus",
    "Equal",
    "Backslash",
    "Backspace",
    "Tab",
    "Delete",
    "Escape",
    "ArrowDown",
    "End",
    "Enter",
    "Home",
    "Insert",
    "PageDown",
    "PageUp",
    "ArrowRight",
    "ArrowUp",
    "ArrowLeft",
    "Meta",
    "Alt",
    "Control",
    "Shift",
];

/// Map an xdotool-style or browser key name to the browser vocabulary.
///
/// ```
/// use ally_tools::keys::to_browser_key;
///
/// assert_eq!(to_browser_key("Return").unwrap(), "Enter");
/// assert_eq!(to_browser_key("Page_Down").unwrap(), "PageDown");
/// assert_eq!(to_browser_key("x").unwrap(), "x");
/// assert!(to_browser_key("Hyper_L").is_err());
/// ```
pub fn to_browser_key(key: &str) -> Result<String, ToolError> {
    let mapped = match key {
        "Return" => Some("Enter"),
        "Page_Down" => Some("PageDown"),
        "Page_Up" => Some("PageUp"),
        "Left" => Some("ArrowLeft"),
        "Right" => Some("ArrowRight"),
        "Up" => Some("ArrowUp"),
        "Down" => Some("ArrowDown"),
        "BackSpace" => Some("Backspace"),
        "Del" => Some("Delete"),
        "Esc" => Some("Escape"),
        "Space" | "Spacebar" => Some(" "),
        "alt" => Some("Alt"),
        _ => None,
    };
    if let Some(mapped) = mapped {
        return Ok(mapped.to_string());
    }
    if is_browser_key(key) || key.chars().count() == 1 {
        return Ok(key.to_string());
    }
    Err(ToolError::new(format!(
        "Unrecognized key: '{key}'. Please use a standard key name."
    )))
}

fn is_browser_key(key: &str) -> bool {
    if NAMED_KEYS.contains(&key) {
        return true;
    }
    let numbered = |prefix: &str, range: std::ops::RangeInclusive<u32>| {
        key.strip_prefix(prefix)
            .filter(|n| !n.starts_with('0') || *n == "0")
            .and_then(|n| n.parse::<u32>().ok())
            .is_some_and(|n| range.contains(&n))
    };
    if numbered("F", 1..=12) || numbered("Digit", 0..=9) {
        return true;
    }
    key.strip_prefix("Key")
        .is_some_and(|rest| rest.len() == 1 && rest.bytes().all(|b| b.is_ascii_uppercase()))
}

/// Normalise one chord modifier (`ctrl`, `Cmd`, `option`, ...) to its browser name.
pub fn normalize_modifier(modifier: &str) -> Result<&'static str, ToolError> {
    let name = match modifier.to_ascii_lowercase().as_str() {
        "ctrl" | "control" => "Control",
        "cmd" | "command" | "meta" => "Meta",
        "alt" | "option" => "Alt",
        "shift" => "Shift",
        _ => {
            return Err(ToolError::new(format!(
                "Invalid modifier key: '{modifier}'. Valid modifiers are: Ctrl, Meta, Alt, Shift"
            )))
        }
    };
    Ok(name)
}

/// A `+`-joined key combination such as `ctrl+shift+t`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    /// Browser modifier names in the order they are pressed.
    pub modifiers: Vec<&'static str>,
    /// The base key as written.
    pub raw_key: String,
    /// The base key in browser vocabulary.
    pub key: String,
}

impl KeyChord {
    pub fn parse(text: &str) -> Result<Self, ToolError> {
        let (modifiers, raw_key) = split_chord(text);
        let modifiers = modifiers
            .into_iter()
            .map(normalize_modifier)
            .collect::<Result<Vec<_>, _>>()?;
        let key = to_browser_key(raw_key)?;
        Ok(Self {
            modifiers,
            raw_key: raw_key.to_string(),
            key,
        })
    }
}

/// `"+"` and `"ctrl++"` keep the plus sign as the base key.
fn split_chord(text: &str) -> (Vec<&str>, &str) {
    if text == "+" {
        return (Vec::new(), text);
    }
    if let Some(prefix) = text.strip_suffix("++") {
        return (prefix.split('+').collect(), "+");
    }
    match text.rsplit_once('+') {
        Some((mods, key)) => (mods.split('+').collect(), key),
        None => (Vec::new(), text),
    }
}
